//! `voxpilot doctor` — Diagnose system health.

use voxpilot_config::AppConfig;
use voxpilot_core::browser::BrowserLayer;
use voxpilot_core::provider::Provider;
use voxpilot_providers::{HttpBrowserBridge, OpenAiCompatProvider};

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    println!("🩺 VoxPilot Doctor — System Diagnostics");
    println!("=======================================\n");

    let mut issues = 0;

    let config_path = AppConfig::config_dir().join("config.toml");
    if !config_path.exists() {
        println!("  ⚠️  No config file at {} (using defaults)", config_path.display());
    }

    let config = match AppConfig::load() {
        Ok(config) => {
            println!("  ✅ Configuration valid");
            config
        }
        Err(e) => {
            println!("  ❌ Configuration invalid: {e}");
            println!("\n  ⚠️  Fix the configuration and run doctor again.");
            return Ok(());
        }
    };

    // Reasoning service
    match OpenAiCompatProvider::from_config(&config.reasoning) {
        Ok(provider) => match provider.health_check().await {
            Ok(true) => println!("  ✅ Reasoning service reachable ({})", config.reasoning.base_url),
            Ok(false) => {
                println!("  ❌ Reasoning service rejected the request (check the API key)");
                issues += 1;
            }
            Err(e) => {
                println!("  ❌ Reasoning service unreachable: {e}");
                issues += 1;
            }
        },
        Err(e) => {
            println!("  ❌ {e}");
            issues += 1;
        }
    }

    // Browser bridge
    let bridge = HttpBrowserBridge::from_config(&config.browser);
    match bridge.health_check().await {
        Ok(true) => println!("  ✅ Browser bridge reachable ({})", config.browser.bridge_url),
        Ok(false) => {
            println!("  ❌ Browser bridge is up but not ready");
            issues += 1;
        }
        Err(e) => {
            println!("  ❌ Browser bridge unreachable: {e}");
            issues += 1;
        }
    }

    // Speech
    if !config.speech.enabled {
        println!("  ⚠️  Narration disabled");
    } else if config.speech.api_key.is_some() {
        println!("  ✅ ElevenLabs key configured (voice {})", config.speech.voice_id);
    } else {
        println!("  ⚠️  No ElevenLabs key; narration goes to the console");
    }

    // Summary
    println!();
    if issues == 0 {
        println!("  🎉 All checks passed!");
    } else {
        println!("  ⚠️  {issues} issue(s) found. See above for details.");
    }

    Ok(())
}
