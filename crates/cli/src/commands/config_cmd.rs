//! `voxpilot config` — Configuration management commands.

use voxpilot_config::AppConfig;

pub fn show_default() {
    println!("{}", AppConfig::default_toml());
}

pub fn validate() -> Result<(), Box<dyn std::error::Error>> {
    println!("🔍 Validating configuration...");

    match AppConfig::load() {
        Ok(config) => {
            println!("   ✅ Config parsed successfully");

            let warnings = warnings(&config);
            if warnings.is_empty() {
                println!("   ✅ All checks passed");
            } else {
                println!();
                for w in &warnings {
                    println!("   ⚠️  {w}");
                }
            }

            println!();
            println!("   Model:       {}", config.reasoning.model);
            println!("   Endpoint:    {}", config.reasoning.base_url);
            println!("   Browser:     {}", config.browser.bridge_url);
            println!("   Voice:       {}", config.speech.voice_id);
            println!("   Max cycles:  {}", config.agent.max_cycles);
            println!(
                "   Loop check:  {} of last {}",
                config.loop_detection.threshold, config.loop_detection.window
            );
            match &config.session_log.path {
                Some(path) => println!("   Session log: {}", path.display()),
                None => println!("   Session log: off"),
            }
        }
        Err(e) => {
            println!("   ❌ Config error: {e}");
            return Err(e.into());
        }
    }

    Ok(())
}

pub fn path() {
    println!("{}", AppConfig::config_dir().join("config.toml").display());
}

/// Settings that load fine but will degrade a session.
fn warnings(config: &AppConfig) -> Vec<&'static str> {
    let mut warnings = Vec::new();
    if !config.has_api_key() {
        warnings.push("No reasoning API key (set OPENAI_API_KEY or VOXPILOT_API_KEY)");
    }
    if config.speech.enabled && config.speech.api_key.is_none() {
        warnings.push("No ElevenLabs key; narration will be printed instead of spoken");
    }
    if config.browser.start_url.is_none() {
        warnings.push("No browser.start_url; goals start on whatever page is open");
    }
    warnings
}
