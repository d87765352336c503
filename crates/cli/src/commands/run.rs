//! `voxpilot run` — interactive session.
//!
//! Stdin stands in for the two push-to-talk keys: a plain line is the
//! primary key (new goal), a line starting with `+` the secondary key
//! (amend the current goal).

use tokio::io::{self, AsyncBufReadExt, BufReader};
use voxpilot_agent::{VoiceGateway, VoiceOutcome};
use voxpilot_core::signal::SignalKind;

use super::session::{self, Session};

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = session::load_config()?;
    let Session {
        mut agent,
        gateway,
        narrator,
        speech,
    } = session::build(&config).await?;

    println!();
    println!("  ╔══════════════════════════════════════════════╗");
    println!("  ║          VoxPilot — Interactive Mode         ║");
    println!("  ╚══════════════════════════════════════════════╝");
    println!();
    println!("  Model:     {}", config.reasoning.model);
    println!("  Browser:   {}", config.browser.bridge_url);
    println!("  Speech:    {speech}");
    println!();
    println!("  Type a goal and press Enter to start it.");
    println!("  Start a line with '+' to add to the current goal.");
    println!("  Type 'exit' or Ctrl+C to quit.");
    println!();

    let input = tokio::spawn(read_lines(gateway));
    agent.serve().await?;
    narrator.wait_idle().await;
    input.abort();

    println!();
    println!("  Goodbye! 👋");
    println!();
    Ok(())
}

/// Split a stdin line into a signal kind and its text.
pub fn classify(line: &str) -> Option<(SignalKind, &str)> {
    let line = line.trim();
    let (kind, text) = match line.strip_prefix('+') {
        Some(rest) => (SignalKind::AmendGoal, rest.trim()),
        None => (SignalKind::NewGoal, line),
    };
    (!text.is_empty()).then_some((kind, text))
}

/// Forward stdin lines until `exit` or EOF. Dropping the gateway closes the
/// signal channel, which ends the session once the agent is idle.
async fn read_lines(gateway: VoiceGateway) {
    let mut lines = BufReader::new(io::stdin()).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if matches!(line.trim(), "exit" | "quit" | "/exit" | "/quit" | ":q") {
            break;
        }
        let Some((kind, text)) = classify(&line) else {
            continue;
        };
        if gateway.submit_text(kind, text) == VoiceOutcome::ChannelClosed {
            break;
        }
    }
}
