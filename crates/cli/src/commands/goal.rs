//! `voxpilot goal` — run one goal from text or a WAV recording.

use std::path::PathBuf;

use voxpilot_agent::VoiceOutcome;
use voxpilot_core::signal::SignalKind;

use super::session::{self, Session};

pub async fn run(text: Option<String>, audio: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let config = session::load_config()?;
    let Session {
        mut agent,
        gateway,
        narrator,
        ..
    } = session::build(&config).await?;

    let outcome = match (text, audio) {
        (_, Some(path)) => {
            let wav = tokio::fs::read(&path)
                .await
                .map_err(|e| format!("Failed to read {}: {e}", path.display()))?;
            match gateway.handle_utterance(SignalKind::NewGoal, wav).await? {
                VoiceOutcome::Sent(signal) => println!("  Heard: {}", signal.text),
                VoiceOutcome::Rejected { transcript } => {
                    narrator.wait_idle().await;
                    return Err(format!("Recording not understood (heard {transcript:?})").into());
                }
                VoiceOutcome::ChannelClosed => return Err("Agent is not running".into()),
            }
            agent.apply_signals().await;
            agent.drive().await?
        }
        (Some(text), None) => agent.run(&text).await?,
        (None, None) => return Err("Provide a goal, e.g. voxpilot goal \"open youtube\"".into()),
    };

    println!();
    println!("  {}", session::describe_outcome(&outcome));
    narrator.wait_idle().await;
    Ok(())
}
