//! Voice gateway: push-to-talk utterances in, interruption signals out.

use std::sync::Arc;

use tracing::{debug, info};
use voxpilot_core::error::ProviderError;
use voxpilot_core::signal::{InterruptionSignal, SignalKind};
use voxpilot_core::speech::Transcriber;

use crate::interruption::SignalSender;
use crate::narration::NarrationCoordinator;

/// Spoken when a transcript is empty or too uncertain to act on.
pub const NOT_UNDERSTOOD: &str = "I didn't catch that. Please try again.";

/// What happened to one utterance.
#[derive(Debug, Clone, PartialEq)]
pub enum VoiceOutcome {
    Sent(InterruptionSignal),
    /// Blank or low-confidence; the user was asked to repeat
    Rejected { transcript: String },
    /// The agent is gone
    ChannelClosed,
}

pub struct VoiceGateway {
    transcriber: Arc<dyn Transcriber>,
    signals: SignalSender,
    narrator: Arc<NarrationCoordinator>,
    min_avg_logprob: f64,
}

impl VoiceGateway {
    pub fn new(
        transcriber: Arc<dyn Transcriber>,
        signals: SignalSender,
        narrator: Arc<NarrationCoordinator>,
    ) -> Self {
        Self {
            transcriber,
            signals,
            narrator,
            min_avg_logprob: -0.5,
        }
    }

    pub fn with_min_avg_logprob(mut self, threshold: f64) -> Self {
        self.min_avg_logprob = threshold;
        self
    }

    /// Transcribe one recorded segment and forward it to the agent.
    ///
    /// `kind` follows the key that was held: primary starts a new goal,
    /// secondary amends the current one.
    pub async fn handle_utterance(&self, kind: SignalKind, wav: Vec<u8>) -> Result<VoiceOutcome, ProviderError> {
        let transcript = self.transcriber.transcribe(wav).await?;
        debug!(
            transcriber = self.transcriber.name(),
            text = %transcript.text,
            avg_logprob = ?transcript.avg_logprob,
            "Utterance transcribed"
        );

        if !transcript.is_confident(self.min_avg_logprob) {
            info!(text = %transcript.text, avg_logprob = ?transcript.avg_logprob, "Transcript below confidence threshold");
            return Ok(self.reject(transcript.text));
        }
        Ok(self.submit_text(kind, &transcript.text))
    }

    /// Forward already-transcribed text (typed input, tests).
    pub fn submit_text(&self, kind: SignalKind, text: &str) -> VoiceOutcome {
        let text = text.trim();
        if text.is_empty() {
            return self.reject(String::new());
        }

        let signal = InterruptionSignal {
            kind,
            text: text.to_string(),
        };
        if !self.signals.send(signal.clone()) {
            return VoiceOutcome::ChannelClosed;
        }
        info!(?kind, text = %text, "Signal sent");
        VoiceOutcome::Sent(signal)
    }

    fn reject(&self, transcript: String) -> VoiceOutcome {
        self.narrator.announce(NOT_UNDERSTOOD);
        VoiceOutcome::Rejected { transcript }
    }
}
