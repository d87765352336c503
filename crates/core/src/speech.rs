//! Speech traits — synthesis for narration and transcription for voice input.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;

/// Turns an explanation into audible speech.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    fn name(&self) -> &str;

    /// Speak `text`, resolving once playback has finished.
    ///
    /// Dropping the future cancels synthesis and playback.
    async fn speak(&self, text: &str) -> Result<(), ProviderError>;
}

/// Destination for synthesized PCM audio chunks.
#[async_trait]
pub trait AudioSink: Send + Sync {
    fn name(&self) -> &str;

    /// Play (or store) one chunk; resolves when the chunk has been consumed.
    async fn write(&self, chunk: &[u8]) -> Result<(), ProviderError>;

    /// Called once after the last chunk of an utterance.
    async fn finish(&self) -> Result<(), ProviderError> {
        Ok(())
    }

    /// Silence anything still queued. Called when an utterance is cancelled.
    fn stop(&self) {}
}

/// A final transcript of one push-to-talk segment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transcript {
    pub text: String,

    /// Mean token log-probability, when the provider reports it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avg_logprob: Option<f64>,
}

impl Transcript {
    /// Whether the transcript clears the confidence threshold. Transcripts
    /// without logprobs are trusted.
    pub fn is_confident(&self, min_avg_logprob: f64) -> bool {
        self.avg_logprob.is_none_or(|lp| lp >= min_avg_logprob)
    }
}

/// Turns one recorded audio segment (WAV bytes) into text.
#[async_trait]
pub trait Transcriber: Send + Sync {
    fn name(&self) -> &str;

    async fn transcribe(&self, wav: Vec<u8>) -> Result<Transcript, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confidence_threshold() {
        let sure = Transcript { text: "open youtube".into(), avg_logprob: Some(-0.1) };
        let unsure = Transcript { text: "opn ytb".into(), avg_logprob: Some(-0.9) };
        let unknown = Transcript { text: "hello".into(), avg_logprob: None };
        assert!(sure.is_confident(-0.5));
        assert!(!unsure.is_confident(-0.5));
        assert!(unknown.is_confident(-0.5));
    }
}
