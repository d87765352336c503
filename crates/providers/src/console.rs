//! Console synthesizer — prints narration for terminals without audio.
//!
//! Playback time is simulated from the word count so the narration slot
//! behaves the same as with real speech.

use async_trait::async_trait;
use std::time::Duration;
use voxpilot_core::error::ProviderError;
use voxpilot_core::speech::SpeechSynthesizer;

pub struct ConsoleSynthesizer {
    words_per_minute: u32,
}

impl ConsoleSynthesizer {
    pub fn new(words_per_minute: u32) -> Self {
        Self {
            words_per_minute: words_per_minute.max(1),
        }
    }

    /// How long speaking `text` would take.
    pub fn speaking_time(&self, text: &str) -> Duration {
        let words = text.split_whitespace().count() as f64;
        Duration::from_secs_f64(words * 60.0 / self.words_per_minute as f64)
    }
}

#[async_trait]
impl SpeechSynthesizer for ConsoleSynthesizer {
    fn name(&self) -> &str {
        "console"
    }

    async fn speak(&self, text: &str) -> Result<(), ProviderError> {
        println!("🔊 {text}");
        tokio::time::sleep(self.speaking_time(text)).await;
        Ok(())
    }
}
