//! External service adapters for VoxPilot.
//!
//! - [`OpenAiCompatProvider`] implements `voxpilot_core::Provider`
//! - [`OpenAiTranscriber`] implements `voxpilot_core::Transcriber`
//! - [`ElevenLabsSynthesizer`] and [`ConsoleSynthesizer`] implement
//!   `voxpilot_core::SpeechSynthesizer`
//! - [`HttpBrowserBridge`] implements `voxpilot_core::BrowserLayer`
//! - [`PacedPcmSink`] and, with the `audio-device` feature, `DevicePcmSink`
//!   implement `voxpilot_core::AudioSink`

pub mod browser_bridge;
pub mod console;
pub mod elevenlabs;
pub mod openai_compat;
pub mod openai_transcribe;
pub mod playback;

pub use browser_bridge::HttpBrowserBridge;
pub use console::ConsoleSynthesizer;
pub use elevenlabs::ElevenLabsSynthesizer;
pub use openai_compat::OpenAiCompatProvider;
pub use openai_transcribe::OpenAiTranscriber;
#[cfg(feature = "audio-device")]
pub use playback::DevicePcmSink;
pub use playback::{PacedPcmSink, pcm_sample_rate};

use std::time::Duration;
use voxpilot_core::error::ProviderError;

/// Shared HTTP client construction with a request timeout.
pub(crate) fn http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Falling back to default HTTP client");
            reqwest::Client::new()
        })
}

/// Classify a reqwest transport failure.
pub(crate) fn map_transport_error(e: reqwest::Error) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Timeout(e.to_string())
    } else {
        ProviderError::Network(e.to_string())
    }
}
