//! ElevenLabs streaming text-to-speech.
//!
//! Audio arrives as raw PCM chunks which are handed to an [`AudioSink`] as
//! they stream in. `speak` resolves once the sink has consumed the last
//! chunk; dropping the future stops the download and the playback with it.

use async_trait::async_trait;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use voxpilot_config::SpeechConfig;
use voxpilot_core::error::ProviderError;
use voxpilot_core::speech::{AudioSink, SpeechSynthesizer};

use crate::playback::PlaybackGuard;

pub struct ElevenLabsSynthesizer {
    base_url: String,
    api_key: String,
    voice_id: String,
    model_id: String,
    output_format: String,
    sink: Arc<dyn AudioSink>,
    client: reqwest::Client,
}

impl ElevenLabsSynthesizer {
    pub fn new(api_key: impl Into<String>, config: &SpeechConfig, sink: Arc<dyn AudioSink>) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            voice_id: config.voice_id.clone(),
            model_id: config.model_id.clone(),
            output_format: config.output_format.clone(),
            sink,
            client: crate::http_client(Duration::from_secs(60)),
        }
    }

    fn stream_url(&self) -> String {
        format!(
            "{}/text-to-speech/{}/stream?output_format={}",
            self.base_url, self.voice_id, self.output_format
        )
    }
}

#[async_trait]
impl SpeechSynthesizer for ElevenLabsSynthesizer {
    fn name(&self) -> &str {
        "elevenlabs"
    }

    async fn speak(&self, text: &str) -> Result<(), ProviderError> {
        let body = serde_json::json!({
            "text": text,
            "model_id": self.model_id,
        });

        debug!(voice = %self.voice_id, chars = text.len(), "Requesting speech");

        let response = self
            .client
            .post(self.stream_url())
            .header("xi-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(crate::map_transport_error)?;

        let status = response.status().as_u16();
        if status == 401 || status == 403 {
            return Err(ProviderError::AuthenticationFailed(
                "Invalid ElevenLabs API key".into(),
            ));
        }
        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Speech synthesis failed");
            return Err(ProviderError::ApiError {
                status_code: status,
                message: error_body,
            });
        }

        let guard = PlaybackGuard::new(self.sink.as_ref());
        let mut chunks = response.bytes_stream();
        while let Some(chunk) = chunks.next().await {
            let chunk = chunk.map_err(|e| ProviderError::StreamInterrupted(e.to_string()))?;
            self.sink.write(&chunk).await?;
        }
        self.sink.finish().await?;
        guard.disarm();
        Ok(())
    }
}
