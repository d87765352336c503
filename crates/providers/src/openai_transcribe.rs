//! OpenAI speech-to-text (`/audio/transcriptions`).
//!
//! Requests token logprobs so the voice gateway can reject low-confidence
//! transcripts instead of acting on a misheard command.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};
use voxpilot_config::TranscriptionConfig;
use voxpilot_core::error::ProviderError;
use voxpilot_core::speech::{Transcriber, Transcript};

pub struct OpenAiTranscriber {
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    client: reqwest::Client,
}

impl OpenAiTranscriber {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        config: &TranscriptionConfig,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: config.model.clone(),
            temperature: config.temperature,
            client: crate::http_client(Duration::from_secs(config.timeout_secs)),
        }
    }

    fn form(&self, wav: Vec<u8>) -> Result<Form, ProviderError> {
        let file = Part::bytes(wav)
            .file_name("speech.wav")
            .mime_str("audio/wav")
            .map_err(|e| ProviderError::ApiError {
                status_code: 0,
                message: format!("Invalid audio part: {e}"),
            })?;

        Ok(Form::new()
            .part("file", file)
            .text("model", self.model.clone())
            .text("temperature", self.temperature.to_string())
            .text("response_format", "json")
            .text("include[]", "logprobs"))
    }

    fn into_transcript(response: ApiTranscription) -> Transcript {
        let avg_logprob = if response.logprobs.is_empty() {
            None
        } else {
            let sum: f64 = response.logprobs.iter().map(|t| t.logprob).sum();
            Some(sum / response.logprobs.len() as f64)
        };
        Transcript {
            text: response.text.trim().to_string(),
            avg_logprob,
        }
    }
}

#[async_trait]
impl Transcriber for OpenAiTranscriber {
    fn name(&self) -> &str {
        "openai"
    }

    async fn transcribe(&self, wav: Vec<u8>) -> Result<Transcript, ProviderError> {
        let url = format!("{}/audio/transcriptions", self.base_url);
        debug!(model = %self.model, bytes = wav.len(), "Sending transcription request");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .multipart(self.form(wav)?)
            .send()
            .await
            .map_err(crate::map_transport_error)?;

        let status = response.status().as_u16();
        if status == 401 || status == 403 {
            return Err(ProviderError::AuthenticationFailed(
                "Invalid transcription API key".into(),
            ));
        }
        if status == 429 {
            return Err(ProviderError::RateLimited {
                retry_after_secs: 5,
            });
        }
        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Transcription failed");
            return Err(ProviderError::ApiError {
                status_code: status,
                message: error_body,
            });
        }

        let body: ApiTranscription = response.json().await.map_err(|e| ProviderError::ApiError {
            status_code: 200,
            message: format!("Failed to parse transcription: {e}"),
        })?;

        Ok(Self::into_transcript(body))
    }
}

#[derive(Debug, Deserialize)]
struct ApiTranscription {
    text: String,
    #[serde(default)]
    logprobs: Vec<ApiLogprob>,
}

#[derive(Debug, Deserialize)]
struct ApiLogprob {
    logprob: f64,
}
