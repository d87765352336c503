//! HTTP browser bridge.
//!
//! Talks to a small companion process that owns the real browser (for
//! example a Playwright or BrowserGym server). Wire format:
//!
//! - `POST /act` with an action record (`{"op":"click","target":"12"}`)
//!   answers `200` with a page snapshot, or an error status with
//!   `{"kind": "...", "message": "..."}`
//! - `GET /observe` answers `200` with the current page snapshot
//! - `GET /health` answers `200` when the browser is ready

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};
use voxpilot_config::BrowserConfig;
use voxpilot_core::action::ActionRecord;
use voxpilot_core::browser::BrowserLayer;
use voxpilot_core::error::DispatchError;
use voxpilot_core::page::PageSnapshot;

pub struct HttpBrowserBridge {
    base_url: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl HttpBrowserBridge {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
            client: crate::http_client(timeout),
        }
    }

    pub fn from_config(config: &BrowserConfig) -> Self {
        Self::new(config.bridge_url.clone(), Duration::from_secs(config.timeout_secs))
    }

    fn transport_error(&self, e: reqwest::Error) -> DispatchError {
        if e.is_timeout() {
            DispatchError::Timeout {
                timeout_ms: self.timeout.as_millis() as u64,
            }
        } else {
            DispatchError::Unavailable(e.to_string())
        }
    }

    async fn snapshot_from(&self, response: reqwest::Response) -> Result<PageSnapshot, DispatchError> {
        let status = response.status().as_u16();
        if status == 200 {
            return response
                .json::<PageSnapshot>()
                .await
                .map_err(|e| DispatchError::Rejected(format!("Malformed snapshot: {e}")));
        }
        let body = response.text().await.unwrap_or_default();
        warn!(status, body = %body, "Browser bridge reported failure");
        Err(error_from_body(status, &body, self.timeout))
    }
}

/// Map an error response to a dispatch error.
fn error_from_body(status: u16, body: &str, timeout: Duration) -> DispatchError {
    let parsed: Option<BridgeError> = serde_json::from_str(body).ok();
    let message = parsed
        .as_ref()
        .map(|e| e.message.clone())
        .unwrap_or_else(|| body.trim().to_string());

    match parsed.as_ref().map(|e| e.kind.as_str()) {
        Some("element_not_found") => DispatchError::ElementNotFound(message),
        Some("navigation_failed") => DispatchError::NavigationFailed(message),
        Some("timeout") => DispatchError::Timeout {
            timeout_ms: timeout.as_millis() as u64,
        },
        Some("unavailable") => DispatchError::Unavailable(message),
        Some(_) => DispatchError::Rejected(message),
        None => match status {
            404 => DispatchError::ElementNotFound(message),
            502..=504 => DispatchError::Unavailable(format!("status {status}: {message}")),
            _ => DispatchError::Rejected(format!("status {status}: {message}")),
        },
    }
}

#[derive(Debug, Deserialize)]
struct BridgeError {
    kind: String,
    #[serde(default)]
    message: String,
}

#[async_trait]
impl BrowserLayer for HttpBrowserBridge {
    fn name(&self) -> &str {
        "http-bridge"
    }

    async fn dispatch(&self, action: &ActionRecord) -> Result<PageSnapshot, DispatchError> {
        debug!(action = %action, "Dispatching to browser bridge");
        let response = self
            .client
            .post(format!("{}/act", self.base_url))
            .json(action)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        self.snapshot_from(response).await
    }

    async fn observe(&self) -> Result<PageSnapshot, DispatchError> {
        let response = self
            .client
            .get(format!("{}/observe", self.base_url))
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        self.snapshot_from(response).await
    }

    async fn health_check(&self) -> Result<bool, DispatchError> {
        let response = self
            .client
            .get(format!("{}/health", self.base_url))
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        Ok(response.status().is_success())
    }
}
