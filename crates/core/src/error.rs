//! Error types for the VoxPilot domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all VoxPilot operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors (reasoning, speech, transcription) ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Browser layer errors ---
    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    // --- Event stream invariant violations ---
    #[error("Event stream error: {0}")]
    Stream(#[from] StreamError),

    // --- Memory errors ---
    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Failures of an external service: the reasoning model, the speech
/// synthesizer or the transcriber.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError {
        status_code: u16,
        message: String,
    },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

/// Failures reported by the browser layer for a single action.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Navigation failed: {0}")]
    NavigationFailed(String),

    #[error("Action timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Action rejected by browser: {0}")]
    Rejected(String),

    #[error("Browser layer unavailable: {0}")]
    Unavailable(String),
}

impl DispatchError {
    /// Whether the browser layer itself could not be reached. Every other
    /// variant is an ordinary action failure the model can adapt to.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, DispatchError::Unavailable(_))
    }
}

/// Violations of the strict Action/Observation alternation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamError {
    #[error("Stream for goal {0} is closed")]
    Closed(String),

    #[error("Expected an observation for action #{pending_seq} before the next action")]
    ObservationPending { pending_seq: u64 },

    #[error("Observation has no pending action to answer")]
    NoPendingAction,

    #[error("Observation answers action #{got}, but action #{expected} is pending")]
    MismatchedAction { expected: u64, got: u64 },
}

#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),
}
