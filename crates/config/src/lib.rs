//! Configuration loading, validation, and management for VoxPilot.
//!
//! Loads configuration from `~/.voxpilot/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.voxpilot/config.toml`.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Reasoning service (LLM) settings
    #[serde(default)]
    pub reasoning: ReasoningConfig,

    /// Agent loop limits
    #[serde(default)]
    pub agent: AgentConfig,

    /// Loop detection window and threshold
    #[serde(default)]
    pub loop_detection: LoopDetectionConfig,

    /// Speech synthesis settings
    #[serde(default)]
    pub speech: SpeechConfig,

    /// Speech-to-text settings
    #[serde(default)]
    pub transcription: TranscriptionConfig,

    /// Browser bridge settings
    #[serde(default)]
    pub browser: BrowserConfig,

    /// JSONL session log
    #[serde(default)]
    pub session_log: SessionLogConfig,
}

/// Redact a secret for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

fn default_true() -> bool {
    true
}

// ── Reasoning ─────────────────────────────────────────────────────────────

#[derive(Clone, Serialize, Deserialize)]
pub struct ReasoningConfig {
    /// API key for the OpenAI-compatible endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_model() -> String {
    "gpt-4o".into()
}
fn default_temperature() -> f32 {
    0.2
}
fn default_max_tokens() -> u32 {
    1024
}

impl Default for ReasoningConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_base_url(),
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

impl std::fmt::Debug for ReasoningConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReasoningConfig")
            .field("api_key", &redact(&self.api_key))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

// ── Agent ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Hard cap on decision cycles per goal
    #[serde(default = "default_max_cycles")]
    pub max_cycles: usize,

    /// Number of trailing stream entries shown to the model
    #[serde(default = "default_history_window")]
    pub history_window: usize,

    /// Extra attempts after a malformed answer
    #[serde(default = "default_max_parse_retries")]
    pub max_parse_retries: u32,
}

fn default_max_cycles() -> usize {
    50
}
fn default_history_window() -> usize {
    10
}
fn default_max_parse_retries() -> u32 {
    2
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_cycles: default_max_cycles(),
            history_window: default_history_window(),
            max_parse_retries: default_max_parse_retries(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopDetectionConfig {
    /// Number of recent action/observation pairs inspected
    #[serde(default = "default_loop_window")]
    pub window: usize,

    /// Identical no-progress fingerprints needed to flag
    #[serde(default = "default_loop_threshold")]
    pub threshold: usize,
}

fn default_loop_window() -> usize {
    5
}
fn default_loop_threshold() -> usize {
    3
}

impl Default for LoopDetectionConfig {
    fn default() -> Self {
        Self {
            window: default_loop_window(),
            threshold: default_loop_threshold(),
        }
    }
}

// ── Speech ────────────────────────────────────────────────────────────────

#[derive(Clone, Serialize, Deserialize)]
pub struct SpeechConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// ElevenLabs API key; without one the console synthesizer is used
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_speech_base_url")]
    pub base_url: String,

    #[serde(default = "default_voice_id")]
    pub voice_id: String,

    #[serde(default = "default_voice_model")]
    pub model_id: String,

    #[serde(default = "default_output_format")]
    pub output_format: String,

    /// Speaking rate assumed by the console synthesizer
    #[serde(default = "default_words_per_minute")]
    pub words_per_minute: u32,
}

fn default_speech_base_url() -> String {
    "https://api.elevenlabs.io/v1".into()
}
fn default_voice_id() -> String {
    "JBFqnCBsd6RMkjVDRZzb".into()
}
fn default_voice_model() -> String {
    "eleven_multilingual_v2".into()
}
fn default_output_format() -> String {
    "pcm_22050".into()
}
fn default_words_per_minute() -> u32 {
    180
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_key: None,
            base_url: default_speech_base_url(),
            voice_id: default_voice_id(),
            model_id: default_voice_model(),
            output_format: default_output_format(),
            words_per_minute: default_words_per_minute(),
        }
    }
}

impl std::fmt::Debug for SpeechConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpeechConfig")
            .field("enabled", &self.enabled)
            .field("api_key", &redact(&self.api_key))
            .field("base_url", &self.base_url)
            .field("voice_id", &self.voice_id)
            .field("model_id", &self.model_id)
            .field("output_format", &self.output_format)
            .field("words_per_minute", &self.words_per_minute)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionConfig {
    #[serde(default = "default_transcription_model")]
    pub model: String,

    #[serde(default = "default_transcription_temperature")]
    pub temperature: f32,

    /// Transcripts with a lower average logprob are rejected
    #[serde(default = "default_min_avg_logprob")]
    pub min_avg_logprob: f64,

    #[serde(default = "default_transcription_timeout")]
    pub timeout_secs: u64,
}

fn default_transcription_model() -> String {
    "gpt-4o-mini-transcribe".into()
}
fn default_transcription_temperature() -> f32 {
    0.2
}
fn default_min_avg_logprob() -> f64 {
    -0.5
}
fn default_transcription_timeout() -> u64 {
    10
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            model: default_transcription_model(),
            temperature: default_transcription_temperature(),
            min_avg_logprob: default_min_avg_logprob(),
            timeout_secs: default_transcription_timeout(),
        }
    }
}

// ── Browser / session log ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    /// Base URL of the browser bridge (`POST /act`, `GET /observe`)
    #[serde(default = "default_bridge_url")]
    pub bridge_url: String,

    /// Page opened before the first goal
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_url: Option<String>,

    #[serde(default = "default_browser_timeout")]
    pub timeout_secs: u64,
}

fn default_bridge_url() -> String {
    "http://127.0.0.1:9515".into()
}
fn default_browser_timeout() -> u64 {
    30
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            bridge_url: default_bridge_url(),
            start_url: None,
            timeout_secs: default_browser_timeout(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionLogConfig {
    /// JSONL file receiving every goal transition and stream entry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("reasoning", &self.reasoning)
            .field("agent", &self.agent)
            .field("loop_detection", &self.loop_detection)
            .field("speech", &self.speech)
            .field("transcription", &self.transcription)
            .field("browser", &self.browser)
            .field("session_log", &self.session_log)
            .finish()
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.voxpilot/config.toml).
    ///
    /// Environment variables override the file:
    /// - `VOXPILOT_API_KEY`, then `OPENAI_API_KEY`
    /// - `ELEVENLABS_API_KEY`, `ELEVENLABS_VOICE_ID`
    /// - `VOXPILOT_MODEL`, `VOXPILOT_BROWSER_URL`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from an environment lookup.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = non_empty("VOXPILOT_API_KEY").or_else(|| non_empty("OPENAI_API_KEY")) {
            self.reasoning.api_key = Some(key);
        }
        if let Some(key) = non_empty("ELEVENLABS_API_KEY") {
            self.speech.api_key = Some(key);
        }
        if let Some(voice) = non_empty("ELEVENLABS_VOICE_ID") {
            self.speech.voice_id = voice;
        }
        if let Some(model) = non_empty("VOXPILOT_MODEL") {
            self.reasoning.model = model;
        }
        if let Some(url) = non_empty("VOXPILOT_BROWSER_URL") {
            self.browser.bridge_url = url;
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".voxpilot")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.reasoning.temperature) {
            return Err(ConfigError::ValidationError(
                "reasoning.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if !(0.0..=2.0).contains(&self.transcription.temperature) {
            return Err(ConfigError::ValidationError(
                "transcription.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.agent.max_cycles == 0 {
            return Err(ConfigError::ValidationError("agent.max_cycles must be > 0".into()));
        }

        if self.agent.history_window == 0 {
            return Err(ConfigError::ValidationError(
                "agent.history_window must be > 0".into(),
            ));
        }

        let ld = &self.loop_detection;
        if ld.threshold < 2 || ld.window < ld.threshold {
            return Err(ConfigError::ValidationError(format!(
                "loop_detection needs window >= threshold >= 2 (window = {}, threshold = {})",
                ld.window, ld.threshold
            )));
        }

        if self.speech.words_per_minute == 0 {
            return Err(ConfigError::ValidationError(
                "speech.words_per_minute must be > 0".into(),
            ));
        }

        Ok(())
    }

    /// Check if a reasoning API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.reasoning.api_key.is_some()
    }

    /// Generate a default config TOML string (for the `config` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
