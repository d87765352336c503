//! Wiring shared by `run` and `goal`: config → services → agent.

use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use voxpilot_agent::{
    ActionSelector, EventStreamAgent, NarrationCoordinator, RunOutcome, VoiceGateway, channel,
};
use voxpilot_config::AppConfig;
use voxpilot_core::action::ActionRecord;
use voxpilot_core::browser::BrowserLayer;
use voxpilot_core::event::{DomainEvent, EventBus};
use voxpilot_core::speech::{AudioSink, SpeechSynthesizer};
use voxpilot_memory::JsonlSessionLog;
use voxpilot_providers::{
    ConsoleSynthesizer, ElevenLabsSynthesizer, HttpBrowserBridge, OpenAiCompatProvider,
    OpenAiTranscriber, PacedPcmSink, pcm_sample_rate,
};

pub struct Session {
    pub agent: EventStreamAgent,
    pub gateway: VoiceGateway,
    pub narrator: Arc<NarrationCoordinator>,
    /// Where narration goes, for the banner
    pub speech: String,
}

/// Load config and fail early with setup instructions when no key is set.
pub fn load_config() -> Result<AppConfig, Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let local = config.reasoning.base_url.contains("localhost") || config.reasoning.base_url.contains("127.0.0.1");
    if !config.has_api_key() && !local {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set one of these environment variables (or put it in .env):");
        eprintln!("    OPENAI_API_KEY=sk-...");
        eprintln!("    VOXPILOT_API_KEY=sk-...");
        eprintln!();
        eprintln!("  Or add it to your config file:");
        eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }
    Ok(config)
}

/// Build every service from config and connect them.
pub async fn build(config: &AppConfig) -> Result<Session, Box<dyn std::error::Error>> {
    let event_bus = Arc::new(EventBus::default());
    spawn_event_printer(&event_bus);

    let provider = Arc::new(OpenAiCompatProvider::from_config(&config.reasoning)?);
    let browser = Arc::new(HttpBrowserBridge::from_config(&config.browser));
    open_start_page(browser.as_ref(), config.browser.start_url.as_deref()).await;

    let (synthesizer, speech): (Arc<dyn SpeechSynthesizer>, String) = match &config.speech.api_key {
        Some(key) => {
            let sink = audio_sink(&config.speech.output_format);
            let label = format!("ElevenLabs ({})", sink.name());
            let synthesizer: Arc<dyn SpeechSynthesizer> =
                Arc::new(ElevenLabsSynthesizer::new(key.clone(), &config.speech, sink));
            (synthesizer, label)
        }
        None => {
            let synthesizer: Arc<dyn SpeechSynthesizer> =
                Arc::new(ConsoleSynthesizer::new(config.speech.words_per_minute));
            (synthesizer, "console".to_string())
        }
    };
    let speech = if config.speech.enabled { speech } else { "off".to_string() };
    info!(synthesizer = synthesizer.name(), enabled = config.speech.enabled, "Narration ready");
    let narrator =
        Arc::new(NarrationCoordinator::new(synthesizer, event_bus.clone()).with_enabled(config.speech.enabled));

    let selector = ActionSelector::new(provider, &config.reasoning.model, event_bus.clone())
        .with_temperature(config.reasoning.temperature)
        .with_max_tokens(config.reasoning.max_tokens)
        .with_max_retries(config.agent.max_parse_retries)
        .with_history_window(config.agent.history_window);

    let (sender, controller) = channel(event_bus.clone());
    let mut agent = EventStreamAgent::new(selector, browser, narrator.clone(), controller, event_bus)
        .with_max_cycles(config.agent.max_cycles)
        .with_loop_detection(config.loop_detection.window, config.loop_detection.threshold);
    if let Some(path) = &config.session_log.path {
        info!(path = %path.display(), "Session log enabled");
        agent = agent.with_session_log(JsonlSessionLog::new(path.clone()));
    }

    let transcriber = OpenAiTranscriber::new(
        config.reasoning.base_url.clone(),
        config.reasoning.api_key.clone().unwrap_or_default(),
        &config.transcription,
    );
    let gateway = VoiceGateway::new(Arc::new(transcriber), sender, narrator.clone())
        .with_min_avg_logprob(config.transcription.min_avg_logprob);

    Ok(Session {
        agent,
        gateway,
        narrator,
        speech,
    })
}

/// The speaker when one can be opened, otherwise a silent paced sink.
fn audio_sink(output_format: &str) -> Arc<dyn AudioSink> {
    let sample_rate = pcm_sample_rate(output_format).unwrap_or(22_050);
    match device_sink(sample_rate) {
        Some(sink) => sink,
        None => Arc::new(PacedPcmSink::new(sample_rate)),
    }
}

#[cfg(feature = "audio-device")]
fn device_sink(sample_rate: u32) -> Option<Arc<dyn AudioSink>> {
    match voxpilot_providers::DevicePcmSink::open(sample_rate) {
        Ok(sink) => Some(Arc::new(sink)),
        Err(e) => {
            warn!(error = %e, "No audio output; narration will be silent");
            None
        }
    }
}

#[cfg(not(feature = "audio-device"))]
fn device_sink(_sample_rate: u32) -> Option<Arc<dyn AudioSink>> {
    warn!("Built without the audio-device feature; narration will be silent");
    None
}

async fn open_start_page(browser: &dyn BrowserLayer, start_url: Option<&str>) {
    let Some(url) = start_url else { return };
    let navigate = ActionRecord::Navigate { url: url.to_string() };
    match browser.dispatch(&navigate).await {
        Ok(page) => info!(url = %page.url, "Start page opened"),
        Err(e) => warn!(url, error = %e, "Could not open start page"),
    }
}

/// Print a one-line summary of each domain event.
fn spawn_event_printer(event_bus: &EventBus) {
    let mut rx = event_bus.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if let Some(line) = describe_event(&event) {
                        println!("  {line}");
                    }
                }
                Err(RecvError::Lagged(n)) => warn!(skipped = n, "Event printer lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    });
}

fn describe_event(event: &DomainEvent) -> Option<String> {
    match event {
        DomainEvent::GoalStarted { text, .. } => Some(format!("▶ Goal: {text}")),
        DomainEvent::GoalAmended { amendment, .. } => Some(format!("✚ Amended: {amendment}")),
        DomainEvent::GoalSuperseded { .. } => Some("⏭ Previous goal superseded".to_string()),
        DomainEvent::ActionDispatched {
            seq, kind, success, duration_ms, ..
        } => {
            let mark = if *success { "✅" } else { "❌" };
            Some(format!("{mark} #{seq} {} ({duration_ms} ms)", kind.as_str()))
        }
        DomainEvent::LoopEscalated { fingerprint, .. } => Some(format!("🔁 Repeating {fingerprint}")),
        DomainEvent::ErrorOccurred {
            context, error_message, ..
        } => Some(format!("⚠️  {context}: {error_message}")),
        _ => None,
    }
}

pub fn describe_outcome(outcome: &RunOutcome) -> String {
    match outcome {
        RunOutcome::Completed { message, .. } => match message {
            Some(m) => format!("Done: {m}"),
            None => "Done.".to_string(),
        },
        RunOutcome::Aborted { reason, .. } => format!("Stopped: {reason}"),
        RunOutcome::AwaitingInput { question, .. } => format!("Question: {question}"),
        RunOutcome::Paused { error, .. } => format!("Paused: {error}"),
        RunOutcome::Idle => "Nothing to do.".to_string(),
    }
}
