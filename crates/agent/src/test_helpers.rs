//! Shared test doubles for the agent tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use tokio::sync::watch;
use voxpilot_core::action::ActionRecord;
use voxpilot_core::browser::BrowserLayer;
use voxpilot_core::error::{DispatchError, ProviderError};
use voxpilot_core::message::Message;
use voxpilot_core::page::PageSnapshot;
use voxpilot_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use voxpilot_core::signal::InterruptionSignal;
use voxpilot_core::speech::SpeechSynthesizer;

use crate::interruption::SignalSender;

/// A JSON answer in the format the selector expects.
pub fn envelope(explanation: &str, action: &str) -> String {
    serde_json::json!({ "explanation": explanation, "action": action }).to_string()
}

/// A mock provider that returns a sequence of scripted answers.
///
/// Panics if more calls are made than answers provided.
pub struct ScriptedProvider {
    answers: Mutex<VecDeque<Result<String, ProviderError>>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    pub fn new(answers: Vec<String>) -> Self {
        Self {
            answers: Mutex::new(answers.into_iter().map(Ok).collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(error: ProviderError) -> Self {
        Self {
            answers: Mutex::new(VecDeque::from([Err(error)])),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// The per-cycle prompt of call `n` (0-based).
    pub fn prompt(&self, n: usize) -> String {
        self.requests.lock().unwrap()[n].messages[1].content.clone()
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let call = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request);
            requests.len()
        };
        let answer = self
            .answers
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| panic!("ScriptedProvider: no more answers (call #{call})"));

        answer.map(|text| ProviderResponse {
            message: Message::assistant(text),
            usage: Some(Usage {
                prompt_tokens: 10,
                completion_tokens: 5,
                total_tokens: 15,
            }),
            model: "mock-model".into(),
        })
    }
}

/// A browser that replays scripted results, then repeats the current page.
pub struct ScriptedBrowser {
    page: Mutex<PageSnapshot>,
    script: Mutex<VecDeque<Result<PageSnapshot, DispatchError>>>,
    dispatched: Mutex<Vec<ActionRecord>>,
    signals: Mutex<Vec<(usize, SignalSender, InterruptionSignal)>>,
    changing: bool,
}

impl ScriptedBrowser {
    pub fn new(page: PageSnapshot) -> Self {
        Self {
            page: Mutex::new(page),
            script: Mutex::new(VecDeque::new()),
            dispatched: Mutex::new(Vec::new()),
            signals: Mutex::new(Vec::new()),
            changing: false,
        }
    }

    /// Every unscripted dispatch changes the page structure.
    pub fn changing(mut self) -> Self {
        self.changing = true;
        self
    }

    pub fn with_results(self, results: Vec<Result<PageSnapshot, DispatchError>>) -> Self {
        self.script.lock().unwrap().extend(results);
        self
    }

    /// Send `signal` while the `n`th dispatch (1-based) is in flight.
    pub fn with_signal_during(self, n: usize, sender: SignalSender, signal: InterruptionSignal) -> Self {
        self.signals.lock().unwrap().push((n, sender, signal));
        self
    }

    pub fn dispatched(&self) -> Vec<ActionRecord> {
        self.dispatched.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl BrowserLayer for ScriptedBrowser {
    fn name(&self) -> &str {
        "scripted_browser"
    }

    async fn dispatch(&self, action: &ActionRecord) -> Result<PageSnapshot, DispatchError> {
        let n = {
            let mut dispatched = self.dispatched.lock().unwrap();
            dispatched.push(action.clone());
            dispatched.len()
        };

        for (at, sender, signal) in self.signals.lock().unwrap().iter() {
            if *at == n {
                sender.send(signal.clone());
            }
        }

        let scripted = self.script.lock().unwrap().pop_front();
        let mut page = self.page.lock().unwrap();
        match scripted {
            Some(Ok(snapshot)) => {
                *page = snapshot.clone();
                Ok(snapshot)
            }
            Some(Err(e)) => Err(e),
            None => {
                if self.changing {
                    page.tree.push_str(&format!(" [{n}] item"));
                }
                if let ActionRecord::Type { target, text } = action {
                    page.focused = Some(target.to_string());
                    page.tree.push_str(&format!(" value='{text}'"));
                }
                Ok(page.clone())
            }
        }
    }

    async fn observe(&self) -> Result<PageSnapshot, DispatchError> {
        Ok(self.page.lock().unwrap().clone())
    }
}

/// A synthesizer whose playback lasts until the test releases it.
pub struct GatedSynthesizer {
    spoken: Mutex<Vec<String>>,
    started: watch::Sender<usize>,
    gate: watch::Sender<bool>,
}

impl GatedSynthesizer {
    pub fn new() -> Self {
        Self {
            spoken: Mutex::new(Vec::new()),
            started: watch::channel(0).0,
            gate: watch::channel(false).0,
        }
    }

    /// Playback finishes immediately.
    pub fn open() -> Self {
        let synth = Self::new();
        synth.release();
        synth
    }

    /// Let every current and future playback finish.
    pub fn release(&self) {
        self.gate.send_replace(true);
    }

    pub async fn wait_started(&self, n: usize) {
        let mut rx = self.started.subscribe();
        let _ = rx.wait_for(|count| *count >= n).await;
    }

    pub fn spoken(&self) -> Vec<String> {
        self.spoken.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl SpeechSynthesizer for GatedSynthesizer {
    fn name(&self) -> &str {
        "gated_mock"
    }

    async fn speak(&self, text: &str) -> Result<(), ProviderError> {
        self.spoken.lock().unwrap().push(text.to_string());
        self.started.send_modify(|count| *count += 1);
        let mut gate = self.gate.subscribe();
        let _ = gate.wait_for(|open| *open).await;
        Ok(())
    }
}
