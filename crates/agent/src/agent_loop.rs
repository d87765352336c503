//! The event-stream agent.
//!
//! Every decision cycle selects exactly one action, dispatches it to the
//! browser layer, appends the resulting observation and checks for loops.
//! Narration is handed off without waiting, and pending voice signals are
//! applied only between cycles, so cycles never overlap and the active
//! stream always alternates Action/Observation.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, info, warn};
use voxpilot_core::action::ActionRecord;
use voxpilot_core::browser::BrowserLayer;
use voxpilot_core::error::Error;
use voxpilot_core::event::{DomainEvent, EventBus};
use voxpilot_core::goal::GoalId;
use voxpilot_core::memory::{MemoryNote, NoteStore};
use voxpilot_core::page::PageSnapshot;
use voxpilot_core::stream::EventStream;
use voxpilot_memory::{InMemoryNotes, JsonlSessionLog, SessionRecord};

use crate::interruption::{GoalSlot, InterruptionController, Transition};
use crate::loop_detector::{LoopDetector, LoopVerdict};
use crate::narration::NarrationCoordinator;
use crate::prompt;
use crate::selector::{ActionSelector, SelectionInput};

/// Abort reason when the loop detector gives up.
pub const STUCK_REASON: &str = "stuck";

/// Abort reason when a goal runs out of cycles.
pub const MAX_CYCLES_REASON: &str = "max cycles reached";

const DONE_MESSAGE: &str = "All done.";
const STUCK_MESSAGE: &str = "I seem to be stuck and have stopped. What would you like me to do?";
const MAX_CYCLES_MESSAGE: &str = "This is taking too many steps, so I've stopped.";

/// Why `drive` returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed {
        goal_id: GoalId,
        message: Option<String>,
    },
    Aborted {
        goal_id: GoalId,
        reason: String,
    },
    /// The model asked the user a question; the goal stays active
    AwaitingInput {
        goal_id: GoalId,
        question: String,
    },
    /// A service failed; the goal stays active until the user speaks again
    Paused {
        goal_id: GoalId,
        error: String,
    },
    /// No active goal
    Idle,
}

/// Per-goal loop state, reset whenever a different goal becomes active.
struct GoalRuntime {
    goal_id: GoalId,
    detector: LoopDetector,
    hint: Option<String>,
    baseline: Option<PageSnapshot>,
    cycles: usize,
}

enum Step {
    Continue,
    Stop(RunOutcome),
}

pub struct EventStreamAgent {
    selector: ActionSelector,
    browser: Arc<dyn BrowserLayer>,
    narrator: Arc<NarrationCoordinator>,
    controller: InterruptionController,
    notes: Arc<dyn NoteStore>,
    event_bus: Arc<EventBus>,
    max_cycles: usize,
    loop_window: usize,
    loop_threshold: usize,
    session_log: Option<Arc<JsonlSessionLog>>,
    runtime: Option<GoalRuntime>,
}

impl EventStreamAgent {
    pub fn new(
        selector: ActionSelector,
        browser: Arc<dyn BrowserLayer>,
        narrator: Arc<NarrationCoordinator>,
        controller: InterruptionController,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            selector,
            browser,
            narrator,
            controller,
            notes: Arc::new(InMemoryNotes::new()),
            event_bus,
            max_cycles: 50,
            loop_window: 5,
            loop_threshold: 3,
            session_log: None,
            runtime: None,
        }
    }

    pub fn with_notes(mut self, notes: Arc<dyn NoteStore>) -> Self {
        self.notes = notes;
        self
    }

    /// Cycles a single goal may take before it is aborted.
    pub fn with_max_cycles(mut self, max: usize) -> Self {
        self.max_cycles = max.max(1);
        self
    }

    pub fn with_loop_detection(mut self, window: usize, threshold: usize) -> Self {
        self.loop_window = window;
        self.loop_threshold = threshold;
        self
    }

    /// Append goal transitions and stream entries to a JSONL file.
    pub fn with_session_log(mut self, log: JsonlSessionLog) -> Self {
        self.session_log = Some(Arc::new(log));
        self
    }

    pub fn controller(&self) -> &InterruptionController {
        &self.controller
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    /// Start a goal (superseding the active one) and drive it.
    pub async fn run(&mut self, goal_text: &str) -> Result<RunOutcome, Error> {
        if let Some(transition) = self.controller.start_goal(goal_text) {
            self.on_transitions(&[transition]).await;
        }
        self.drive().await
    }

    /// Drive the active goal until it finishes or has to wait for the user.
    ///
    /// Returns [`RunOutcome::Idle`] straight away when no goal is active, so
    /// driving a finished goal again never calls the reasoning service.
    pub async fn drive(&mut self) -> Result<RunOutcome, Error> {
        loop {
            let Some(goal_id) = self.controller.active_id() else {
                return Ok(RunOutcome::Idle);
            };
            self.prepare(&goal_id).await;

            let Some(mut runtime) = self.runtime.take() else {
                return Ok(RunOutcome::Idle);
            };
            let step = self.cycle(&goal_id, &mut runtime).await;
            self.runtime = Some(runtime);

            if let Step::Stop(outcome) = step? {
                return Ok(outcome);
            }
            self.apply_signals().await;
        }
    }

    /// Session loop: wait for a signal, drive, repeat. Ends when every
    /// [`SignalSender`](crate::interruption::SignalSender) is gone.
    pub async fn serve(&mut self) -> Result<(), Error> {
        info!("Agent ready, waiting for instructions");
        loop {
            let outcome = self.drive().await?;
            debug!(?outcome, "Agent idle");

            let Some(transitions) = self.controller.wait().await else {
                info!("Signal channel closed, agent stopping");
                return Ok(());
            };
            self.on_transitions(&transitions).await;
        }
    }

    /// Apply every signal queued since the last boundary.
    pub async fn apply_signals(&mut self) -> Vec<Transition> {
        let transitions = self.controller.poll();
        self.on_transitions(&transitions).await;
        transitions
    }

    async fn on_transitions(&self, transitions: &[Transition]) {
        for transition in transitions {
            match transition {
                Transition::Started { goal_id, superseded } => {
                    self.narrator.cancel();
                    if let Some(old) = superseded {
                        self.log_goal(old).await;
                    }
                    self.log_goal(goal_id).await;
                }
                Transition::Amended { goal_id } => self.log_goal(goal_id).await,
            }
        }
    }

    async fn prepare(&mut self, goal_id: &GoalId) {
        if self.runtime.as_ref().is_some_and(|rt| &rt.goal_id == goal_id) {
            return;
        }

        let baseline = match self.browser.observe().await {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                warn!(goal_id = %goal_id, error = %e, "Could not observe the starting page");
                None
            }
        };
        self.runtime = Some(GoalRuntime {
            goal_id: goal_id.clone(),
            detector: LoopDetector::new(self.loop_window, self.loop_threshold),
            hint: None,
            baseline,
            cycles: 0,
        });
    }

    async fn cycle(&mut self, goal_id: &GoalId, rt: &mut GoalRuntime) -> Result<Step, Error> {
        if rt.cycles >= self.max_cycles {
            warn!(goal_id = %goal_id, cycles = rt.cycles, "Cycle limit reached");
            let outcome = self.abort(goal_id, MAX_CYCLES_REASON, MAX_CYCLES_MESSAGE).await;
            return Ok(Step::Stop(outcome));
        }
        rt.cycles += 1;

        let notes = match self.notes.notes(goal_id).await {
            Ok(notes) => notes,
            Err(e) => {
                warn!(goal_id = %goal_id, error = %e, "Failed to read notes");
                Vec::new()
            }
        };

        // 1. Select
        let hint = rt.hint.take();
        let slot = self.slot(goal_id)?;
        let selection = self
            .selector
            .select(SelectionInput {
                goal: &slot.goal,
                stream: &slot.stream,
                notes: &notes,
                page: slot.stream.last_snapshot().or(rt.baseline.as_ref()),
                hint: hint.as_deref(),
            })
            .await;

        let selection = match selection {
            Ok(selection) => selection,
            Err(e) => {
                rt.hint = hint;
                return Ok(Step::Stop(self.pause(goal_id, "reasoning", e.to_string())));
            }
        };

        if let Some(note) = &selection.note {
            let note = MemoryNote::new(goal_id.clone(), note.clone());
            if let Err(e) = self.notes.append(note).await {
                warn!(goal_id = %goal_id, error = %e, "Failed to store note");
            }
        }

        // 2. Control actions never reach the browser
        match &selection.record {
            ActionRecord::Done { message } => {
                self.controller.complete(goal_id, message.clone());
                self.log_goal(goal_id).await;
                self.narrator.announce(message.as_deref().unwrap_or(DONE_MESSAGE));
                return Ok(Step::Stop(RunOutcome::Completed {
                    goal_id: goal_id.clone(),
                    message: message.clone(),
                }));
            }
            ActionRecord::Clarify { question } => {
                info!(goal_id = %goal_id, question = %question, "Waiting for the user");
                self.narrator.announce(question);
                return Ok(Step::Stop(RunOutcome::AwaitingInput {
                    goal_id: goal_id.clone(),
                    question: question.clone(),
                }));
            }
            _ => {}
        }

        // 3. Dispatch exactly one action
        let record = selection.record;
        let explanation = selection.explanation;
        let seq = self
            .stream_mut(goal_id)?
            .append_action(record.clone(), explanation.clone())?;

        let started = Instant::now();
        let result = self.browser.dispatch(&record).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        // 4. Observe; a failed dispatch still answers the action
        let stream = self.stream_mut(goal_id)?;
        let (snapshot, failure) = match result {
            Ok(snapshot) => (snapshot, None),
            Err(e) => {
                warn!(goal_id = %goal_id, seq, action = %record, error = %e, "Dispatch failed");
                let previous = stream.last_snapshot().or(rt.baseline.as_ref()).cloned();
                (PageSnapshot::failure(previous.as_ref(), e.to_string()), Some(e))
            }
        };
        let success = failure.is_none();
        stream.append_observation(seq, snapshot)?;

        info!(goal_id = %goal_id, seq, action = %record, success, duration_ms, "Action dispatched");
        self.event_bus.publish(DomainEvent::ActionDispatched {
            goal_id: goal_id.to_string(),
            seq,
            kind: record.kind(),
            success,
            duration_ms,
            timestamp: Utc::now(),
        });
        self.log_tail(goal_id, 2).await;

        if let Some(e) = failure
            && e.is_unavailable()
        {
            return Ok(Step::Stop(self.pause(goal_id, "browser", e.to_string())));
        }

        // 5. Loop detection
        let verdict = rt.detector.check(&self.slot(goal_id)?.stream, rt.baseline.as_ref());
        match verdict {
            LoopVerdict::Ok => {}
            LoopVerdict::Escalate {
                fingerprint,
                record: repeated,
                occurrences,
            } => {
                warn!(goal_id = %goal_id, %fingerprint, occurrences, "Loop detected, asking for another strategy");
                rt.hint = Some(prompt::loop_hint(&repeated, occurrences));
                self.event_bus.publish(DomainEvent::LoopEscalated {
                    goal_id: goal_id.to_string(),
                    fingerprint: fingerprint.to_string(),
                    occurrences,
                    timestamp: Utc::now(),
                });
            }
            LoopVerdict::Abort { fingerprint } => {
                warn!(goal_id = %goal_id, %fingerprint, "No progress after escalation");
                let outcome = self.abort(goal_id, STUCK_REASON, STUCK_MESSAGE).await;
                return Ok(Step::Stop(outcome));
            }
        }

        // 6. Narrate without waiting
        self.narrator.submit(seq, &record, &explanation);
        Ok(Step::Continue)
    }

    async fn abort(&mut self, goal_id: &GoalId, reason: &str, spoken: &str) -> RunOutcome {
        self.controller.abort(goal_id, reason);
        self.log_goal(goal_id).await;
        self.narrator.announce(spoken);
        RunOutcome::Aborted {
            goal_id: goal_id.clone(),
            reason: reason.to_string(),
        }
    }

    fn pause(&self, goal_id: &GoalId, context: &str, error: String) -> RunOutcome {
        warn!(goal_id = %goal_id, context, error = %error, "Goal paused");
        self.event_bus.publish(DomainEvent::ErrorOccurred {
            context: context.to_string(),
            error_message: error.clone(),
            timestamp: Utc::now(),
        });
        self.narrator
            .announce(&format!("Something went wrong with the {context}. Tell me when to try again."));
        RunOutcome::Paused {
            goal_id: goal_id.clone(),
            error,
        }
    }

    fn slot(&self, goal_id: &GoalId) -> Result<&GoalSlot, Error> {
        self.controller
            .slot(goal_id)
            .ok_or_else(|| Error::Internal(format!("unknown goal {goal_id}")))
    }

    fn stream_mut(&mut self, goal_id: &GoalId) -> Result<&mut EventStream, Error> {
        self.controller
            .slot_mut(goal_id)
            .map(|slot| &mut slot.stream)
            .ok_or_else(|| Error::Internal(format!("unknown goal {goal_id}")))
    }

    async fn log_goal(&self, goal_id: &GoalId) {
        let Some(log) = &self.session_log else { return };
        let Some(slot) = self.controller.slot(goal_id) else { return };
        persist(log, &SessionRecord::goal(&slot.goal)).await;
    }

    async fn log_tail(&self, goal_id: &GoalId, n: usize) {
        let Some(log) = &self.session_log else { return };
        let Some(slot) = self.controller.slot(goal_id) else { return };
        for entry in slot.stream.tail(n) {
            persist(log, &SessionRecord::entry(&slot.goal, entry)).await;
        }
    }
}

async fn persist(log: &JsonlSessionLog, record: &SessionRecord) {
    if let Err(e) = log.record(record).await {
        warn!(path = %log.path().display(), error = %e, "Session log write failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interruption::{SignalSender, channel};
    use crate::test_helpers::{GatedSynthesizer, ScriptedBrowser, ScriptedProvider, envelope};
    use tokio::sync::broadcast;
    use voxpilot_core::error::{DispatchError, ProviderError};
    use voxpilot_core::goal::GoalStatus;
    use voxpilot_core::signal::InterruptionSignal;
    use voxpilot_core::stream::StreamEntry;

    struct Harness {
        agent: EventStreamAgent,
        provider: Arc<ScriptedProvider>,
        browser: Arc<ScriptedBrowser>,
        bus: Arc<EventBus>,
        sender: SignalSender,
    }

    fn search_page() -> PageSnapshot {
        PageSnapshot::new("https://example.com", "[searchbox] textbox 'Search'")
    }

    fn harness_with(
        provider: ScriptedProvider,
        synth: Arc<GatedSynthesizer>,
        browser: impl FnOnce(SignalSender) -> ScriptedBrowser,
    ) -> Harness {
        let bus = Arc::new(EventBus::default());
        let provider = Arc::new(provider);
        let (sender, controller) = channel(bus.clone());
        let browser = Arc::new(browser(sender.clone()));
        let narrator = Arc::new(NarrationCoordinator::new(synth, bus.clone()));
        let selector = ActionSelector::new(provider.clone(), "mock-model", bus.clone());
        let agent = EventStreamAgent::new(selector, browser.clone(), narrator, controller, bus.clone());
        Harness {
            agent,
            provider,
            browser,
            bus,
            sender,
        }
    }

    fn harness(answers: Vec<String>) -> Harness {
        harness_with(
            ScriptedProvider::new(answers),
            Arc::new(GatedSynthesizer::open()),
            |_| ScriptedBrowser::new(search_page()),
        )
    }

    fn drain(rx: &mut broadcast::Receiver<Arc<DomainEvent>>) -> Vec<Arc<DomainEvent>> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn assert_alternates(stream: &EventStream) {
        for (i, entry) in stream.entries().iter().enumerate() {
            assert_eq!(entry.is_action(), i % 2 == 0, "entry {i} breaks alternation");
        }
    }

    #[tokio::test]
    async fn click_then_type_then_done() {
        let mut h = harness(vec![
            envelope("Opening the search box", r#"click("searchbox")"#),
            envelope("Typing hello", r#"type("searchbox", "hello")"#),
            envelope("Finished", r#"done("Typed hello into the search box")"#),
        ]);

        let outcome = h.agent.run("click the search box and type hello").await.unwrap();
        assert!(matches!(
            outcome,
            RunOutcome::Completed { message: Some(ref m), .. } if m == "Typed hello into the search box"
        ));

        let slot = &h.agent.controller().history()[0];
        assert_eq!(slot.goal.status, GoalStatus::Completed);
        assert_eq!(slot.stream.len(), 4);
        assert!(slot.stream.is_closed());
        assert_alternates(&slot.stream);
        assert_eq!(
            h.browser.dispatched(),
            vec![ActionRecord::click("searchbox"), ActionRecord::type_text("searchbox", "hello")]
        );
        assert!(slot.stream.last_snapshot().unwrap().tree.contains("value='hello'"));
        assert_eq!(h.provider.call_count(), 3);
    }

    #[tokio::test]
    async fn amendment_mid_task_keeps_history() {
        let mut h = harness_with(
            ScriptedProvider::new(vec![
                envelope("Opening the search box", r#"click("searchbox")"#),
                envelope("Typing hello world", r#"type("searchbox", "hello world")"#),
                envelope("Finished", r#"done("Typed hello world")"#),
            ]),
            Arc::new(GatedSynthesizer::open()),
            |sender| {
                ScriptedBrowser::new(search_page()).with_signal_during(
                    1,
                    sender,
                    InterruptionSignal::amend("actually type hello world"),
                )
            },
        );
        let mut rx = h.bus.subscribe();

        let outcome = h.agent.run("click the search box and type hello").await.unwrap();
        assert!(matches!(outcome, RunOutcome::Completed { .. }));

        let history = h.agent.controller().history();
        assert_eq!(history.len(), 1);
        assert_eq!(
            history[0].goal.text,
            "click the search box and type hello\nactually type hello world"
        );
        assert_eq!(history[0].stream.len(), 4);
        assert_alternates(&history[0].stream);

        // The second decision saw the amendment and the first action was not replayed
        assert!(h.provider.prompt(1).contains("actually type hello world"));
        assert_eq!(
            h.browser.dispatched(),
            vec![ActionRecord::click("searchbox"), ActionRecord::type_text("searchbox", "hello world")]
        );
        assert!(
            drain(&mut rx)
                .iter()
                .any(|e| matches!(e.as_ref(), DomainEvent::GoalAmended { .. }))
        );
    }

    #[tokio::test]
    async fn new_goal_mid_task_gets_a_disjoint_stream() {
        let mut h = harness_with(
            ScriptedProvider::new(vec![
                envelope("Opening the search box", r#"click("searchbox")"#),
                envelope("Done", r#"done("Settings are open")"#),
            ]),
            Arc::new(GatedSynthesizer::open()),
            |sender| {
                ScriptedBrowser::new(search_page()).with_signal_during(
                    1,
                    sender,
                    InterruptionSignal::new_goal("open the settings page"),
                )
            },
        );

        let outcome = h.agent.run("click the search box and type hello").await.unwrap();
        assert!(matches!(outcome, RunOutcome::Completed { .. }));

        let history = h.agent.controller().history();
        assert_eq!(history.len(), 2);

        // The in-flight click finished into the superseded goal's own stream
        assert_eq!(history[0].goal.status, GoalStatus::Superseded);
        assert!(history[0].stream.is_closed());
        assert_eq!(history[0].stream.len(), 2);

        assert_eq!(history[1].goal.text, "open the settings page");
        assert_eq!(history[1].goal.status, GoalStatus::Completed);
        assert!(history[1].stream.is_empty());

        let second = h.provider.prompt(1);
        assert!(second.contains("open the settings page"));
        assert!(!second.contains("click the search box"));
    }

    #[tokio::test]
    async fn malformed_answers_are_retried() {
        let mut h = harness(vec![
            "not json at all, sorry".to_string(),
            "{\"explanation\": \"x\", \"action\": \"click(\"}".to_string(),
            envelope("Opening the search box", r#"click("searchbox")"#),
            envelope("Finished", r#"done("Clicked it")"#),
        ]);
        let mut rx = h.bus.subscribe();

        let outcome = h.agent.run("click the search box").await.unwrap();
        assert!(matches!(outcome, RunOutcome::Completed { .. }));
        assert_eq!(h.provider.call_count(), 4);
        assert_eq!(h.browser.dispatched(), vec![ActionRecord::click("searchbox")]);

        let events = drain(&mut rx);
        let parse_failures = events
            .iter()
            .filter(|e| matches!(e.as_ref(), DomainEvent::ParseFailed { .. }))
            .count();
        assert_eq!(parse_failures, 2);
        assert!(
            !events
                .iter()
                .any(|e| matches!(e.as_ref(), DomainEvent::SelectorFallback { .. }))
        );
    }

    #[tokio::test]
    async fn repeated_click_without_progress_aborts_as_stuck() {
        let answers = (0..4)
            .map(|_| envelope("Loading more", r#"click("button_x")"#))
            .collect();
        let mut h = harness_with(
            ScriptedProvider::new(answers),
            Arc::new(GatedSynthesizer::open()),
            |_| ScriptedBrowser::new(PageSnapshot::new("https://shop.example", "[button_x] button 'Load more'")),
        );
        let mut rx = h.bus.subscribe();

        let outcome = h.agent.run("load all the products").await.unwrap();
        assert!(matches!(outcome, RunOutcome::Aborted { ref reason, .. } if reason == STUCK_REASON));

        // Escalated after the third click, aborted after the fourth
        assert_eq!(h.provider.call_count(), 4);
        assert!(h.provider.prompt(3).contains("STOP and try a different strategy"));
        assert!(!h.provider.prompt(2).contains("STOP"));

        let slot = &h.agent.controller().history()[0];
        assert_eq!(slot.goal.status, GoalStatus::Aborted);
        assert_eq!(slot.goal.abort_reason.as_deref(), Some(STUCK_REASON));
        assert_eq!(slot.stream.len(), 8);
        assert_alternates(&slot.stream);

        let escalations = drain(&mut rx)
            .iter()
            .filter(|e| matches!(e.as_ref(), DomainEvent::LoopEscalated { .. }))
            .count();
        assert_eq!(escalations, 1);
    }

    #[tokio::test]
    async fn narration_never_blocks_dispatch() {
        let synth = Arc::new(GatedSynthesizer::new());
        let mut h = harness_with(
            ScriptedProvider::new(vec![
                envelope("Opening the menu", r#"click("menu")"#),
                envelope("Choosing settings", r#"click("settings")"#),
                envelope("", r#"done("Settings are open")"#),
            ]),
            synth.clone(),
            |_| ScriptedBrowser::new(search_page()).changing(),
        );
        let mut rx = h.bus.subscribe();

        // The first narration never finishes on its own
        let outcome = h.agent.run("open settings").await.unwrap();
        assert!(matches!(outcome, RunOutcome::Completed { .. }));
        assert_eq!(h.browser.dispatched().len(), 2);

        let events = drain(&mut rx);
        assert!(events.iter().any(|e| matches!(
            e.as_ref(),
            DomainEvent::NarrationStarted { action_seq: Some(1), .. }
        )));
        assert!(events.iter().any(|e| matches!(
            e.as_ref(),
            DomainEvent::NarrationSkipped { action_seq: 3, text, .. } if text == "Choosing settings"
        )));
        synth.release();
    }

    #[tokio::test]
    async fn driving_a_finished_goal_is_a_noop() {
        let mut h = harness(vec![envelope("Nothing to do", r#"done("Already there")"#)]);
        let outcome = h.agent.run("open the home page").await.unwrap();
        assert!(matches!(outcome, RunOutcome::Completed { .. }));

        assert_eq!(h.agent.drive().await.unwrap(), RunOutcome::Idle);
        assert_eq!(h.agent.drive().await.unwrap(), RunOutcome::Idle);
        assert_eq!(h.provider.call_count(), 1);
        assert_eq!(h.agent.controller().history().len(), 1);
    }

    #[tokio::test]
    async fn failed_dispatch_is_observed_and_the_goal_continues() {
        let mut h = harness_with(
            ScriptedProvider::new(vec![
                envelope("Clicking the result", r#"click("42")"#),
                envelope("Using the search box instead", r#"click("searchbox")"#),
                envelope("Finished", r#"done("Clicked")"#),
            ]),
            Arc::new(GatedSynthesizer::open()),
            |_| {
                ScriptedBrowser::new(search_page())
                    .with_results(vec![Err(DispatchError::ElementNotFound("42".into()))])
            },
        );

        let outcome = h.agent.run("click the first result").await.unwrap();
        assert!(matches!(outcome, RunOutcome::Completed { .. }));

        let stream = &h.agent.controller().history()[0].stream;
        assert_alternates(stream);
        let StreamEntry::Observation(failed) = &stream.entries()[1] else {
            panic!("expected an observation");
        };
        assert!(!failed.snapshot.success);
        assert!(failed.snapshot.error.as_deref().unwrap().contains("42"));
        assert_eq!(failed.snapshot.url, "https://example.com");
        assert!(h.provider.prompt(1).contains("42"));
    }

    #[tokio::test]
    async fn unreachable_browser_pauses_the_goal() {
        let mut h = harness_with(
            ScriptedProvider::new(vec![envelope("Opening the search box", r#"click("searchbox")"#)]),
            Arc::new(GatedSynthesizer::open()),
            |_| {
                ScriptedBrowser::new(search_page())
                    .with_results(vec![Err(DispatchError::Unavailable("connection refused".into()))])
            },
        );
        let mut rx = h.bus.subscribe();

        let outcome = h.agent.run("click the search box").await.unwrap();
        assert!(matches!(outcome, RunOutcome::Paused { ref error, .. } if error.contains("connection refused")));

        let controller = h.agent.controller();
        assert!(controller.active_id().is_some());
        let stream = &controller.active().unwrap().stream;
        assert_eq!(stream.len(), 2);
        assert_alternates(stream);
        assert!(
            drain(&mut rx)
                .iter()
                .any(|e| matches!(e.as_ref(), DomainEvent::ErrorOccurred { .. }))
        );
    }

    #[tokio::test]
    async fn reasoning_failure_pauses_without_touching_the_stream() {
        let mut h = harness_with(
            ScriptedProvider::failing(ProviderError::Network("down".into())),
            Arc::new(GatedSynthesizer::open()),
            |_| ScriptedBrowser::new(search_page()),
        );

        let outcome = h.agent.run("click the search box").await.unwrap();
        assert!(matches!(outcome, RunOutcome::Paused { ref error, .. } if error.contains("down")));

        let slot = h.agent.controller().active().unwrap();
        assert!(slot.goal.is_active());
        assert!(slot.stream.is_empty());
        assert!(h.browser.dispatched().is_empty());
    }

    #[tokio::test]
    async fn clarify_waits_and_an_amendment_resumes() {
        let mut h = harness(vec![
            envelope("", r#"clarify("Which account should I use?")"#),
            envelope("Signing in", r#"done("Signed in with the work account")"#),
        ]);

        let outcome = h.agent.run("sign in").await.unwrap();
        assert!(matches!(
            outcome,
            RunOutcome::AwaitingInput { ref question, .. } if question == "Which account should I use?"
        ));
        let slot = h.agent.controller().active().unwrap();
        assert!(!slot.stream.is_closed());
        assert!(h.browser.dispatched().is_empty());

        assert!(h.sender.amend("the work account"));
        let transitions = h.agent.apply_signals().await;
        assert!(matches!(transitions.as_slice(), [Transition::Amended { .. }]));

        let outcome = h.agent.drive().await.unwrap();
        assert!(matches!(outcome, RunOutcome::Completed { .. }));
        assert!(h.provider.prompt(1).contains("the work account"));
    }

    #[tokio::test]
    async fn cycle_limit_aborts_the_goal() {
        let mut h = harness_with(
            ScriptedProvider::new(vec![
                envelope("Scrolling", r#"scroll("down")"#),
                envelope("Scrolling", r#"scroll("down")"#),
            ]),
            Arc::new(GatedSynthesizer::open()),
            |_| ScriptedBrowser::new(search_page()).changing(),
        );
        h.agent = h.agent.with_max_cycles(2);

        let outcome = h.agent.run("read the whole feed").await.unwrap();
        assert!(matches!(outcome, RunOutcome::Aborted { ref reason, .. } if reason == MAX_CYCLES_REASON));
        assert_eq!(h.provider.call_count(), 2);
        assert_eq!(h.browser.dispatched().len(), 2);
    }

    #[tokio::test]
    async fn notes_reach_later_cycles() {
        let with_note = serde_json::json!({
            "explanation": "Opening the search box",
            "action": "click(\"searchbox\")",
            "note": "the search box is [searchbox]"
        })
        .to_string();
        let mut h = harness(vec![with_note, envelope("Finished", r#"done("ok")"#)]);

        h.agent.run("search for cats").await.unwrap();
        assert!(h.provider.prompt(1).contains("the search box is [searchbox]"));
    }

    #[tokio::test]
    async fn serve_runs_until_the_channel_closes() {
        let Harness {
            mut agent,
            provider,
            sender,
            ..
        } = harness(vec![envelope("Finished", r#"done("Settings are open")"#)]);

        assert!(sender.new_goal("open the settings page"));
        drop(sender);

        agent.serve().await.unwrap();
        let history = agent.controller().history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].goal.status, GoalStatus::Completed);
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn session_log_records_transitions_and_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.jsonl");
        let mut h = harness(vec![
            envelope("Opening the search box", r#"click("searchbox")"#),
            envelope("Typing hello", r#"type("searchbox", "hello")"#),
            envelope("Finished", r#"done("Typed hello")"#),
        ]);
        h.agent = h.agent.with_session_log(JsonlSessionLog::new(path.clone()));

        h.agent.run("click the search box and type hello").await.unwrap();

        let records = JsonlSessionLog::read_all(&path).unwrap();
        let entries = records
            .iter()
            .filter(|r| matches!(r, SessionRecord::Entry { .. }))
            .count();
        assert_eq!(entries, 4);
        assert!(matches!(
            records.first(),
            Some(SessionRecord::Goal { status: GoalStatus::Active, .. })
        ));
        assert!(matches!(
            records.last(),
            Some(SessionRecord::Goal { status: GoalStatus::Completed, .. })
        ));
    }
}
