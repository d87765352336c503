//! Interruption controller — owns the goal history and the active goal.
//!
//! The voice layer only ever holds a [`SignalSender`]. Signals queue up in
//! an unbounded channel and are applied by the orchestrator at cycle
//! boundaries ([`InterruptionController::poll`]) or while it is idle
//! ([`InterruptionController::wait`]). Within one batch a `NewGoal` wins
//! over every `AmendGoal`, and the last `NewGoal` wins over earlier ones.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{debug, info};
use voxpilot_core::event::{DomainEvent, EventBus};
use voxpilot_core::goal::{Goal, GoalId, GoalStatus};
use voxpilot_core::signal::{InterruptionSignal, SignalKind};
use voxpilot_core::stream::EventStream;

/// The sending half handed to the voice layer.
#[derive(Debug, Clone)]
pub struct SignalSender {
    tx: mpsc::UnboundedSender<InterruptionSignal>,
}

impl SignalSender {
    /// Queue a signal. Returns false once the agent has shut down.
    pub fn send(&self, signal: InterruptionSignal) -> bool {
        self.tx.send(signal).is_ok()
    }

    pub fn new_goal(&self, text: impl Into<String>) -> bool {
        self.send(InterruptionSignal::new_goal(text))
    }

    pub fn amend(&self, text: impl Into<String>) -> bool {
        self.send(InterruptionSignal::amend(text))
    }
}

/// A goal and its event stream.
#[derive(Debug, Clone)]
pub struct GoalSlot {
    pub goal: Goal,
    pub stream: EventStream,
}

/// What applying a signal changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Started {
        goal_id: GoalId,
        superseded: Option<GoalId>,
    },
    Amended {
        goal_id: GoalId,
    },
}

pub struct InterruptionController {
    rx: mpsc::UnboundedReceiver<InterruptionSignal>,
    history: Vec<GoalSlot>,
    active: Option<usize>,
    event_bus: Arc<EventBus>,
}

/// Create a connected sender/controller pair.
pub fn channel(event_bus: Arc<EventBus>) -> (SignalSender, InterruptionController) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        SignalSender { tx },
        InterruptionController {
            rx,
            history: Vec::new(),
            active: None,
            event_bus,
        },
    )
}

impl InterruptionController {
    /// The active goal, if any.
    pub fn active(&self) -> Option<&GoalSlot> {
        self.active.and_then(|i| self.history.get(i))
    }

    pub fn active_mut(&mut self) -> Option<&mut GoalSlot> {
        self.active.and_then(|i| self.history.get_mut(i))
    }

    pub fn active_id(&self) -> Option<GoalId> {
        self.active().map(|slot| slot.goal.id.clone())
    }

    /// Every goal ever started, oldest first. Superseded goals stay here.
    pub fn history(&self) -> &[GoalSlot] {
        &self.history
    }

    pub fn slot(&self, id: &GoalId) -> Option<&GoalSlot> {
        self.history.iter().find(|s| &s.goal.id == id)
    }

    pub fn slot_mut(&mut self, id: &GoalId) -> Option<&mut GoalSlot> {
        self.history.iter_mut().find(|s| &s.goal.id == id)
    }

    /// Start a goal, superseding the active one.
    pub fn start_goal(&mut self, text: &str) -> Option<Transition> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }

        let superseded = self.supersede_active();
        let goal = Goal::new(text);
        let goal_id = goal.id.clone();
        info!(goal_id = %goal_id, text = %goal.text, "Goal started");

        self.history.push(GoalSlot {
            stream: EventStream::new(goal_id.clone()),
            goal,
        });
        self.active = Some(self.history.len() - 1);

        if let Some(old) = &superseded {
            self.event_bus.publish(DomainEvent::GoalSuperseded {
                goal_id: old.to_string(),
                replaced_by: goal_id.to_string(),
                timestamp: Utc::now(),
            });
        }
        self.event_bus.publish(DomainEvent::GoalStarted {
            goal_id: goal_id.to_string(),
            text: text.to_string(),
            timestamp: Utc::now(),
        });

        Some(Transition::Started { goal_id, superseded })
    }

    /// Append to the active goal; with no active goal this starts one.
    pub fn amend(&mut self, text: &str) -> Option<Transition> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }

        let Some(slot) = self.active_mut() else {
            debug!("Amendment with no active goal, starting a new one");
            return self.start_goal(text);
        };

        slot.goal.amend(text);
        let goal_id = slot.goal.id.clone();
        info!(goal_id = %goal_id, amendment = %text, "Goal amended");
        self.event_bus.publish(DomainEvent::GoalAmended {
            goal_id: goal_id.to_string(),
            amendment: text.to_string(),
            timestamp: Utc::now(),
        });
        Some(Transition::Amended { goal_id })
    }

    /// Apply one signal.
    pub fn apply(&mut self, signal: InterruptionSignal) -> Option<Transition> {
        match signal.kind {
            SignalKind::NewGoal => self.start_goal(&signal.text),
            SignalKind::AmendGoal => self.amend(&signal.text),
        }
    }

    /// Apply a batch of signals that arrived during one cycle.
    ///
    /// The last NewGoal wins and everything queued before it is dropped.
    /// Amendments queued after it refine the new goal.
    pub fn apply_batch(&mut self, batch: Vec<InterruptionSignal>) -> Vec<Transition> {
        let mut batch: Vec<_> = batch
            .into_iter()
            .filter(|s| !s.text.trim().is_empty())
            .collect();

        if let Some(idx) = batch.iter().rposition(|s| s.kind == SignalKind::NewGoal)
            && idx > 0
        {
            debug!(dropped = idx, "New goal overrides earlier signals in batch");
            batch.drain(..idx);
        }
        batch.into_iter().filter_map(|s| self.apply(s)).collect()
    }

    /// Apply everything queued since the last boundary. Never waits.
    pub fn poll(&mut self) -> Vec<Transition> {
        let mut batch = Vec::new();
        while let Ok(signal) = self.rx.try_recv() {
            batch.push(signal);
        }
        if batch.is_empty() {
            return Vec::new();
        }
        self.apply_batch(batch)
    }

    /// Wait for the next signal (plus anything queued behind it) and apply
    /// it. Returns `None` once every sender is gone.
    pub async fn wait(&mut self) -> Option<Vec<Transition>> {
        loop {
            let first = self.rx.recv().await?;
            let mut batch = vec![first];
            while let Ok(signal) = self.rx.try_recv() {
                batch.push(signal);
            }
            let transitions = self.apply_batch(batch);
            if !transitions.is_empty() {
                return Some(transitions);
            }
        }
    }

    /// Mark a goal completed. Returns false if it was already finished.
    pub fn complete(&mut self, id: &GoalId, message: Option<String>) -> bool {
        self.finish(id, GoalStatus::Completed, None, message)
    }

    /// Mark a goal aborted. Returns false if it was already finished.
    pub fn abort(&mut self, id: &GoalId, reason: &str) -> bool {
        self.finish(id, GoalStatus::Aborted, Some(reason.to_string()), None)
    }

    fn finish(
        &mut self,
        id: &GoalId,
        status: GoalStatus,
        reason: Option<String>,
        message: Option<String>,
    ) -> bool {
        let Some(idx) = self.history.iter().position(|s| &s.goal.id == id) else {
            return false;
        };
        let slot = &mut self.history[idx];
        if slot.goal.status.is_terminal() {
            return false;
        }

        slot.goal.status = status;
        slot.goal.abort_reason = reason.clone();
        slot.goal.final_message = message;
        slot.stream.close();
        let cycles = slot.stream.action_count();
        info!(goal_id = %id, ?status, reason = ?reason, cycles, "Goal finished");

        if self.active == Some(idx) {
            self.active = None;
        }

        self.event_bus.publish(DomainEvent::GoalFinished {
            goal_id: id.to_string(),
            status,
            reason,
            cycles,
            timestamp: Utc::now(),
        });
        true
    }

    fn supersede_active(&mut self) -> Option<GoalId> {
        let slot = self.active_mut()?;
        slot.goal.status = GoalStatus::Superseded;
        slot.stream.close();
        let id = slot.goal.id.clone();
        info!(goal_id = %id, "Goal superseded");
        self.active = None;
        Some(id)
    }
}
