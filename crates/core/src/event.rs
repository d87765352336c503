//! Domain event system — decoupled observability for the agent loop.
//!
//! Events are published when something interesting happens: a goal starts
//! or ends, an action is dispatched, a parse fails, a narration is skipped.
//! Loggers, session recorders and tests subscribe without touching the
//! loop itself.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::action::ActionKind;
use crate::goal::GoalStatus;

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// A new goal became active
    GoalStarted {
        goal_id: String,
        text: String,
        timestamp: DateTime<Utc>,
    },

    /// Text was appended to the active goal
    GoalAmended {
        goal_id: String,
        amendment: String,
        timestamp: DateTime<Utc>,
    },

    /// The active goal was replaced by a new one
    GoalSuperseded {
        goal_id: String,
        replaced_by: String,
        timestamp: DateTime<Utc>,
    },

    /// A goal reached Completed or Aborted
    GoalFinished {
        goal_id: String,
        status: GoalStatus,
        reason: Option<String>,
        cycles: usize,
        timestamp: DateTime<Utc>,
    },

    /// One browser action was dispatched and observed
    ActionDispatched {
        goal_id: String,
        seq: u64,
        kind: ActionKind,
        success: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// The reasoning service's output did not match the grammar
    ParseFailed {
        goal_id: String,
        attempt: u32,
        error: String,
        timestamp: DateTime<Utc>,
    },

    /// Every attempt failed; a clarify action was synthesized
    SelectorFallback {
        goal_id: String,
        attempts: u32,
        timestamp: DateTime<Utc>,
    },

    /// The loop detector asked for a different strategy
    LoopEscalated {
        goal_id: String,
        fingerprint: String,
        occurrences: usize,
        timestamp: DateTime<Utc>,
    },

    /// An explanation started playing
    NarrationStarted {
        action_seq: Option<u64>,
        text: String,
        timestamp: DateTime<Utc>,
    },

    /// An explanation was dropped because another was still playing
    NarrationSkipped {
        action_seq: u64,
        text: String,
        timestamp: DateTime<Utc>,
    },

    /// An error occurred
    ErrorOccurred {
        context: String,
        error_message: String,
        timestamp: DateTime<Utc>,
    },
}

/// A broadcast-based event bus for domain events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
/// Components can subscribe to receive all events and filter for what they care about.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: DomainEvent) {
        // Ignore send errors (no subscribers = that's fine)
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn event_bus_publish_subscribe() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.publish(DomainEvent::ActionDispatched {
            goal_id: "g1".into(),
            seq: 1,
            kind: ActionKind::Click,
            success: true,
            duration_ms: 42,
            timestamp: Utc::now(),
        });

        let event = rx.recv().await.unwrap();
        match event.as_ref() {
            DomainEvent::ActionDispatched { kind, success, .. } => {
                assert_eq!(*kind, ActionKind::Click);
                assert!(success);
            }
            _ => panic!("Expected ActionDispatched event"),
        }
    }

    #[test]
    fn event_bus_no_subscribers_doesnt_panic() {
        let bus = EventBus::new(16);
        bus.publish(DomainEvent::ErrorOccurred {
            context: "test".into(),
            error_message: "no subscribers".into(),
            timestamp: Utc::now(),
        });
    }
}
