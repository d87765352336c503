//! Interruption signals — transient voice messages that start or amend a goal.

use serde::{Deserialize, Serialize};

/// Which push-to-talk key produced the utterance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    /// Primary key: start a goal, replacing the current one
    NewGoal,
    /// Secondary key: add to the current goal
    AmendGoal,
}

/// One transcribed utterance, consumed exactly once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterruptionSignal {
    pub kind: SignalKind,
    pub text: String,
}

impl InterruptionSignal {
    pub fn new_goal(text: impl Into<String>) -> Self {
        Self { kind: SignalKind::NewGoal, text: text.into() }
    }

    pub fn amend(text: impl Into<String>) -> Self {
        Self { kind: SignalKind::AmendGoal, text: text.into() }
    }
}
