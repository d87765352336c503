//! Narration tasks — one per executed action, never retried, never queued.

use serde::{Deserialize, Serialize};

use crate::action::ActionKind;

/// Whether an explanation was spoken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NarrationDecision {
    Speak,
    Skip,
}

/// Why an explanation was not spoken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// An earlier narration was still playing
    Busy,
    /// Nothing to say
    Empty,
    /// Speech output is turned off
    Disabled,
}

/// The pairing of one completed action with its explanation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NarrationTask {
    pub action_seq: u64,
    pub kind: ActionKind,
    pub explanation: String,
    pub decision: NarrationDecision,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<SkipReason>,
}

impl NarrationTask {
    pub fn spoken(&self) -> bool {
        self.decision == NarrationDecision::Speak
    }
}
