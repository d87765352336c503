//! Memory store trait — durable written notes for a goal.
//!
//! Notes are short facts or sub-plans the model chose to keep ("search box
//! already focused"). They are keyed by goal, append-ordered, and read on
//! every decision cycle of that goal. They are not raw history; the event
//! stream is.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::MemoryError;
use crate::goal::GoalId;

/// A single written note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryNote {
    pub goal_id: GoalId,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

impl MemoryNote {
    pub fn new(goal_id: GoalId, text: impl Into<String>) -> Self {
        Self {
            goal_id,
            text: text.into(),
            created_at: Utc::now(),
        }
    }
}

/// The core NoteStore trait.
///
/// Implementations: in-memory (default), no-op.
#[async_trait]
pub trait NoteStore: Send + Sync {
    /// The backend name (e.g., "in_memory", "none").
    fn name(&self) -> &str;

    /// Append a note for a goal.
    async fn append(&self, note: MemoryNote) -> Result<(), MemoryError>;

    /// All notes of a goal in append order.
    async fn notes(&self, goal_id: &GoalId) -> Result<Vec<MemoryNote>, MemoryError>;

    /// Number of notes stored for a goal.
    async fn count(&self, goal_id: &GoalId) -> Result<usize, MemoryError> {
        Ok(self.notes(goal_id).await?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn note_serialization() {
        let note = MemoryNote::new(GoalId::from("g"), "search box already focused");
        let json = serde_json::to_string(&note).unwrap();
        assert!(json.contains("already focused"));
    }
}
