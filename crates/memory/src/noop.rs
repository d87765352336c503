//! No-op note store — disables written notes entirely.

use async_trait::async_trait;
use voxpilot_core::error::MemoryError;
use voxpilot_core::goal::GoalId;
use voxpilot_core::memory::{MemoryNote, NoteStore};

/// A note store that keeps nothing.
pub struct NoopNotes;

#[async_trait]
impl NoteStore for NoopNotes {
    fn name(&self) -> &str {
        "none"
    }

    async fn append(&self, _note: MemoryNote) -> Result<(), MemoryError> {
        Ok(())
    }

    async fn notes(&self, _goal_id: &GoalId) -> Result<Vec<MemoryNote>, MemoryError> {
        Ok(Vec::new())
    }
}
