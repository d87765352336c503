//! In-memory note store — the default for voice sessions.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use voxpilot_core::error::MemoryError;
use voxpilot_core::goal::GoalId;
use voxpilot_core::memory::{MemoryNote, NoteStore};

/// Notes keyed by goal, each list in append order.
pub struct InMemoryNotes {
    notes: Arc<RwLock<HashMap<GoalId, Vec<MemoryNote>>>>,
}

impl InMemoryNotes {
    pub fn new() -> Self {
        Self {
            notes: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Number of goals with at least one note.
    pub async fn goal_count(&self) -> usize {
        self.notes.read().await.len()
    }
}

impl Default for InMemoryNotes {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NoteStore for InMemoryNotes {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn append(&self, note: MemoryNote) -> Result<(), MemoryError> {
        let text = note.text.trim();
        if text.is_empty() {
            return Ok(());
        }
        let note = MemoryNote {
            text: text.to_string(),
            ..note
        };
        self.notes
            .write()
            .await
            .entry(note.goal_id.clone())
            .or_default()
            .push(note);
        Ok(())
    }

    async fn notes(&self, goal_id: &GoalId) -> Result<Vec<MemoryNote>, MemoryError> {
        Ok(self
            .notes
            .read()
            .await
            .get(goal_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn count(&self, goal_id: &GoalId) -> Result<usize, MemoryError> {
        Ok(self.notes.read().await.get(goal_id).map_or(0, Vec::len))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn append_and_read_in_order() {
        let store = InMemoryNotes::new();
        let goal = GoalId::from("g1");
        store.append(MemoryNote::new(goal.clone(), "first")).await.unwrap();
        store.append(MemoryNote::new(goal.clone(), "second")).await.unwrap();

        let notes = store.notes(&goal).await.unwrap();
        let texts: Vec<_> = notes.iter().map(|n| n.text.as_str()).collect();
        assert_eq!(texts, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn notes_are_scoped_per_goal() {
        let store = InMemoryNotes::new();
        let a = GoalId::from("a");
        let b = GoalId::from("b");
        store.append(MemoryNote::new(a.clone(), "about a")).await.unwrap();

        assert_eq!(store.count(&a).await.unwrap(), 1);
        assert!(store.notes(&b).await.unwrap().is_empty());
        assert_eq!(store.goal_count().await, 1);
    }

    #[tokio::test]
    async fn blank_notes_are_dropped() {
        let store = InMemoryNotes::new();
        let goal = GoalId::from("g1");
        store.append(MemoryNote::new(goal.clone(), "   ")).await.unwrap();
        store.append(MemoryNote::new(goal.clone(), "  padded  ")).await.unwrap();

        let notes = store.notes(&goal).await.unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].text, "padded");
    }
}
