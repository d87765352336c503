//! The append-only Action/Observation log of one goal (the event stream).
//!
//! The stream is the single source of truth fed to the action selector.
//! It enforces strict alternation: an action must be answered by exactly
//! one observation before the next action may be appended, and a closed
//! stream accepts nothing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::action::ActionRecord;
use crate::error::StreamError;
use crate::goal::GoalId;
use crate::page::PageSnapshot;

/// An action the agent dispatched to the browser.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionEntry {
    pub seq: u64,
    pub record: ActionRecord,
    /// The model's explanation, also used for narration
    #[serde(default)]
    pub explanation: String,
    pub timestamp: DateTime<Utc>,
}

/// The browser state produced by one action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservationEntry {
    pub seq: u64,
    /// Sequence number of the action that produced this observation
    pub action_seq: u64,
    pub snapshot: PageSnapshot,
    pub timestamp: DateTime<Utc>,
}

/// One entry of the stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEntry {
    Action(ActionEntry),
    Observation(ObservationEntry),
}

impl StreamEntry {
    pub fn seq(&self) -> u64 {
        match self {
            StreamEntry::Action(a) => a.seq,
            StreamEntry::Observation(o) => o.seq,
        }
    }

    pub fn is_action(&self) -> bool {
        matches!(self, StreamEntry::Action(_))
    }
}

/// Ordered log of Action/Observation entries for one goal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventStream {
    goal_id: GoalId,
    entries: Vec<StreamEntry>,
    closed: bool,
    next_seq: u64,
}

impl EventStream {
    pub fn new(goal_id: GoalId) -> Self {
        Self {
            goal_id,
            entries: Vec::new(),
            closed: false,
            next_seq: 1,
        }
    }

    pub fn goal_id(&self) -> &GoalId {
        &self.goal_id
    }

    pub fn entries(&self) -> &[StreamEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Freeze the stream. Further appends fail.
    pub fn close(&mut self) {
        self.closed = true;
    }

    /// The last `n` entries (fewer if the stream is shorter).
    pub fn tail(&self, n: usize) -> &[StreamEntry] {
        let start = self.entries.len().saturating_sub(n);
        &self.entries[start..]
    }

    /// The action still waiting for its observation, if any.
    pub fn pending_action(&self) -> Option<&ActionEntry> {
        match self.entries.last() {
            Some(StreamEntry::Action(a)) => Some(a),
            _ => None,
        }
    }

    /// The most recent page snapshot.
    pub fn last_snapshot(&self) -> Option<&PageSnapshot> {
        self.entries.iter().rev().find_map(|e| match e {
            StreamEntry::Observation(o) => Some(&o.snapshot),
            StreamEntry::Action(_) => None,
        })
    }

    /// Number of actions recorded.
    pub fn action_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_action()).count()
    }

    /// Completed (action, observation) pairs in order.
    pub fn pairs(&self) -> Vec<(&ActionEntry, &ObservationEntry)> {
        self.entries
            .windows(2)
            .filter_map(|w| match (&w[0], &w[1]) {
                (StreamEntry::Action(a), StreamEntry::Observation(o)) if o.action_seq == a.seq => Some((a, o)),
                _ => None,
            })
            .collect()
    }

    /// Append an action. Fails if an earlier action is still unanswered.
    pub fn append_action(
        &mut self,
        record: ActionRecord,
        explanation: impl Into<String>,
    ) -> Result<u64, StreamError> {
        self.ensure_open()?;
        if let Some(pending) = self.pending_action() {
            return Err(StreamError::ObservationPending { pending_seq: pending.seq });
        }
        let seq = self.take_seq();
        self.entries.push(StreamEntry::Action(ActionEntry {
            seq,
            record,
            explanation: explanation.into(),
            timestamp: Utc::now(),
        }));
        Ok(seq)
    }

    /// Append the observation answering the pending action `action_seq`.
    pub fn append_observation(
        &mut self,
        action_seq: u64,
        snapshot: PageSnapshot,
    ) -> Result<u64, StreamError> {
        self.ensure_open()?;
        let expected = self
            .pending_action()
            .map(|a| a.seq)
            .ok_or(StreamError::NoPendingAction)?;
        if expected != action_seq {
            return Err(StreamError::MismatchedAction { expected, got: action_seq });
        }
        let seq = self.take_seq();
        self.entries.push(StreamEntry::Observation(ObservationEntry {
            seq,
            action_seq,
            snapshot,
            timestamp: Utc::now(),
        }));
        Ok(seq)
    }

    fn ensure_open(&self) -> Result<(), StreamError> {
        if self.closed {
            return Err(StreamError::Closed(self.goal_id.to_string()));
        }
        Ok(())
    }

    fn take_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }
}
