//! Goals: the user's current instruction and its lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a goal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GoalId(pub String);

impl GoalId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Default for GoalId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for GoalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle status of a goal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalStatus {
    Active,
    Superseded,
    Completed,
    Aborted,
}

impl GoalStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, GoalStatus::Active)
    }
}

/// The user's current high-level instruction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Goal {
    pub id: GoalId,

    /// Original instruction followed by every amendment
    pub text: String,

    /// Amendment texts in arrival order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub amendments: Vec<String>,

    pub created_at: DateTime<Utc>,

    pub status: GoalStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abort_reason: Option<String>,

    /// Message attached to the final `done` action
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_message: Option<String>,
}

impl Goal {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            id: GoalId::new(),
            text: text.into().trim().to_string(),
            amendments: Vec::new(),
            created_at: Utc::now(),
            status: GoalStatus::Active,
            abort_reason: None,
            final_message: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == GoalStatus::Active
    }

    /// Append an amendment. The existing text is kept.
    pub fn amend(&mut self, amendment: &str) {
        let amendment = amendment.trim();
        if amendment.is_empty() {
            return;
        }
        self.text = if self.text.is_empty() {
            amendment.to_string()
        } else {
            format!("{}\n{}", self.text, amendment)
        };
        self.amendments.push(amendment.to_string());
    }
}
