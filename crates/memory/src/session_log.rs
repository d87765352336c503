//! JSONL session log — every goal transition and stream entry, one per line.
//!
//! The log is append-only and human-inspectable. It is written on every
//! record so a crashed session still leaves a complete trace up to the
//! last completed cycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, warn};
use voxpilot_core::error::MemoryError;
use voxpilot_core::goal::{Goal, GoalStatus};
use voxpilot_core::stream::StreamEntry;

/// One line of the session log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "record", rename_all = "snake_case")]
pub enum SessionRecord {
    /// A goal was created, amended, superseded or finished
    Goal {
        goal_id: String,
        status: GoalStatus,
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
        timestamp: DateTime<Utc>,
    },
    /// An action or observation appended to a goal's stream
    Entry { goal_id: String, entry: StreamEntry },
}

impl SessionRecord {
    pub fn goal(goal: &Goal) -> Self {
        SessionRecord::Goal {
            goal_id: goal.id.to_string(),
            status: goal.status,
            text: goal.text.clone(),
            reason: goal.abort_reason.clone(),
            timestamp: Utc::now(),
        }
    }

    pub fn entry(goal: &Goal, entry: &StreamEntry) -> Self {
        SessionRecord::Entry {
            goal_id: goal.id.to_string(),
            entry: entry.clone(),
        }
    }
}

/// An append-only JSONL writer.
pub struct JsonlSessionLog {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlSessionLog {
    pub fn new(path: PathBuf) -> Self {
        debug!(path = %path.display(), "Session log opened");
        Self {
            path,
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record and flush it to disk.
    pub async fn record(&self, record: &SessionRecord) -> Result<(), MemoryError> {
        let mut line = serde_json::to_string(record)
            .map_err(|e| MemoryError::Storage(format!("Failed to serialize session record: {e}")))?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                MemoryError::Storage(format!("Failed to create session log directory: {e}"))
            })?;
        }

        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| MemoryError::Storage(format!("Failed to open session log: {e}")))?;
        file.write_all(line.as_bytes())
            .and_then(|_| file.flush())
            .map_err(|e| MemoryError::Storage(format!("Failed to write session log: {e}")))?;

        Ok(())
    }

    /// Read every well-formed record back. Corrupted lines are skipped.
    pub fn read_all(path: &Path) -> Result<Vec<SessionRecord>, MemoryError> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(MemoryError::QueryFailed(format!(
                    "Failed to read session log: {e}"
                )));
            }
        };

        Ok(content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| match serde_json::from_str::<SessionRecord>(line) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!(error = %e, "Skipping corrupted session record");
                    None
                }
            })
            .collect())
    }
}
