//! Page snapshots — the immutable observation the browser layer returns
//! after every dispatched action.

use serde::{Deserialize, Serialize};

/// Structural summary of the browser after an action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageSnapshot {
    /// Current page URL
    pub url: String,

    /// Page title, if the browser layer reports one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Bid of the focused element
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub focused: Option<String>,

    /// Flattened accessibility tree
    #[serde(default)]
    pub tree: String,

    /// Error text when the last action failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Whether the last action succeeded
    #[serde(default = "default_success")]
    pub success: bool,
}

fn default_success() -> bool {
    true
}

impl PageSnapshot {
    pub fn new(url: impl Into<String>, tree: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: None,
            focused: None,
            tree: tree.into(),
            error: None,
            success: true,
        }
    }

    pub fn with_focus(mut self, bid: impl Into<String>) -> Self {
        self.focused = Some(bid.into());
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// A snapshot describing a failed dispatch. The page is assumed
    /// unchanged, so the last known URL and tree carry forward.
    pub fn failure(previous: Option<&PageSnapshot>, error: impl Into<String>) -> Self {
        let mut snapshot = previous.cloned().unwrap_or_else(|| PageSnapshot::new("about:blank", ""));
        snapshot.error = Some(error.into());
        snapshot.success = false;
        snapshot
    }

    /// Text the loop detector hashes: URL plus the tree with whitespace
    /// collapsed. Focus and error text are deliberately excluded.
    pub fn structure(&self) -> String {
        let tree: Vec<&str> = self.tree.split_whitespace().collect();
        format!("{}\n{}", self.url.trim(), tree.join(" "))
    }

    /// Tree truncated to `max_chars` for prompts.
    pub fn tree_excerpt(&self, max_chars: usize) -> String {
        if self.tree.chars().count() <= max_chars {
            return self.tree.clone();
        }
        let cut: String = self.tree.chars().take(max_chars).collect();
        format!("{cut}...")
    }
}
