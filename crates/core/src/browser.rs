//! BrowserLayer trait — the request/response boundary to the browser.
//!
//! The agent hands over one validated action and receives one immutable
//! [`PageSnapshot`]. The browser layer owns the DOM; the agent never holds a
//! reference into it.

use async_trait::async_trait;

use crate::action::ActionRecord;
use crate::error::DispatchError;
use crate::page::PageSnapshot;

#[async_trait]
pub trait BrowserLayer: Send + Sync {
    /// A human-readable name (e.g., "http-bridge").
    fn name(&self) -> &str;

    /// Execute exactly one action and return the resulting page.
    async fn dispatch(&self, action: &ActionRecord) -> Result<PageSnapshot, DispatchError>;

    /// Snapshot the current page without acting.
    async fn observe(&self) -> Result<PageSnapshot, DispatchError>;

    /// Health check: is the browser layer reachable?
    async fn health_check(&self) -> Result<bool, DispatchError> {
        Ok(true)
    }
}
