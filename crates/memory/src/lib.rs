//! Memory implementations for VoxPilot: per-goal notes and the session log.

pub mod in_memory;
pub mod noop;
pub mod session_log;

pub use in_memory::InMemoryNotes;
pub use noop::NoopNotes;
pub use session_log::{JsonlSessionLog, SessionRecord};
