//! The VoxPilot agent: an event-stream loop that drives a browser by voice.
//!
//! Each decision cycle:
//!
//! 1. **Select** one action from the goal, notes and recent stream tail
//! 2. **Dispatch** it to the browser layer and append the observation
//! 3. **Check** the stream for loops (escalate, then abort)
//! 4. **Narrate** the explanation without waiting for playback
//! 5. **Apply** any voice signals that arrived during the cycle
//!
//! `done` and `clarify` end the drive without touching the browser.

pub mod agent_loop;
pub mod grammar;
pub mod interruption;
pub mod loop_detector;
pub mod narration;
pub mod prompt;
pub mod selector;
pub mod voice;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use agent_loop::{EventStreamAgent, MAX_CYCLES_REASON, RunOutcome, STUCK_REASON};
pub use interruption::{GoalSlot, InterruptionController, SignalSender, Transition, channel};
pub use loop_detector::{Fingerprint, LoopDetector, LoopVerdict};
pub use narration::NarrationCoordinator;
pub use selector::{ActionSelector, FALLBACK_QUESTION, Selection, SelectionInput};
pub use voice::{NOT_UNDERSTOOD, VoiceGateway, VoiceOutcome};
