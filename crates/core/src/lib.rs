//! # VoxPilot Core
//!
//! Domain types, traits, and error definitions for the VoxPilot voice
//! browser agent. This crate has **no agent logic**; it defines the domain
//! model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator (reasoning model, browser, speech,
//! transcription, note storage) is a trait here. Implementations live in
//! their respective crates, so the agent loop can be driven by scripted
//! mocks in tests and by real services in the binary.

pub mod action;
pub mod browser;
pub mod error;
pub mod event;
pub mod goal;
pub mod memory;
pub mod message;
pub mod narration;
pub mod page;
pub mod provider;
pub mod signal;
pub mod speech;
pub mod stream;

// Re-export key types at crate root for ergonomics
pub use action::{ActionKind, ActionRecord, ElementRef, ParseError};
pub use browser::BrowserLayer;
pub use error::{DispatchError, Error, MemoryError, ProviderError, Result, StreamError};
pub use event::{DomainEvent, EventBus};
pub use goal::{Goal, GoalId, GoalStatus};
pub use memory::{MemoryNote, NoteStore};
pub use message::{Message, Role};
pub use narration::{NarrationDecision, NarrationTask, SkipReason};
pub use page::PageSnapshot;
pub use provider::{Provider, ProviderRequest, ProviderResponse, Usage};
pub use signal::{InterruptionSignal, SignalKind};
pub use speech::{AudioSink, SpeechSynthesizer, Transcriber, Transcript};
pub use stream::{ActionEntry, EventStream, ObservationEntry, StreamEntry};
