//! Narration coordinator — fire-and-forget speech with a single slot.
//!
//! At most one narration plays at a time and nothing is ever queued: an
//! explanation that arrives while another is playing is dropped. The slot
//! holds the generation number of the playing narration (0 = idle), so a
//! cancelled playback can never release a newer narration's slot.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use voxpilot_core::action::ActionRecord;
use voxpilot_core::event::{DomainEvent, EventBus};
use voxpilot_core::narration::{NarrationDecision, NarrationTask, SkipReason};
use voxpilot_core::speech::SpeechSynthesizer;

const IDLE: u64 = 0;

pub struct NarrationCoordinator {
    synthesizer: Arc<dyn SpeechSynthesizer>,
    slot: Arc<AtomicU64>,
    next_generation: AtomicU64,
    playback: Mutex<Option<(u64, JoinHandle<()>)>>,
    event_bus: Arc<EventBus>,
    enabled: bool,
}

impl NarrationCoordinator {
    pub fn new(synthesizer: Arc<dyn SpeechSynthesizer>, event_bus: Arc<EventBus>) -> Self {
        Self {
            synthesizer,
            slot: Arc::new(AtomicU64::new(IDLE)),
            next_generation: AtomicU64::new(1),
            playback: Mutex::new(None),
            event_bus,
            enabled: true,
        }
    }

    /// Turn speech output on or off.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Whether a narration is currently playing.
    pub fn is_playing(&self) -> bool {
        self.slot.load(Ordering::Acquire) != IDLE
    }

    /// Offer the explanation of a completed action. Never waits.
    pub fn submit(&self, action_seq: u64, record: &ActionRecord, explanation: &str) -> NarrationTask {
        let text = explanation.trim();
        let task = |decision, skip_reason| NarrationTask {
            action_seq,
            kind: record.kind(),
            explanation: text.to_string(),
            decision,
            skip_reason,
        };

        if !self.enabled {
            return task(NarrationDecision::Skip, Some(SkipReason::Disabled));
        }
        if text.is_empty() {
            return task(NarrationDecision::Skip, Some(SkipReason::Empty));
        }

        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        if self
            .slot
            .compare_exchange(IDLE, generation, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            info!(action_seq, explanation = %text, "Narration busy, explanation dropped");
            self.event_bus.publish(DomainEvent::NarrationSkipped {
                action_seq,
                text: text.to_string(),
                timestamp: Utc::now(),
            });
            return task(NarrationDecision::Skip, Some(SkipReason::Busy));
        }

        self.play(generation, Some(action_seq), text.to_string());
        task(NarrationDecision::Speak, None)
    }

    /// Speak a system message, interrupting any narration in flight.
    pub fn announce(&self, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        if !self.enabled {
            info!(message = %text, "Announcement (speech disabled)");
            return;
        }

        self.cancel();
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        // The slot was just cleared; a racing submit may have claimed it, in
        // which case the announcement still takes over.
        self.slot.store(generation, Ordering::Release);
        self.play(generation, None, text.to_string());
    }

    /// Stop whatever is playing.
    pub fn cancel(&self) {
        let current = self.lock_playback().take();
        if let Some((generation, handle)) = current {
            handle.abort();
            if self
                .slot
                .compare_exchange(generation, IDLE, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                debug!(generation, "Narration cancelled");
            }
        }
    }

    /// Wait until the current narration (if any) finishes.
    pub async fn wait_idle(&self) {
        let current = self.lock_playback().take();
        if let Some((_, handle)) = current {
            let _ = handle.await;
        }
    }

    fn play(&self, generation: u64, action_seq: Option<u64>, text: String) {
        self.event_bus.publish(DomainEvent::NarrationStarted {
            action_seq,
            text: text.clone(),
            timestamp: Utc::now(),
        });

        let synthesizer = self.synthesizer.clone();
        let slot = self.slot.clone();
        let handle = tokio::spawn(async move {
            if let Err(e) = synthesizer.speak(&text).await {
                warn!(error = %e, "Narration failed");
            }
            let _ = slot.compare_exchange(generation, IDLE, Ordering::AcqRel, Ordering::Acquire);
        });

        let previous = self.lock_playback().replace((generation, handle));
        if let Some((_, old)) = previous {
            // Already finished or superseded by an announcement.
            old.abort();
        }
    }

    fn lock_playback(&self) -> std::sync::MutexGuard<'_, Option<(u64, JoinHandle<()>)>> {
        self.playback.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
