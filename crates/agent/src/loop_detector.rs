//! Loop detection over the tail of an event stream.
//!
//! Each action/observation pair is reduced to a fingerprint: operation,
//! target element and whether the page structure changed relative to the
//! previous observation. When the latest fingerprint shows up `threshold`
//! times in the last `window` pairs without any structural change, the
//! detector escalates once; if the very next pair repeats the same
//! fingerprint, the goal is stuck. Any other next pair drops the escalation.

use sha2::{Digest, Sha256};
use std::fmt;
use voxpilot_core::action::{ActionKind, ActionRecord};
use voxpilot_core::page::PageSnapshot;
use voxpilot_core::stream::EventStream;

/// What the orchestrator should do after a cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopVerdict {
    Ok,
    /// Ask the selector for a different strategy next cycle
    Escalate {
        fingerprint: Fingerprint,
        record: ActionRecord,
        occurrences: usize,
    },
    /// No progress after escalation; give up on the goal
    Abort { fingerprint: Fingerprint },
}

/// Operation + target + structural delta of one pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    pub kind: ActionKind,
    pub target: Option<String>,
    /// Truncated hash of the new structure, `None` when unchanged
    pub delta: Option<u64>,
}

impl Fingerprint {
    fn same_action(&self, other: &Fingerprint) -> bool {
        self.kind == other.kind && self.target == other.target
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.target {
            Some(t) => write!(f, "{}({t})", self.kind.as_str())?,
            None => write!(f, "{}", self.kind.as_str())?,
        }
        match self.delta {
            Some(d) => write!(f, " Δ{d:016x}"),
            None => f.write_str(" no-change"),
        }
    }
}

/// SHA-256 of the normalized page structure, truncated to 64 bits.
pub fn structure_hash(snapshot: &PageSnapshot) -> u64 {
    let digest = Sha256::digest(snapshot.structure().as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(bytes)
}

/// Fingerprints of every pair in the stream, oldest first.
///
/// `baseline` is the page observed before the first action; without it the
/// first pair counts as a change.
pub fn fingerprints(stream: &EventStream, baseline: Option<&PageSnapshot>) -> Vec<(Fingerprint, ActionRecord)> {
    let mut previous = baseline.map(structure_hash);
    stream
        .pairs()
        .into_iter()
        .map(|(action, observation)| {
            let hash = structure_hash(&observation.snapshot);
            let delta = match previous {
                Some(prev) if prev == hash => None,
                _ => Some(hash),
            };
            previous = Some(hash);
            let fingerprint = Fingerprint {
                kind: action.record.kind(),
                target: action.record.target().map(|t| t.as_str().to_string()),
                delta,
            };
            (fingerprint, action.record.clone())
        })
        .collect()
}

/// Per-goal loop detector state.
#[derive(Debug)]
pub struct LoopDetector {
    window: usize,
    threshold: usize,
    /// Flagged fingerprint and the pair count when it was flagged
    escalated: Option<(Fingerprint, usize)>,
}

impl LoopDetector {
    pub fn new(window: usize, threshold: usize) -> Self {
        let threshold = threshold.max(2);
        Self {
            window: window.max(threshold),
            threshold,
            escalated: None,
        }
    }

    pub fn is_escalated(&self) -> bool {
        self.escalated.is_some()
    }

    /// Inspect the stream after a completed pair.
    pub fn check(&mut self, stream: &EventStream, baseline: Option<&PageSnapshot>) -> LoopVerdict {
        let all = fingerprints(stream, baseline);
        let start = all.len().saturating_sub(self.window);
        let recent = &all[start..];

        let Some((latest, record)) = recent.last() else {
            return LoopVerdict::Ok;
        };

        if latest.delta.is_some() {
            self.escalated = None;
            return LoopVerdict::Ok;
        }

        if let Some((flagged, at)) = self.escalated.take()
            && all.len() == at + 1
            && flagged.same_action(latest)
        {
            return LoopVerdict::Abort {
                fingerprint: latest.clone(),
            };
        }

        let occurrences = recent
            .iter()
            .filter(|(fp, _)| fp.delta.is_none() && fp.same_action(latest))
            .count();

        if occurrences < self.threshold {
            return LoopVerdict::Ok;
        }

        self.escalated = Some((latest.clone(), all.len()));
        LoopVerdict::Escalate {
            fingerprint: latest.clone(),
            record: record.clone(),
            occurrences,
        }
    }
}

impl Default for LoopDetector {
    fn default() -> Self {
        Self::new(5, 3)
    }
}
