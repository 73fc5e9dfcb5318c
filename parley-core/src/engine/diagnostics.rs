use std::sync::atomic::{AtomicUsize, Ordering};

use serde::Serialize;

/// Collaborator call counters, shared by every request the engine serves.
#[derive(Default)]
pub struct EngineDiagnostics {
    pub transcriptions: AtomicUsize,
    pub transcription_fallbacks: AtomicUsize,
    pub generations: AtomicUsize,
    pub generation_fallbacks: AtomicUsize,
    pub timeouts: AtomicUsize,
}

impl EngineDiagnostics {
    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot {
            transcriptions: self.transcriptions.load(Ordering::Relaxed),
            transcription_fallbacks: self.transcription_fallbacks.load(Ordering::Relaxed),
            generations: self.generations.load(Ordering::Relaxed),
            generation_fallbacks: self.generation_fallbacks.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticsSnapshot {
    pub transcriptions: usize,
    pub transcription_fallbacks: usize,
    pub generations: usize,
    pub generation_fallbacks: usize,
    pub timeouts: usize,
}
