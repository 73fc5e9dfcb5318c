//! Shared application state.
//!
//! `AppState` is cloned into every axum handler by the `State` extractor;
//! all fields are `Arc`s so clones are cheap.

use std::collections::VecDeque;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use parking_lot::Mutex;
use parley_core::engine::DiagnosticsSnapshot;
use parley_core::PracticeEngine;
use serde::Serialize;

use crate::settings::AppSettings;
use crate::storage::LocalStore;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<PracticeEngine>,
    /// Local encrypted SQLite storage.
    pub store: Arc<LocalStore>,
    /// Settings as loaded at startup.
    pub settings: Arc<AppSettings>,
    /// Rolling stage latency metrics.
    pub perf_metrics: Arc<Mutex<PerfMetrics>>,
    /// Turns scored and persisted.
    pub turns_applied: Arc<AtomicUsize>,
    /// Turns refused (empty input, finished session, no session).
    pub turns_rejected: Arc<AtomicUsize>,
    pub scripts_started: Arc<AtomicUsize>,
}

impl AppState {
    pub fn new(engine: PracticeEngine, store: LocalStore, settings: AppSettings) -> Self {
        Self {
            engine: Arc::new(engine),
            store: Arc::new(store),
            settings: Arc::new(settings),
            perf_metrics: Arc::new(Mutex::new(PerfMetrics::default())),
            turns_applied: Arc::new(AtomicUsize::new(0)),
            turns_rejected: Arc::new(AtomicUsize::new(0)),
            scripts_started: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn diagnostics_snapshot(&self) -> AppDiagnostics {
        AppDiagnostics {
            turns_applied: self.turns_applied.load(Ordering::Relaxed),
            turns_rejected: self.turns_rejected.load(Ordering::Relaxed),
            scripts_started: self.scripts_started.load(Ordering::Relaxed),
            engine: self.engine.diagnostics_snapshot(),
        }
    }

    pub fn perf_snapshot(&self) -> PerfSnapshot {
        let diagnostics = self.diagnostics_snapshot();
        let metrics = self.perf_metrics.lock().snapshot();
        PerfSnapshot {
            diagnostics,
            transcribe_ms: metrics.transcribe_ms,
            generate_ms: metrics.generate_ms,
            score_ms: metrics.score_ms,
            persist_ms: metrics.persist_ms,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppDiagnostics {
    pub turns_applied: usize,
    pub turns_rejected: usize,
    pub scripts_started: usize,
    pub engine: DiagnosticsSnapshot,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerfSnapshot {
    pub diagnostics: AppDiagnostics,
    pub transcribe_ms: PerfStageSnapshot,
    pub generate_ms: PerfStageSnapshot,
    pub score_ms: PerfStageSnapshot,
    pub persist_ms: PerfStageSnapshot,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerfStageSnapshot {
    pub count: usize,
    pub mean_ms: f64,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
    pub max_ms: f64,
}

#[derive(Debug, Default)]
pub struct PerfMetrics {
    transcribe_ms: StageWindow,
    generate_ms: StageWindow,
    score_ms: StageWindow,
    persist_ms: StageWindow,
}

impl PerfMetrics {
    pub fn record_transcribe(&mut self, elapsed_ms: f64) {
        self.transcribe_ms.record(elapsed_ms);
    }

    pub fn record_generate(&mut self, elapsed_ms: f64) {
        self.generate_ms.record(elapsed_ms);
    }

    pub fn record_score(&mut self, elapsed_ms: f64) {
        self.score_ms.record(elapsed_ms);
    }

    pub fn record_persist(&mut self, elapsed_ms: f64) {
        self.persist_ms.record(elapsed_ms);
    }

    pub fn snapshot(&self) -> PerfMetricsSnapshot {
        PerfMetricsSnapshot {
            transcribe_ms: self.transcribe_ms.snapshot(),
            generate_ms: self.generate_ms.snapshot(),
            score_ms: self.score_ms.snapshot(),
            persist_ms: self.persist_ms.snapshot(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PerfMetricsSnapshot {
    pub transcribe_ms: PerfStageSnapshot,
    pub generate_ms: PerfStageSnapshot,
    pub score_ms: PerfStageSnapshot,
    pub persist_ms: PerfStageSnapshot,
}

#[derive(Debug)]
struct StageWindow {
    samples: VecDeque<f64>,
    cap: usize,
    count: usize,
    sum_ms: f64,
    max_ms: f64,
}

impl Default for StageWindow {
    fn default() -> Self {
        Self {
            samples: VecDeque::with_capacity(512),
            cap: 512,
            count: 0,
            sum_ms: 0.0,
            max_ms: 0.0,
        }
    }
}

impl StageWindow {
    fn record(&mut self, elapsed_ms: f64) {
        let v = if elapsed_ms.is_finite() {
            elapsed_ms.max(0.0)
        } else {
            0.0
        };
        if self.samples.len() == self.cap {
            let _ = self.samples.pop_front();
        }
        self.samples.push_back(v);
        self.count = self.count.saturating_add(1);
        self.sum_ms += v;
        self.max_ms = self.max_ms.max(v);
    }

    /// Percentiles over the retained window; `count`, `mean` and `max` over
    /// every sample ever recorded.
    fn snapshot(&self) -> PerfStageSnapshot {
        if self.samples.is_empty() {
            return PerfStageSnapshot::default();
        }
        let mut sorted: Vec<f64> = self.samples.iter().copied().collect();
        sorted.sort_by(|a, b| a.total_cmp(b));

        let percentile = |p: f64| -> f64 {
            let n = sorted.len();
            let idx = ((n - 1) as f64 * p).round() as usize;
            sorted[idx.min(n - 1)]
        };

        PerfStageSnapshot {
            count: self.count,
            mean_ms: self.sum_ms / self.count as f64,
            p50_ms: percentile(0.50),
            p95_ms: percentile(0.95),
            p99_ms: percentile(0.99),
            max_ms: self.max_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_window_is_zeroed() {
        assert_eq!(StageWindow::default().snapshot(), PerfStageSnapshot::default());
    }

    #[test]
    fn percentiles_over_window() {
        let mut window = StageWindow::default();
        for v in 1..=100 {
            window.record(v as f64);
        }
        window.record(f64::NAN);
        let snap = window.snapshot();
        assert_eq!(snap.count, 101);
        assert_eq!(snap.max_ms, 100.0);
        assert_eq!(snap.p50_ms, 50.0);
        assert_eq!(snap.p99_ms, 99.0);
    }

    #[test]
    fn window_evicts_oldest_beyond_cap() {
        let mut window = StageWindow::default();
        for _ in 0..512 {
            window.record(1000.0);
        }
        for _ in 0..512 {
            window.record(1.0);
        }
        let snap = window.snapshot();
        assert_eq!(snap.count, 1024);
        assert_eq!(snap.p99_ms, 1.0);
        assert_eq!(snap.max_ms, 1000.0);
    }
}
