//! Shared health state for the /health endpoint.
//! Updated by the backfill scheduler after every run.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};

use serde::Serialize;

/// Last-run bookkeeping for the backfill job. Written by the job, read by the API.
#[derive(Default)]
pub struct HealthState {
    pub run_in_progress: AtomicBool,
    /// Unix ms when the last run finished (0 = never).
    pub last_run_finished_ms: AtomicI64,
    pub last_run_recorded: AtomicU64,
    pub last_run_errors: AtomicU64,
    pub runs_completed: AtomicU64,
    /// Runs that aborted before finishing (e.g. storage unavailable).
    pub runs_failed: AtomicU64,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct HealthSnapshot {
    pub run_in_progress: bool,
    pub last_run_finished_ms: Option<i64>,
    pub last_run_recorded: u64,
    pub last_run_errors: u64,
    pub runs_completed: u64,
    pub runs_failed: u64,
}

impl HealthState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn run_started(&self) {
        self.run_in_progress.store(true, Ordering::Relaxed);
    }

    pub fn run_finished(&self, finished_ms: i64, recorded: u64, errors: u64) {
        self.last_run_finished_ms.store(finished_ms, Ordering::Relaxed);
        self.last_run_recorded.store(recorded, Ordering::Relaxed);
        self.last_run_errors.store(errors, Ordering::Relaxed);
        self.runs_completed.fetch_add(1, Ordering::Relaxed);
        self.run_in_progress.store(false, Ordering::Relaxed);
    }

    pub fn run_failed(&self) {
        self.runs_failed.fetch_add(1, Ordering::Relaxed);
        self.run_in_progress.store(false, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> HealthSnapshot {
        let finished = self.last_run_finished_ms.load(Ordering::Relaxed);
        HealthSnapshot {
            run_in_progress: self.run_in_progress.load(Ordering::Relaxed),
            last_run_finished_ms: (finished > 0).then_some(finished),
            last_run_recorded: self.last_run_recorded.load(Ordering::Relaxed),
            last_run_errors: self.last_run_errors.load(Ordering::Relaxed),
            runs_completed: self.runs_completed.load(Ordering::Relaxed),
            runs_failed: self.runs_failed.load(Ordering::Relaxed),
        }
    }
}
