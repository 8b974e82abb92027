//! Sync pass state and statistics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use civicsync_common::Error;

/// Whether a sync pass is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    Idle,
    Running,
}

/// Outcome counters of past passes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStats {
    /// When the last pass finished.
    pub last_pass_at: Option<DateTime<Utc>>,
    /// Entries delivered by the last pass.
    pub last_succeeded: usize,
    /// Entries left pending by the last pass.
    pub last_failed: usize,
    /// Error that aborted the last pass, if any.
    pub last_error: Option<String>,
    /// Passes run since start, including aborted ones.
    pub total_passes: u64,
}

/// Point-in-time view of the sync engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStatus {
    pub phase: SyncPhase,
    /// Entries currently waiting in the offline queue.
    pub pending: usize,
    pub stats: SyncStats,
}

/// Idle/Running flag plus statistics.
///
/// The flag only moves Idle to Running through a compare-and-swap, and only
/// moves back when the returned [`PassGuard`] is dropped.
#[derive(Debug, Default)]
pub struct SyncState {
    running: AtomicBool,
    stats: Mutex<SyncStats>,
}

impl SyncState {
    /// Create an idle state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current phase.
    pub fn phase(&self) -> SyncPhase {
        if self.running.load(Ordering::Acquire) {
            SyncPhase::Running
        } else {
            SyncPhase::Idle
        }
    }

    /// Enter `Running` unless a pass is already in flight.
    pub fn try_begin(&self) -> Option<PassGuard<'_>> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| PassGuard { state: self })
    }

    /// Record a completed pass.
    pub fn record_pass(&self, succeeded: usize, failed: usize) {
        let mut stats = self.lock_stats();
        stats.last_pass_at = Some(Utc::now());
        stats.last_succeeded = succeeded;
        stats.last_failed = failed;
        stats.last_error = None;
        stats.total_passes += 1;
    }

    /// Record a pass aborted by an error.
    pub fn record_error(&self, error: &Error) {
        let mut stats = self.lock_stats();
        stats.last_pass_at = Some(Utc::now());
        stats.last_error = Some(error.to_string());
        stats.total_passes += 1;
    }

    /// Snapshot of the statistics.
    pub fn stats(&self) -> SyncStats {
        self.lock_stats().clone()
    }

    fn lock_stats(&self) -> MutexGuard<'_, SyncStats> {
        // Stats are plain counters, a poisoned lock still holds usable data.
        self.stats.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Holds the state in `Running`; dropping it returns to `Idle`.
#[must_use = "dropping the guard immediately ends the pass"]
#[derive(Debug)]
pub struct PassGuard<'a> {
    state: &'a SyncState,
}

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.state.running.store(false, Ordering::Release);
    }
}
