//! Replays queued offline writes against the backend.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use civicsync_common::{ErrorKind, Result};
use civicsync_transport::Transport;

use crate::queue::{OfflineQueue, QueuedMutation};
use crate::retry::{RetryConfig, RetryExecutor};
use crate::scheduler::SyncMode;
use crate::state::{SyncState, SyncStatus};

/// Configuration for the sync engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Extra replay attempts per entry when the backend is unreachable.
    pub max_retries: u32,
    /// Delay before the first retry, doubled for each further retry.
    pub retry_initial_delay_ms: u64,
    /// When passes are triggered.
    pub mode: SyncMode,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_retries: 0,
            retry_initial_delay_ms: 500,
            mode: SyncMode::Manual,
        }
    }
}

impl SyncConfig {
    fn retry_config(&self) -> RetryConfig {
        RetryConfig::new(self.max_retries)
            .with_initial_delay(Duration::from_millis(self.retry_initial_delay_ms))
    }
}

/// A queued write that could not be delivered in this pass.
#[derive(Debug, Clone)]
pub struct FailedEntry {
    /// The entry, still in the queue.
    pub entry: QueuedMutation,
    /// Why replay failed.
    pub reason: String,
    /// Classification of the failure.
    pub kind: ErrorKind,
}

/// Outcome of one sync pass.
#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    /// Entries delivered and removed from the queue.
    pub succeeded: usize,
    /// Entries left in the queue, in replay order.
    pub failed: Vec<FailedEntry>,
    /// Wall time of the pass.
    pub duration: Duration,
    /// True if another pass was already running and nothing was done.
    pub skipped: bool,
}

impl SyncReport {
    fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }
}

/// Drains the offline queue through the transport.
///
/// At most one pass runs at a time per engine; overlapping calls from the
/// scheduler and from callers return an empty report.
pub struct SyncEngine {
    queue: OfflineQueue,
    transport: Arc<dyn Transport>,
    state: Arc<SyncState>,
    retry: RetryExecutor,
    config: SyncConfig,
}

impl SyncEngine {
    /// Create a new sync engine.
    pub fn new(queue: OfflineQueue, transport: Arc<dyn Transport>, config: SyncConfig) -> Self {
        Self {
            queue,
            transport,
            state: Arc::new(SyncState::new()),
            retry: RetryExecutor::new(config.retry_config()),
            config,
        }
    }

    /// The queue this engine drains.
    pub fn queue(&self) -> &OfflineQueue {
        &self.queue
    }

    /// Get a reference to the sync state.
    pub fn state(&self) -> Arc<SyncState> {
        self.state.clone()
    }

    /// Engine configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Current phase, statistics and pending count.
    pub async fn status(&self) -> Result<SyncStatus> {
        Ok(SyncStatus {
            phase: self.state.phase(),
            pending: self.queue.len().await?,
            stats: self.state.stats(),
        })
    }

    /// Replay every pending entry once, oldest first.
    ///
    /// # Postconditions
    /// - Delivered entries are removed, one at a time
    /// - Failed entries stay in the queue untouched
    /// - The state is `Idle` again, whatever the outcome
    ///
    /// # Errors
    /// - Storage failure while reading or removing entries; the pass stops
    pub async fn run_sync_pass(&self) -> Result<SyncReport> {
        let Some(_guard) = self.state.try_begin() else {
            debug!("Sync pass already running, skipping");
            return Ok(SyncReport::skipped());
        };

        let started = Instant::now();
        let result = self.replay_pending(started).await;

        match &result {
            Ok(report) => {
                self.state.record_pass(report.succeeded, report.failed.len());
                if report.succeeded > 0 || !report.failed.is_empty() {
                    info!(
                        succeeded = report.succeeded,
                        failed = report.failed.len(),
                        elapsed_ms = report.duration.as_millis() as u64,
                        "Sync pass finished"
                    );
                }
            }
            Err(e) => {
                self.state.record_error(e);
                error!("Sync pass aborted: {}", e);
            }
        }

        result
    }

    async fn replay_pending(&self, started: Instant) -> Result<SyncReport> {
        let entries = self.queue.drain().await?;
        if entries.is_empty() {
            debug!("Offline queue empty, nothing to sync");
            return Ok(SyncReport {
                duration: started.elapsed(),
                ..SyncReport::default()
            });
        }

        info!("Replaying {} queued writes", entries.len());
        let mut report = SyncReport::default();

        for entry in entries {
            match self.replay(&entry).await {
                Ok(_) => {
                    self.queue.remove_exactly(&entry.id).await?;
                    report.succeeded += 1;
                }
                // The token could not be read; the store is broken for every entry.
                Err(e) if e.is_storage() => return Err(e),
                Err(e) => {
                    warn!(
                        id = %entry.id,
                        method = %entry.method,
                        path = %entry.path,
                        "Replay failed, keeping entry: {}",
                        e
                    );
                    report.failed.push(FailedEntry {
                        reason: e.to_string(),
                        kind: e.kind(),
                        entry,
                    });
                }
            }
        }

        report.duration = started.elapsed();
        Ok(report)
    }

    async fn replay(&self, entry: &QueuedMutation) -> Result<Value> {
        self.retry
            .execute(&entry.path, || {
                self.transport
                    .send(entry.method, &entry.path, entry.payload.clone())
            })
            .await
    }
}
