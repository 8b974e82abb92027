//! Sync scheduling: manual, on-demand and periodic triggers.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, RwLock};
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info};

use civicsync_common::{Error, Result};

use crate::engine::{SyncEngine, SyncReport};

/// When sync passes run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SyncMode {
    /// Manual requests only.
    Manual,
    /// Manual requests plus reconnect and resume notifications.
    OnDemand,
    /// Manual requests plus a fixed interval.
    Periodic {
        #[serde(rename = "interval_secs", with = "duration_secs")]
        interval: Duration,
    },
    /// On-demand and periodic.
    Hybrid {
        #[serde(rename = "interval_secs", with = "duration_secs")]
        interval: Duration,
    },
}

impl Default for SyncMode {
    fn default() -> Self {
        SyncMode::Manual
    }
}

impl SyncMode {
    fn interval(&self) -> Option<Duration> {
        match self {
            SyncMode::Periodic { interval } | SyncMode::Hybrid { interval } => Some(*interval),
            _ => None,
        }
    }

    fn reacts_to_notifications(&self) -> bool {
        matches!(self, SyncMode::OnDemand | SyncMode::Hybrid { .. })
    }
}

/// What caused a sync pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncTrigger {
    /// Explicit user or caller request.
    Manual,
    /// Network connectivity came back.
    Reconnect,
    /// The application returned to the foreground.
    Resume,
    /// Interval tick.
    Periodic,
}

enum SchedulerRequest {
    Sync(SyncTrigger, Option<oneshot::Sender<Result<SyncReport>>>),
    ModeChanged,
    Shutdown,
}

/// Front end for requesting passes from a running scheduler task.
#[derive(Clone)]
pub struct SyncScheduler {
    mode: Arc<RwLock<SyncMode>>,
    request_tx: mpsc::Sender<SchedulerRequest>,
}

impl SyncScheduler {
    /// Create a scheduler and the handle that runs its background task.
    pub fn new(mode: SyncMode) -> (Self, SyncSchedulerHandle) {
        let (request_tx, request_rx) = mpsc::channel(100);
        let mode = Arc::new(RwLock::new(mode));

        let scheduler = Self {
            mode: mode.clone(),
            request_tx,
        };
        let handle = SyncSchedulerHandle { mode, request_rx };

        (scheduler, handle)
    }

    /// Request a pass and wait for its report.
    pub async fn request_sync(&self) -> Result<SyncReport> {
        let (response_tx, response_rx) = oneshot::channel();

        self.request_tx
            .send(SchedulerRequest::Sync(SyncTrigger::Manual, Some(response_tx)))
            .await
            .map_err(|_| Error::Config("Sync scheduler is not running".to_string()))?;

        response_rx
            .await
            .map_err(|_| Error::Config("Sync scheduler stopped before reporting".to_string()))?
    }

    /// Notify the scheduler of a reconnect or resume.
    ///
    /// Ignored unless the mode is on-demand or hybrid. Does not wait for the
    /// pass to finish.
    pub async fn notify(&self, trigger: SyncTrigger) {
        let mode = self.mode.read().await.clone();
        if !mode.reacts_to_notifications() {
            debug!(?trigger, ?mode, "sync notification ignored");
            return;
        }
        let _ = self
            .request_tx
            .send(SchedulerRequest::Sync(trigger, None))
            .await;
    }

    /// Change the sync mode.
    ///
    /// A running task re-arms its interval immediately.
    pub async fn set_mode(&self, mode: SyncMode) {
        *self.mode.write().await = mode;
        let _ = self.request_tx.send(SchedulerRequest::ModeChanged).await;
    }

    /// Get current sync mode.
    pub async fn get_mode(&self) -> SyncMode {
        self.mode.read().await.clone()
    }

    /// Stop the background task.
    pub async fn shutdown(&self) {
        let _ = self.request_tx.send(SchedulerRequest::Shutdown).await;
    }
}

/// Background half of the scheduler.
pub struct SyncSchedulerHandle {
    mode: Arc<RwLock<SyncMode>>,
    request_rx: mpsc::Receiver<SchedulerRequest>,
}

impl SyncSchedulerHandle {
    /// Run passes on the given engine until shut down.
    pub async fn run_engine(self, engine: Arc<SyncEngine>) {
        self.run(move |_trigger| {
            let engine = engine.clone();
            async move { engine.run_sync_pass().await }
        })
        .await
    }

    /// Run the scheduler loop.
    ///
    /// Spawn this in a tokio task. `sync_fn` is called for every accepted
    /// trigger.
    pub async fn run<F, Fut>(mut self, sync_fn: F)
    where
        F: Fn(SyncTrigger) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<SyncReport>> + Send,
    {
        let mut current_interval = self.mode.read().await.interval();
        let mut ticker = current_interval.map(periodic_ticker);

        info!("Sync scheduler started");

        loop {
            tokio::select! {
                request = self.request_rx.recv() => {
                    match request {
                        Some(SchedulerRequest::Sync(trigger, response_tx)) => {
                            debug!(?trigger, "processing sync request");
                            let result = sync_fn(trigger).await;
                            log_result(trigger, &result);
                            if let Some(tx) = response_tx {
                                let _ = tx.send(result);
                            }
                        }
                        Some(SchedulerRequest::ModeChanged) => {
                            debug!("sync mode changed");
                        }
                        Some(SchedulerRequest::Shutdown) | None => {
                            info!("Sync scheduler shutting down");
                            break;
                        }
                    }
                }

                _ = wait_for_tick(&mut ticker) => {
                    let result = sync_fn(SyncTrigger::Periodic).await;
                    log_result(SyncTrigger::Periodic, &result);
                }
            }

            let expected = self.mode.read().await.interval();
            if expected != current_interval {
                current_interval = expected;
                ticker = current_interval.map(periodic_ticker);
            }
        }
    }
}

fn periodic_ticker(period: Duration) -> Interval {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker
}

async fn wait_for_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

fn log_result(trigger: SyncTrigger, result: &Result<SyncReport>) {
    match result {
        Ok(report) if report.skipped => {
            debug!(?trigger, "sync pass skipped, another pass is running");
        }
        Ok(report) => {
            info!(
                ?trigger,
                succeeded = report.succeeded,
                failed = report.failed.len(),
                "sync pass completed"
            );
        }
        Err(e) => error!(?trigger, "sync pass failed: {}", e),
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
