//! Offline write queue and sync engine for civicsync.
//!
//! Writes that cannot reach the backend are appended to the
//! [`OfflineQueue`]. The [`SyncEngine`] later replays them in FIFO order,
//! removing each entry only once the backend has accepted it. The
//! [`SyncScheduler`] runs passes on manual request, on reconnect or resume,
//! and on a fixed interval.

pub mod engine;
pub mod queue;
pub mod retry;
pub mod scheduler;
pub mod state;

pub use engine::{FailedEntry, SyncConfig, SyncEngine, SyncReport};
pub use queue::{OfflineQueue, QueuedMutation};
pub use retry::{RetryConfig, RetryExecutor};
pub use scheduler::{SyncMode, SyncScheduler, SyncSchedulerHandle, SyncTrigger};
pub use state::{PassGuard, SyncPhase, SyncState, SyncStats, SyncStatus};
