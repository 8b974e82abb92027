//! civicsync client
//!
//! Resilient data access for the civic-issue reporting app:
//! - Reads go through a [`ReadThroughCache`] that falls back to the last
//!   snapshot, then to seed data, and never returns an empty fallback
//! - Writes that cannot reach the backend are queued and replayed later
//! - Sessions are persisted atomically and attached to every request

pub mod cache;
pub mod client;
pub mod config;
pub mod issues;
pub mod logging;
pub mod seed;
pub mod session;

pub use cache::{Collection, CollectionSource, ReadThroughCache, Resource};
pub use client::{CivicClient, CivicClientBuilder};
pub use config::{ClientConfig, StorageConfig};
pub use issues::{ImageRef, IssuesApi};
pub use session::SessionManager;

pub use civicsync_common::{
    Credentials, Error, ErrorKind, GeoLocation, Issue, IssueId, IssueStatus, NewIssue, Result,
    Session, SignupRequest, UserProfile,
};
pub use civicsync_sync::{SyncConfig, SyncMode, SyncReport, SyncScheduler, SyncStatus, SyncTrigger};
