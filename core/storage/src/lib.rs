//! Durable key-value storage for civicsync.
//!
//! This crate provides the store every other layer keeps its state in: the
//! session token, cache snapshots and the offline mutation queue.
//!
//! # Design Principles
//! - Backend isolation: callers only see the `KeyValueStore` trait
//! - Async operations: all I/O is async
//! - Single-key atomicity: `update` is a read-modify-write without interleaving
//! - Multi-key atomicity: `set_many` and `multi_remove` are all-or-nothing

pub mod keys;
pub mod local;
pub mod memory;
pub mod registry;
pub mod sqlite;
pub mod store;

pub use local::FileStore;
pub use memory::MemoryStore;
pub use registry::{create_default_registry, StoreFactory, StoreRegistry};
pub use sqlite::SqliteStore;
pub use store::{KeyValueStore, KeyValueStoreExt, UpdateFn};
