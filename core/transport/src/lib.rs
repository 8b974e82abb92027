//! Authenticated transport for civicsync.
//!
//! Every request goes through the [`Transport`] trait so the cache, queue and
//! sync engine can be exercised against scripted fakes. [`HttpTransport`] is
//! the production implementation: it attaches the session bearer token,
//! applies a fixed timeout, logs each call and classifies failures.

pub mod config;
pub mod http;
pub mod token;
pub mod transport;

pub use config::TransportConfig;
pub use http::HttpTransport;
pub use token::{StaticTokenProvider, StoreTokenProvider, TokenProvider};
pub use transport::{Method, Transport, TransportExt, UploadPart};
