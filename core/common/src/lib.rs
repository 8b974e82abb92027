//! Common utilities and types shared across civicsync crates.
//!
//! This crate provides the error taxonomy every layer reports through and the
//! issue/session types exchanged with the backend.

pub mod error;
pub mod types;

pub use error::{Error, ErrorKind, Result};
pub use types::{
    AuthToken, Credentials, GeoLocation, Issue, IssueId, IssueStatus, NewIssue, SensitiveString,
    Session, SignupRequest, TempId, UserProfile,
};
