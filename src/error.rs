//! Error types for the Argus monitoring fleet.
//!
//! This module provides a unified error type [`ArgusError`] for all Argus
//! operations, along with a convenient [`Result`] type alias.
//!
//! # Error Categories
//!
//! - **Store**: coordination-store transport and precondition errors
//! - **Cluster**: election and membership errors
//! - **Configuration**: invalid settings or missing configuration
//! - **Serialization**: record encode/decode failures
//!
//! The engine treats most store errors as non-fatal: they are recorded on the
//! event queue and the owning loop continues. The exceptions are the fatal
//! initialization failures (hostname lookup, member structure setup), which
//! abort process startup.

use std::io;
use thiserror::Error;

/// Main error type for Argus operations.
#[derive(Error, Debug)]
pub enum ArgusError {
    // Coordination store errors
    #[error("Key not found: {0}")]
    KeyNotFound(String),

    #[error("Compare-and-swap precondition failed for key {0}")]
    CasFailed(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Watch canceled")]
    WatchCanceled,

    #[error("Watch error: {0}")]
    Watch(String),

    // Cluster errors
    #[error("Member structure setup failed: {0}")]
    MemberSetup(String),

    #[error("Hostname lookup failed: {0}")]
    Hostname(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration: {field}: {reason}")]
    InvalidConfig { field: String, reason: String },

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    // External errors
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ArgusError {
    /// Check whether this error is the store's "key not found" condition.
    ///
    /// The director monitor normalizes this to the "no active director"
    /// observation instead of treating it as a failure.
    pub fn is_key_not_found(&self) -> bool {
        matches!(self, ArgusError::KeyNotFound(_))
    }

    /// Check if the error is retryable on a later tick.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ArgusError::Store(_) | ArgusError::CasFailed(_) | ArgusError::Watch(_)
        )
    }
}

impl From<serde_json::Error> for ArgusError {
    fn from(e: serde_json::Error) -> Self {
        ArgusError::Serialization(e.to_string())
    }
}

impl From<etcd_client::Error> for ArgusError {
    fn from(e: etcd_client::Error) -> Self {
        ArgusError::Store(e.to_string())
    }
}

/// Result type alias for Argus operations.
pub type Result<T> = std::result::Result<T, ArgusError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_not_found_detection() {
        let err = ArgusError::KeyNotFound("cluster/director".to_string());
        assert!(err.is_key_not_found());
        assert!(!ArgusError::Store("boom".to_string()).is_key_not_found());
    }

    #[test]
    fn test_retryable() {
        assert!(ArgusError::CasFailed("cluster/director".to_string()).is_retryable());
        assert!(!ArgusError::Config("bad".to_string()).is_retryable());
    }
}
