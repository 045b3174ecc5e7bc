//! Overwatch message types.
//!
//! The overwatch collaborator owns process-level shutdown policy: the
//! cluster engine never terminates itself on store trouble, it publishes a
//! typed [`Message`] and carries on. Repeated messages are overwatch's
//! signal to restart or stop the process.

use crate::error::ArgusError;
use std::fmt;

/// Classification of a reported failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorType {
    /// The members watch returned an unexpected error.
    EtcdWatcherError,
    /// A store read/write/refresh failed.
    EtcdGenericError,
    /// The store client could not be (re)established.
    EtcdDialError,
}

impl fmt::Display for ErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorType::EtcdWatcherError => "ETCD_WATCHER_ERROR",
            ErrorType::EtcdGenericError => "ETCD_GENERIC_ERROR",
            ErrorType::EtcdDialError => "ETCD_DIAL_ERROR",
        };
        f.write_str(name)
    }
}

/// A failure report sent to the overwatch channel.
#[derive(Debug)]
pub struct Message {
    /// The underlying failure.
    pub error: ArgusError,
    /// Which component produced the report, e.g. `cluster.runMemberMonitor`.
    pub source: String,
    /// Failure classification.
    pub error_type: ErrorType,
}

impl Message {
    pub fn new(error: ArgusError, source: impl Into<String>, error_type: ErrorType) -> Self {
        Self {
            error,
            source: source.into(),
            error_type,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_type_display() {
        assert_eq!(ErrorType::EtcdWatcherError.to_string(), "ETCD_WATCHER_ERROR");
        assert_eq!(ErrorType::EtcdGenericError.to_string(), "ETCD_GENERIC_ERROR");
    }
}
