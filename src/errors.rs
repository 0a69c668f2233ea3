//! Store Error Hierarchy
//!
//! Errors are grouped by the layer that detects them. Every type here is
//! `Clone + PartialEq` so callers can assert on exact error values, and every
//! key-bearing variant exposes the offending key through [`Error::key`].

use std::time::Duration;

use config::ConfigError;

use crate::txn::Comparison;
use crate::txn::Condition;
use crate::txn::TxnKind;
use crate::Revision;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Connect/disconnect state machine misuse
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    /// A per-key condition did not hold; the transaction had no effect
    #[error(transparent)]
    Condition(#[from] ConditionError),

    /// Malformed request or response shape
    #[error(transparent)]
    Request(#[from] RequestError),

    /// Whole-transaction commit failure not attributable to a condition
    #[error(transparent)]
    Commit(#[from] CommitError),

    /// Backing store unreachable, slow or failing
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// Invalid store configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Structured value could not be encoded or decoded
    #[error("Value codec error: {0}")]
    Codec(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LifecycleError {
    #[error("Store is not connected")]
    NotConnected,

    #[error("Store is already connected")]
    AlreadyConnected,

    /// A disconnect arrived while the connect was still in progress
    #[error("Connect aborted by disconnect")]
    ConnectAborted,

    /// Second close of the same watch subscription
    #[error("Watch on {key} is already closed")]
    AlreadyClosed { key: String },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConditionError {
    #[error("Key {key} already exists")]
    AlreadyExists { key: String },

    #[error("Key {key} not found")]
    NotFound { key: String },

    /// Revision comparison failed: `actual <condition> requested` was false
    #[error("Condition failure on key {key}: required revision {condition} {requested}, actual {actual}")]
    ConditionFail {
        key: String,
        requested: Revision,
        condition: Comparison,
        actual: Revision,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequestError {
    /// Condition missing or not applicable to the operation
    #[error("Condition {condition:?} is not valid for a {operation} of key {key}")]
    BadArgCondition {
        key: String,
        condition: Option<Condition>,
        operation: TxnKind,
    },

    /// Revision comparison requested against the invalid revision
    #[error("Condition {condition:?} on key {key} requires a valid revision")]
    BadArgRevision { key: String, condition: Condition },

    #[error("Expected {expected} records, found {actual}")]
    BadRecordCount { expected: usize, actual: usize },

    #[error("Expected record for key {expected}, found {actual}")]
    BadRecordKey { expected: String, actual: String },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommitError {
    #[error("Failed to read key {key}")]
    KeyReadFailure { key: String },

    #[error("Failed to write key {key}")]
    KeyWriteFailure { key: String },

    #[error("Failed to delete key {key}")]
    KeyDeleteFailure { key: String },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    /// The operation did not complete within its timeout
    #[error("{operation} did not complete within {timeout:?}")]
    DeadlineExceeded {
        operation: &'static str,
        timeout: Duration,
    },

    #[error("Failed to connect to {endpoints:?}: {reason}")]
    ConnectFailed { endpoints: Vec<String>, reason: String },

    #[error("Backing store unavailable: {0}")]
    Unavailable(String),
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Error::Config(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Codec(e.to_string())
    }
}

impl Error {
    /// The key this error is about, if any
    pub fn key(&self) -> Option<&str> {
        match self {
            Error::Lifecycle(LifecycleError::AlreadyClosed { key })
            | Error::Condition(ConditionError::AlreadyExists { key })
            | Error::Condition(ConditionError::NotFound { key })
            | Error::Condition(ConditionError::ConditionFail { key, .. })
            | Error::Request(RequestError::BadArgCondition { key, .. })
            | Error::Request(RequestError::BadArgRevision { key, .. })
            | Error::Commit(CommitError::KeyReadFailure { key })
            | Error::Commit(CommitError::KeyWriteFailure { key })
            | Error::Commit(CommitError::KeyDeleteFailure { key }) => Some(key),
            _ => None,
        }
    }

    /// Rewrite the carried key, preserving the error kind.
    ///
    /// Errors without a key are returned unchanged.
    pub fn map_key<F>(
        self,
        f: F,
    ) -> Self
    where
        F: FnOnce(&str) -> String,
    {
        match self {
            Error::Lifecycle(LifecycleError::AlreadyClosed { key }) => {
                LifecycleError::AlreadyClosed { key: f(&key) }.into()
            }
            Error::Condition(ConditionError::AlreadyExists { key }) => {
                ConditionError::AlreadyExists { key: f(&key) }.into()
            }
            Error::Condition(ConditionError::NotFound { key }) => ConditionError::NotFound { key: f(&key) }.into(),
            Error::Condition(ConditionError::ConditionFail {
                key,
                requested,
                condition,
                actual,
            }) => ConditionError::ConditionFail {
                key: f(&key),
                requested,
                condition,
                actual,
            }
            .into(),
            Error::Request(RequestError::BadArgCondition {
                key,
                condition,
                operation,
            }) => RequestError::BadArgCondition {
                key: f(&key),
                condition,
                operation,
            }
            .into(),
            Error::Request(RequestError::BadArgRevision { key, condition }) => {
                RequestError::BadArgRevision { key: f(&key), condition }.into()
            }
            Error::Commit(CommitError::KeyReadFailure { key }) => CommitError::KeyReadFailure { key: f(&key) }.into(),
            Error::Commit(CommitError::KeyWriteFailure { key }) => CommitError::KeyWriteFailure { key: f(&key) }.into(),
            Error::Commit(CommitError::KeyDeleteFailure { key }) => {
                CommitError::KeyDeleteFailure { key: f(&key) }.into()
            }
            other => other,
        }
    }

    /// True for failures a caller may resolve by re-reading and retrying
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Condition(ConditionError::ConditionFail { .. })
                | Error::Commit(_)
                | Error::Backend(BackendError::DeadlineExceeded { .. })
                | Error::Backend(BackendError::Unavailable(_))
        )
    }
}
