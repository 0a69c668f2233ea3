//! Conditional multi-key transactions
//!
//! A [`Request`] names a set of keys, a [`Record`] per key (only the value
//! matters for writes) and a [`Condition`] per key. The engine
//! ([`crate::Store::read_txn`], [`crate::Store::write_txn`],
//! [`crate::Store::delete_txn`]) checks every condition against the key's
//! current revision and then applies the operation atomically, or not at
//! all.
//!
//! Keys are evaluated in ascending key order; the first failing key decides
//! the returned error.

mod condition;
mod engine;

pub use condition::*;


use std::collections::BTreeMap;
use std::fmt;

use serde::Deserialize;
use serde::Serialize;

use crate::RequestError;
use crate::Result;

/// Store-assigned modification revision
pub type Revision = i64;

/// Revision of a key that does not exist
pub const REVISION_INVALID: Revision = 0;

/// A value together with the revision it was written at
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub revision: Revision,
    pub value: String,
}

impl Record {
    pub fn new(
        revision: Revision,
        value: impl Into<String>,
    ) -> Self {
        Self {
            revision,
            value: value.into(),
        }
    }

    /// Record carrying only a value, as used in write requests
    pub fn value(value: impl Into<String>) -> Self {
        Self::new(REVISION_INVALID, value)
    }

    pub fn exists(&self) -> bool {
        self.revision != REVISION_INVALID
    }
}

/// The three transactional operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TxnKind {
    Read,
    Write,
    Delete,
}

impl fmt::Display for TxnKind {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            TxnKind::Read => write!(f, "read"),
            TxnKind::Write => write!(f, "write"),
            TxnKind::Delete => write!(f, "delete"),
        }
    }
}

/// Transaction request
///
/// `records` and `conditions` must cover the same key set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Request {
    /// Diagnostic only; logged with the request
    pub reason: String,
    pub records: BTreeMap<String, Record>,
    pub conditions: BTreeMap<String, Condition>,
}

impl Request {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            ..Default::default()
        }
    }

    /// Add a key to write, guarded by `condition`
    pub fn write(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
        condition: Condition,
    ) -> Self {
        let key = key.into();
        self.records.insert(key.clone(), Record::value(value));
        self.conditions.insert(key, condition);
        self
    }

    /// Add a key to read or delete, guarded by `condition`
    pub fn key(
        mut self,
        key: impl Into<String>,
        condition: Condition,
    ) -> Self {
        let key = key.into();
        self.records.insert(key.clone(), Record::default());
        self.conditions.insert(key, condition);
        self
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Check the request shape and every condition's applicability to `kind`.
    ///
    /// Returns the keys with their conditions in evaluation order.
    pub(crate) fn checks(
        &self,
        kind: TxnKind,
    ) -> Result<Vec<(&str, Condition)>> {
        if self.records.len() != self.conditions.len() {
            return Err(RequestError::BadRecordCount {
                expected: self.records.len(),
                actual: self.conditions.len(),
            }
            .into());
        }

        let mut checks = Vec::with_capacity(self.records.len());
        for key in self.records.keys() {
            let condition = self.conditions.get(key).copied().ok_or_else(|| RequestError::BadArgCondition {
                key: key.clone(),
                condition: None,
                operation: kind,
            })?;
            condition.validate(key, kind)?;
            checks.push((key.as_str(), condition));
        }
        Ok(checks)
    }
}

/// Transaction response
///
/// `revision` is the store revision the transaction committed (or read) at;
/// every key written by the transaction carries that revision. `records` is
/// only populated by reads and prefix listings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Response {
    pub revision: Revision,
    pub records: BTreeMap<String, Record>,
}

impl Response {
    pub fn new(revision: Revision) -> Self {
        Self {
            revision,
            records: BTreeMap::new(),
        }
    }
}
