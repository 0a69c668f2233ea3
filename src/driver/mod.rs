//! Backing store capability interface
//!
//! The transaction engine only needs a handful of primitives from the
//! strongly-consistent store underneath it:
//! - an atomic multi-key read at a single revision ([`StoreDriver::fetch`])
//! - a guarded commit that applies reads/writes/deletes iff every guarded key
//!   still carries the revision observed earlier ([`StoreDriver::commit`])
//! - prefix range scans and range deletes
//! - a raw change feed carrying the previous record of every change
//!
//! Keys at this level are fully-qualified; namespacing happens in the
//! [`crate::Store`].

mod mem;
pub use mem::*;


use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use serde::Deserialize;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::Record;
use crate::Result;
use crate::Revision;

/// Raw change feed of one subscription, in commit order
///
/// Bounded: a subscriber that falls a full buffer behind is dropped by the
/// backing store and its feed ends.
pub type ChangeFeed = mpsc::Receiver<Change>;

/// Consistent view of a set of keys at one store revision
///
/// Absent keys are omitted from `records`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub revision: Revision,
    pub records: BTreeMap<String, Record>,
}

/// Commit precondition: `key` must currently carry `revision` (0 = absent)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Guard {
    pub key: String,
    pub revision: Revision,
}

/// One operation applied inside a guarded commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Get { key: String },
    Put { key: String, value: String },
    Delete { key: String },
}

impl Operation {
    pub fn key(&self) -> &str {
        match self {
            Operation::Get { key } | Operation::Put { key, .. } | Operation::Delete { key } => key,
        }
    }
}

/// Outcome of a guarded commit
///
/// When `succeeded` is false nothing was applied and `revision` is the
/// store revision the guards were checked against.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Commit {
    pub succeeded: bool,
    pub revision: Revision,
    /// Results of `Get` operations, absent keys omitted
    pub records: BTreeMap<String, Record>,
}

/// Raw change record as delivered by the backing store feed
///
/// `current` is `None` for deletions, `previous` is `None` when the key did
/// not exist before the change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    pub key: String,
    pub revision: Revision,
    pub current: Option<Record>,
    pub previous: Option<Record>,
}

/// Backing store cluster member
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub id: u64,
    pub name: String,
    pub client_urls: Vec<String>,
}

/// Live handle to the backing store
#[cfg_attr(test, automock)]
#[async_trait]
pub trait StoreDriver: Send + Sync + 'static {
    /// Read `keys` atomically at the current revision
    async fn fetch(
        &self,
        keys: &[String],
    ) -> Result<Snapshot>;

    /// Apply `ops` atomically iff every guard still holds
    async fn commit(
        &self,
        guards: &[Guard],
        ops: &[Operation],
    ) -> Result<Commit>;

    /// All keys starting with `prefix`, in key order
    async fn range(
        &self,
        prefix: &str,
    ) -> Result<Snapshot>;

    /// Delete all keys starting with `prefix`, returning the resulting revision
    async fn delete_range(
        &self,
        prefix: &str,
    ) -> Result<Revision>;

    /// Subscribe to changes of `key`, or of every key under it when `with_prefix`.
    ///
    /// At most `capacity` undelivered changes are held for the subscriber.
    async fn watch(
        &self,
        key: &str,
        with_prefix: bool,
        capacity: usize,
    ) -> Result<ChangeFeed>;

    async fn members(&self) -> Result<Vec<Member>>;

    /// Refresh the endpoint list from current membership
    async fn sync(&self) -> Result<Vec<String>>;

    /// Release the handle; later calls fail
    async fn close(&self);
}

/// Opens [`StoreDriver`] handles to a set of endpoints
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(
        &self,
        endpoints: &[String],
    ) -> Result<Arc<dyn StoreDriver>>;
}
