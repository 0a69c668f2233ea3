//! Logical record operations
//!
//! The façade addresses records by a [`KeyRoot`] and a logical name, picks
//! the transaction condition implied by each operation, and reports errors
//! in terms of the logical name rather than the store key.
//!
//! | Operation | Condition |
//! |---|---|
//! | `create` | `Create` |
//! | `read` | `Unconditional` (absence tolerated) |
//! | `read_required` | `Required` |
//! | `update(rev)` / `delete(rev)` | `RevisionEqual(rev)`, or `Unconditional` for [`REVISION_INVALID`] |

mod codec;
pub use codec::*;


use std::collections::BTreeMap;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::Condition;
use crate::Error;
use crate::Record;
use crate::Request;
use crate::RequestError;
use crate::Response;
use crate::Result;
use crate::Revision;
use crate::Store;
use crate::Watch;
use crate::REVISION_INVALID;

/// Top-level partition of the key space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyRoot {
    StoreTest,
    Users,
    Inventory,
    Workloads,
}

impl KeyRoot {
    pub fn prefix(self) -> &'static str {
        match self {
            KeyRoot::StoreTest => "storetest/",
            KeyRoot::Users => "users/",
            KeyRoot::Inventory => "inventory/",
            KeyRoot::Workloads => "workloads/",
        }
    }

    /// Store key of a logical name
    pub fn key(
        self,
        name: &str,
    ) -> String {
        format!("{}{}", self.prefix(), name)
    }

    /// Logical name of a store key under this root
    pub fn name<'a>(
        self,
        key: &'a str,
    ) -> Option<&'a str> {
        key.strip_prefix(self.prefix())
    }
}

impl fmt::Display for KeyRoot {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(self.prefix().trim_end_matches('/'))
    }
}

/// Condition for an update or delete at `revision`
fn revision_condition(revision: Revision) -> Condition {
    if revision != REVISION_INVALID {
        Condition::RevisionEqual(revision)
    } else {
        Condition::Unconditional
    }
}

/// Rewrite a store-key error to carry the logical name
fn logical(
    root: KeyRoot,
    e: Error,
) -> Error {
    e.map_key(|key| root.name(key).unwrap_or(key).to_string())
}

/// The single record a one-key read returned, if any
fn single_record(
    root: KeyRoot,
    name: &str,
    response: Response,
) -> Result<Option<Record>> {
    if response.records.len() > 1 {
        return Err(RequestError::BadRecordCount {
            expected: 1,
            actual: response.records.len(),
        }
        .into());
    }

    let expected = root.key(name);
    match response.records.into_iter().next() {
        None => Ok(None),
        Some((key, record)) if key == expected => Ok(Some(record)),
        Some((key, _)) => Err(RequestError::BadRecordKey {
            expected: name.to_string(),
            actual: root.name(&key).unwrap_or(&key).to_string(),
        }
        .into()),
    }
}

impl Store {
    /// Create `name` with `value`; fails with `AlreadyExists` if present
    pub async fn create(
        &self,
        root: KeyRoot,
        name: &str,
        value: impl Into<String>,
    ) -> Result<Revision> {
        let request = Request::new(format!("create {root}/{name}")).write(root.key(name), value, Condition::Create);
        self.write_txn(&request)
            .await
            .map(|r| r.revision)
            .map_err(|e| logical(root, e))
    }

    pub async fn create_with_encode<T, C>(
        &self,
        root: KeyRoot,
        name: &str,
        value: &T,
        codec: &C,
    ) -> Result<Revision>
    where
        T: Serialize,
        C: ValueCodec,
    {
        let value = codec.encode(value)?;
        self.create(root, name, value).await
    }

    /// Create several names in one all-or-nothing transaction
    pub async fn create_multiple<N, V>(
        &self,
        root: KeyRoot,
        items: impl IntoIterator<Item = (N, V)>,
    ) -> Result<Revision>
    where
        N: AsRef<str>,
        V: Into<String>,
    {
        let mut request = Request::new(format!("create multiple under {root}"));
        for (name, value) in items {
            request = request.write(root.key(name.as_ref()), value, Condition::Create);
        }
        self.write_txn(&request)
            .await
            .map(|r| r.revision)
            .map_err(|e| logical(root, e))
    }

    /// Current record of `name`, `None` if absent
    pub async fn read(
        &self,
        root: KeyRoot,
        name: &str,
    ) -> Result<Option<Record>> {
        let request = Request::new(format!("read {root}/{name}")).key(root.key(name), Condition::Unconditional);
        let response = self.read_txn(&request).await.map_err(|e| logical(root, e))?;
        single_record(root, name, response)
    }

    /// Current record of `name`; fails with `NotFound` if absent
    pub async fn read_required(
        &self,
        root: KeyRoot,
        name: &str,
    ) -> Result<Record> {
        let request = Request::new(format!("read {root}/{name}")).key(root.key(name), Condition::Required);
        let response = self.read_txn(&request).await.map_err(|e| logical(root, e))?;
        single_record(root, name, response)?.ok_or_else(|| {
            RequestError::BadRecordCount {
                expected: 1,
                actual: 0,
            }
            .into()
        })
    }

    pub async fn read_with_decode<T, C>(
        &self,
        root: KeyRoot,
        name: &str,
        codec: &C,
    ) -> Result<Option<(T, Revision)>>
    where
        T: DeserializeOwned,
        C: ValueCodec,
    {
        match self.read(root, name).await? {
            Some(record) => Ok(Some((codec.decode(&record.value)?, record.revision))),
            None => Ok(None),
        }
    }

    /// Replace the value of `name`, optionally only if it is still at `revision`
    pub async fn update(
        &self,
        root: KeyRoot,
        name: &str,
        revision: Revision,
        value: impl Into<String>,
    ) -> Result<Revision> {
        let request = Request::new(format!("update {root}/{name}")).write(
            root.key(name),
            value,
            revision_condition(revision),
        );
        self.write_txn(&request)
            .await
            .map(|r| r.revision)
            .map_err(|e| logical(root, e))
    }

    pub async fn update_with_encode<T, C>(
        &self,
        root: KeyRoot,
        name: &str,
        revision: Revision,
        value: &T,
        codec: &C,
    ) -> Result<Revision>
    where
        T: Serialize,
        C: ValueCodec,
    {
        let value = codec.encode(value)?;
        self.update(root, name, revision, value).await
    }

    /// Delete `name`, optionally only if it is still at `revision`
    pub async fn delete(
        &self,
        root: KeyRoot,
        name: &str,
        revision: Revision,
    ) -> Result<Revision> {
        let request = Request::new(format!("delete {root}/{name}")).key(root.key(name), revision_condition(revision));
        self.delete_txn(&request)
            .await
            .map(|r| r.revision)
            .map_err(|e| logical(root, e))
    }

    /// Delete several names in one all-or-nothing transaction
    pub async fn delete_multiple<N>(
        &self,
        root: KeyRoot,
        items: impl IntoIterator<Item = (N, Revision)>,
    ) -> Result<Revision>
    where
        N: AsRef<str>,
    {
        let mut request = Request::new(format!("delete multiple under {root}"));
        for (name, revision) in items {
            request = request.key(root.key(name.as_ref()), revision_condition(revision));
        }
        self.delete_txn(&request)
            .await
            .map(|r| r.revision)
            .map_err(|e| logical(root, e))
    }

    /// Every record whose name starts with `prefix`, keyed by logical name
    pub async fn list(
        &self,
        root: KeyRoot,
        prefix: &str,
    ) -> Result<(BTreeMap<String, Record>, Revision)> {
        let response = self
            .list_with_prefix(&root.key(prefix))
            .await
            .map_err(|e| logical(root, e))?;

        let mut records = BTreeMap::new();
        for (key, record) in response.records {
            let name = root.name(&key).ok_or_else(|| RequestError::BadRecordKey {
                expected: root.key(prefix),
                actual: key.clone(),
            })?;
            records.insert(name.to_string(), record);
        }
        Ok((records, response.revision))
    }

    pub async fn list_with_decode<T, C>(
        &self,
        root: KeyRoot,
        prefix: &str,
        codec: &C,
    ) -> Result<(BTreeMap<String, (T, Revision)>, Revision)>
    where
        T: DeserializeOwned,
        C: ValueCodec,
    {
        let (records, revision) = self.list(root, prefix).await?;
        let decoded = records
            .into_iter()
            .map(|(name, record)| -> Result<(String, (T, Revision))> {
                Ok((name, (codec.decode(&record.value)?, record.revision)))
            })
            .collect::<Result<BTreeMap<_, _>>>()?;
        Ok((decoded, revision))
    }

    /// Subscribe to changes of `name`; event keys are logical names
    pub async fn watch(
        &self,
        root: KeyRoot,
        name: &str,
    ) -> Result<Watch> {
        self.open_watch(&root.key(name), false, root.prefix()).await
    }

    /// Subscribe to changes of every name starting with `prefix`
    pub async fn watch_with_prefix(
        &self,
        root: KeyRoot,
        prefix: &str,
    ) -> Result<Watch> {
        self.open_watch(&root.key(prefix), true, root.prefix()).await
    }
}
