use std::collections::BTreeMap;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::debug;
use tracing::info;
use tracing::trace;
use tracing::warn;

use super::Change;
use super::ChangeFeed;
use super::Commit;
use super::Connector;
use super::Guard;
use super::Member;
use super::Operation;
use super::Snapshot;
use super::StoreDriver;
use crate::BackendError;
use crate::Record;
use crate::Result;
use crate::Revision;
use crate::REVISION_INVALID;

/// In-process strongly-consistent key-value cluster
///
/// Behaves like the production backing store as far as the engine can tell:
/// one global revision counter, one modification revision per committed
/// transaction shared by every key it touched, ordered keys, and change feeds
/// that carry the previous record. Cloning yields another handle to the same
/// cluster.
#[derive(Clone, Debug)]
pub struct MemCluster {
    inner: Arc<ClusterInner>,
}

#[derive(Debug)]
struct ClusterInner {
    space: RwLock<KeySpace>,
    members: RwLock<Vec<Member>>,
    next_member_id: AtomicU64,

    watchers: DashMap<u64, Watcher>,
    next_watcher_id: AtomicU64,

    reachable: AtomicBool,
    latency_in_ms: AtomicU64,

    /// Drivers handed out and not yet closed
    open_drivers: AtomicUsize,
}

#[derive(Debug)]
struct KeySpace {
    revision: Revision,
    entries: BTreeMap<String, Record>,
}

#[derive(Debug)]
struct Watcher {
    key: String,
    with_prefix: bool,
    sender: mpsc::Sender<Change>,
}

impl Watcher {
    fn matches(
        &self,
        key: &str,
    ) -> bool {
        if self.with_prefix {
            key.starts_with(&self.key)
        } else {
            key == self.key
        }
    }
}

impl MemCluster {
    /// Create a cluster with one member per client endpoint
    pub fn new(endpoints: Vec<String>) -> Self {
        let cluster = Self {
            inner: Arc::new(ClusterInner {
                space: RwLock::new(KeySpace {
                    revision: 1,
                    entries: BTreeMap::new(),
                }),
                members: RwLock::new(Vec::new()),
                next_member_id: AtomicU64::new(1),
                watchers: DashMap::new(),
                next_watcher_id: AtomicU64::new(1),
                reachable: AtomicBool::new(true),
                latency_in_ms: AtomicU64::new(0),
                open_drivers: AtomicUsize::new(0),
            }),
        };
        for endpoint in endpoints {
            cluster.add_member(endpoint);
        }
        cluster
    }

    pub fn add_member(
        &self,
        endpoint: impl Into<String>,
    ) -> Member {
        let id = self.inner.next_member_id.fetch_add(1, Ordering::Relaxed);
        let member = Member {
            id,
            name: format!("member-{id}"),
            client_urls: vec![endpoint.into()],
        };
        self.inner.members.write().push(member.clone());
        debug!(member_id = id, "Cluster member added");
        member
    }

    pub fn remove_member(
        &self,
        id: u64,
    ) -> Option<Member> {
        let mut members = self.inner.members.write();
        let index = members.iter().position(|m| m.id == id)?;
        debug!(member_id = id, "Cluster member removed");
        Some(members.remove(index))
    }

    pub fn members(&self) -> Vec<Member> {
        self.inner.members.read().clone()
    }

    /// Simulate a partition: connects and calls fail while unreachable
    pub fn set_reachable(
        &self,
        reachable: bool,
    ) {
        self.inner.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Delay every connect and driver call by `latency`
    pub fn set_latency(
        &self,
        latency: Duration,
    ) {
        self.inner.latency_in_ms.store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    /// Current store revision
    pub fn revision(&self) -> Revision {
        self.inner.space.read().revision
    }

    pub fn len(&self) -> usize {
        self.inner.space.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Raw record of a fully-qualified key
    pub fn get(
        &self,
        key: &str,
    ) -> Option<Record> {
        self.inner.space.read().entries.get(key).cloned()
    }

    /// Number of live change-feed subscriptions
    ///
    /// Subscriptions whose feed receiver has been dropped are pruned first.
    pub fn watcher_count(&self) -> usize {
        self.inner.watchers.retain(|_, w| !w.sender.is_closed());
        self.inner.watchers.len()
    }

    /// Number of driver handles connected and not yet closed
    pub fn connection_count(&self) -> usize {
        self.inner.open_drivers.load(Ordering::SeqCst)
    }
}

impl ClusterInner {
    async fn delay(&self) {
        let latency = self.latency_in_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
    }

    fn fetch(
        &self,
        keys: &[String],
    ) -> Snapshot {
        let space = self.space.read();
        let records = keys
            .iter()
            .filter_map(|key| space.entries.get(key).map(|r| (key.clone(), r.clone())))
            .collect();
        Snapshot {
            revision: space.revision,
            records,
        }
    }

    fn commit(
        &self,
        guards: &[Guard],
        ops: &[Operation],
    ) -> Commit {
        let mut space = self.space.write();

        for guard in guards {
            let current = space.entries.get(&guard.key).map(|r| r.revision).unwrap_or(REVISION_INVALID);
            if current != guard.revision {
                trace!(key = %guard.key, expected = guard.revision, current, "Commit guard failed");
                return Commit {
                    succeeded: false,
                    revision: space.revision,
                    records: BTreeMap::new(),
                };
            }
        }

        let changed = ops.iter().any(|op| match op {
            Operation::Get { .. } => false,
            Operation::Put { .. } => true,
            Operation::Delete { key } => space.entries.contains_key(key),
        });
        let revision = if changed { space.revision + 1 } else { space.revision };

        let mut records = BTreeMap::new();
        let mut changes = Vec::new();
        for op in ops {
            match op {
                Operation::Get { key } => {
                    if let Some(record) = space.entries.get(key) {
                        records.insert(key.clone(), record.clone());
                    }
                }
                Operation::Put { key, value } => {
                    let current = Record::new(revision, value.clone());
                    let previous = space.entries.insert(key.clone(), current.clone());
                    changes.push(Change {
                        key: key.clone(),
                        revision,
                        current: Some(current),
                        previous,
                    });
                }
                Operation::Delete { key } => {
                    if let Some(previous) = space.entries.remove(key) {
                        changes.push(Change {
                            key: key.clone(),
                            revision,
                            current: None,
                            previous: Some(previous),
                        });
                    }
                }
            }
        }
        space.revision = revision;
        trace!(keys = ?ops.iter().map(Operation::key).collect::<Vec<_>>(), revision, "Commit applied");

        // Dispatch under the write lock so feeds observe commit order
        self.dispatch(changes);

        Commit {
            succeeded: true,
            revision,
            records,
        }
    }

    fn range(
        &self,
        prefix: &str,
    ) -> Snapshot {
        let space = self.space.read();
        let records = space
            .entries
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, record)| (key.clone(), record.clone()))
            .collect();
        Snapshot {
            revision: space.revision,
            records,
        }
    }

    fn delete_range(
        &self,
        prefix: &str,
    ) -> Revision {
        let mut space = self.space.write();
        let keys: Vec<String> = space
            .entries
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key.clone())
            .collect();
        if keys.is_empty() {
            return space.revision;
        }

        let revision = space.revision + 1;
        let mut changes = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(previous) = space.entries.remove(&key) {
                changes.push(Change {
                    key,
                    revision,
                    current: None,
                    previous: Some(previous),
                });
            }
        }
        space.revision = revision;
        self.dispatch(changes);
        revision
    }

    fn dispatch(
        &self,
        changes: Vec<Change>,
    ) {
        for change in changes {
            self.watchers.retain(|id, watcher| {
                if !watcher.matches(&change.key) {
                    return !watcher.sender.is_closed();
                }
                match watcher.sender.try_send(change.clone()) {
                    Ok(()) => true,
                    Err(TrySendError::Full(_)) => {
                        warn!(watcher_id = *id, key = %watcher.key, revision = change.revision, "Slow watcher dropped");
                        false
                    }
                    Err(TrySendError::Closed(_)) => false,
                }
            });
        }
    }

    fn register_watcher(
        &self,
        key: &str,
        with_prefix: bool,
        capacity: usize,
    ) -> ChangeFeed {
        let id = self.next_watcher_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        self.watchers.insert(
            id,
            Watcher {
                key: key.to_string(),
                with_prefix,
                sender,
            },
        );
        trace!(watcher_id = id, key, with_prefix, capacity, "Change feed registered");
        receiver
    }

    fn member_endpoints(&self) -> Vec<String> {
        self.members
            .read()
            .iter()
            .flat_map(|m| m.client_urls.iter().cloned())
            .collect()
    }
}

#[async_trait]
impl Connector for MemCluster {
    async fn connect(
        &self,
        endpoints: &[String],
    ) -> Result<Arc<dyn StoreDriver>> {
        self.inner.delay().await;

        if !self.inner.reachable.load(Ordering::SeqCst) {
            return Err(BackendError::ConnectFailed {
                endpoints: endpoints.to_vec(),
                reason: "cluster unreachable".to_string(),
            }
            .into());
        }

        let known = self.inner.member_endpoints();
        if !endpoints.iter().any(|e| known.contains(e)) {
            return Err(BackendError::ConnectFailed {
                endpoints: endpoints.to_vec(),
                reason: "no endpoint matches a cluster member".to_string(),
            }
            .into());
        }

        info!(?endpoints, "Connected to in-process cluster");
        self.inner.open_drivers.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MemDriver {
            cluster: self.inner.clone(),
            endpoints: ArcSwap::from_pointee(endpoints.to_vec()),
            closed: AtomicBool::new(false),
        }))
    }
}

/// Driver handle onto a [`MemCluster`]
#[derive(Debug)]
pub struct MemDriver {
    cluster: Arc<ClusterInner>,
    endpoints: ArcSwap<Vec<String>>,
    closed: AtomicBool,
}

impl MemDriver {
    /// Endpoints this handle currently talks to
    pub fn endpoints(&self) -> Vec<String> {
        self.endpoints.load().as_ref().clone()
    }

    async fn ready(&self) -> Result<()> {
        self.cluster.delay().await;
        if self.closed.load(Ordering::SeqCst) {
            return Err(BackendError::Unavailable("driver closed".to_string()).into());
        }
        if !self.cluster.reachable.load(Ordering::SeqCst) {
            return Err(BackendError::Unavailable("cluster unreachable".to_string()).into());
        }
        Ok(())
    }
}

#[async_trait]
impl StoreDriver for MemDriver {
    async fn fetch(
        &self,
        keys: &[String],
    ) -> Result<Snapshot> {
        self.ready().await?;
        Ok(self.cluster.fetch(keys))
    }

    async fn commit(
        &self,
        guards: &[Guard],
        ops: &[Operation],
    ) -> Result<Commit> {
        self.ready().await?;
        Ok(self.cluster.commit(guards, ops))
    }

    async fn range(
        &self,
        prefix: &str,
    ) -> Result<Snapshot> {
        self.ready().await?;
        Ok(self.cluster.range(prefix))
    }

    async fn delete_range(
        &self,
        prefix: &str,
    ) -> Result<Revision> {
        self.ready().await?;
        Ok(self.cluster.delete_range(prefix))
    }

    async fn watch(
        &self,
        key: &str,
        with_prefix: bool,
        capacity: usize,
    ) -> Result<ChangeFeed> {
        self.ready().await?;
        Ok(self.cluster.register_watcher(key, with_prefix, capacity))
    }

    async fn members(&self) -> Result<Vec<Member>> {
        self.ready().await?;
        Ok(self.cluster.members.read().clone())
    }

    async fn sync(&self) -> Result<Vec<String>> {
        self.ready().await?;
        let endpoints = self.cluster.member_endpoints();
        if endpoints.is_empty() {
            return Err(BackendError::Unavailable("cluster has no members".to_string()).into());
        }
        self.endpoints.store(Arc::new(endpoints.clone()));
        Ok(endpoints)
    }

    async fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.cluster.open_drivers.fetch_sub(1, Ordering::SeqCst);
            debug!(endpoints = ?self.endpoints(), "Driver closed");
        }
    }
}
