//! Change notifications
//!
//! ```text
//! backing store feed (raw Change, with previous record)
//!        ↓
//! delivery task (one per subscription): classify → WatchEvent
//!        ↓
//! Watch.events (bounded mpsc, feed order preserved)
//! ```
//!
//! A subscription lives until [`Watch::close`] is called, the [`Watch`] is
//! dropped, the owning store disconnects, or the feed ends.
//!
//! Both buffers hold `watch_buffer_size` entries. A consumer that stops
//! reading until both are full has its feed dropped by the backing store;
//! it then drains what was buffered and sees the end of the stream.

mod delivery;


use serde::Deserialize;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::trace;

use crate::Change;
use crate::LifecycleError;
use crate::Result;
use crate::Revision;
use crate::Store;
use crate::REVISION_INVALID;

/// Kind of change a [`WatchEvent`] reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WatchEventType {
    /// The key did not exist before
    Create,
    /// The key existed before and still exists
    Update,
    /// The key no longer exists
    Delete,
}

/// Typed change notification
///
/// The old side of a `Create` and the new side of a `Delete` are empty with
/// [`REVISION_INVALID`]; an `Update` carries both sides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchEvent {
    pub event_type: WatchEventType,
    /// Store revision of the change
    pub revision: Revision,
    pub key: String,
    pub old_revision: Revision,
    pub old_value: String,
    pub new_revision: Revision,
    pub new_value: String,
}

impl WatchEvent {
    /// Classify a raw change by which of its sides are present
    pub fn from_change(
        key: String,
        change: Change,
    ) -> Self {
        let event_type = match (&change.previous, &change.current) {
            (_, None) => WatchEventType::Delete,
            (None, Some(_)) => WatchEventType::Create,
            (Some(_), Some(_)) => WatchEventType::Update,
        };

        let (old_revision, old_value) = change
            .previous
            .map(|r| (r.revision, r.value))
            .unwrap_or((REVISION_INVALID, String::new()));
        let (new_revision, new_value) = change
            .current
            .map(|r| (r.revision, r.value))
            .unwrap_or((REVISION_INVALID, String::new()));

        Self {
            event_type,
            revision: change.revision,
            key,
            old_revision,
            old_value,
            new_revision,
            new_value,
        }
    }
}

/// Open subscription, owned exclusively by the subscriber
///
/// Dropping a `Watch` cancels its delivery task; [`Watch::close`]
/// additionally waits for the task to finish.
#[derive(Debug)]
pub struct Watch {
    key: String,
    events: mpsc::Receiver<WatchEvent>,
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl Watch {
    /// The key or prefix this subscription was opened on
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Consumer side of the event channel
    pub fn events(&mut self) -> &mut mpsc::Receiver<WatchEvent> {
        &mut self.events
    }

    /// Next event, or `None` once the subscription has ended
    pub async fn recv(&mut self) -> Option<WatchEvent> {
        self.events.recv().await
    }

    pub fn is_closed(&self) -> bool {
        self.task.is_none()
    }

    /// Cancel the subscription and wait for its delivery task to exit.
    ///
    /// Events already buffered stay readable; the channel then reports the
    /// end of the stream.
    ///
    /// # Errors
    /// [`LifecycleError::AlreadyClosed`] when called a second time.
    pub async fn close(&mut self) -> Result<()> {
        let task = self.task.take().ok_or_else(|| LifecycleError::AlreadyClosed { key: self.key.clone() })?;
        self.token.cancel();
        if let Err(e) = task.await {
            debug!(key = %self.key, error = %e, "Watch delivery task ended abnormally");
        }
        trace!(key = %self.key, "Watch closed");
        Ok(())
    }
}

impl Drop for Watch {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

impl Store {
    /// Subscribe to changes of exactly `key`
    pub async fn set_watch(
        &self,
        key: &str,
    ) -> Result<Watch> {
        self.open_watch(key, false, "").await
    }

    /// Subscribe to changes of every key starting with `prefix`
    pub async fn set_watch_with_prefix(
        &self,
        prefix: &str,
    ) -> Result<Watch> {
        self.open_watch(prefix, true, "").await
    }

    /// Open a subscription whose event keys are reported relative to the
    /// namespace with `strip` additionally removed.
    pub(crate) async fn open_watch(
        &self,
        key: &str,
        with_prefix: bool,
        strip: &str,
    ) -> Result<Watch> {
        let connection = self.connection()?;
        let full_key = connection.namespace.qualify(key);
        let buffer_size = self.watch_buffer_size();
        let feed = self
            .timed("set_watch", connection.driver.watch(&full_key, with_prefix, buffer_size))
            .await?;

        let (sender, events) = mpsc::channel(buffer_size);
        let token = connection.shutdown.child_token();
        let strip = connection.namespace.qualify(strip);

        let task = tokio::spawn(delivery::run(feed, sender, token.clone(), strip));
        debug!(key = full_key.as_str(), with_prefix, "Watch opened");

        Ok(Watch {
            key: key.to_string(),
            events,
            token,
            task: Some(task),
        })
    }
}
