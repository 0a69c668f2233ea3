//! Connection & lifecycle management
//!
//! A [`Store`] is constructed disconnected from an explicit
//! [`StoreConfig`] and a [`Connector`]. [`Store::connect`] opens the backing
//! store handle and fixes the effective [`Namespace`]; [`Store::disconnect`]
//! tears it down again and is a no-op on a disconnected store.
//!
//! # Basic Usage
//! ```no_run
//! use std::sync::Arc;
//! use chamber_store::{Condition, MemCluster, Request, Store, StoreConfig};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> chamber_store::Result<()> {
//!     let cluster = MemCluster::new(vec!["http://127.0.0.1:2379".into()]);
//!     let store = Store::new(StoreConfig::default(), Arc::new(cluster));
//!     store.connect().await?;
//!
//!     let written = store
//!         .write_txn(&Request::new("example").write("k1", "v1", Condition::Create))
//!         .await?;
//!     println!("committed at revision {}", written.revision);
//!
//!     store.disconnect().await
//! }
//! ```

mod namespace;
pub use namespace::*;


use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::scoped_timer::ScopedTimer;
use crate::BackendError;
use crate::Connector;
use crate::Error;
use crate::LifecycleError;
use crate::Member;
use crate::Result;
use crate::StoreConfig;
use crate::StoreDriver;
use crate::TraceFlags;

/// Client-side persistence engine over a strongly-consistent key-value store
///
/// Data operations take `&self`; one connected store can be shared (for
/// example behind an `Arc`) by concurrent callers.
pub struct Store {
    config: RwLock<StoreConfig>,
    state: Mutex<LifecycleState>,
    connector: Arc<dyn Connector>,
}

enum LifecycleState {
    Disconnected,
    /// Cancelled by a disconnect that overtakes the connect
    Connecting(CancellationToken),
    Connected(Arc<Connection>),
}

/// Live backing store handle, exclusively owned by one [`Store`]
pub(crate) struct Connection {
    pub(crate) driver: Arc<dyn StoreDriver>,
    pub(crate) namespace: Namespace,
    endpoints: ArcSwap<Vec<String>>,
    /// Parent of every watch delivery task opened on this connection
    pub(crate) shutdown: CancellationToken,
}

/// Resets an abandoned connect attempt back to disconnected and releases
/// the driver it opened but never installed
struct ConnectingGuard<'a> {
    state: &'a Mutex<LifecycleState>,
    aborted: CancellationToken,
    driver: Option<Arc<dyn StoreDriver>>,
}

impl ConnectingGuard<'_> {
    async fn close_driver(&mut self) {
        if let Some(driver) = self.driver.take() {
            driver.close().await;
        }
    }
}

impl Drop for ConnectingGuard<'_> {
    fn drop(&mut self) {
        {
            let mut state = self.state.lock();
            // a cancelled attempt no longer owns the state
            if !self.aborted.is_cancelled() && matches!(*state, LifecycleState::Connecting(_)) {
                *state = LifecycleState::Disconnected;
            }
        }

        if let Some(driver) = self.driver.take() {
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    debug!("Closing driver of an abandoned connect");
                    handle.spawn(async move { driver.close().await });
                }
                Err(_) => warn!("Abandoned connect outlived its runtime, driver left open"),
            }
        }
    }
}

impl Store {
    pub fn new(
        config: StoreConfig,
        connector: Arc<dyn Connector>,
    ) -> Self {
        Self {
            config: RwLock::new(config),
            state: Mutex::new(LifecycleState::Disconnected),
            connector,
        }
    }

    /// Store with [`StoreConfig::default`] settings
    pub fn with_defaults(connector: Arc<dyn Connector>) -> Self {
        Self::new(StoreConfig::default(), connector)
    }

    //-----------------------------------------------------------
    // Configuration

    pub fn set_address(
        &self,
        endpoints: Vec<String>,
    ) -> Result<()> {
        if endpoints.is_empty() {
            return Err(Error::Config("at least one endpoint required".to_string()));
        }
        self.update_disconnected(|config| config.endpoints = endpoints)
    }

    pub fn address(&self) -> Vec<String> {
        self.config.read().endpoints.clone()
    }

    pub fn set_timeout_connect(
        &self,
        timeout: Duration,
    ) -> Result<()> {
        self.update_disconnected(|config| config.connect_timeout_in_ms = timeout.as_millis() as u64)
    }

    pub fn timeout_connect(&self) -> Duration {
        self.config.read().connect_timeout()
    }

    /// Takes effect for the next operation, connected or not
    pub fn set_timeout_request(
        &self,
        timeout: Duration,
    ) {
        self.config.write().request_timeout_in_ms = timeout.as_millis() as u64;
    }

    pub fn timeout_request(&self) -> Duration {
        self.config.read().request_timeout()
    }

    pub fn set_namespace_suffix(
        &self,
        suffix: impl Into<String>,
    ) -> Result<()> {
        let suffix = suffix.into();
        self.update_disconnected(|config| config.namespace_suffix = suffix)
    }

    pub fn namespace_suffix(&self) -> String {
        self.config.read().namespace_suffix.clone()
    }

    /// Takes effect for the next operation, connected or not
    pub fn set_trace_flags(
        &self,
        flags: TraceFlags,
    ) {
        self.config.write().trace_flags = flags;
    }

    pub fn trace_flags(&self) -> TraceFlags {
        self.config.read().trace_flags
    }

    pub(crate) fn max_txn_attempts(&self) -> usize {
        self.config.read().max_txn_attempts.max(1)
    }

    pub(crate) fn watch_buffer_size(&self) -> usize {
        self.config.read().watch_buffer_size.max(1)
    }

    fn update_disconnected<F>(
        &self,
        f: F,
    ) -> Result<()>
    where
        F: FnOnce(&mut StoreConfig),
    {
        let state = self.state.lock();
        if !matches!(*state, LifecycleState::Disconnected) {
            return Err(LifecycleError::AlreadyConnected.into());
        }
        f(&mut self.config.write());
        Ok(())
    }

    //-----------------------------------------------------------
    // Lifecycle

    pub fn is_connected(&self) -> bool {
        matches!(*self.state.lock(), LifecycleState::Connected(_))
    }

    /// Effective namespace while connected
    pub fn namespace(&self) -> Option<String> {
        match &*self.state.lock() {
            LifecycleState::Connected(connection) => Some(connection.namespace.as_str().to_string()),
            _ => None,
        }
    }

    /// Endpoints of the live connection, as last refreshed
    pub fn connected_endpoints(&self) -> Option<Vec<String>> {
        match &*self.state.lock() {
            LifecycleState::Connected(connection) => Some(connection.endpoints.load().as_ref().clone()),
            _ => None,
        }
    }

    /// Open the backing store handle within the connect timeout
    ///
    /// A [`Store::disconnect`] issued while the connect is in progress aborts
    /// it. Whatever driver the attempt had opened is closed, also when the
    /// connect future itself is dropped.
    ///
    /// # Errors
    /// - [`LifecycleError::AlreadyConnected`] if a handle is bound or a
    ///   connect is in progress
    /// - [`LifecycleError::ConnectAborted`] if a disconnect overtook the connect
    /// - [`BackendError::DeadlineExceeded`] if the connect timeout elapses
    /// - [`BackendError::ConnectFailed`] if no endpoint accepts the connection
    pub async fn connect(&self) -> Result<()> {
        let aborted = CancellationToken::new();
        let config = {
            let mut state = self.state.lock();
            if !matches!(*state, LifecycleState::Disconnected) {
                return Err(LifecycleError::AlreadyConnected.into());
            }
            *state = LifecycleState::Connecting(aborted.clone());
            self.config.read().clone()
        };
        let mut guard = ConnectingGuard {
            state: &self.state,
            aborted: aborted.clone(),
            driver: None,
        };

        let opened = tokio::select! {
            biased;
            _ = aborted.cancelled() => Err(Error::from(LifecycleError::ConnectAborted)),
            opened = self.open(&config, &mut guard.driver) => opened,
        };

        match opened.and_then(|connection| self.install(connection, &aborted)) {
            Ok(()) => {
                guard.driver = None;
                Ok(())
            }
            Err(e) => {
                guard.close_driver().await;
                warn!(error = %e, endpoints = ?config.endpoints, "Store connect failed");
                Err(e)
            }
        }
    }

    /// Bind `connection` unless a disconnect aborted the attempt meanwhile
    fn install(
        &self,
        connection: Connection,
        aborted: &CancellationToken,
    ) -> Result<()> {
        let mut state = self.state.lock();
        if aborted.is_cancelled() {
            return Err(LifecycleError::ConnectAborted.into());
        }
        info!(
            namespace = connection.namespace.as_str(),
            endpoints = ?connection.endpoints.load_full(),
            "Store connected"
        );
        *state = LifecycleState::Connected(Arc::new(connection));
        Ok(())
    }

    /// Connect and clean the test namespace; the opened driver is parked in
    /// `slot` so an abandoned attempt can still close it
    async fn open(
        &self,
        config: &StoreConfig,
        slot: &mut Option<Arc<dyn StoreDriver>>,
    ) -> Result<Connection> {
        let connect_timeout = config.connect_timeout();
        let driver = match tokio::time::timeout(connect_timeout, self.connector.connect(&config.endpoints)).await {
            Ok(driver) => driver?,
            Err(_) => {
                return Err(BackendError::DeadlineExceeded {
                    operation: "connect",
                    timeout: connect_timeout,
                }
                .into())
            }
        };
        *slot = Some(driver.clone());

        let namespace = Namespace::effective(&config.test_namespace, &config.namespace_suffix);

        if config.test_namespace.use_test_namespace && config.test_namespace.clean_on_connect {
            let request_timeout = config.request_timeout();
            let prefix = namespace.qualify("");
            let cleaned = match tokio::time::timeout(request_timeout, driver.delete_range(&prefix)).await {
                Ok(cleaned) => cleaned,
                Err(_) => Err(BackendError::DeadlineExceeded {
                    operation: "clean_namespace",
                    timeout: request_timeout,
                }
                .into()),
            };
            let revision = cleaned?;
            debug!(namespace = namespace.as_str(), revision, "Test namespace cleaned");
        }

        Ok(Connection {
            driver,
            namespace,
            endpoints: ArcSwap::from_pointee(config.endpoints.clone()),
            shutdown: CancellationToken::new(),
        })
    }

    /// Release the backing store handle
    ///
    /// Closes every watch opened through this store. Calling it on a
    /// disconnected store is a no-op, not an error. A connect still in
    /// progress is aborted: the store is disconnected on return and the
    /// pending [`Store::connect`] fails with [`LifecycleError::ConnectAborted`].
    pub async fn disconnect(&self) -> Result<()> {
        let connection = {
            let mut state = self.state.lock();
            match std::mem::replace(&mut *state, LifecycleState::Disconnected) {
                LifecycleState::Connected(connection) => connection,
                LifecycleState::Connecting(aborted) => {
                    aborted.cancel();
                    info!("Connect in progress aborted by disconnect");
                    return Ok(());
                }
                LifecycleState::Disconnected => {
                    debug!("Disconnect on a store that is not connected");
                    return Ok(());
                }
            }
        };

        connection.shutdown.cancel();
        connection.driver.close().await;
        info!(namespace = connection.namespace.as_str(), "Store disconnected");
        Ok(())
    }

    //-----------------------------------------------------------
    // Cluster topology

    /// Members of the backing store cluster
    pub async fn get_cluster_members(&self) -> Result<Vec<Member>> {
        let connection = self.connection()?;
        self.timed("get_cluster_members", connection.driver.members()).await
    }

    /// Re-sync the live connection's endpoints from current membership
    pub async fn update_cluster_connections(&self) -> Result<()> {
        let connection = self.connection()?;
        let endpoints = self
            .timed("update_cluster_connections", connection.driver.sync())
            .await?;
        info!(?endpoints, "Cluster connections updated");
        connection.endpoints.store(Arc::new(endpoints));
        Ok(())
    }

    //-----------------------------------------------------------
    // Shared by the engine, watch and façade layers

    /// Live handle, or [`LifecycleError::NotConnected`]
    pub(crate) fn connection(&self) -> Result<Arc<Connection>> {
        match &*self.state.lock() {
            LifecycleState::Connected(connection) => Ok(connection.clone()),
            _ => Err(LifecycleError::NotConnected.into()),
        }
    }

    /// Run `fut` bounded by the current request timeout
    pub(crate) async fn timed<T, F>(
        &self,
        operation: &'static str,
        fut: F,
    ) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let _timer = ScopedTimer::new(operation);
        let timeout = self.timeout_request();
        match tokio::time::timeout(timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                warn!(operation, ?timeout, "Store operation timed out");
                Err(BackendError::DeadlineExceeded { operation, timeout }.into())
            }
        }
    }
}
