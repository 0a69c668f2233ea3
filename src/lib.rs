//! Persistence core of the chamber datacenter simulation
//!
//! ```text
//! Store (lifecycle, namespace, timeouts)
//!   ├── txn     conditional multi-key read/write/delete transactions
//!   ├── watch   typed change notifications
//!   └── record  logical records under a KeyRoot
//!            ↓
//! StoreDriver (backing store handle; MemCluster in-process)
//! ```

mod config;
mod driver;
mod errors;
mod record;
mod scoped_timer;
mod store;
mod txn;
mod watch;

pub use config::*;
pub use driver::*;
pub use errors::*;
pub use record::*;
pub use store::*;
pub use txn::*;
pub use watch::*;

//-----------------------------------------------------------
// Test utils

#[cfg(test)]
pub(crate) mod test_utils;
