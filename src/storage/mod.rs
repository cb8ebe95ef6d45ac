//! Storage Module
//!
//! The persistence engine behind the server.
//!
//! ## Responsibilities
//! - Narrow `Store` capability consumed by the dispatcher
//! - In-memory ordered store for tests and ephemeral servers
//! - Durable log-backed store for production use
//!
//! ## Log File Format
//! ```text
//! ┌─────────────────────────────────────────┐
//! │ Record 1                                │
//! │ ┌─────────┬─────────┬────────┬────────┐ │
//! │ │ LSN (8) │ CRC (4) │Len (4) │ Op     │ │
//! │ └─────────┴─────────┴────────┴────────┘ │
//! ├─────────────────────────────────────────┤
//! │ Record 2 ...                            │
//! └─────────────────────────────────────────┘
//! ```

mod log;
mod memory;

pub use log::{
    LogOp, LogStore, ReplayStats, SyncStrategy, LOG_FILENAME, MAX_RECORD_SIZE, RECORD_HEADER_SIZE,
};
pub use memory::MemoryStore;

use crate::error::Result;

/// Key-value persistence engine
///
/// Shared by every connection worker without extra locking, so
/// implementations handle their own concurrency.
pub trait Store: Send + Sync + 'static {
    /// Value for `key`, `NetKvError::KeyNotFound` if absent
    fn get(&self, key: &[u8]) -> Result<Vec<u8>>;

    /// Insert or overwrite
    fn put(&self, key: &[u8], value: &[u8]) -> Result<()>;

    /// Remove `key`; removing an absent key succeeds
    fn delete(&self, key: &[u8]) -> Result<()>;

    /// Flush and release resources; later calls fail
    fn close(&self) -> Result<()>;
}

impl<S: Store + ?Sized> Store for std::sync::Arc<S> {
    fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        (**self).get(key)
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        (**self).put(key, value)
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        (**self).delete(key)
    }

    fn close(&self) -> Result<()> {
        (**self).close()
    }
}
