//! Short-lived key-value cache for freshness markers.
//!
//! A converter only ever stores *positive* assertions here ("this output was
//! confirmed fresh a moment ago"), each with a time-to-live. The cache is
//! never the source of truth: losing every entry only costs a few extra
//! metadata lookups against the destination store.
//!
//! # Implementations
//! - [`MemoryCache`]: process-local, for tests and long-running servers.
//! - [`SqliteCache`]: persisted in a SQLite database, shared between
//!   invocations of the command-line tool.
//! - [`NullCache`]: remembers nothing.

mod db;
pub mod error;
mod key;
mod memory;
mod null;
mod sqlite;

pub use crate::db::Database;
pub use crate::key::CacheKey;
pub use crate::memory::MemoryCache;
pub use crate::null::NullCache;
pub use crate::sqlite::SqliteCache;
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

pub type CacheHandle = Arc<dyn Cache + Send + Sync>;

/// A string-to-string store whose entries expire.
///
/// Expired entries must read as absent; whether they are physically removed
/// at that point is up to the implementation.
#[async_trait]
pub trait Cache: Send + Sync {
    /// Fetch the value for `key`, or `None` if it is missing or expired.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store `value` under `key` for `ttl`, replacing any previous entry.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    /// Remove the entry for `key`, if any.
    async fn forget(&self, key: &str) -> Result<()>;

    /// Returns `true` if a live entry exists for `key`.
    async fn contains(&self, key: &str) -> Result<bool> {
        Ok(self.get(key).await?.is_some())
    }
}
