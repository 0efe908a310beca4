use crate::Cache;
use crate::error::Result;
use async_trait::async_trait;
use std::time::Duration;

/// Cache implementation that never caches.
///
/// Every lookup is a miss, so every freshness decision falls through to the
/// destination store's timestamps.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullCache;

#[async_trait]
impl Cache for NullCache {
    async fn get(&self, _key: &str) -> Result<Option<String>> {
        Ok(None)
    }

    async fn set(&self, _key: &str, _value: &str, _ttl: Duration) -> Result<()> {
        Ok(())
    }

    async fn forget(&self, _key: &str) -> Result<()> {
        Ok(())
    }
}
