//! In-memory cache with per-entry expiry.

use crate::Cache;
use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Instant,
}
impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// Process-local cache.
///
/// Expired entries are dropped lazily, when they are next looked up or when
/// the next entry is written.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, Entry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remaining lifetime of a live entry.
    pub async fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        let guard = self.entries.read().await;
        guard.get(key).filter(|entry| entry.is_live(now)).map(|entry| entry.expires_at - now)
    }

    /// Number of live entries.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.read().await.values().filter(|entry| entry.is_live(now)).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let now = Instant::now();
        {
            let guard = self.entries.read().await;
            match guard.get(key) {
                None => return Ok(None),
                Some(entry) if entry.is_live(now) => return Ok(Some(entry.value.clone())),
                Some(_) => {},
            }
        }
        // Expired: take the write lock and drop it, unless someone refreshed
        // the entry in the meantime.
        let mut guard = self.entries.write().await;
        if guard.get(key).is_some_and(|entry| !entry.is_live(now)) {
            guard.remove(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let now = Instant::now();
        // Saturate rather than panic on absurd TTLs.
        let expires_at = now.checked_add(ttl).unwrap_or(now + Duration::from_secs(u32::MAX as u64));
        let mut guard = self.entries.write().await;
        guard.retain(|_, entry| entry.is_live(now));
        guard.insert(key.to_string(), Entry { value: value.to_string(), expires_at });
        Ok(())
    }

    async fn forget(&self, key: &str) -> Result<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}
