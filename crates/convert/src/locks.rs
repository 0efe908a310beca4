use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Per-base-path mutual exclusion.
///
/// Conversions under the same base path share a staging directory, so they
/// must not overlap. Locks for different base paths are independent. Entries
/// are held weakly and pruned once nobody holds or waits on them.
#[derive(Debug, Default)]
pub struct BaseLocks {
    locks: Mutex<HashMap<PathBuf, Weak<AsyncMutex<()>>>>,
}

impl BaseLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `base`.
    pub async fn lock(&self, base: &Path) -> OwnedMutexGuard<()> {
        let mutex = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks.retain(|_, lock| lock.strong_count() > 0);
            match locks.get(base).and_then(Weak::upgrade) {
                Some(existing) => existing,
                None => {
                    let created = Arc::new(AsyncMutex::new(()));
                    locks.insert(base.to_path_buf(), Arc::downgrade(&created));
                    created
                },
            }
        };
        mutex.lock_owned().await
    }

    /// Number of base paths currently locked or waited on.
    pub fn len(&self) -> usize {
        let locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.values().filter(|lock| lock.strong_count() > 0).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
