use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use kiln_cache::{Cache, CacheKey};
use kiln_storage::StorageBackend;
use std::path::Path;

/// Decide whether the output at `to` has to be (re)built from `from`.
///
/// A forced run always recompiles. Otherwise a live cache entry for the
/// output counts as proof of freshness, and only on a cache miss is the
/// destination store asked whether the output exists and is at least as new
/// as its source.
pub async fn needs_recompile(
    destination: &dyn StorageBackend,
    cache: &dyn Cache,
    key: &CacheKey,
    from: &Path,
    to: &Path,
    force: bool,
) -> Result<bool> {
    if force {
        return Ok(true);
    }
    if cache.get(key.as_str()).await.or_raise(|| ErrorKind::Cache)?.is_some() {
        tracing::trace!(%key, "Freshness marker found");
        return Ok(false);
    }
    if !destination.exists(to).await.or_raise(|| ErrorKind::Storage)? {
        tracing::trace!(to = %to.display(), "Output missing from destination");
        return Ok(true);
    }
    let output_modified = destination.last_modified(to).await.or_raise(|| ErrorKind::Storage)?;
    let source_modified = destination.last_modified(from).await.or_raise(|| ErrorKind::Storage)?;
    Ok(output_modified < source_modified)
}
