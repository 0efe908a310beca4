//! Local scratch copies of a base directory.
//!
//! Converters only ever see the local filesystem. Before a conversion the
//! whole subtree under the base path is mirrored from the destination store
//! into a fresh staging directory; afterwards the single output file is
//! published back and the directory is removed. [`Staging`] owns that
//! directory, and dropping it removes the directory, so an early return or a
//! cancelled future never leaves one behind.

use crate::error::{ErrorKind, Result};
use crate::target::Target;
use exn::ResultExt;
use kiln_config::PublishPolicy;
use kiln_storage::{Entry, StorageBackend};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::instrument;

/// A staging directory, removed when dropped.
#[derive(Debug)]
pub struct Staging {
    dir: PathBuf,
    removed: bool,
}

impl Staging {
    /// Create a fresh staging directory for `base` and mirror the store's
    /// subtree into it.
    ///
    /// A directory left over from an earlier run is removed first.
    #[instrument(level = "debug", skip_all, fields(base = %base.display()))]
    pub async fn acquire(scratch_root: &Path, destination: &dyn StorageBackend, base: &Path) -> Result<Self> {
        let dir = scratch_root.join(dir_name(base));
        if fs::try_exists(&dir).await.or_raise(|| ErrorKind::Staging)? {
            tracing::debug!(dir = %dir.display(), "Removing stale staging directory");
            fs::remove_dir_all(&dir).await.or_raise(|| ErrorKind::Staging)?;
        }
        fs::create_dir_all(&dir).await.or_raise(|| ErrorKind::Staging)?;
        let staging = Self { dir, removed: false };
        let mirrored = staging.mirror(destination, base).await?;
        tracing::debug!(dir = %staging.dir.display(), files = mirrored, "Staged base directory");
        Ok(staging)
    }

    /// Root of the staging directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Local path of a file given relative to the base.
    pub fn path(&self, relative: &Path) -> PathBuf {
        self.dir.join(relative)
    }

    /// Make room for the converter to write `output` (relative to the base).
    ///
    /// Creates the parent directory and removes the copy of a previously
    /// published output that mirroring brought along, so a converter that
    /// writes nothing is caught by [`publish()`](Self::publish) instead of
    /// republishing the old file.
    pub async fn prepare_output(&self, output: &Path) -> Result<()> {
        let local = self.path(output);
        if let Some(parent) = local.parent() {
            fs::create_dir_all(parent).await.or_raise(|| ErrorKind::Staging)?;
        }
        match fs::remove_file(&local).await {
            Ok(()) => tracing::trace!(output = %output.display(), "Removed mirrored output before conversion"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {},
            Err(e) => return Err(e).or_raise(|| ErrorKind::Staging),
        }
        Ok(())
    }

    /// Copy the staged output to the destination store.
    ///
    /// Whether an output already in the store gets replaced depends on
    /// `policy`; a `forced` run replaces it under
    /// [`PublishPolicy::IfAbsentOrStale`]. Returns `true` if the store was
    /// written to.
    pub async fn publish(
        &self,
        destination: &dyn StorageBackend,
        target: &Target,
        policy: PublishPolicy,
        forced: bool,
    ) -> Result<bool> {
        let staged = self.path(&target.output);
        if !fs::try_exists(&staged).await.or_raise(|| ErrorKind::Staging)? {
            exn::bail!(ErrorKind::NoOutput(target.output.clone()));
        }
        if destination.exists(&target.to).await.or_raise(|| ErrorKind::Storage)? {
            let replace = match policy {
                PublishPolicy::IfAbsent => false,
                PublishPolicy::IfAbsentOrStale if forced => true,
                PublishPolicy::IfAbsentOrStale => {
                    let output_modified = destination.last_modified(&target.to).await.or_raise(|| ErrorKind::Storage)?;
                    let source_modified =
                        destination.last_modified(&target.from).await.or_raise(|| ErrorKind::Storage)?;
                    output_modified < source_modified
                },
            };
            if !replace {
                tracing::debug!(to = %target.to.display(), ?policy, "Keeping existing output");
                return Ok(false);
            }
        }
        let data = fs::read(&staged).await.or_raise(|| ErrorKind::Staging)?;
        destination.write(&target.to, &data).await.or_raise(|| ErrorKind::Storage)?;
        Ok(true)
    }

    /// Remove the staging directory, reporting failure instead of only
    /// logging it like [`Drop`] does.
    pub async fn finish(mut self) -> Result<()> {
        self.removed = true;
        fs::remove_dir_all(&self.dir).await.or_raise(|| ErrorKind::Staging)
    }

    /// Copy every file under `base` that isn't already staged.
    async fn mirror(&self, destination: &dyn StorageBackend, base: &Path) -> Result<usize> {
        let mut pending = vec![base.to_path_buf()];
        let mut copied = 0;
        while let Some(dir) = pending.pop() {
            for entry in destination.children(&dir).await.or_raise(|| ErrorKind::Storage)? {
                let info = match entry {
                    Entry::Directory(path) => {
                        pending.push(path);
                        continue;
                    },
                    Entry::File(info) => info,
                };
                let Ok(relative) = info.path.strip_prefix(base) else {
                    exn::bail!(ErrorKind::Staging);
                };
                let local = self.path(relative);
                if fs::try_exists(&local).await.or_raise(|| ErrorKind::Staging)? {
                    continue;
                }
                let data = destination.read(&info.path).await.or_raise(|| ErrorKind::Storage)?;
                if let Some(parent) = local.parent() {
                    fs::create_dir_all(parent).await.or_raise(|| ErrorKind::Staging)?;
                }
                fs::write(&local, data).await.or_raise(|| ErrorKind::Staging)?;
                copied += 1;
            }
        }
        Ok(copied)
    }
}

// Reached only when `finish()` wasn't: failed conversions and cancelled
// calls. The removal blocks whichever thread drops the guard.
impl Drop for Staging {
    fn drop(&mut self) {
        if self.removed {
            return;
        }
        match std::fs::remove_dir_all(&self.dir) {
            Ok(()) => tracing::debug!(dir = %self.dir.display(), "Removed staging directory"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {},
            Err(e) => tracing::warn!(dir = %self.dir.display(), error = %e, "Failed to remove staging directory"),
        }
    }
}

/// Flat directory name for a base path.
///
/// Nested base paths (`web` and `web/admin`) must not share or contain each
/// other's staging directories, so separators are escaped instead of
/// mirrored.
fn dir_name(base: &Path) -> String {
    base.components()
        .map(|c| c.as_os_str().to_string_lossy().replace('%', "%25"))
        .collect::<Vec<_>>()
        .join("%2F")
}
