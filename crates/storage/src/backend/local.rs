//! Local filesystem storage backend.
//!
//! Files are stored in a configured directory and accessed using standard
//! filesystem operations via `tokio::fs` for async I/O. Besides serving as a
//! destination store, this is also the backend staging directories are
//! written through.

use crate::error::ErrorKind;
use crate::{Entry, FileInfo, StorageBackend, error::Result, path::validate as validate_path};
use async_trait::async_trait;
use exn::ResultExt;
use std::fs::{Metadata, create_dir_all as sync_create_dir};
use std::path::{Path, PathBuf};
use tokio::fs;

/// Local filesystem storage backend.
///
/// Stores files in a directory on the local filesystem. All paths are relative
/// to the configured root directory.
///
/// # Examples
///
/// ```no_run
/// use kiln_storage::backend::LocalBackend;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = LocalBackend::new("public", "/srv/www/public")?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct LocalBackend {
    name: String,
    /// Root directory of the store
    root: PathBuf,
}
impl LocalBackend {
    /// Create a new local filesystem backend.
    ///
    /// # Arguments
    /// * `name` - Name used in logging
    /// * `root` - Absolute path to the store's root directory
    ///
    /// # Errors
    ///
    /// Returns an error if the path is not absolute, or if it exists but is
    /// not a directory.
    pub fn new(name: impl Into<String>, root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_absolute() {
            exn::bail!(ErrorKind::InvalidPath(root));
        }

        if root.exists() {
            if !root.is_dir() {
                exn::bail!(ErrorKind::InvalidPath(root));
            }
        } else {
            // Use non-async here; it'll only happen once on startup and it's
            // not worth the hassle of making the constructor async.
            sync_create_dir(&root).map_err(|e| Self::map_io_error(e, &root))?;
            tracing::debug!(root = %root.display(), "Created local storage root");
        }

        Ok(Self { name: name.into(), root })
    }

    /// Root directory of this backend.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Get the absolute path for a relative storage path.
    ///
    /// Validates the path and joins it with the root directory.
    pub fn absolute_path(&self, path: impl AsRef<Path>) -> Result<PathBuf> {
        let validated = validate_path(path.as_ref())?;
        Ok(self.root.join(validated))
    }

    /// Convert an absolute path back to a relative storage path.
    fn relative_path(&self, absolute: impl AsRef<Path>) -> Result<PathBuf> {
        let absolute = absolute.as_ref();
        if !absolute.is_absolute() {
            exn::bail!(ErrorKind::BackendError(format!(
                "attempting to get relative path of non-absolute path `{:?}`",
                absolute
            )))
        }
        let relative = absolute.strip_prefix(&self.root).or_raise(|| {
            ErrorKind::BackendError(format!("path `{:?}` is not within root `{:?}`", absolute, self.root))
        })?;
        validate_path(relative)
    }

    fn metadata(path: &Path, metadata: Metadata) -> Result<FileInfo> {
        let modified = metadata.modified().map_err(ErrorKind::Io)?.into();
        Ok(FileInfo::new(PathBuf::from(path), metadata.len(), modified))
    }

    fn map_io_error(e: std::io::Error, path: &Path) -> ErrorKind {
        match e.kind() {
            std::io::ErrorKind::NotFound => ErrorKind::NotFound(path.to_path_buf()),
            std::io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied(path.to_path_buf()),
            _ => ErrorKind::Io(e),
        }
    }
}

#[async_trait]
impl StorageBackend for LocalBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn children(&self, dir: &Path) -> Result<Vec<Entry>> {
        let abs_dir = self.absolute_path(dir)?;
        let mut entries = match fs::read_dir(&abs_dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => exn::bail!(Self::map_io_error(err, dir)),
        };
        let mut children = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| Self::map_io_error(e, dir))? {
            let path = entry.path();
            let metadata = entry.metadata().await.map_err(|e| Self::map_io_error(e, &path))?;
            let relative = self.relative_path(&path)?;
            if metadata.is_dir() {
                children.push(Entry::Directory(relative));
            } else if metadata.is_file() {
                children.push(Entry::File(Self::metadata(&relative, metadata)?));
            } else {
                tracing::trace!(path = %relative.display(), "Skipping entry that is neither file nor directory");
            }
        }
        Ok(children)
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        let abs_path = self.absolute_path(path)?;
        Ok(fs::try_exists(&abs_path).await.map_err(ErrorKind::Io)?)
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        let abs_path = self.absolute_path(path)?;
        Ok(fs::read(&abs_path).await.map_err(|e| Self::map_io_error(e, path))?)
    }

    async fn write(&self, path: &Path, data: &[u8]) -> Result<()> {
        let abs_path = self.absolute_path(path)?;
        // Create parent directories if needed, to keep behaviour
        // consistent with S3-compatible storage.
        if let Some(parent) = abs_path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| Self::map_io_error(e, path))?;
        }
        Ok(fs::write(&abs_path, data).await.map_err(|e| Self::map_io_error(e, path))?)
    }

    async fn stat(&self, path: &Path) -> Result<FileInfo> {
        let abs_path = self.absolute_path(path)?;
        let metadata = fs::metadata(&abs_path).await.map_err(|e| Self::map_io_error(e, path))?;
        if !metadata.is_file() {
            exn::bail!(ErrorKind::NotFound(path.to_path_buf()));
        }
        Self::metadata(path, metadata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn backend() -> (tempfile::TempDir, LocalBackend) {
        let temp_dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new("name", temp_dir.path()).unwrap();
        (temp_dir, backend)
    }

    #[test]
    fn test_new_requires_absolute_path() {
        let temp_dir = tempfile::tempdir().unwrap();
        assert!(LocalBackend::new("name", temp_dir.path()).is_ok());
        assert!(LocalBackend::new("name", "relative/path").is_err());
        assert!(LocalBackend::new("name", "./relative").is_err());
    }

    #[test]
    fn test_new_creates_missing_root() {
        let temp_dir = tempfile::tempdir().unwrap();
        let root = temp_dir.path().join("nested/root");
        LocalBackend::new("name", &root).unwrap();
        assert!(root.is_dir());
    }

    #[test]
    fn test_absolute_path() {
        let (temp_dir, backend) = backend();
        let expected = temp_dir.path().join("assets/app.scss");
        assert_eq!(backend.absolute_path("assets/app.scss").unwrap(), expected);
        assert!(backend.absolute_path("../etc/passwd").is_err());
    }

    #[test]
    fn test_relative_path() {
        let (temp_dir, backend) = backend();
        let abs = temp_dir.path().join("assets/app.scss");
        assert_eq!(backend.relative_path(&abs).unwrap(), Path::new("assets/app.scss"));
        assert!(backend.relative_path("/other/file.css").is_err());
    }

    #[tokio::test]
    async fn test_write_and_read() {
        let (_temp_dir, backend) = backend();
        backend.write(Path::new("a/b/app.css"), b"body{}").await.unwrap();
        assert_eq!(backend.read(Path::new("a/b/app.css")).await.unwrap(), b"body{}");
    }

    #[tokio::test]
    async fn test_children() {
        let (_temp_dir, backend) = backend();
        backend.write(Path::new("assets/app.scss"), b"a").await.unwrap();
        backend.write(Path::new("assets/partials/_vars.scss"), b"b").await.unwrap();
        let mut children = backend.children(Path::new("assets")).await.unwrap();
        children.sort_by(|a, b| a.path().cmp(b.path()));
        assert_eq!(children.len(), 2);
        assert!(matches!(&children[0], Entry::File(info) if info.path == Path::new("assets/app.scss") && info.size == 1));
        assert_eq!(children[1], Entry::Directory(PathBuf::from("assets/partials")));
    }

    #[tokio::test]
    async fn test_children_of_missing_directory() {
        let (_temp_dir, backend) = backend();
        assert!(backend.children(Path::new("nope")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_exists() {
        let (_temp_dir, backend) = backend();
        assert!(!backend.exists(Path::new("app.css")).await.unwrap());
        backend.write(Path::new("app.css"), b"data").await.unwrap();
        assert!(backend.exists(Path::new("app.css")).await.unwrap());
    }

    #[tokio::test]
    async fn test_stat_and_last_modified() {
        let (_temp_dir, backend) = backend();
        backend.write(Path::new("app.css"), b"body{}").await.unwrap();
        let info = backend.stat(Path::new("app.css")).await.unwrap();
        assert_eq!(info.path, PathBuf::from("app.css"));
        assert_eq!(info.size, 6);
        assert_eq!(backend.last_modified(Path::new("app.css")).await.unwrap(), info.modified);
    }

    #[tokio::test]
    async fn test_stat_directory_is_not_found() {
        let (_temp_dir, backend) = backend();
        backend.write(Path::new("dir/app.css"), b"body{}").await.unwrap();
        let err = backend.stat(Path::new("dir")).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }

    #[tokio::test]
    async fn test_path_security() {
        let (_temp_dir, backend) = backend();
        assert!(backend.read(Path::new("../etc/passwd")).await.is_err());
        assert!(backend.write(Path::new("../etc/passwd"), b"data").await.is_err());
        assert!(backend.children(Path::new("../")).await.is_err());
        assert!(backend.exists(Path::new("../../file")).await.is_err());
    }
}
