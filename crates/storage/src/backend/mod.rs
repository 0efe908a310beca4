//! Storage backend trait and implementations.
//!
//! This module defines the `StorageBackend` trait, which provides a unified
//! interface for storage operations across different backends (local
//! filesystem, S3-compatible services, an in-memory mock for tests).

mod local;
#[cfg(feature = "mock")]
mod mock;
#[cfg(feature = "s3")]
mod s3;

pub use self::local::LocalBackend;
#[cfg(feature = "mock")]
pub use self::mock::{MockBackend, Operations};
#[cfg(feature = "s3")]
pub use self::s3::S3Backend;
use crate::error::Result;
use crate::file::{Entry, FileInfo};
use async_trait::async_trait;
use std::path::Path;
use time::OffsetDateTime;

/// Unified interface for storage backends.
///
/// All storage operations are asynchronous to efficiently handle network
/// operations. The trait covers exactly what staged conversion needs from a
/// destination: metadata for freshness checks, a one-level directory walk
/// for mirroring, reads to stage files and writes to publish outputs.
///
/// # Path Handling
/// All paths are relative to the storage root and must be validated using
/// [`validate_path`](crate::validate_path) before use. Implementations should
/// enforce this validation.
///
/// # Examples
///
/// ```no_run
/// use std::path::Path;
/// use kiln_storage::{StorageBackend, error::Result};
///
/// async fn is_stale(backend: &dyn StorageBackend, source: &Path, output: &Path) -> Result<bool> {
///     if !backend.exists(output).await? {
///         return Ok(true);
///     }
///     Ok(backend.last_modified(output).await? < backend.last_modified(source).await?)
/// }
/// ```
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Name of the configured backend (used for logging only).
    fn name(&self) -> &str;

    /// List the immediate children of a directory.
    ///
    /// Files are returned with their metadata, subdirectories as
    /// [`Entry::Directory`]. Listing a directory that doesn't exist returns
    /// an empty list rather than an error.
    async fn children(&self, dir: &Path) -> Result<Vec<Entry>>;

    /// Check if a file exists.
    async fn exists(&self, path: &Path) -> Result<bool>;

    /// Read file contents.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if the file
    /// does not exist.
    async fn read(&self, path: &Path) -> Result<Vec<u8>>;

    /// Write file contents, replacing any existing file.
    ///
    /// Implementations create parent directories as needed.
    async fn write(&self, path: &Path, data: &[u8]) -> Result<()>;

    /// Get file metadata without reading contents.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if the file
    /// does not exist.
    async fn stat(&self, path: &Path) -> Result<FileInfo>;

    /// Last modification time of a file.
    async fn last_modified(&self, path: &Path) -> Result<OffsetDateTime> {
        Ok(self.stat(path).await?.modified)
    }
}
