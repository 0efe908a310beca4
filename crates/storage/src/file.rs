//! Storage models.
//!
//! Metadata returned by storage backends for listing and freshness checks.

use std::path::{Path, PathBuf};
use time::OffsetDateTime;

/// File metadata returned by storage backends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    /// Relative path from storage root
    pub path: PathBuf,
    /// File size in bytes
    pub size: u64,
    /// Last modified timestamp
    pub modified: OffsetDateTime,
}
impl FileInfo {
    pub fn new(path: impl Into<PathBuf>, size: u64, modified: OffsetDateTime) -> Self {
        Self { path: path.into(), size, modified }
    }
}

/// A single child of a directory, as returned by
/// [`StorageBackend::children()`](crate::StorageBackend::children).
///
/// Object stores don't really have directories; backends report "common
/// prefixes" as [`Directory`](Self::Directory) entries so that callers can
/// walk a tree one level at a time regardless of the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    File(FileInfo),
    Directory(PathBuf),
}
impl Entry {
    pub fn path(&self) -> &Path {
        match self {
            Self::File(info) => &info.path,
            Self::Directory(path) => path,
        }
    }

    pub fn is_dir(&self) -> bool {
        matches!(self, Self::Directory(_))
    }
}
