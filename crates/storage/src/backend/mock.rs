//! In-memory storage backend for testing.

use crate::error::{ErrorKind, Result};
use crate::file::{Entry, FileInfo};
use crate::path::validate as validate_path;
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use time::OffsetDateTime;
use tokio::sync::RwLock;

use crate::StorageBackend;

#[derive(Default)]
struct Counters {
    reads: AtomicUsize,
    writes: AtomicUsize,
    listings: AtomicUsize,
    stats: AtomicUsize,
}

/// Snapshot of how many operations a [`MockBackend`] has served.
///
/// `stats` counts metadata lookups (`exists`, `stat` and `last_modified`),
/// `listings` counts `children` calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Operations {
    pub reads: usize,
    pub writes: usize,
    pub listings: usize,
    pub stats: usize,
}

/// In-memory storage backend for testing.
///
/// Files are stored in a map behind a [`RwLock`], so all trait methods can
/// operate on `&self` without external synchronisation. Modification times
/// can be set explicitly with [`set_modified()`](Self::set_modified), which
/// makes freshness comparisons deterministic, and every operation is counted
/// (see [`operations()`](Self::operations)).
///
/// # Examples
///
/// ```
/// use kiln_storage::backend::{MockBackend, StorageBackend};
/// use std::path::Path;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = MockBackend::with_files([
///     ("assets/app.scss", b"body { color: red }"),
/// ]);
/// assert!(backend.exists(Path::new("assets/app.scss")).await?);
///
/// backend.write(Path::new("assets/compiled/app.css"), b"body{color:red}").await?;
/// assert_eq!(backend.operations().writes, 1);
/// # Ok(())
/// # }
/// ```
pub struct MockBackend {
    name: String,
    storage: RwLock<BTreeMap<PathBuf, (OffsetDateTime, Vec<u8>)>>,
    counters: Counters,
}

impl MockBackend {
    /// Create a mock backend pre-populated with files.
    ///
    /// Panics if any path fails validation (e.g. path traversal). If test
    /// setup is wrong, then test should not pass.
    pub fn with_files(files: impl IntoIterator<Item = (impl Into<PathBuf>, impl Into<Vec<u8>>)>) -> Self {
        let mut map = BTreeMap::new();
        let now = OffsetDateTime::now_utc();
        for (path, data) in files {
            let path = path.into();
            let Ok(validated) = validate_path(&path) else {
                // Deliberate: a broken fixture should fail the test loudly.
                panic!("MockBackend::with_files: invalid path {}", path.display());
            };
            map.insert(validated, (now, data.into()));
        }
        Self {
            name: "mock".to_string(),
            storage: RwLock::new(map),
            counters: Counters::default(),
        }
    }

    /// Change the name of the mock backend.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Override the modification time of an existing file.
    ///
    /// Panics if the file doesn't exist.
    pub async fn set_modified(&self, path: impl AsRef<Path>, modified: OffsetDateTime) {
        let path = path.as_ref();
        let mut guard = self.storage.write().await;
        let entry = match validate_path(path) {
            Ok(validated) => guard.get_mut(&validated),
            Err(_) => None,
        };
        let Some(entry) = entry else {
            panic!("MockBackend::set_modified: no such file {}", path.display());
        };
        entry.0 = modified;
    }

    /// Number of operations served so far.
    pub fn operations(&self) -> Operations {
        Operations {
            reads: self.counters.reads.load(Ordering::SeqCst),
            writes: self.counters.writes.load(Ordering::SeqCst),
            listings: self.counters.listings.load(Ordering::SeqCst),
            stats: self.counters.stats.load(Ordering::SeqCst),
        }
    }

    fn count(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::SeqCst);
    }

    fn not_found(path: PathBuf) -> exn::Exn<ErrorKind> {
        exn::Exn::from(ErrorKind::NotFound(path))
    }
}
impl Default for MockBackend {
    fn default() -> Self {
        let files: [(&str, &str); 0] = [];
        Self::with_files(files)
    }
}

#[async_trait]
impl StorageBackend for MockBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn children(&self, dir: &Path) -> Result<Vec<Entry>> {
        Self::count(&self.counters.listings);
        let dir = validate_path(dir)?;
        let guard = self.storage.read().await;
        let mut directories = BTreeSet::new();
        let mut children = Vec::new();
        for (path, (modified, data)) in guard.iter() {
            let Ok(rest) = path.strip_prefix(&dir) else {
                continue;
            };
            let mut components = rest.components();
            let Some(first) = components.next() else {
                continue;
            };
            if components.next().is_some() {
                directories.insert(dir.join(first));
            } else {
                children.push(Entry::File(FileInfo::new(path.clone(), data.len() as u64, *modified)));
            }
        }
        children.extend(directories.into_iter().map(Entry::Directory));
        Ok(children)
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        Self::count(&self.counters.stats);
        let path = validate_path(path)?;
        Ok(self.storage.read().await.contains_key(&path))
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        Self::count(&self.counters.reads);
        let path = validate_path(path)?;
        let (_modified, data) = self.storage.read().await.get(&path).cloned().ok_or_else(|| Self::not_found(path))?;
        Ok(data)
    }

    async fn write(&self, path: &Path, data: &[u8]) -> Result<()> {
        Self::count(&self.counters.writes);
        let path = validate_path(path)?;
        self.storage.write().await.insert(path, (OffsetDateTime::now_utc(), data.to_vec()));
        Ok(())
    }

    async fn stat(&self, path: &Path) -> Result<FileInfo> {
        Self::count(&self.counters.stats);
        let path = validate_path(path)?;
        let guard = self.storage.read().await;
        let (modified, data) = guard.get(&path).ok_or_else(|| Self::not_found(path.clone()))?;
        Ok(FileInfo::new(path.clone(), data.len() as u64, *modified))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;

    #[tokio::test]
    async fn test_write_and_read() {
        let backend = MockBackend::default();
        backend.write(Path::new("app.css"), b"hello").await.unwrap();
        assert_eq!(backend.read(Path::new("app.css")).await.unwrap(), b"hello");
        assert_eq!(backend.operations(), Operations { reads: 1, writes: 1, ..Default::default() });
    }

    #[tokio::test]
    async fn test_read_not_found() {
        let backend = MockBackend::default();
        let err = backend.read(Path::new("missing.css")).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }

    #[tokio::test]
    async fn test_set_modified() {
        let backend = MockBackend::with_files([("app.scss", b"a")]);
        let earlier = OffsetDateTime::now_utc() - Duration::hours(1);
        backend.set_modified("app.scss", earlier).await;
        assert_eq!(backend.last_modified(Path::new("app.scss")).await.unwrap(), earlier);
    }

    #[tokio::test]
    #[should_panic(expected = "no such file")]
    async fn test_set_modified_missing_file() {
        MockBackend::default().set_modified("missing.scss", OffsetDateTime::now_utc()).await;
    }

    #[tokio::test]
    async fn test_children() {
        let backend = MockBackend::with_files([
            ("assets/app.scss", b"a".to_vec()),
            ("assets/partials/_vars.scss", b"b".to_vec()),
            ("assets/partials/deep/_mixins.scss", b"c".to_vec()),
            ("other/app.less", b"d".to_vec()),
        ]);
        let children = backend.children(Path::new("assets")).await.unwrap();
        assert_eq!(children.len(), 2);
        assert!(matches!(&children[0], Entry::File(info) if info.path == Path::new("assets/app.scss")));
        assert_eq!(children[1], Entry::Directory(PathBuf::from("assets/partials")));
        assert!(backend.children(Path::new("missing")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_children_does_not_match_sibling_prefixes() {
        let backend = MockBackend::with_files([("app/main.scss", b"a"), ("application.scss", b"b")]);
        let children = backend.children(Path::new("app")).await.unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].path(), Path::new("app/main.scss"));
    }

    #[tokio::test]
    async fn test_path_traversal_rejected() {
        let backend = MockBackend::default();
        assert!(backend.read(Path::new("../etc/passwd")).await.is_err());
        assert!(backend.write(Path::new("../escape"), b"bad").await.is_err());
    }

    #[test]
    #[should_panic(expected = "invalid path")]
    fn test_with_files_panics_on_bad_path() {
        MockBackend::with_files([("../escape", b"bad")]);
    }
}
