//! Storage backends for the build filesystem.

use hotweb_util::path::normalize;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

/// Metadata for a stored entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileMeta {
    pub len: u64,
    pub is_dir: bool,
}

impl FileMeta {
    #[must_use]
    pub fn file(len: u64) -> Self {
        Self { len, is_dir: false }
    }

    #[must_use]
    pub fn dir() -> Self {
        Self {
            len: 0,
            is_dir: true,
        }
    }
}

/// A flat store of files addressed by virtual path.
///
/// Paths are normalized by each implementation, so `lib/a.js` and `/lib/a.js`
/// address the same entry. Writes go through `&self`; implementations handle
/// their own synchronization.
pub trait Store: Send + Sync {
    fn read(&self, path: &str) -> io::Result<Vec<u8>>;

    fn metadata(&self, path: &str) -> io::Result<FileMeta>;

    fn write(&self, path: &str, contents: &[u8]) -> io::Result<()>;

    fn remove(&self, path: &str) -> io::Result<()>;

    /// Whether `path` exists. Errors other than `NotFound` are returned.
    fn exists(&self, path: &str) -> io::Result<bool> {
        match self.metadata(path) {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }
}

impl<S: Store + ?Sized> Store for Arc<S> {
    fn read(&self, path: &str) -> io::Result<Vec<u8>> {
        (**self).read(path)
    }

    fn metadata(&self, path: &str) -> io::Result<FileMeta> {
        (**self).metadata(path)
    }

    fn write(&self, path: &str, contents: &[u8]) -> io::Result<()> {
        (**self).write(path, contents)
    }

    fn remove(&self, path: &str) -> io::Result<()> {
        (**self).remove(path)
    }
}

fn not_found(path: &str) -> io::Error {
    io::Error::new(io::ErrorKind::NotFound, format!("{path}: no such file"))
}

fn poisoned() -> io::Error {
    io::Error::other("store lock poisoned")
}

/// In-memory store. Directories exist implicitly when a file lives below them.
#[derive(Debug, Default)]
pub struct MemStore {
    files: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of files held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.files.read().map(|f| f.len()).unwrap_or(0)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Store for MemStore {
    fn read(&self, path: &str) -> io::Result<Vec<u8>> {
        let path = normalize(path);
        let files = self.files.read().map_err(|_| poisoned())?;
        files
            .get(&path)
            .cloned()
            .ok_or_else(|| not_found(&path))
    }

    fn metadata(&self, path: &str) -> io::Result<FileMeta> {
        let path = normalize(path);
        let files = self.files.read().map_err(|_| poisoned())?;
        if let Some(file) = files.get(&path) {
            return Ok(FileMeta::file(file.len() as u64));
        }
        if path == "/" {
            return Ok(FileMeta::dir());
        }
        let dir_prefix = format!("{path}/");
        if files.keys().any(|k| k.starts_with(&dir_prefix)) {
            Ok(FileMeta::dir())
        } else {
            Err(not_found(&path))
        }
    }

    fn write(&self, path: &str, contents: &[u8]) -> io::Result<()> {
        let path = normalize(path);
        let mut files = self.files.write().map_err(|_| poisoned())?;
        files.insert(path, contents.to_vec());
        Ok(())
    }

    fn remove(&self, path: &str) -> io::Result<()> {
        let path = normalize(path);
        let mut files = self.files.write().map_err(|_| poisoned())?;
        files.remove(&path).map(|_| ()).ok_or_else(|| not_found(&path))
    }
}

/// A store rooted at an OS directory.
#[derive(Debug, Clone)]
pub struct DirStore {
    root: PathBuf,
}

impl DirStore {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// OS path for a virtual path. Normalization keeps it inside the root.
    #[must_use]
    pub fn resolve(&self, path: &str) -> PathBuf {
        let normalized = normalize(path);
        let rel = normalized.trim_start_matches('/');
        if rel.is_empty() {
            self.root.clone()
        } else {
            self.root.join(rel)
        }
    }
}

impl Store for DirStore {
    fn read(&self, path: &str) -> io::Result<Vec<u8>> {
        fs::read(self.resolve(path))
    }

    fn metadata(&self, path: &str) -> io::Result<FileMeta> {
        let meta = fs::metadata(self.resolve(path))?;
        if meta.is_dir() {
            Ok(FileMeta::dir())
        } else {
            Ok(FileMeta::file(meta.len()))
        }
    }

    fn write(&self, path: &str, contents: &[u8]) -> io::Result<()> {
        hotweb_util::fs::atomic_write(&self.resolve(path), contents)
    }

    fn remove(&self, path: &str) -> io::Result<()> {
        fs::remove_file(self.resolve(path))
    }
}

/// Wraps a store and rejects every mutation.
#[derive(Debug, Clone)]
pub struct ReadOnlyStore<S>(pub S);

impl<S: Store> Store for ReadOnlyStore<S> {
    fn read(&self, path: &str) -> io::Result<Vec<u8>> {
        self.0.read(path)
    }

    fn metadata(&self, path: &str) -> io::Result<FileMeta> {
        self.0.metadata(path)
    }

    fn write(&self, path: &str, _contents: &[u8]) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::PermissionDenied,
            format!("{path}: read-only store"),
        ))
    }

    fn remove(&self, path: &str) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::PermissionDenied,
            format!("{path}: read-only store"),
        ))
    }
}

/// Copy-on-write composition of a read-only base and a writable overlay.
///
/// Reads prefer the overlay and fall back to the base. Writes and removals
/// only touch the overlay.
#[derive(Clone)]
pub struct CowStore {
    base: ReadOnlyStore<Arc<dyn Store>>,
    overlay: Arc<dyn Store>,
}

impl CowStore {
    #[must_use]
    pub fn new(base: Arc<dyn Store>, overlay: Arc<dyn Store>) -> Self {
        Self {
            base: ReadOnlyStore(base),
            overlay,
        }
    }

    #[must_use]
    pub fn overlay(&self) -> &dyn Store {
        self.overlay.as_ref()
    }
}

impl Store for CowStore {
    fn read(&self, path: &str) -> io::Result<Vec<u8>> {
        match self.overlay.read(path) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => self.base.read(path),
            result => result,
        }
    }

    fn metadata(&self, path: &str) -> io::Result<FileMeta> {
        match self.overlay.metadata(path) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => self.base.metadata(path),
            result => result,
        }
    }

    fn write(&self, path: &str, contents: &[u8]) -> io::Result<()> {
        self.overlay.write(path, contents)
    }

    fn remove(&self, path: &str) -> io::Result<()> {
        self.overlay.remove(path)
    }
}
