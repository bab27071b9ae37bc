//! Virtual build filesystem.
//!
//! [`MakeFs`] overlays a read-only source store with a writable cache store and
//! builds derived files on demand. Rules map a destination extension to a
//! source extension and a [`Transform`]: a request for `/app.js` with a rule
//! `.js <- .jsx` builds `/app.jsx` into the cache and serves the result.
//!
//! Cached outputs are reused until [`MakeFs::invalidate`] evicts them.

mod store;

pub use store::{CowStore, DirStore, FileMeta, MemStore, ReadOnlyStore, Store};

use crate::error::{Error, Result};
use crate::transform::Transform;
use dashmap::DashMap;
use hotweb_util::path;
use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex, PoisonError};

struct Rule {
    src_ext: String,
    transform: Arc<dyn Transform>,
}

/// Copy-on-write filesystem with extension-keyed build rules.
pub struct MakeFs {
    fs: CowStore,
    rules: HashMap<String, Vec<Rule>>,
    building: DashMap<String, Arc<Mutex<()>>>,
}

impl MakeFs {
    /// Compose `source` (never written) with `cache` (receives every write).
    pub fn new(source: impl Store + 'static, cache: impl Store + 'static) -> Self {
        Self {
            fs: CowStore::new(Arc::new(source), Arc::new(cache)),
            rules: HashMap::new(),
            building: DashMap::new(),
        }
    }

    /// Register a rule building `dst_ext` files from `src_ext` files.
    ///
    /// Rules for the same destination are tried in registration order.
    /// Extensions may be given with or without the leading dot.
    pub fn register(&mut self, dst_ext: &str, src_ext: &str, transform: impl Transform + 'static) {
        self.rules.entry(dotted(dst_ext)).or_default().push(Rule {
            src_ext: dotted(src_ext),
            transform: Arc::new(transform),
        });
    }

    /// Read a file, building it first if a rule applies.
    pub fn read(&self, path: &str) -> Result<Vec<u8>> {
        let path = path::normalize(path);
        if let Some(bytes) = self.ensure_built(&path)? {
            return Ok(bytes);
        }
        self.fs.read(&path).map_err(|e| Error::from_io(&path, e))
    }

    /// Stat a file, building it first if a rule applies.
    pub fn metadata(&self, path: &str) -> Result<FileMeta> {
        let path = path::normalize(path);
        self.ensure_built(&path)?;
        self.fs.metadata(&path).map_err(|e| Error::from_io(&path, e))
    }

    /// Write a file. Writes always land in the cache store.
    pub fn write(&self, path: &str, contents: &[u8]) -> Result<()> {
        let path = path::normalize(path);
        self.fs.write(&path, contents)?;
        Ok(())
    }

    /// Evict cached outputs built from `changed`.
    ///
    /// Returns every destination path `changed` is a source for, whether or
    /// not it had been built yet, sorted.
    pub fn invalidate(&self, changed: &str) -> Result<Vec<String>> {
        let changed = path::normalize(changed);
        let ext = path::extension(&changed);
        let mut derived = Vec::new();
        if ext.is_empty() {
            return Ok(derived);
        }

        for (dst_ext, rules) in &self.rules {
            if !rules.iter().any(|rule| rule.src_ext == ext) {
                continue;
            }
            let dst = path::replace_extension(&changed, dst_ext);
            self.evict(&dst)?;
            derived.push(dst);
        }

        derived.sort();
        Ok(derived)
    }

    /// Remove a cached output once no build of it is in flight.
    ///
    /// A build that read the old source still holds the gate, so its output
    /// lands before the removal instead of after it.
    fn evict(&self, dst: &str) -> Result<()> {
        let gate = self.gate(dst);
        let _guard = gate.lock().unwrap_or_else(PoisonError::into_inner);
        let removed = match self.fs.overlay().remove(dst) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        };
        self.release(dst, &gate);
        removed
    }

    fn gate(&self, dst: &str) -> Arc<Mutex<()>> {
        Arc::clone(&self.building.entry(dst.to_string()).or_default())
    }

    /// Drop the gate for `dst` unless another thread is waiting on it.
    fn release(&self, dst: &str, gate: &Arc<Mutex<()>>) {
        self.building
            .remove_if(dst, |_, held| Arc::ptr_eq(held, gate) && Arc::strong_count(held) == 2);
    }

    /// Build `path` if a rule's source exists. `None` means no rule applied.
    fn ensure_built(&self, path: &str) -> Result<Option<Vec<u8>>> {
        let Some(rules) = self.rules.get(path::extension(path)) else {
            return Ok(None);
        };

        for rule in rules {
            let src = path::replace_extension(path, &rule.src_ext);
            if self.fs.exists(&src)? {
                return self.build(path, &src, rule).map(Some);
            }
        }
        Ok(None)
    }

    fn build(&self, dst: &str, src: &str, rule: &Rule) -> Result<Vec<u8>> {
        if let Some(bytes) = self.cached(dst)? {
            return Ok(bytes);
        }

        // One build per destination at a time; latecomers reuse the output
        let gate = self.gate(dst);
        let _guard = gate.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(bytes) = self.cached(dst)? {
            return Ok(bytes);
        }

        let result = rule
            .transform
            .transform(&self.fs, dst, src)
            .map_err(|source| Error::Transform {
                dst: dst.to_string(),
                src: src.to_string(),
                source,
            })
            .and_then(|bytes| {
                self.fs.write(dst, &bytes)?;
                Ok(bytes)
            });
        self.release(dst, &gate);
        result
    }

    fn cached(&self, dst: &str) -> Result<Option<Vec<u8>>> {
        match self.fs.overlay().read(dst) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

fn dotted(ext: &str) -> String {
    if ext.starts_with('.') {
        ext.to_string()
    } else {
        format!(".{ext}")
    }
}
