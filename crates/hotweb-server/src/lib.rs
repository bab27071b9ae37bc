#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::needless_pass_by_value)]

//! Live-reload server for hotweb.
//!
//! [`Hotweb`] ties a build filesystem to connected browsers:
//! - module requests are answered with proxies that re-import on change
//! - a websocket at `<prefix>/.hotweb` pushes change notifications
//! - a file watcher turns edits under the serve root into notifications
//!
//! ```no_run
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! use hotweb_core::HotwebConfig;
//! use hotweb_server::Hotweb;
//! use std::sync::Arc;
//!
//! let hotweb = Arc::new(Hotweb::new(HotwebConfig::new("site".into()))?);
//! let _watch = hotweb.watch()?;
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:8080").await?;
//! axum::serve(listener, hotweb.router()).await?;
//! # Ok(())
//! # }
//! ```

pub mod registry;
mod routes;
pub mod watch;

pub use registry::{ChangeMessage, ClientId, ClientRegistry};
pub use watch::{WatchError, WatchHandle};

use axum::Router;
use hotweb_core::{
    exports, DirStore, Error, HotwebConfig, MakeFs, MemStore, ModuleProxy, ReadOnlyStore, Store,
    SwcTransform, Transform, TransformError,
};
use hotweb_util::path;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Extensions compiled to `.js` on request, in lookup order.
pub const COMPILED_EXTENSIONS: [&str; 3] = [".jsx", ".tsx", ".ts"];

/// A live-reload server instance.
pub struct Hotweb {
    config: HotwebConfig,
    fs: Arc<MakeFs>,
    clients: ClientRegistry,
}

impl Hotweb {
    /// Serve `config.serve_root`, compiling JSX and TypeScript on request.
    ///
    /// Build outputs are kept in memory, or under `config.cache_dir` when set.
    pub fn new(config: HotwebConfig) -> hotweb_core::Result<Self> {
        if !config.serve_root.is_dir() {
            return Err(Error::NotFound {
                path: config.serve_root.display().to_string(),
            });
        }

        let source = ReadOnlyStore(DirStore::new(config.serve_root.clone()));
        let mut fs = match &config.cache_dir {
            Some(dir) => {
                std::fs::create_dir_all(dir)?;
                MakeFs::new(source, DirStore::new(dir.clone()))
            }
            None => MakeFs::new(source, MemStore::new()),
        };
        register_compilers(&mut fs, &config.jsx_factory);

        Ok(Self::with_fs(config, fs))
    }

    /// Serve from a prepared filesystem. `config.serve_root` is still the
    /// directory [`Hotweb::watch`] watches.
    pub fn with_fs(config: HotwebConfig, fs: MakeFs) -> Self {
        Self {
            config,
            fs: Arc::new(fs),
            clients: ClientRegistry::new(),
        }
    }

    pub fn config(&self) -> &HotwebConfig {
        &self.config
    }

    pub fn fs(&self) -> &MakeFs {
        &self.fs
    }

    pub fn clients(&self) -> &ClientRegistry {
        &self.clients
    }

    /// Tell every connected client that `path` (relative to the mount) changed.
    ///
    /// Returns the number of clients notified.
    pub fn notify(&self, path: &str) -> usize {
        self.clients
            .broadcast(&ChangeMessage::new(self.public_path(path)))
    }

    /// Decoded request path for a path relative to the mount. Change
    /// messages and proxy `accept` keys both use this form.
    fn public_path(&self, path: &str) -> String {
        format!("{}{}", self.config.mount_prefix, path::normalize(path))
    }

    /// Proxy module source for the module at `path` (relative to the mount),
    /// requested as `request_path`.
    pub fn proxy_source(&self, request_path: &str, path: &str) -> hotweb_core::Result<String> {
        let source = self.fs.read(path)?;
        let names = exports(&source)?;
        let client_path = self.config.client_module_path();
        let key = self.public_path(path);
        let proxy = ModuleProxy::new(
            request_path,
            &names,
            &client_path,
            &self.config.reload_export,
        )
        .accept_as(&key);
        Ok(proxy.render())
    }

    /// Start watching the serve root and broadcasting changes.
    ///
    /// Watching stops when the returned handle is dropped.
    pub fn watch(self: &Arc<Self>) -> Result<WatchHandle, WatchError> {
        watch::start(Arc::clone(self))
    }

    /// HTTP routes for this instance.
    pub fn router(self: &Arc<Self>) -> Router {
        routes::router(Arc::clone(self))
    }
}

impl std::fmt::Debug for Hotweb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hotweb")
            .field("config", &self.config)
            .field("clients", &self.clients.len())
            .finish_non_exhaustive()
    }
}

fn register_compilers(fs: &mut MakeFs, jsx_factory: &str) {
    let swc = Arc::new(SwcTransform::new(jsx_factory));
    for src_ext in COMPILED_EXTENSIONS {
        let swc = Arc::clone(&swc);
        fs.register(
            ".js",
            src_ext,
            move |store: &dyn Store, dst: &str, src: &str| -> Result<Vec<u8>, TransformError> {
                let start = Instant::now();
                let result = swc.transform(store, dst, src);
                match &result {
                    Ok(bytes) => debug!(
                        dst,
                        src,
                        bytes = bytes.len(),
                        duration_ms = start.elapsed().as_millis() as u64,
                        "Compiled module"
                    ),
                    Err(error) => debug!(dst, src, %error, "Compile failed"),
                }
                result
            },
        );
    }
}
