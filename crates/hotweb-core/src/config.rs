use hotweb_util::path;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Export name a module declares to opt out of hot swapping.
pub const DEFAULT_RELOAD_EXPORT: &str = "noHMR";

/// File name of the browser bootstrap script.
pub const DEFAULT_CLIENT_MODULE: &str = "client.mjs";

/// Reserved path segment for the websocket and the bootstrap script.
pub const HOTWEB_SEGMENT: &str = "/.hotweb";

/// Default watcher interval in milliseconds.
pub const DEFAULT_WATCH_INTERVAL_MS: u64 = 100;

/// Default JSX factory function.
pub const DEFAULT_JSX_FACTORY: &str = "m";

/// Runtime configuration for a hotweb server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HotwebConfig {
    /// Directory tree being served and watched.
    pub serve_root: PathBuf,

    /// URL prefix the server is mounted under (empty for the root).
    pub mount_prefix: String,

    /// Request path prefixes (relative to the mount) that are never proxied.
    pub ignore_prefixes: Vec<String>,

    /// Export name that forces a full page reload instead of a hot swap.
    pub reload_export: String,

    /// File name of the bootstrap script under `/.hotweb/`.
    pub client_module_name: String,

    /// Extensions treated as JavaScript modules for proxying.
    pub module_extensions: Vec<String>,

    /// Coalescing window (and poll interval) for the watcher.
    pub watch_interval_ms: u64,

    /// Use the polling watcher instead of native OS notifications.
    pub poll_watch: bool,

    /// Enable console logging in the bootstrap script.
    pub debug: bool,

    /// Persist derived artifacts here instead of in memory.
    pub cache_dir: Option<PathBuf>,

    /// Function JSX elements compile to.
    pub jsx_factory: String,
}

impl Default for HotwebConfig {
    fn default() -> Self {
        Self {
            serve_root: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            mount_prefix: String::new(),
            ignore_prefixes: Vec::new(),
            reload_export: DEFAULT_RELOAD_EXPORT.to_string(),
            client_module_name: DEFAULT_CLIENT_MODULE.to_string(),
            module_extensions: vec![".mjs".to_string(), ".js".to_string(), ".jsx".to_string()],
            watch_interval_ms: DEFAULT_WATCH_INTERVAL_MS,
            poll_watch: false,
            debug: false,
            cache_dir: None,
            jsx_factory: DEFAULT_JSX_FACTORY.to_string(),
        }
    }
}

impl HotwebConfig {
    /// Create a new config serving the given directory.
    #[must_use]
    pub fn new(serve_root: PathBuf) -> Self {
        Self {
            serve_root,
            ..Default::default()
        }
    }

    /// Set the mount prefix. Trailing slashes are dropped and a leading slash is added.
    #[must_use]
    pub fn with_mount_prefix(mut self, prefix: &str) -> Self {
        let trimmed = prefix.trim_matches('/');
        self.mount_prefix = if trimmed.is_empty() {
            String::new()
        } else {
            format!("/{trimmed}")
        };
        self
    }

    /// Set ignored path prefixes. Empty entries are dropped.
    #[must_use]
    pub fn with_ignore_prefixes<I, S>(mut self, prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ignore_prefixes = prefixes
            .into_iter()
            .map(Into::into)
            .filter(|p: &String| !p.is_empty())
            .collect();
        self
    }

    /// Set the opt-out export name.
    #[must_use]
    pub fn with_reload_export(mut self, name: impl Into<String>) -> Self {
        self.reload_export = name.into();
        self
    }

    /// Set the watcher interval.
    #[must_use]
    pub fn with_watch_interval_ms(mut self, ms: u64) -> Self {
        self.watch_interval_ms = ms;
        self
    }

    /// Use the polling watcher.
    #[must_use]
    pub fn with_poll_watch(mut self, poll: bool) -> Self {
        self.poll_watch = poll;
        self
    }

    /// Set the bootstrap debug flag.
    #[must_use]
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Persist derived artifacts on disk.
    #[must_use]
    pub fn with_cache_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.cache_dir = dir;
        self
    }

    /// Set the JSX factory.
    #[must_use]
    pub fn with_jsx_factory(mut self, factory: impl Into<String>) -> Self {
        self.jsx_factory = factory.into();
        self
    }

    #[must_use]
    pub fn watch_interval(&self) -> Duration {
        Duration::from_millis(self.watch_interval_ms)
    }

    /// Websocket endpoint, including the mount prefix.
    #[must_use]
    pub fn websocket_path(&self) -> String {
        format!("{}{HOTWEB_SEGMENT}", self.mount_prefix)
    }

    /// Bootstrap script URL path, including the mount prefix.
    #[must_use]
    pub fn client_module_path(&self) -> String {
        format!(
            "{}{HOTWEB_SEGMENT}/{}",
            self.mount_prefix, self.client_module_name
        )
    }

    /// Whether `path` (relative to the mount) falls under an ignore prefix.
    #[must_use]
    pub fn is_ignored(&self, path: &str) -> bool {
        self.ignore_prefixes
            .iter()
            .any(|prefix| path.starts_with(prefix.as_str()))
    }

    /// Whether `path` has one of the module extensions.
    #[must_use]
    pub fn is_module(&self, path: &str) -> bool {
        let ext = path::extension(path);
        !ext.is_empty() && self.module_extensions.iter().any(|e| e == ext)
    }

    /// Whether a request for `path` (relative to the mount) gets a proxy module.
    ///
    /// Requests carrying a query string never do; callers check that separately.
    #[must_use]
    pub fn should_proxy(&self, path: &str) -> bool {
        self.is_module(path) && !self.is_ignored(path) && !path::is_hidden(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = HotwebConfig::new(PathBuf::from("/srv"));
        assert_eq!(config.reload_export, "noHMR");
        assert_eq!(config.jsx_factory, "m");
        assert_eq!(config.watch_interval(), Duration::from_millis(100));
        assert_eq!(config.websocket_path(), "/.hotweb");
        assert_eq!(config.client_module_path(), "/.hotweb/client.mjs");
    }

    #[test]
    fn test_mount_prefix_normalized() {
        let config = HotwebConfig::default().with_mount_prefix("ui/");
        assert_eq!(config.mount_prefix, "/ui");
        assert_eq!(config.websocket_path(), "/ui/.hotweb");
        assert_eq!(config.client_module_path(), "/ui/.hotweb/client.mjs");

        let root = HotwebConfig::default().with_mount_prefix("/");
        assert_eq!(root.mount_prefix, "");
    }

    #[test]
    fn test_should_proxy() {
        let config = HotwebConfig::default().with_ignore_prefixes(["/vendor", ""]);
        assert_eq!(config.ignore_prefixes, vec!["/vendor".to_string()]);

        assert!(config.should_proxy("/app.js"));
        assert!(config.should_proxy("/lib/page.mjs"));
        assert!(config.should_proxy("/lib/hero.jsx"));
        assert!(!config.should_proxy("/style.css"));
        assert!(!config.should_proxy("/index.html"));
        assert!(!config.should_proxy("/vendor/preact.js"));
        assert!(!config.should_proxy("/lib/_private.js"));
        assert!(!config.should_proxy("/.eslintrc.js"));
        assert!(!config.should_proxy("/Makefile"));
    }

    #[test]
    fn test_deserialize_partial() {
        let config: HotwebConfig =
            serde_json::from_str(r#"{"serve_root": "/srv", "debug": true}"#).unwrap();
        assert_eq!(config.serve_root, PathBuf::from("/srv"));
        assert!(config.debug);
        assert_eq!(config.client_module_name, "client.mjs");
    }
}
