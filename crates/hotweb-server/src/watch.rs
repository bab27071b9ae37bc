//! File watching for the serve root.
//!
//! The notify callback runs on notify's own thread and only forwards into a
//! tokio channel. The broadcast loop coalesces bursts of events, evicts stale
//! build outputs, and notifies every connected client.

use crate::Hotweb;
use hotweb_util::path;
use notify::event::{CreateKind, MetadataKind, ModifyKind, RemoveKind, RenameMode};
use notify::{Config, Event, EventKind, PollWatcher, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::{debug, info, trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Change {
    Written,
    Removed,
}

#[derive(Debug)]
enum WatchMessage {
    Change(PathBuf, Change),
    Error(String),
}

/// A running watcher. Dropping it stops watching; the broadcast loop exits
/// once the watcher's channel closes.
pub struct WatchHandle {
    watcher: Box<dyn Watcher + Send>,
    task: JoinHandle<()>,
}

impl WatchHandle {
    /// Stop watching and wait for already-queued changes to be broadcast.
    pub async fn stop(self) {
        drop(self.watcher);
        if let Err(e) = self.task.await {
            warn!(error = %e, "Broadcast loop ended abnormally");
        }
    }
}

impl std::fmt::Debug for WatchHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchHandle")
            .field("finished", &self.task.is_finished())
            .finish_non_exhaustive()
    }
}

/// Start watching `hotweb`'s serve root. Must be called within a tokio runtime.
pub(crate) fn start(hotweb: Arc<Hotweb>) -> Result<WatchHandle, WatchError> {
    let config = hotweb.config();
    let root = std::fs::canonicalize(&config.serve_root).map_err(|e| {
        WatchError::InvalidRoot(format!("{}: {e}", config.serve_root.display()))
    })?;
    if !root.is_dir() {
        return Err(WatchError::InvalidRoot(root.display().to_string()));
    }

    let (tx, rx) = mpsc::unbounded_channel();
    let handler = move |res: Result<Event, notify::Error>| forward(&tx, res);

    let mut watcher: Box<dyn Watcher + Send> = if config.poll_watch {
        let poll = Config::default().with_poll_interval(config.watch_interval());
        Box::new(
            PollWatcher::new(handler, poll)
                .map_err(|e| WatchError::WatcherFailed(e.to_string()))?,
        )
    } else {
        Box::new(
            RecommendedWatcher::new(handler, Config::default())
                .map_err(|e| WatchError::WatcherFailed(e.to_string()))?,
        )
    };

    watcher
        .watch(&root, RecursiveMode::Recursive)
        .map_err(|e| WatchError::WatcherFailed(e.to_string()))?;

    info!(
        root = %root.display(),
        poll = config.poll_watch,
        interval_ms = config.watch_interval_ms,
        "Watching directory"
    );

    let scope = Scope {
        cache_dir: config
            .cache_dir
            .as_ref()
            .and_then(|dir| std::fs::canonicalize(dir).ok()),
        root,
    };
    let task = tokio::spawn(broadcast_loop(hotweb, scope, rx));

    Ok(WatchHandle { watcher, task })
}

/// Runs on the notify thread.
fn forward(tx: &mpsc::UnboundedSender<WatchMessage>, res: Result<Event, notify::Error>) {
    let event = match res {
        Ok(event) => event,
        Err(e) => {
            let _ = tx.send(WatchMessage::Error(e.to_string()));
            return;
        }
    };

    if event.kind == EventKind::Modify(ModifyKind::Name(RenameMode::Both)) {
        let mut paths = event.paths.into_iter();
        if let Some(from) = paths.next() {
            let _ = tx.send(WatchMessage::Change(from, Change::Removed));
        }
        for to in paths {
            let _ = tx.send(WatchMessage::Change(to, Change::Written));
        }
        return;
    }

    let Some(change) = classify(&event.kind) else {
        return;
    };
    for path in event.paths {
        let _ = tx.send(WatchMessage::Change(path, change));
    }
}

fn classify(kind: &EventKind) -> Option<Change> {
    match kind {
        EventKind::Create(CreateKind::File | CreateKind::Any)
        | EventKind::Modify(
            ModifyKind::Any
            | ModifyKind::Data(_)
            | ModifyKind::Name(RenameMode::To)
            | ModifyKind::Metadata(MetadataKind::WriteTime),
        ) => Some(Change::Written),
        EventKind::Remove(RemoveKind::File | RemoveKind::Any)
        | EventKind::Modify(ModifyKind::Name(RenameMode::From)) => Some(Change::Removed),
        _ => None,
    }
}

async fn broadcast_loop(
    hotweb: Arc<Hotweb>,
    scope: Scope,
    mut rx: mpsc::UnboundedReceiver<WatchMessage>,
) {
    let window = hotweb.config().watch_interval();
    let mut pending: BTreeMap<PathBuf, Change> = BTreeMap::new();
    let mut flush_at: Option<Instant> = None;

    loop {
        tokio::select! {
            msg = rx.recv() => match msg {
                Some(WatchMessage::Change(path, change)) => {
                    pending.insert(path, change);
                    if flush_at.is_none() {
                        flush_at = Some(Instant::now() + window);
                    }
                }
                Some(WatchMessage::Error(error)) => {
                    warn!(%error, "Watcher error");
                }
                None => {
                    debug!("Watcher channel closed, stopping broadcast loop");
                    break;
                }
            },
            () = time::sleep_until(flush_at.unwrap_or_else(Instant::now)), if flush_at.is_some() => {
                flush_at = None;
                for (path, change) in std::mem::take(&mut pending) {
                    scope.apply(&hotweb, &path, change);
                }
            }
        }
    }

    for (path, change) in pending {
        scope.apply(&hotweb, &path, change);
    }
}

struct Scope {
    root: PathBuf,
    cache_dir: Option<PathBuf>,
}

impl Scope {
    fn apply(&self, hotweb: &Hotweb, path: &Path, change: Change) {
        if self
            .cache_dir
            .as_deref()
            .is_some_and(|dir| path.starts_with(dir))
        {
            return;
        }
        let Some(changed) = path::to_virtual(&self.root, path) else {
            trace!(path = %path.display(), "Ignoring change outside the serve root");
            return;
        };
        if change == Change::Written && path.is_dir() {
            return;
        }

        let derived = match hotweb.fs().invalidate(&changed) {
            Ok(derived) => derived,
            Err(error) => {
                warn!(path = %changed, %error, "Failed to evict build outputs");
                Vec::new()
            }
        };

        if change == Change::Removed {
            debug!(path = %changed, evicted = derived.len(), "File removed");
            return;
        }

        for notified in notify_paths(&changed, derived) {
            let clients = hotweb.notify(&notified);
            debug!(path = %notified, clients, "Broadcast change");
        }
    }
}

/// The changed path followed by every derived path the clients would not
/// already match by prefix.
fn notify_paths(changed: &str, derived: Vec<String>) -> Vec<String> {
    let mut paths = vec![changed.to_string()];
    paths.extend(derived.into_iter().filter(|dst| !changed.starts_with(dst.as_str())));
    paths
}

/// Watcher error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchError {
    InvalidRoot(String),
    WatcherFailed(String),
}

impl std::fmt::Display for WatchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidRoot(root) => write!(f, "Invalid watch root: {root}"),
            Self::WatcherFailed(msg) => write!(f, "Watcher failed: {msg}"),
        }
    }
}

impl std::error::Error for WatchError {}
