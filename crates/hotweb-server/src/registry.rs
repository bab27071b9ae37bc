//! Connected browser clients.
//!
//! Every websocket gets its own unbounded channel; broadcasting never waits on
//! a client.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;

/// Identifier handed out by [`ClientRegistry::register`].
pub type ClientId = u64;

/// Change notification sent to every client as a JSON text frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeMessage {
    /// Changed request path, including the mount prefix.
    pub path: String,
    /// Milliseconds since the Unix epoch; used as the cache-busting token.
    pub ts: u64,
}

impl ChangeMessage {
    /// A notification for `path` stamped with the current time.
    #[must_use]
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ts: now_ms(),
        }
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Registry of live client channels. Cloning shares the registry.
#[derive(Debug, Clone, Default)]
pub struct ClientRegistry {
    clients: Arc<DashMap<ClientId, mpsc::UnboundedSender<ChangeMessage>>>,
    next_id: Arc<AtomicU64>,
}

impl ClientRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a client. Messages broadcast from now on arrive on the receiver.
    pub fn register(&self) -> (ClientId, mpsc::UnboundedReceiver<ChangeMessage>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        self.clients.insert(id, tx);
        (id, rx)
    }

    /// Drop a client. Returns whether it was registered.
    pub fn remove(&self, id: ClientId) -> bool {
        self.clients.remove(&id).is_some()
    }

    /// Queue `msg` for every client and return how many accepted it.
    ///
    /// Clients whose receiver is gone are removed.
    pub fn broadcast(&self, msg: &ChangeMessage) -> usize {
        let mut delivered = 0;
        let mut dead = Vec::new();
        for entry in self.clients.iter() {
            if entry.value().send(msg.clone()).is_ok() {
                delivered += 1;
            } else {
                dead.push(*entry.key());
            }
        }
        // Removal takes a shard write lock, so it waits until iteration is done
        for id in dead {
            self.clients.remove(&id);
        }
        delivered
    }

    /// Drop every client channel. Open websocket sessions end once their
    /// pending messages are flushed.
    pub fn disconnect_all(&self) {
        self.clients.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
