//! Origin-scoped key/value storage shared by every tab of an origin.
//!
//! Writes made by one tab are announced to the other tabs as
//! [`StorageEvent`]s; a tab never observes its own writes through its
//! subscription.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;

use crate::errors::StorageError;

const EVENT_CAPACITY: usize = 64;

static NEXT_SOURCE_ID: AtomicU64 = AtomicU64::new(1);

/// Allocate an identifier for a new writer (tab).
pub fn next_source_id() -> u64 {
    NEXT_SOURCE_ID.fetch_add(1, Ordering::Relaxed)
}

/// A change to one key, as seen by other tabs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StorageEvent {
    pub key: String,
    /// `None` when the key was removed
    pub new_value: Option<String>,
    /// Writer that made the change
    pub source: u64,
}

/// Receives storage events written by other tabs.
pub struct StorageSubscription {
    rx: broadcast::Receiver<StorageEvent>,
    own_source: u64,
}

impl StorageSubscription {
    pub fn new(rx: broadcast::Receiver<StorageEvent>, own_source: u64) -> Self {
        Self { rx, own_source }
    }

    /// Next event from another tab, or `None` once the storage is gone.
    pub async fn recv(&mut self) -> Option<StorageEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) if event.source == self.own_source => continue,
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "storage subscription lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// Synchronous origin storage, the analogue of `localStorage`.
pub trait OriginStorage: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Remove `key`. Removing a missing key succeeds.
    fn remove(&self, key: &str) -> Result<(), StorageError>;

    /// Subscribe to changes made through other handles.
    fn subscribe(&self) -> StorageSubscription;
}

// ============================================================================
// In-Memory Origin
// ============================================================================

struct OriginInner {
    entries: Mutex<HashMap<String, String>>,
    events: broadcast::Sender<StorageEvent>,
}

/// In-process origin storage.
///
/// Each handle acts as one tab: [`MemoryOrigin::tab`] returns another handle
/// over the same entries with its own writer identity.
#[derive(Clone)]
pub struct MemoryOrigin {
    inner: Arc<OriginInner>,
    source: u64,
}

impl MemoryOrigin {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(OriginInner {
                entries: Mutex::new(HashMap::new()),
                events,
            }),
            source: next_source_id(),
        }
    }

    /// Another tab of the same origin.
    pub fn tab(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            source: next_source_id(),
        }
    }

    /// Snapshot of every stored key.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.inner.entries.lock().keys().cloned().collect();
        keys.sort();
        keys
    }

    fn announce(&self, key: &str, new_value: Option<String>) {
        // No receivers is fine
        let _ = self.inner.events.send(StorageEvent {
            key: key.to_string(),
            new_value,
            source: self.source,
        });
    }
}

impl Default for MemoryOrigin {
    fn default() -> Self {
        Self::new()
    }
}

impl OriginStorage for MemoryOrigin {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.inner.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.inner
            .entries
            .lock()
            .insert(key.to_string(), value.to_string());
        self.announce(key, Some(value.to_string()));
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let removed = self.inner.entries.lock().remove(key);
        if removed.is_some() {
            self.announce(key, None);
        }
        Ok(())
    }

    fn subscribe(&self) -> StorageSubscription {
        StorageSubscription::new(self.inner.events.subscribe(), self.source)
    }
}
