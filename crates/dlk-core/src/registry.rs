//! Cross-tab coordination through origin storage.
//!
//! The pending registry lists request ids that some tab of this origin is
//! waiting on. The response channel carries a raw response from the tab the
//! wallet redirected into over to the tab that holds the pending request.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::StorageError;
use crate::response::ResponseParams;
use crate::storage::OriginStorage;

// ============================================================================
// Tab Role
// ============================================================================

/// Which side of a cross-tab exchange this page instance is on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TabRole {
    /// Holds (or may hold) the pending request; processes responses locally.
    Original,
    /// Opened fresh by the wallet's redirect; forwards responses.
    Responder,
}

/// Decide this tab's role from its own pending ids and the shared registry.
///
/// A tab with nothing pending while other tabs have outstanding requests was
/// most likely opened by the wallet redirect.
pub fn resolve_tab_role<L, R>(local_ids: &[L], registry_ids: &[R]) -> TabRole
where
    L: AsRef<str>,
    R: AsRef<str>,
{
    if local_ids.is_empty() && !registry_ids.is_empty() {
        TabRole::Responder
    } else {
        TabRole::Original
    }
}

// ============================================================================
// Pending Registry
// ============================================================================

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegistryEntry {
    id: String,
    /// Unix millis after which the entry is ignored
    expires_at: i64,
}

/// Stored forms of the registry. Older writers stored bare ids.
#[derive(Deserialize)]
#[serde(untagged)]
enum StoredEntry {
    Entry(RegistryEntry),
    Bare(String),
}

/// Ordered set of outstanding request ids shared by every tab.
pub struct PendingRegistry {
    storage: Arc<dyn OriginStorage>,
    key: String,
}

impl PendingRegistry {
    pub fn new(storage: Arc<dyn OriginStorage>, key: impl Into<String>) -> Self {
        Self {
            storage,
            key: key.into(),
        }
    }

    /// Unexpired ids, oldest first.
    pub fn ids(&self, now_ms: i64) -> Vec<String> {
        self.live_entries(now_ms).into_iter().map(|e| e.id).collect()
    }

    /// Add `id` with the given deadline, dropping expired entries.
    pub fn add(&self, id: &str, expires_at_ms: i64, now_ms: i64) -> Result<(), StorageError> {
        let mut entries = self.live_entries(now_ms);
        entries.retain(|e| e.id != id);
        entries.push(RegistryEntry {
            id: id.to_string(),
            expires_at: expires_at_ms,
        });
        self.write(&entries)
    }

    /// Remove `id`. Removing an absent id is a no-op.
    pub fn remove(&self, id: &str, now_ms: i64) -> Result<(), StorageError> {
        let before = self.read_entries();
        let entries: Vec<RegistryEntry> = before
            .iter()
            .filter(|e| e.id != id && e.expires_at > now_ms)
            .cloned()
            .collect();
        if entries.len() == before.len() {
            return Ok(());
        }
        self.write(&entries)
    }

    fn live_entries(&self, now_ms: i64) -> Vec<RegistryEntry> {
        let mut entries = self.read_entries();
        entries.retain(|e| e.expires_at > now_ms);
        entries
    }

    fn read_entries(&self) -> Vec<RegistryEntry> {
        let raw = match self.storage.get(&self.key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(e) => {
                debug!(error = %e, "pending registry unreadable");
                return Vec::new();
            }
        };
        let stored: Vec<StoredEntry> = match serde_json::from_str(&raw) {
            Ok(stored) => stored,
            Err(e) => {
                debug!(error = %e, "pending registry malformed");
                return Vec::new();
            }
        };
        stored
            .into_iter()
            .map(|entry| match entry {
                StoredEntry::Entry(entry) => entry,
                // Bare ids carry no deadline
                StoredEntry::Bare(id) => RegistryEntry {
                    id,
                    expires_at: i64::MAX,
                },
            })
            .collect()
    }

    fn write(&self, entries: &[RegistryEntry]) -> Result<(), StorageError> {
        if entries.is_empty() {
            return self.storage.remove(&self.key);
        }
        let raw = serde_json::to_string(entries)?;
        self.storage.set(&self.key, &raw)
    }
}

// ============================================================================
// Response Channel
// ============================================================================

/// Slot holding the most recent unclaimed forwarded response.
pub struct ResponseChannel {
    storage: Arc<dyn OriginStorage>,
    key: String,
}

impl ResponseChannel {
    pub fn new(storage: Arc<dyn OriginStorage>, key: impl Into<String>) -> Self {
        Self {
            storage,
            key: key.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Publish a raw response for the original tab.
    pub fn publish(&self, params: &ResponseParams) -> Result<(), StorageError> {
        let raw = serde_json::to_string(params)?;
        self.storage.set(&self.key, &raw)
    }

    /// Parse a value written to the channel key.
    pub fn decode(raw: &str) -> Option<ResponseParams> {
        serde_json::from_str(raw).ok()
    }

    /// Remove the current response.
    pub fn clear(&self) -> Result<(), StorageError> {
        self.storage.remove(&self.key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryOrigin;

    const KEY: &str = "phantom_pending_requests";

    fn registry() -> (PendingRegistry, MemoryOrigin) {
        let origin = MemoryOrigin::new();
        (PendingRegistry::new(Arc::new(origin.clone()), KEY), origin)
    }

    #[test]
    fn test_tab_role() {
        let none: [&str; 0] = [];
        assert_eq!(resolve_tab_role(&none, &["req_1"]), TabRole::Responder);
        assert_eq!(resolve_tab_role(&["req_1"], &["req_1"]), TabRole::Original);
        assert_eq!(resolve_tab_role(&["req_1"], &none), TabRole::Original);
        assert_eq!(resolve_tab_role(&none, &none), TabRole::Original);
    }

    #[test]
    fn test_add_and_remove() {
        let (registry, origin) = registry();
        registry.add("req_1", 1_000, 0).unwrap();
        registry.add("req_2", 1_000, 0).unwrap();
        registry.add("req_1", 2_000, 0).unwrap();
        assert_eq!(registry.ids(0), vec!["req_2", "req_1"]);

        registry.remove("req_2", 0).unwrap();
        registry.remove("req_2", 0).unwrap();
        assert_eq!(registry.ids(0), vec!["req_1"]);

        registry.remove("req_1", 0).unwrap();
        assert!(origin.get(KEY).unwrap().is_none());
    }

    #[test]
    fn test_expired_entries_are_ignored() {
        let (registry, _) = registry();
        registry.add("stale", 100, 0).unwrap();
        registry.add("fresh", 10_000, 0).unwrap();

        assert_eq!(registry.ids(500), vec!["fresh"]);

        // Adding prunes the stale entry from storage
        registry.add("next", 10_000, 500).unwrap();
        assert_eq!(registry.ids(0), vec!["fresh", "next"]);
    }

    #[test]
    fn test_bare_id_array_is_accepted() {
        let (registry, origin) = registry();
        origin.set(KEY, r#"["req_a","req_b"]"#).unwrap();
        assert_eq!(registry.ids(i64::MAX - 1), vec!["req_a", "req_b"]);

        origin.set(KEY, "garbage").unwrap();
        assert!(registry.ids(0).is_empty());
    }

    #[test]
    fn test_response_channel_publish_and_clear() {
        let origin = MemoryOrigin::new();
        let channel = ResponseChannel::new(Arc::new(origin.clone()), "chan");
        let mut params = ResponseParams::new();
        params.insert("nonce".to_string(), "n".to_string());

        channel.publish(&params).unwrap();
        let raw = origin.get("chan").unwrap().unwrap();
        assert_eq!(ResponseChannel::decode(&raw), Some(params));
        assert_eq!(ResponseChannel::decode("not json"), None);

        channel.clear().unwrap();
        assert!(origin.get("chan").unwrap().is_none());
    }
}
