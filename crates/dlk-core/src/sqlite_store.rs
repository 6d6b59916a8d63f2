//! SQLite-backed durable storage.
//!
//! One database file holds both the origin's sealed key pair and its
//! key/value origin storage, so a terminal driver keeps its identity and
//! wallet session across runs.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use tokio::sync::broadcast;

use dlk_crypto::SealedKeyPair;

use crate::errors::StorageError;
use crate::storage::{next_source_id, OriginStorage, StorageEvent, StorageSubscription};
use crate::vault::KeyStore;

// ============================================================================
// Schema Version
// ============================================================================

/// Current schema version for migrations.
const SCHEMA_VERSION: i32 = 1;

const EVENT_CAPACITY: usize = 64;

fn op_failed(context: &str) -> impl Fn(rusqlite::Error) -> StorageError + '_ {
    move |e| StorageError::OperationFailed(format!("{context}: {e}"))
}

// ============================================================================
// SQLite Store Implementation
// ============================================================================

/// SQLite-based persistent store.
///
/// Writes are single statements, so each record is replaced atomically.
/// Storage events are only delivered to subscribers in this process.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    events: broadcast::Sender<StorageEvent>,
    source: u64,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and run migrations.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let conn = Connection::open(path).map_err(op_failed("failed to open database"))?;

        // WAL lets a second process read while we write
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(op_failed("failed to set pragmas"))?;

        Self::from_connection(conn)
    }

    /// In-memory database for tests.
    pub fn new_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory().map_err(op_failed("failed to open in-memory database"))?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, StorageError> {
        Self::run_migrations(&conn)?;
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            events,
            source: next_source_id(),
        })
    }

    fn run_migrations(conn: &Connection) -> Result<(), StorageError> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY
            )",
            [],
        )
        .map_err(op_failed("failed to create schema_version"))?;

        let current_version: i32 = conn
            .query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |row| {
                row.get(0)
            })
            .map_err(op_failed("failed to read schema version"))?;

        if current_version < 1 {
            Self::migrate_v1(conn)?;
        }
        debug_assert!(current_version <= SCHEMA_VERSION);
        Ok(())
    }

    fn migrate_v1(conn: &Connection) -> Result<(), StorageError> {
        conn.execute_batch(
            r#"
            -- The origin's single key pair
            CREATE TABLE IF NOT EXISTS key_pair (
                slot INTEGER PRIMARY KEY CHECK (slot = 1),
                sealed TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );

            -- Origin key/value storage
            CREATE TABLE IF NOT EXISTS origin_storage (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            INSERT INTO schema_version (version) VALUES (1);
            "#,
        )
        .map_err(op_failed("migration v1 failed"))
    }

    fn announce(&self, key: &str, new_value: Option<String>) {
        let _ = self.events.send(StorageEvent {
            key: key.to_string(),
            new_value,
            source: self.source,
        });
    }
}

// ============================================================================
// Key Store
// ============================================================================

#[async_trait]
impl KeyStore for SqliteStore {
    fn is_available(&self) -> bool {
        true
    }

    async fn load(&self) -> Result<Option<SealedKeyPair>, StorageError> {
        let sealed: Option<String> = self
            .conn
            .lock()
            .query_row("SELECT sealed FROM key_pair WHERE slot = 1", [], |row| row.get(0))
            .optional()
            .map_err(op_failed("failed to load key pair"))?;

        sealed
            .map(|raw| serde_json::from_str(&raw).map_err(StorageError::from))
            .transpose()
    }

    async fn save(&self, pair: &SealedKeyPair) -> Result<(), StorageError> {
        let sealed = serde_json::to_string(pair)?;
        self.conn
            .lock()
            .execute(
                "INSERT OR REPLACE INTO key_pair (slot, sealed, created_at) VALUES (1, ?1, ?2)",
                params![sealed, pair.created_at_unix()],
            )
            .map_err(op_failed("failed to save key pair"))?;
        Ok(())
    }

    async fn delete(&self) -> Result<(), StorageError> {
        self.conn
            .lock()
            .execute("DELETE FROM key_pair", [])
            .map_err(op_failed("failed to delete key pair"))?;
        Ok(())
    }
}

// ============================================================================
// Origin Storage
// ============================================================================

impl OriginStorage for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.conn
            .lock()
            .query_row(
                "SELECT value FROM origin_storage WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .map_err(op_failed("failed to read origin storage"))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.conn
            .lock()
            .execute(
                "INSERT OR REPLACE INTO origin_storage (key, value) VALUES (?1, ?2)",
                params![key, value],
            )
            .map_err(op_failed("failed to write origin storage"))?;
        self.announce(key, Some(value.to_string()));
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let removed = self
            .conn
            .lock()
            .execute("DELETE FROM origin_storage WHERE key = ?1", params![key])
            .map_err(op_failed("failed to delete from origin storage"))?;
        if removed > 0 {
            self.announce(key, None);
        }
        Ok(())
    }

    fn subscribe(&self) -> StorageSubscription {
        StorageSubscription::new(self.events.subscribe(), self.source)
    }
}
