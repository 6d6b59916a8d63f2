//! Per-origin key vault.
//!
//! The vault owns the dapp's single X25519 key pair. The pair is created
//! lazily on first `init()`, persisted through a [`KeyStore`] as an opaque
//! [`SealedKeyPair`], and used only through [`KeyVault::create_shared_secret`].

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::RwLock as AsyncRwLock;
use tracing::{debug, info};

use dlk_crypto::{SealedKeyPair, SharedSecret};

use crate::errors::{DeeplinkError, StorageError};

// ============================================================================
// Key Store Trait
// ============================================================================

/// Durable storage for the origin's sealed key pair.
///
/// Implementations store exactly one record; `save` replaces it atomically.
#[async_trait]
pub trait KeyStore: Send + Sync {
    /// Whether this store can hold keys in the current environment.
    fn is_available(&self) -> bool;

    /// Load the stored key pair.
    ///
    /// # Returns
    /// * `Ok(Some(pair))` if a pair is stored
    /// * `Ok(None)` if nothing is stored
    /// * `Err(StorageError)` if the operation fails
    async fn load(&self) -> Result<Option<SealedKeyPair>, StorageError>;

    /// Replace the stored key pair.
    async fn save(&self, pair: &SealedKeyPair) -> Result<(), StorageError>;

    /// Delete the stored key pair. Succeeds when nothing is stored.
    async fn delete(&self) -> Result<(), StorageError>;
}

// ============================================================================
// In-Memory Key Store
// ============================================================================

/// In-process key store.
///
/// Clones share the same slot, so several simulated tabs of one origin see
/// the same key pair.
#[derive(Clone, Default)]
pub struct MemoryKeyStore {
    slot: Arc<AsyncRwLock<Option<SealedKeyPair>>>,
    available: bool,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self {
            slot: Arc::new(AsyncRwLock::new(None)),
            available: true,
        }
    }

    /// A store that reports itself unavailable, like a browser without
    /// IndexedDB.
    pub fn unavailable() -> Self {
        Self {
            slot: Arc::new(AsyncRwLock::new(None)),
            available: false,
        }
    }
}

#[async_trait]
impl KeyStore for MemoryKeyStore {
    fn is_available(&self) -> bool {
        self.available
    }

    async fn load(&self) -> Result<Option<SealedKeyPair>, StorageError> {
        Ok(self.slot.read().await.clone())
    }

    async fn save(&self, pair: &SealedKeyPair) -> Result<(), StorageError> {
        *self.slot.write().await = Some(pair.clone());
        Ok(())
    }

    async fn delete(&self) -> Result<(), StorageError> {
        self.slot.write().await.take();
        Ok(())
    }
}

// ============================================================================
// Key Vault
// ============================================================================

/// Holds the origin's key pair and derives shared secrets from it.
pub struct KeyVault {
    store: Arc<dyn KeyStore>,
    current: RwLock<Option<SealedKeyPair>>,
}

impl KeyVault {
    /// Create a vault over `store`.
    ///
    /// # Errors
    /// * `EnvironmentUnsupported` if the store is not available
    pub fn new(store: Arc<dyn KeyStore>) -> Result<Self, DeeplinkError> {
        if !store.is_available() {
            return Err(DeeplinkError::EnvironmentUnsupported(
                "no durable key store available".to_string(),
            ));
        }
        Ok(Self {
            store,
            current: RwLock::new(None),
        })
    }

    /// Load the stored key pair or generate and persist a new one.
    ///
    /// Calling `init` again returns the same public key.
    pub async fn init(&self) -> Result<String, DeeplinkError> {
        if let Some(public_key) = self.public_key_base58() {
            return Ok(public_key);
        }

        let pair = match self.store.load().await? {
            Some(pair) => {
                debug!(public_key = %pair.public_key_base58(), "loaded stored key pair");
                pair
            }
            None => {
                let pair = SealedKeyPair::generate(chrono::Utc::now().timestamp());
                self.store.save(&pair).await?;
                info!(public_key = %pair.public_key_base58(), "generated new key pair");
                pair
            }
        };

        let mut current = self.current.write();
        // A concurrent init may have won; keep whichever landed first.
        let pair = current.get_or_insert(pair);
        Ok(pair.public_key_base58())
    }

    /// Public key of the held pair, `None` before `init`.
    pub fn public_key_base58(&self) -> Option<String> {
        self.current.read().as_ref().map(SealedKeyPair::public_key_base58)
    }

    /// Unix timestamp at which the held pair was generated.
    pub fn created_at_unix(&self) -> Option<i64> {
        self.current.read().as_ref().map(SealedKeyPair::created_at_unix)
    }

    /// Derive the shared secret with a peer's base58 public key.
    ///
    /// # Errors
    /// * `NotInitialized` before `init` or after `clear`
    /// * `InvalidPublicKey` if the peer key is malformed or low-order
    pub fn create_shared_secret(
        &self,
        their_public_key_base58: &str,
    ) -> Result<SharedSecret, DeeplinkError> {
        let current = self.current.read();
        let pair = current.as_ref().ok_or(DeeplinkError::NotInitialized)?;
        Ok(pair.diffie_hellman_base58(their_public_key_base58)?)
    }

    /// Delete the stored pair and forget the in-memory one.
    pub async fn clear(&self) -> Result<(), DeeplinkError> {
        self.current.write().take();
        self.store.delete().await?;
        info!("cleared key pair");
        Ok(())
    }
}

impl std::fmt::Debug for KeyVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyVault")
            .field("public_key", &self.public_key_base58())
            .finish_non_exhaustive()
    }
}
