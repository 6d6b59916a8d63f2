//! Wallet session persistence.
//!
//! Only the non-sensitive part of a session is written to origin storage:
//! wallet address, session token and the wallet's encryption public key.
//! The shared secret is re-derived through the [`KeyVault`] on every load,
//! so clearing the vault invalidates every stored session.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use dlk_crypto::SharedSecret;

use crate::errors::DeeplinkError;
use crate::storage::OriginStorage;
use crate::vault::KeyVault;

// ============================================================================
// Session
// ============================================================================

/// An established (or partially established) wallet session.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Session {
    pub session_token: Option<String>,
    pub wallet_address: Option<String>,
    pub peer_public_key_base58: Option<String>,
    shared_secret: Option<SharedSecret>,
}

impl Session {
    pub fn new(
        wallet_address: impl Into<String>,
        session_token: impl Into<String>,
        peer_public_key_base58: impl Into<String>,
    ) -> Self {
        Self {
            session_token: Some(session_token.into()),
            wallet_address: Some(wallet_address.into()),
            peer_public_key_base58: Some(peer_public_key_base58.into()),
            shared_secret: None,
        }
    }

    /// Attach the in-memory shared secret.
    pub fn with_shared_secret(mut self, secret: SharedSecret) -> Self {
        self.shared_secret = Some(secret);
        self
    }

    pub fn shared_secret(&self) -> Option<&SharedSecret> {
        self.shared_secret.as_ref()
    }

    /// True iff token, wallet address and shared secret are all present.
    pub fn is_valid(&self) -> bool {
        self.session_token.is_some() && self.wallet_address.is_some() && self.shared_secret.is_some()
    }
}

impl From<SessionRecord> for Session {
    fn from(record: SessionRecord) -> Self {
        Self {
            session_token: record.session_token,
            wallet_address: record.wallet_address,
            peer_public_key_base58: record.peer_public_key_base58,
            shared_secret: None,
        }
    }
}

/// Persisted form of a session. Never holds key material.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wallet_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peer_public_key_base58: Option<String>,
}

// ============================================================================
// Session Store
// ============================================================================

/// Reads and writes the session record in origin storage.
pub struct SessionStore {
    storage: Arc<dyn OriginStorage>,
    vault: Arc<KeyVault>,
    key: String,
}

impl SessionStore {
    pub fn new(storage: Arc<dyn OriginStorage>, vault: Arc<KeyVault>, key: impl Into<String>) -> Self {
        Self {
            storage,
            vault,
            key: key.into(),
        }
    }

    /// Persist `session`. `peer_public_key_base58` overrides the key carried
    /// by the session when given.
    pub fn save(
        &self,
        session: &Session,
        peer_public_key_base58: Option<&str>,
    ) -> Result<(), DeeplinkError> {
        let record = SessionRecord {
            wallet_address: session.wallet_address.clone(),
            session_token: session.session_token.clone(),
            peer_public_key_base58: peer_public_key_base58
                .map(str::to_string)
                .or_else(|| session.peer_public_key_base58.clone()),
        };
        self.write_record(&record)?;
        debug!(
            has_token = record.session_token.is_some(),
            has_peer_key = record.peer_public_key_base58.is_some(),
            "saved session"
        );
        Ok(())
    }

    /// Load the stored session and re-derive its shared secret.
    ///
    /// Returns `None` when nothing is stored, the record cannot be parsed,
    /// or the shared secret cannot be derived (for example after the vault
    /// was cleared).
    pub fn load(&self) -> Option<Session> {
        let record = match self.read_record() {
            Ok(Some(record)) => record,
            Ok(None) => return None,
            Err(e) => {
                warn!(error = %e, "ignoring unreadable session record");
                return None;
            }
        };

        let mut session = Session::from(record);

        if let Some(peer) = session.peer_public_key_base58.as_deref() {
            match self.vault.create_shared_secret(peer) {
                Ok(secret) => session.shared_secret = Some(secret),
                Err(e) => {
                    debug!(error = %e, "cannot re-derive shared secret for stored session");
                    return None;
                }
            }
        }
        Some(session)
    }

    /// Delete the stored record. The key vault is left untouched.
    pub fn clear(&self) -> Result<(), DeeplinkError> {
        self.storage.remove(&self.key)?;
        debug!("cleared session");
        Ok(())
    }

    /// Whether `session` can be used for encrypted requests.
    pub fn has_valid_session(session: &Session) -> bool {
        session.is_valid()
    }

    /// Replace only the session token of the stored record.
    pub fn update_token(&self, token: &str) -> Result<(), DeeplinkError> {
        let mut record = self.read_record()?.unwrap_or_default();
        if record.session_token.as_deref() == Some(token) {
            return Ok(());
        }
        record.session_token = Some(token.to_string());
        self.write_record(&record)?;
        debug!("updated session token");
        Ok(())
    }

    fn read_record(&self) -> Result<Option<SessionRecord>, DeeplinkError> {
        match self.storage.get(&self.key)? {
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|e| DeeplinkError::Serialization(e.to_string())),
            None => Ok(None),
        }
    }

    fn write_record(&self, record: &SessionRecord) -> Result<(), DeeplinkError> {
        let raw =
            serde_json::to_string(record).map_err(|e| DeeplinkError::Serialization(e.to_string()))?;
        self.storage.set(&self.key, &raw)?;
        Ok(())
    }
}
