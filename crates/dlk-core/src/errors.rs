//! Error types for the deep-link engine.
//!
//! Every failure a caller can observe is a [`DeeplinkError`]. Storage
//! backends report [`StorageError`], which converts into it.

use thiserror::Error;

use dlk_crypto::CryptoError;

// ============================================================================
// Storage Errors
// ============================================================================

/// Errors raised by key stores and origin storage backends.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// The backing store does not exist in this environment
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("storage operation failed: {0}")]
    OperationFailed(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        StorageError::Serialization(e.to_string())
    }
}

// ============================================================================
// Deep-link Errors
// ============================================================================

/// Unified error type for deep-link operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeeplinkError {
    /// No durable non-extractable key store exists in this environment
    #[error("environment unsupported: {0}")]
    EnvironmentUnsupported(String),

    /// The key vault was used before `init()`
    #[error("key vault not initialized; call init() first")]
    NotInitialized,

    /// No response arrived before the deadline
    #[error("request {request_id} timed out after {timeout_ms}ms")]
    Timeout { request_id: String, timeout_ms: u64 },

    /// The response did not authenticate under the session key
    #[error("failed to decrypt wallet response")]
    DecryptionFailure,

    /// The wallet explicitly returned an error
    #[error("wallet error{}: {message}", code.as_deref().map(|c| format!(" {c}")).unwrap_or_default())]
    WalletReportedError {
        code: Option<String>,
        message: String,
    },

    /// Listening stopped while the request was outstanding
    #[error("request cancelled: communication stopped")]
    Cancelled,

    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// An encrypted operation was attempted without an established session
    #[error("no wallet session; connect first")]
    NotConnected,

    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("malformed wallet response: {0}")]
    MalformedResponse(String),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("navigation failed: {0}")]
    Navigation(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<CryptoError> for DeeplinkError {
    fn from(e: CryptoError) -> Self {
        match e {
            CryptoError::DecryptionFailure => DeeplinkError::DecryptionFailure,
            CryptoError::InvalidPublicKey(reason) => DeeplinkError::InvalidPublicKey(reason),
            CryptoError::InvalidEncoding => {
                DeeplinkError::MalformedResponse("invalid base58 encoding".to_string())
            }
            CryptoError::Serialization(reason) => DeeplinkError::Serialization(reason),
            CryptoError::EncryptionFailed | CryptoError::Rng => {
                DeeplinkError::Serialization(e.to_string())
            }
        }
    }
}

impl DeeplinkError {
    /// Whether retrying the whole flow may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DeeplinkError::Timeout { .. } | DeeplinkError::Cancelled | DeeplinkError::Navigation(_)
        )
    }

    /// Build a wallet-reported error from raw response fields.
    pub fn wallet(code: Option<&str>, message: Option<&str>) -> Self {
        let code = code.filter(|c| !c.is_empty()).map(str::to_string);
        let message = match (message.filter(|m| !m.is_empty()), &code) {
            (Some(m), _) => m.to_string(),
            (None, Some(c)) => format!("Error: {c}"),
            (None, None) => "unknown wallet error".to_string(),
        };
        DeeplinkError::WalletReportedError { code, message }
    }
}
