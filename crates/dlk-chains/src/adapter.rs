//! Chain adapter trait and the result types shared by every chain.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use dlk_core::DeeplinkError;
use dlk_crypto::encoding::from_base58;

// ============================================================================
// Types
// ============================================================================

/// Address families a provider can be configured for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressType {
    Solana,
    Ethereum,
}

impl AddressType {
    pub fn as_str(self) -> &'static str {
        match self {
            AddressType::Solana => "solana",
            AddressType::Ethereum => "ethereum",
        }
    }
}

impl std::fmt::Display for AddressType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AddressType {
    type Err = DeeplinkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "solana" => Ok(AddressType::Solana),
            "ethereum" => Ok(AddressType::Ethereum),
            other => Err(DeeplinkError::UnsupportedOperation(format!(
                "unknown address type: {other}"
            ))),
        }
    }
}

/// A connected wallet address.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletAddress {
    pub address_type: AddressType,
    pub address: String,
}

/// Signature over an arbitrary message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignedMessage {
    pub signature: Vec<u8>,
    pub public_key: String,
}

// ============================================================================
// Chain Adapter Trait
// ============================================================================

/// Operations every chain exposes through deep links.
#[async_trait]
pub trait ChainAdapter: Send + Sync {
    fn address_type(&self) -> AddressType;

    /// Connect (or reuse an existing session) and return the wallet address.
    async fn connect(&self) -> Result<String, DeeplinkError>;

    async fn disconnect(&self) -> Result<(), DeeplinkError>;

    async fn sign_message(&self, message: &[u8]) -> Result<SignedMessage, DeeplinkError>;

    fn is_connected(&self) -> bool;

    fn public_key(&self) -> Option<String>;
}

// ============================================================================
// Response Decoding
// ============================================================================

/// Decode a byte field from a wallet response. Wallets send either a
/// base58 string or an array of integers.
pub fn decode_bytes(value: &Value, field: &str) -> Result<Vec<u8>, DeeplinkError> {
    match value {
        Value::String(encoded) => from_base58(encoded)
            .map_err(|_| DeeplinkError::MalformedResponse(format!("{field} is not valid base58"))),
        Value::Array(items) => items
            .iter()
            .map(|item| {
                item.as_u64()
                    .and_then(|n| u8::try_from(n).ok())
                    .ok_or_else(|| {
                        DeeplinkError::MalformedResponse(format!("{field} holds a non-byte value"))
                    })
            })
            .collect(),
        _ => Err(DeeplinkError::MalformedResponse(format!(
            "{field} is neither base58 nor a byte array"
        ))),
    }
}

/// Decode a required byte field of a response object.
pub fn bytes_field(response: &Value, field: &str) -> Result<Vec<u8>, DeeplinkError> {
    let value = response
        .get(field)
        .ok_or_else(|| DeeplinkError::MalformedResponse(format!("response has no {field}")))?;
    decode_bytes(value, field)
}
