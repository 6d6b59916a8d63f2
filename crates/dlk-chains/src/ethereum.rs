//! Ethereum placeholder. The wallet has no Ethereum deep links yet, so
//! every operation fails with `UnsupportedOperation`.

use async_trait::async_trait;
use serde_json::Value;

use dlk_core::DeeplinkError;

use crate::adapter::{AddressType, ChainAdapter, SignedMessage};

const UNSUPPORTED: &str = "Ethereum deeplinks are not yet supported by Phantom";

/// Chain id reported while no Ethereum session can exist (mainnet).
pub const DEFAULT_CHAIN_ID: u64 = 1;

fn unsupported<T>() -> Result<T, DeeplinkError> {
    Err(DeeplinkError::UnsupportedOperation(UNSUPPORTED.to_string()))
}

#[derive(Debug, Default)]
pub struct EthereumAdapter;

impl EthereumAdapter {
    pub fn new() -> Self {
        Self
    }

    pub async fn sign_personal_message(
        &self,
        _message: &[u8],
        _address: &str,
    ) -> Result<Vec<u8>, DeeplinkError> {
        unsupported()
    }

    pub async fn sign_typed_data(
        &self,
        _typed_data: &Value,
        _address: &str,
    ) -> Result<Vec<u8>, DeeplinkError> {
        unsupported()
    }

    pub async fn send_transaction(&self, _transaction: &Value) -> Result<String, DeeplinkError> {
        unsupported()
    }

    pub async fn switch_chain(&self, _chain_id: u64) -> Result<(), DeeplinkError> {
        unsupported()
    }

    pub fn chain_id(&self) -> u64 {
        DEFAULT_CHAIN_ID
    }

    pub fn accounts(&self) -> Vec<String> {
        Vec::new()
    }
}

#[async_trait]
impl ChainAdapter for EthereumAdapter {
    fn address_type(&self) -> AddressType {
        AddressType::Ethereum
    }

    async fn connect(&self) -> Result<String, DeeplinkError> {
        unsupported()
    }

    async fn disconnect(&self) -> Result<(), DeeplinkError> {
        unsupported()
    }

    async fn sign_message(&self, _message: &[u8]) -> Result<SignedMessage, DeeplinkError> {
        unsupported()
    }

    fn is_connected(&self) -> bool {
        false
    }

    fn public_key(&self) -> Option<String> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn is_unsupported<T: std::fmt::Debug>(result: Result<T, DeeplinkError>) -> bool {
        matches!(result, Err(DeeplinkError::UnsupportedOperation(ref m)) if m == UNSUPPORTED)
    }

    #[tokio::test]
    async fn test_every_operation_is_unsupported() {
        let eth = EthereumAdapter::new();
        assert!(is_unsupported(eth.connect().await));
        assert!(is_unsupported(eth.disconnect().await));
        assert!(is_unsupported(eth.sign_message(b"hi").await));
        assert!(is_unsupported(eth.sign_personal_message(b"hi", "0xabc").await));
        assert!(is_unsupported(eth.sign_typed_data(&json!({}), "0xabc").await));
        assert!(is_unsupported(eth.send_transaction(&json!({"to": "0xabc"})).await));
        assert!(is_unsupported(eth.switch_chain(137).await));
    }

    #[test]
    fn test_read_only_state() {
        let eth = EthereumAdapter::new();
        assert_eq!(eth.chain_id(), 1);
        assert!(eth.accounts().is_empty());
        assert!(!eth.is_connected());
        assert!(eth.public_key().is_none());
    }
}
