//! Provider facade: wires the vault, session store and communicator
//! together and exposes one adapter per configured address type.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, info};

use dlk_core::config::ConfigError;
use dlk_core::{
    Communicator, DeeplinkConfig, DeeplinkError, KeyStore, KeyVault, OriginStorage, PageHost,
    SessionStore,
};

use crate::adapter::{AddressType, ChainAdapter, WalletAddress};
use crate::ethereum::EthereumAdapter;
use crate::solana::SolanaAdapter;

const EVENT_CAPACITY: usize = 32;

// ============================================================================
// Configuration & Events
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub address_types: Vec<AddressType>,
    #[serde(flatten)]
    pub deeplink: DeeplinkConfig,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            address_types: vec![AddressType::Solana],
            deeplink: DeeplinkConfig::default(),
        }
    }
}

/// What started a connect attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectSource {
    /// `connect()` was called
    Manual,
    /// A stored session was restored by `initialize()`
    Restored,
}

/// Provider lifecycle events.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProviderEvent {
    ConnectStart {
        source: ConnectSource,
    },
    Connect {
        addresses: Vec<WalletAddress>,
        source: ConnectSource,
    },
    ConnectError {
        error: DeeplinkError,
        source: ConnectSource,
    },
    Disconnect,
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("at least one address type must be configured")]
    NoAddressTypes,

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Deeplink(#[from] DeeplinkError),
}

// ============================================================================
// Provider
// ============================================================================

/// Deep-link wallet provider for one tab.
pub struct DeeplinkProvider {
    comm: Communicator,
    solana: Option<SolanaAdapter>,
    ethereum: Option<EthereumAdapter>,
    addresses: RwLock<Vec<WalletAddress>>,
    events: broadcast::Sender<ProviderEvent>,
}

impl DeeplinkProvider {
    /// Build a provider over the given environment.
    ///
    /// # Errors
    /// * `NoAddressTypes` for an empty address-type list
    /// * `Config` for an invalid deep-link configuration
    /// * `Deeplink(EnvironmentUnsupported)` if `keys` cannot hold key pairs
    pub fn new(
        config: ProviderConfig,
        page: Arc<dyn PageHost>,
        storage: Arc<dyn OriginStorage>,
        keys: Arc<dyn KeyStore>,
    ) -> Result<Self, ProviderError> {
        if config.address_types.is_empty() {
            return Err(ProviderError::NoAddressTypes);
        }
        config.deeplink.validate()?;

        let vault = Arc::new(KeyVault::new(keys)?);
        let sessions = Arc::new(SessionStore::new(
            storage.clone(),
            vault.clone(),
            config.deeplink.storage_keys.session.clone(),
        ));
        let comm = Communicator::new(config.deeplink, page, storage, vault, sessions);

        let solana = config
            .address_types
            .contains(&AddressType::Solana)
            .then(|| SolanaAdapter::new(comm.clone()));
        let ethereum = config
            .address_types
            .contains(&AddressType::Ethereum)
            .then(EthereumAdapter::new);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Ok(Self {
            comm,
            solana,
            ethereum,
            addresses: RwLock::new(Vec::new()),
            events,
        })
    }

    /// Load (or create) the origin key pair, start listening for
    /// responses, and restore a stored session.
    ///
    /// Listening starts before the restore so a handshake sitting in the
    /// current location is adopted first.
    pub async fn initialize(&self) -> Result<(), DeeplinkError> {
        let public_key = self.comm.vault().init().await?;
        debug!(dapp_public_key = %public_key, "key vault ready");

        self.comm.start_listening();

        if let Some(address) = self
            .solana
            .as_ref()
            .and_then(|s| s.refresh_session())
            .and_then(|s| s.wallet_address)
        {
            let addresses = vec![WalletAddress {
                address_type: AddressType::Solana,
                address,
            }];
            *self.addresses.write() = addresses.clone();
            info!("restored wallet session");
            self.emit(ProviderEvent::Connect {
                addresses,
                source: ConnectSource::Restored,
            });
        }
        Ok(())
    }

    /// Connect the wallet, reusing a stored session when one is valid.
    pub async fn connect(&self) -> Result<Vec<WalletAddress>, DeeplinkError> {
        let solana = self.solana()?;
        let source = ConnectSource::Manual;
        self.emit(ProviderEvent::ConnectStart { source });

        match solana.connect().await {
            Ok(address) => {
                let addresses = vec![WalletAddress {
                    address_type: AddressType::Solana,
                    address,
                }];
                *self.addresses.write() = addresses.clone();
                self.emit(ProviderEvent::Connect {
                    addresses: addresses.clone(),
                    source,
                });
                Ok(addresses)
            }
            Err(error) => {
                self.emit(ProviderEvent::ConnectError {
                    error: error.clone(),
                    source,
                });
                Err(error)
            }
        }
    }

    /// End the session and stop listening. The key pair is kept, so the
    /// next connect reuses the same dapp identity.
    pub async fn disconnect(&self) -> Result<(), DeeplinkError> {
        match &self.solana {
            Some(solana) => solana.disconnect().await?,
            None => self.comm.sessions().clear()?,
        }
        self.comm.stop_listening();
        self.addresses.write().clear();
        info!("wallet disconnected");
        self.emit(ProviderEvent::Disconnect);
        Ok(())
    }

    /// Disconnect and delete the origin key pair.
    pub async fn disconnect_and_forget_keys(&self) -> Result<(), DeeplinkError> {
        self.disconnect().await?;
        self.comm.vault().clear().await
    }

    pub fn addresses(&self) -> Vec<WalletAddress> {
        self.addresses.read().clone()
    }

    pub fn is_connected(&self) -> bool {
        !self.addresses.read().is_empty()
    }

    pub fn solana(&self) -> Result<&SolanaAdapter, DeeplinkError> {
        self.solana.as_ref().ok_or_else(|| {
            DeeplinkError::UnsupportedOperation("solana is not configured".to_string())
        })
    }

    pub fn ethereum(&self) -> Result<&EthereumAdapter, DeeplinkError> {
        self.ethereum.as_ref().ok_or_else(|| {
            DeeplinkError::UnsupportedOperation("ethereum is not configured".to_string())
        })
    }

    pub fn communicator(&self) -> &Communicator {
        &self.comm
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProviderEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: ProviderEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}

impl std::fmt::Debug for DeeplinkProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeeplinkProvider")
            .field("addresses", &*self.addresses.read())
            .field("solana", &self.solana.is_some())
            .field("ethereum", &self.ethereum.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dlk_core::{MemoryKeyStore, MemoryOrigin, SimulatedTab};

    fn provider(config: ProviderConfig, keys: MemoryKeyStore) -> Result<DeeplinkProvider, ProviderError> {
        DeeplinkProvider::new(
            config,
            Arc::new(SimulatedTab::new("https://dapp.example/app")),
            Arc::new(MemoryOrigin::new()),
            Arc::new(keys),
        )
    }

    #[test]
    fn test_rejects_empty_address_types() {
        let config = ProviderConfig {
            address_types: vec![],
            ..Default::default()
        };
        assert!(matches!(
            provider(config, MemoryKeyStore::new()),
            Err(ProviderError::NoAddressTypes)
        ));
    }

    #[test]
    fn test_rejects_unavailable_key_store() {
        assert!(matches!(
            provider(ProviderConfig::default(), MemoryKeyStore::unavailable()),
            Err(ProviderError::Deeplink(DeeplinkError::EnvironmentUnsupported(_)))
        ));
    }

    #[tokio::test]
    async fn test_unconfigured_chains() {
        let provider = provider(ProviderConfig::default(), MemoryKeyStore::new()).unwrap();
        assert!(provider.solana().is_ok());
        assert!(matches!(
            provider.ethereum(),
            Err(DeeplinkError::UnsupportedOperation(_))
        ));

        let config = ProviderConfig {
            address_types: vec![AddressType::Ethereum],
            ..Default::default()
        };
        let eth_only = self::provider(config, MemoryKeyStore::new()).unwrap();
        assert!(matches!(
            eth_only.connect().await,
            Err(DeeplinkError::UnsupportedOperation(_))
        ));
    }

    #[test]
    fn test_config_from_json() {
        let config: ProviderConfig =
            serde_json::from_str(r#"{"address_types": ["solana", "ethereum"], "cluster": "devnet"}"#)
                .unwrap();
        assert_eq!(config.address_types.len(), 2);
        assert_eq!(config.deeplink.cluster, "devnet");
    }
}
