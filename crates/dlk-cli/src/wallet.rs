//! Wallet operations behind the CLI commands.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use dlk_chains::{ChainAdapter, DeeplinkProvider, ProviderConfig};
use dlk_core::{DeeplinkError, PageHost, SqliteStore};
use dlk_crypto::encoding::{from_base58, to_base58};

use crate::config::Config;
use crate::output::{ConnectOutput, DisconnectOutput, SignatureOutput, StatusInfo, TransactionsOutput};
use crate::terminal::TerminalPage;

/// An initialized provider plus the settings it was built from.
pub struct WalletContext {
    provider: DeeplinkProvider,
    config: Config,
    db_path: PathBuf,
}

impl WalletContext {
    /// Open the database, wire the terminal in as the page, and initialize.
    pub async fn open(config: &Config) -> anyhow::Result<(Self, Arc<TerminalPage>)> {
        let db_path = config.db_path();
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let store = SqliteStore::new(&db_path)
            .with_context(|| format!("failed to open {}", db_path.display()))?;
        let page = Arc::new(TerminalPage::new(config.page.url.clone()));

        let context = Self::with_environment(config, page.clone(), store, db_path).await?;
        Ok((context, page))
    }

    /// Build over an explicit page and store.
    pub async fn with_environment(
        config: &Config,
        page: Arc<dyn PageHost>,
        store: SqliteStore,
        db_path: PathBuf,
    ) -> anyhow::Result<Self> {
        let provider_config = ProviderConfig {
            deeplink: config.wallet.clone(),
            ..Default::default()
        };
        let provider = DeeplinkProvider::new(
            provider_config,
            page,
            Arc::new(store.clone()),
            Arc::new(store),
        )?;
        provider.initialize().await?;
        info!(db = %db_path.display(), "wallet context ready");

        Ok(Self {
            provider,
            config: config.clone(),
            db_path,
        })
    }

    pub fn provider(&self) -> &DeeplinkProvider {
        &self.provider
    }

    pub async fn connect(&self) -> Result<ConnectOutput, DeeplinkError> {
        let addresses = self.provider.connect().await?;
        let dapp_public_key = self
            .provider
            .communicator()
            .vault()
            .public_key_base58()
            .ok_or(DeeplinkError::NotInitialized)?;
        Ok(ConnectOutput {
            addresses,
            dapp_public_key,
        })
    }

    pub async fn sign_message(&self, message: &str) -> Result<SignatureOutput, DeeplinkError> {
        let signed = self.provider.solana()?.sign_message(message.as_bytes()).await?;
        Ok(SignatureOutput {
            signature: to_base58(&signed.signature),
            public_key: Some(signed.public_key),
        })
    }

    pub async fn sign_transaction(&self, transaction: &str) -> Result<TransactionsOutput, DeeplinkError> {
        let tx = decode_input(transaction)?;
        let signed = self.provider.solana()?.sign_transaction(&tx).await?;
        Ok(TransactionsOutput {
            transactions: vec![to_base58(&signed)],
        })
    }

    pub async fn sign_all(&self, transactions: &[String]) -> Result<TransactionsOutput, DeeplinkError> {
        let txs = transactions
            .iter()
            .map(|tx| decode_input(tx))
            .collect::<Result<Vec<_>, _>>()?;
        let signed = self.provider.solana()?.sign_all_transactions(&txs).await?;
        Ok(TransactionsOutput {
            transactions: signed.iter().map(|tx| to_base58(tx)).collect(),
        })
    }

    pub async fn sign_and_send(&self, transaction: &str) -> Result<SignatureOutput, DeeplinkError> {
        let tx = decode_input(transaction)?;
        let signature = self.provider.solana()?.sign_and_send_transaction(&tx).await?;
        Ok(SignatureOutput {
            signature: to_base58(&signature),
            public_key: None,
        })
    }

    pub fn status(&self) -> StatusInfo {
        let vault = self.provider.communicator().vault();
        StatusInfo {
            connected: self.provider.is_connected(),
            wallet_address: self.provider.addresses().first().map(|a| a.address.clone()),
            dapp_public_key: vault.public_key_base58(),
            key_created_at: vault.created_at_unix(),
            cluster: self.config.wallet.cluster.clone(),
            wallet_base_url: self.config.wallet.wallet_base_url.clone(),
            db_path: self.db_path.display().to_string(),
        }
    }

    pub async fn disconnect(&self, forget_keys: bool) -> Result<DisconnectOutput, DeeplinkError> {
        if forget_keys {
            self.provider.disconnect_and_forget_keys().await?;
        } else {
            self.provider.disconnect().await?;
        }
        Ok(DisconnectOutput {
            forgot_keys: forget_keys,
        })
    }

    /// Stop listening so this run leaves nothing in the pending registry.
    pub fn close(&self) {
        self.provider.communicator().stop_listening();
    }
}

fn decode_input(transaction: &str) -> Result<Vec<u8>, DeeplinkError> {
    from_base58(transaction.trim()).map_err(|_| {
        DeeplinkError::Serialization("transaction must be base58 encoded".to_string())
    })
}
