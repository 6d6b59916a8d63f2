//! Solana over deep links.
//!
//! Every operation after `connect` is an encrypted round trip through the
//! communicator: build the link, register the request, navigate, await.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use dlk_core::{Communicator, DeeplinkError, DeeplinkMethod, Session};
use dlk_crypto::encoding::to_base58;

use crate::adapter::{bytes_field, decode_bytes, AddressType, ChainAdapter, SignedMessage};

/// Solana chain adapter.
pub struct SolanaAdapter {
    comm: Communicator,
    session: RwLock<Option<Session>>,
}

impl SolanaAdapter {
    pub fn new(comm: Communicator) -> Self {
        Self {
            comm,
            session: RwLock::new(None),
        }
    }

    /// Reload the stored session. The communicator rewrites it on every
    /// handshake and token refresh, so the cached copy goes stale.
    pub fn refresh_session(&self) -> Option<Session> {
        let session = self.comm.sessions().load().filter(Session::is_valid);
        self.session.write().clone_from(&session);
        session
    }

    /// Cached session without touching storage.
    pub fn session(&self) -> Option<Session> {
        self.session.read().clone()
    }

    async fn request(&self, method: DeeplinkMethod, payload: Value) -> Result<Value, DeeplinkError> {
        let session = self.refresh_session().ok_or(DeeplinkError::NotConnected)?;
        let request_id = self.comm.generate_request_id();
        let url = self.comm.build_url(method, &request_id, &payload, Some(&session))?;

        let pending = self
            .comm
            .wait_for_response(&request_id, self.comm.config().default_timeout());
        if let Err(e) = self.comm.navigate(&url) {
            self.comm.cancel_request(&request_id);
            return Err(e);
        }
        debug!(%method, "waiting for wallet");

        let result = pending.await;
        self.comm.clean_url();
        self.refresh_session();
        result
    }

    /// Sign a serialized transaction without submitting it.
    pub async fn sign_transaction(&self, transaction: &[u8]) -> Result<Vec<u8>, DeeplinkError> {
        let response = self
            .request(
                DeeplinkMethod::SignTransaction,
                json!({ "transaction": to_base58(transaction) }),
            )
            .await?;
        bytes_field(&response, "transaction")
    }

    /// Sign several serialized transactions in one wallet round trip.
    pub async fn sign_all_transactions(
        &self,
        transactions: &[Vec<u8>],
    ) -> Result<Vec<Vec<u8>>, DeeplinkError> {
        let encoded: Vec<String> = transactions.iter().map(|tx| to_base58(tx)).collect();
        let response = self
            .request(
                DeeplinkMethod::SignAllTransactions,
                json!({ "transactions": encoded }),
            )
            .await?;

        let signed = response
            .get("transactions")
            .and_then(Value::as_array)
            .ok_or_else(|| DeeplinkError::MalformedResponse("response has no transactions".to_string()))?;
        if signed.len() != transactions.len() {
            return Err(DeeplinkError::MalformedResponse(format!(
                "expected {} signed transactions, got {}",
                transactions.len(),
                signed.len()
            )));
        }
        signed
            .iter()
            .map(|tx| decode_bytes(tx, "transactions"))
            .collect()
    }

    /// Sign and submit a transaction; returns the transaction signature.
    pub async fn sign_and_send_transaction(
        &self,
        transaction: &[u8],
    ) -> Result<Vec<u8>, DeeplinkError> {
        let response = self
            .request(
                DeeplinkMethod::SignAndSendTransaction,
                json!({ "transaction": to_base58(transaction) }),
            )
            .await?;
        bytes_field(&response, "signature")
    }
}

#[async_trait]
impl ChainAdapter for SolanaAdapter {
    fn address_type(&self) -> AddressType {
        AddressType::Solana
    }

    async fn connect(&self) -> Result<String, DeeplinkError> {
        if let Some(address) = self.refresh_session().and_then(|s| s.wallet_address) {
            debug!(wallet = %address, "reusing stored session");
            return Ok(address);
        }

        let config = self.comm.config();
        let request_id = self.comm.generate_request_id();
        let url = self.comm.build_url(
            DeeplinkMethod::Connect,
            &request_id,
            &json!({ "cluster": config.cluster }),
            None,
        )?;

        let pending = self.comm.wait_for_response(&request_id, config.connect_timeout());
        if let Err(e) = self.comm.navigate(&url) {
            self.comm.cancel_request(&request_id);
            return Err(e);
        }
        info!(cluster = %config.cluster, "sent connect request to wallet");

        let result = pending.await;
        self.comm.clean_url();
        result?;

        self.refresh_session()
            .and_then(|s| s.wallet_address)
            .ok_or_else(|| {
                DeeplinkError::MalformedResponse("handshake did not establish a session".to_string())
            })
    }

    /// Tell the wallet the session is over (without waiting for it) and
    /// forget the session locally.
    async fn disconnect(&self) -> Result<(), DeeplinkError> {
        if let Some(session) = self.refresh_session() {
            let request_id = self.comm.generate_request_id();
            match self
                .comm
                .build_url(DeeplinkMethod::Disconnect, &request_id, &json!({}), Some(&session))
            {
                Ok(url) => {
                    if let Err(e) = self.comm.navigate(&url) {
                        warn!(error = %e, "failed to notify wallet of disconnect");
                    }
                }
                Err(e) => warn!(error = %e, "failed to build disconnect link"),
            }
        }

        self.comm.sessions().clear()?;
        *self.session.write() = None;
        info!("solana session cleared");
        Ok(())
    }

    async fn sign_message(&self, message: &[u8]) -> Result<SignedMessage, DeeplinkError> {
        let response = self
            .request(
                DeeplinkMethod::SignMessage,
                json!({ "message": to_base58(message), "display": "utf8" }),
            )
            .await?;

        let signature = bytes_field(&response, "signature")?;
        let public_key = response
            .get("publicKey")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| self.public_key())
            .ok_or_else(|| DeeplinkError::MalformedResponse("response has no publicKey".to_string()))?;
        Ok(SignedMessage {
            signature,
            public_key,
        })
    }

    fn is_connected(&self) -> bool {
        self.session.read().is_some()
    }

    fn public_key(&self) -> Option<String> {
        self.session.read().as_ref().and_then(|s| s.wallet_address.clone())
    }
}

impl std::fmt::Debug for SolanaAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SolanaAdapter")
            .field("connected", &self.is_connected())
            .finish()
    }
}
