//! Simulated wallet for driving the deep-link protocol in tests.
//!
//! [`MockWallet`] plays the far side of a deep link: it parses the URL the
//! dapp navigated to, decrypts the request, and produces the redirect URL a
//! real wallet would send the user back to.

use anyhow::{anyhow, bail, Context, Result};
use ed25519_dalek::{Signer, SigningKey};
use getrandom::getrandom;
use rand_core::OsRng;
use serde_json::{json, Value};
use url::{form_urlencoded, Url};

use dlk_crypto::encoding::{from_base58, to_base58};
use dlk_crypto::{decrypt, encrypt, EncryptedPayload, SealedKeyPair, SharedSecret};

use crate::deeplink::DeeplinkMethod;
use crate::response::ResponseParams;

/// Generate a random 16-byte array.
pub fn rand16() -> [u8; 16] {
    let mut b = [0u8; 16];
    getrandom(&mut b).expect("rng");
    b
}

/// A request as received by the wallet.
#[derive(Clone, Debug)]
pub struct WalletRequest {
    pub method: DeeplinkMethod,
    pub request_id: Option<String>,
    pub redirect_link: String,
    pub dapp_public_key: String,
    /// Decrypted payload of an encrypted request
    pub payload: Option<Value>,
    /// Every query parameter of the deep link
    pub params: ResponseParams,
}

impl WalletRequest {
    fn payload_str(&self, field: &str) -> Result<&str> {
        self.payload
            .as_ref()
            .and_then(|p| p.get(field))
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow!("request payload has no string field {field}"))
    }
}

/// A wallet that approves (or rejects) whatever it is asked.
pub struct MockWallet {
    keys: SealedKeyPair,
    signing: SigningKey,
    session_token: String,
    echo_request_id: bool,
    encrypted_handshake: bool,
}

impl Default for MockWallet {
    fn default() -> Self {
        Self::new()
    }
}

impl MockWallet {
    pub fn new() -> Self {
        Self {
            keys: SealedKeyPair::generate(0),
            signing: SigningKey::generate(&mut OsRng),
            session_token: format!("sess-{}", hex::encode(rand16())),
            echo_request_id: true,
            encrypted_handshake: false,
        }
    }

    pub fn with_session_token(mut self, token: impl Into<String>) -> Self {
        self.session_token = token.into();
        self
    }

    /// Omit `request_id` from responses, like wallets that do not echo it.
    pub fn without_request_id_echo(mut self) -> Self {
        self.echo_request_id = false;
        self
    }

    /// Answer connect with an encrypted `{public_key, session}` payload.
    pub fn with_encrypted_handshake(mut self) -> Self {
        self.encrypted_handshake = true;
        self
    }

    /// Wallet address (base58 Ed25519 public key).
    pub fn address(&self) -> String {
        to_base58(self.signing.verifying_key().as_bytes())
    }

    /// The wallet's X25519 encryption public key.
    pub fn encryption_public_key(&self) -> String {
        self.keys.public_key_base58()
    }

    pub fn session_token(&self) -> &str {
        &self.session_token
    }

    /// Shared secret with a dapp key.
    pub fn shared_secret(&self, dapp_public_key: &str) -> Result<SharedSecret> {
        Ok(self.keys.diffie_hellman_base58(dapp_public_key)?)
    }

    /// Parse (and decrypt, if needed) a deep link.
    pub fn parse_request(&self, deep_link: &str) -> Result<WalletRequest> {
        let url = Url::parse(deep_link).context("deep link is not a URL")?;
        let method: DeeplinkMethod = url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .ok_or_else(|| anyhow!("deep link has no method"))?
            .parse()?;
        let params: ResponseParams = url.query_pairs().into_owned().collect();

        let get = |key: &str| params.get(key).cloned();
        let dapp_public_key =
            get("dapp_encryption_public_key").ok_or_else(|| anyhow!("missing dapp key"))?;
        let redirect_link = get("redirect_link").ok_or_else(|| anyhow!("missing redirect_link"))?;

        let payload = match (get("nonce"), get("data")) {
            (Some(nonce), Some(data)) => {
                let secret = self.shared_secret(&dapp_public_key)?;
                let value: Value = decrypt(&EncryptedPayload { nonce, data }, &secret)?;
                Some(value)
            }
            _ => None,
        };
        let request_id = get("request_id");

        Ok(WalletRequest {
            method,
            request_id,
            redirect_link,
            dapp_public_key,
            payload,
            params,
        })
    }

    /// Approve `request` and return the redirect URL.
    pub fn approve(&self, request: &WalletRequest) -> Result<String> {
        if request.method != DeeplinkMethod::Connect
            && request.payload_str("session")? != self.session_token
        {
            return Ok(self.reject(
                request,
                "4100",
                "The requested method and/or account has not been authorized",
            ));
        }

        let result = match request.method {
            DeeplinkMethod::Connect => return self.handshake_response(request),
            DeeplinkMethod::SignMessage => {
                let message = from_base58(request.payload_str("message")?)?;
                json!({
                    "signature": to_base58(&self.signing.sign(&message).to_bytes()),
                    "publicKey": self.address(),
                })
            }
            DeeplinkMethod::SignTransaction => {
                let tx = from_base58(request.payload_str("transaction")?)?;
                json!({ "transaction": to_base58(&self.sign_transaction(&tx)) })
            }
            DeeplinkMethod::SignAllTransactions => {
                let txs = request
                    .payload
                    .as_ref()
                    .and_then(|p| p.get("transactions"))
                    .and_then(Value::as_array)
                    .ok_or_else(|| anyhow!("request has no transactions"))?;
                let mut signed = Vec::with_capacity(txs.len());
                for tx in txs {
                    let tx = tx.as_str().ok_or_else(|| anyhow!("transaction is not a string"))?;
                    signed.push(to_base58(&self.sign_transaction(&from_base58(tx)?)));
                }
                json!({ "transactions": signed })
            }
            DeeplinkMethod::SignAndSendTransaction => {
                let tx = from_base58(request.payload_str("transaction")?)?;
                json!({ "signature": to_base58(&self.signing.sign(&tx).to_bytes()) })
            }
            DeeplinkMethod::Disconnect => bail!("disconnect has no response"),
        };
        self.respond_encrypted(request, &result)
    }

    /// Answer a connect request.
    pub fn handshake_response(&self, request: &WalletRequest) -> Result<String> {
        let mut fields = vec![(
            "phantom_encryption_public_key".to_string(),
            self.encryption_public_key(),
        )];
        if self.encrypted_handshake {
            let secret = self.shared_secret(&request.dapp_public_key)?;
            let sealed = encrypt(
                &json!({ "public_key": self.address(), "session": self.session_token }),
                &secret,
            )?;
            fields.push(("nonce".to_string(), sealed.nonce));
            fields.push(("data".to_string(), sealed.data));
        } else {
            fields.push(("public_key".to_string(), self.address()));
            fields.push(("session".to_string(), self.session_token.clone()));
        }
        Ok(self.redirect(request, fields))
    }

    /// Encrypt `value` for the dapp and return the redirect URL.
    pub fn respond_encrypted(&self, request: &WalletRequest, value: &Value) -> Result<String> {
        let secret = self.shared_secret(&request.dapp_public_key)?;
        let sealed = encrypt(value, &secret)?;
        Ok(self.redirect(
            request,
            vec![
                ("nonce".to_string(), sealed.nonce),
                ("data".to_string(), sealed.data),
            ],
        ))
    }

    /// Reject `request` with a wallet error.
    pub fn reject(&self, request: &WalletRequest, code: &str, message: &str) -> String {
        self.redirect(
            request,
            vec![
                ("errorCode".to_string(), code.to_string()),
                ("errorMessage".to_string(), message.to_string()),
            ],
        )
    }

    /// Redirect URL carrying arbitrary fields.
    pub fn redirect(&self, request: &WalletRequest, mut fields: Vec<(String, String)>) -> String {
        if self.echo_request_id {
            if let Some(id) = &request.request_id {
                fields.push(("request_id".to_string(), id.clone()));
            }
        }
        append_response(&request.redirect_link, &fields)
    }

    fn sign_transaction(&self, tx: &[u8]) -> Vec<u8> {
        let mut signed = self.signing.sign(tx).to_bytes().to_vec();
        signed.extend_from_slice(tx);
        signed
    }
}

/// Append response fields to a redirect link. A link with a fragment gets
/// them after the fragment (`#marker?k=v`), otherwise in the query.
pub fn append_response(redirect_link: &str, fields: &[(String, String)]) -> String {
    let query = form_urlencoded::Serializer::new(String::new())
        .extend_pairs(fields)
        .finish();
    match redirect_link.split_once('#') {
        Some((base, fragment)) => format!("{base}#{fragment}?{query}"),
        None if redirect_link.contains('?') => format!("{redirect_link}&{query}"),
        None => format!("{redirect_link}?{query}"),
    }
}
