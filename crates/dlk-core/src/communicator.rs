//! Request/response correlation over deep links.
//!
//! A request leaves the page as a navigation to a deep link. Its response
//! comes back later as URL parameters, possibly in a different tab. The
//! [`Communicator`] keeps the in-flight requests of one tab, listens on every
//! channel a response can arrive through, and settles each request exactly
//! once: by a matching response, by its timeout, or by `stop_listening`.
//!
//! Responses that land in a tab with nothing pending while other tabs have
//! outstanding requests are forwarded through origin storage to the tab that
//! owns the request.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};
use std::time::Duration;

use parking_lot::Mutex;
use rand_core::{OsRng, RngCore};
use serde_json::{Map, Value};
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

use dlk_crypto::{decrypt, encrypt, SharedSecret};

use crate::config::DeeplinkConfig;
use crate::deeplink::{default_redirect_link, encrypted_url, handshake_url, DeeplinkMethod};
use crate::errors::DeeplinkError;
use crate::page::{PageEvent, PageHost};
use crate::registry::{resolve_tab_role, PendingRegistry, ResponseChannel, TabRole};
use crate::response::{
    classify, params_from_location, params_from_message, request_id, ResponseParams,
    WalletResponse, PEER_PUBLIC_KEY, PUBLIC_KEY, SESSION,
};
use crate::session::{Session, SessionRecord, SessionStore};
use crate::storage::{OriginStorage, StorageEvent, StorageSubscription};
use crate::vault::KeyVault;

/// Outcome delivered to a waiting caller.
pub type ResponseResult = Result<Value, DeeplinkError>;

/// Where a response entered this tab.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ResponseSource {
    Location,
    Message,
    /// Forwarded by a responder tab
    Channel,
}

struct PendingRequest {
    tx: oneshot::Sender<ResponseResult>,
    timer: JoinHandle<()>,
    generation: u64,
}

/// Generate an unpredictable request id (`req_` + 128 random bits in hex).
pub fn generate_request_id() -> String {
    let mut bytes = [0u8; 16];
    OsRng.fill_bytes(&mut bytes);
    format!("req_{}", hex::encode(bytes))
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn short_id(id: &str) -> &str {
    id.get(..12).unwrap_or(id)
}

// ============================================================================
// Pending Response
// ============================================================================

/// Future resolving to the wallet's response for one request.
#[must_use = "a pending response does nothing unless awaited"]
pub struct PendingResponse {
    request_id: String,
    rx: oneshot::Receiver<ResponseResult>,
}

impl PendingResponse {
    pub fn request_id(&self) -> &str {
        &self.request_id
    }
}

impl Future for PendingResponse {
    type Output = ResponseResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            // Sender dropped without settling: the communicator went away
            Poll::Ready(Err(_)) => Poll::Ready(Err(DeeplinkError::Cancelled)),
            Poll::Pending => Poll::Pending,
        }
    }
}

// ============================================================================
// Communicator
// ============================================================================

struct Inner {
    config: DeeplinkConfig,
    page: Arc<dyn PageHost>,
    storage: Arc<dyn OriginStorage>,
    vault: Arc<KeyVault>,
    sessions: Arc<SessionStore>,
    registry: PendingRegistry,
    channel: ResponseChannel,
    pending: Mutex<HashMap<String, PendingRequest>>,
    listener: Mutex<Option<JoinHandle<()>>>,
    next_generation: AtomicU64,
}

/// Deep-link request/response engine for one tab.
///
/// Cloning yields another handle to the same engine.
#[derive(Clone)]
pub struct Communicator {
    inner: Arc<Inner>,
}

impl Communicator {
    pub fn new(
        config: DeeplinkConfig,
        page: Arc<dyn PageHost>,
        storage: Arc<dyn OriginStorage>,
        vault: Arc<KeyVault>,
        sessions: Arc<SessionStore>,
    ) -> Self {
        let registry = PendingRegistry::new(storage.clone(), config.storage_keys.pending_registry.clone());
        let channel = ResponseChannel::new(storage.clone(), config.storage_keys.response_channel.clone());
        Self {
            inner: Arc::new(Inner {
                config,
                page,
                storage,
                vault,
                sessions,
                registry,
                channel,
                pending: Mutex::new(HashMap::new()),
                listener: Mutex::new(None),
                next_generation: AtomicU64::new(0),
            }),
        }
    }

    pub fn config(&self) -> &DeeplinkConfig {
        &self.inner.config
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.inner.sessions
    }

    pub fn vault(&self) -> &Arc<KeyVault> {
        &self.inner.vault
    }

    /// Generate an id for a new request.
    pub fn generate_request_id(&self) -> String {
        generate_request_id()
    }

    /// Build the deep link for `method`.
    ///
    /// With a session holding a shared secret, `payload` is extended with the
    /// session token, encrypted, and sent as `nonce`/`data`. Without one,
    /// only the connect handshake may be built; its string fields are sent
    /// in plaintext.
    ///
    /// # Errors
    /// * `NotInitialized` if the key vault has no key pair
    /// * `NotConnected` for a non-connect method without a shared secret
    /// * `Serialization` if `payload` is not a JSON object
    pub fn build_url(
        &self,
        method: DeeplinkMethod,
        request_id: &str,
        payload: &Value,
        session: Option<&Session>,
    ) -> Result<Url, DeeplinkError> {
        let config = &self.inner.config;
        let dapp_public_key = self
            .inner
            .vault
            .public_key_base58()
            .ok_or(DeeplinkError::NotInitialized)?;
        let redirect_link = match &config.redirect_link {
            Some(link) => link.clone(),
            None => default_redirect_link(&self.inner.page.location())?.to_string(),
        };
        let fields = payload_object(payload)?;

        if let Some((session, secret)) = session.and_then(|s| s.shared_secret().map(|k| (s, k))) {
            let mut body = fields.clone();
            if let Some(token) = &session.session_token {
                body.insert(SESSION.to_string(), Value::String(token.clone()));
            }
            let encrypted = encrypt(&Value::Object(body), secret)?;
            let url = encrypted_url(
                &config.wallet_base_url,
                method,
                &dapp_public_key,
                &encrypted,
                &redirect_link,
                request_id,
            )?;
            debug!(method = %method, request_id = short_id(request_id), "built encrypted deep link");
            return Ok(url);
        }

        if method != DeeplinkMethod::Connect {
            return Err(DeeplinkError::NotConnected);
        }

        let app_url = config
            .app_url
            .clone()
            .unwrap_or_else(|| self.inner.page.origin());
        let extra: Vec<(&str, &str)> = fields
            .iter()
            .filter_map(|(k, v)| v.as_str().map(|v| (k.as_str(), v)))
            .collect();
        let url = handshake_url(
            &config.wallet_base_url,
            method,
            &dapp_public_key,
            &redirect_link,
            &app_url,
            request_id,
            extra,
        )?;
        debug!(method = %method, request_id = short_id(request_id), "built handshake deep link");
        Ok(url)
    }

    /// Register a pending request and return a future for its response.
    ///
    /// The request is registered before this returns, so the caller can
    /// navigate right after. It settles with `Timeout` once `timeout`
    /// elapses without a response.
    pub fn wait_for_response(&self, request_id: &str, timeout: Duration) -> PendingResponse {
        let (tx, rx) = oneshot::channel();
        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);

        {
            let mut pending = self.inner.pending.lock();
            let weak = Arc::downgrade(&self.inner);
            let id = request_id.to_string();
            let timer = tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                if let Some(inner) = weak.upgrade() {
                    inner.expire(&id, generation, timeout);
                }
            });
            let replaced = pending.insert(
                request_id.to_string(),
                PendingRequest {
                    tx,
                    timer,
                    generation,
                },
            );
            if let Some(old) = replaced {
                warn!(request_id = short_id(request_id), "request id reused; dropping older waiter");
                old.timer.abort();
            }
        }

        let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        let expires_at = now_ms().saturating_add(i64::try_from(timeout_ms).unwrap_or(i64::MAX));
        if let Err(e) = self.inner.registry.add(request_id, expires_at, now_ms()) {
            warn!(error = %e, "failed to mirror request into pending registry");
        }
        debug!(
            request_id = short_id(request_id),
            timeout_ms,
            pending = self.pending_count(),
            "awaiting wallet response"
        );

        self.start_listening();

        PendingResponse {
            request_id: request_id.to_string(),
            rx,
        }
    }

    /// Navigate the page to a deep link.
    pub fn navigate(&self, url: &Url) -> Result<(), DeeplinkError> {
        self.inner.page.navigate(url.as_str())
    }

    /// Reject one pending request with `Cancelled`.
    pub fn cancel_request(&self, request_id: &str) {
        let removed = self.inner.pending.lock().remove(request_id);
        if let Some(request) = removed {
            request.timer.abort();
            self.inner.unregister(request_id);
            let _ = request.tx.send(Err(DeeplinkError::Cancelled));
        }
    }

    /// Start listening for responses and inspect the current location.
    /// Calling it again while listening does nothing.
    pub fn start_listening(&self) {
        {
            let mut listener = self.inner.listener.lock();
            if listener.is_some() {
                return;
            }
            let page_events = self.inner.page.subscribe();
            let storage_events = self.inner.storage.subscribe();
            let weak = Arc::downgrade(&self.inner);
            *listener = Some(tokio::spawn(listen(weak, page_events, storage_events)));
        }
        info!("listening for wallet responses");

        let location = self.inner.page.location();
        self.inner
            .handle_params(params_from_location(&location), ResponseSource::Location);
    }

    /// Stop listening and reject every pending request with `Cancelled`.
    pub fn stop_listening(&self) {
        if let Some(handle) = self.inner.listener.lock().take() {
            handle.abort();
            info!("stopped listening for wallet responses");
        }

        let drained: Vec<(String, PendingRequest)> = self.inner.pending.lock().drain().collect();
        for (id, request) in drained {
            request.timer.abort();
            self.inner.unregister(&id);
            let _ = request.tx.send(Err(DeeplinkError::Cancelled));
            debug!(request_id = short_id(&id), "cancelled pending request");
        }
    }

    /// Strip query and fragment from the visible location.
    pub fn clean_url(&self) {
        self.inner.clean_location();
    }

    pub fn pending_count(&self) -> usize {
        self.inner.pending.lock().len()
    }

    pub fn is_listening(&self) -> bool {
        self.inner.listener.lock().is_some()
    }
}

impl std::fmt::Debug for Communicator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Communicator")
            .field("pending", &self.pending_count())
            .field("listening", &self.is_listening())
            .finish()
    }
}

fn payload_object(payload: &Value) -> Result<Map<String, Value>, DeeplinkError> {
    match payload {
        Value::Object(fields) => Ok(fields.clone()),
        Value::Null => Ok(Map::new()),
        _ => Err(DeeplinkError::Serialization(
            "request payload must be a JSON object".to_string(),
        )),
    }
}

async fn listen(
    weak: Weak<Inner>,
    mut page_events: broadcast::Receiver<PageEvent>,
    mut storage_events: StorageSubscription,
) {
    loop {
        tokio::select! {
            event = page_events.recv() => match event {
                Ok(event) => {
                    let Some(inner) = weak.upgrade() else { break };
                    inner.handle_page_event(event);
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "page events lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            event = storage_events.recv() => match event {
                Some(event) => {
                    let Some(inner) = weak.upgrade() else { break };
                    inner.handle_storage_event(event);
                }
                None => break,
            },
        }
    }
    debug!("response listener exited");
}

// ============================================================================
// Response Handling
// ============================================================================

impl Inner {
    fn handle_page_event(&self, event: PageEvent) {
        match event {
            PageEvent::LocationChanged(location) => {
                self.handle_params(params_from_location(&location), ResponseSource::Location);
            }
            PageEvent::Message { origin, data } => {
                if origin != self.page.origin() {
                    return;
                }
                if let Some(params) = params_from_message(&data, &self.config.message_type) {
                    self.handle_params(params, ResponseSource::Message);
                }
            }
        }
    }

    fn handle_storage_event(&self, event: StorageEvent) {
        if event.key != self.channel.key() {
            return;
        }
        let Some(raw) = event.new_value else { return };
        match ResponseChannel::decode(&raw) {
            Some(params) => self.handle_params(params, ResponseSource::Channel),
            None => warn!("ignoring malformed forwarded response"),
        }
    }

    fn handle_params(&self, params: ResponseParams, source: ResponseSource) {
        let response = classify(&params);
        if response == WalletResponse::Unrecognized {
            return;
        }
        // A response is read from the location once; a later start_listening
        // must not hand it to a newer request.
        if source == ResponseSource::Location {
            self.clean_location();
        }
        let echoed_id = request_id(&params).map(str::to_string);
        debug!(
            kind = response.kind(),
            ?source,
            request_id = echoed_id.as_deref().map(short_id),
            "wallet response received"
        );

        let now = now_ms();
        let local_ids: Vec<String> = self.pending.lock().keys().cloned().collect();
        let registry_ids = self.registry.ids(now);
        if resolve_tab_role(&local_ids, &registry_ids) == TabRole::Responder {
            if source != ResponseSource::Channel {
                self.forward(&params);
            }
            return;
        }

        let matched = {
            let mut pending = self.pending.lock();
            let selected = match &echoed_id {
                Some(id) => pending.contains_key(id).then(|| id.clone()),
                None if pending.len() == 1 => pending.keys().next().cloned(),
                None => None,
            };
            selected.and_then(|id| pending.remove(&id).map(|request| (id, request)))
        };

        let Some((id, request)) = matched else {
            if local_ids.is_empty() {
                self.adopt_orphaned_handshake(&response);
            } else {
                debug!("no pending request matches response");
            }
            return;
        };

        request.timer.abort();
        self.unregister(&id);
        if source == ResponseSource::Channel {
            if let Err(e) = self.channel.clear() {
                warn!(error = %e, "failed to clear response channel");
            }
        }

        let outcome = self.settle(response, &params);
        match &outcome {
            Ok(_) => info!(request_id = short_id(&id), "request resolved"),
            Err(e) => info!(request_id = short_id(&id), error = %e, "request rejected"),
        }
        let _ = request.tx.send(outcome);
    }

    fn clean_location(&self) {
        let location = self.page.location();
        let Ok(mut url) = Url::parse(&location) else {
            warn!("cannot clean unparsable location");
            return;
        };
        if url.query().is_none() && url.fragment().is_none() {
            return;
        }
        url.set_query(None);
        url.set_fragment(None);
        if let Err(e) = self.page.replace_location(url.as_str()) {
            warn!(error = %e, "failed to clean location");
        }
    }

    /// Hand a response over to the tab that owns the request.
    fn forward(&self, params: &ResponseParams) {
        match self.channel.publish(params) {
            Ok(()) => info!("forwarded wallet response to originating tab"),
            Err(e) => {
                warn!(error = %e, "failed to forward wallet response");
                return;
            }
        }
        if let Err(e) = self.page.close() {
            warn!(error = %e, "could not close responder tab");
        }
    }

    fn settle(&self, response: WalletResponse, params: &ResponseParams) -> ResponseResult {
        match response {
            WalletResponse::Error { code, message } => {
                Err(DeeplinkError::wallet(code.as_deref(), message.as_deref()))
            }
            WalletResponse::Encrypted {
                payload,
                peer_key: Some(peer_key),
            } => {
                let secret = self.vault.create_shared_secret(&peer_key)?;
                let mut decrypted: Value = decrypt(&payload, &secret)?;
                self.persist_handshake(
                    string_field(&decrypted, PUBLIC_KEY),
                    string_field(&decrypted, SESSION),
                    &peer_key,
                )?;
                if let Value::Object(fields) = &mut decrypted {
                    fields.insert(PEER_PUBLIC_KEY.to_string(), Value::String(peer_key));
                }
                Ok(decrypted)
            }
            WalletResponse::Encrypted {
                payload,
                peer_key: None,
            } => {
                let secret = self.session_secret()?;
                let decrypted: Value = decrypt(&payload, &secret)?;
                if let Some(token) = string_field(&decrypted, SESSION) {
                    if let Err(e) = self.sessions.update_token(&token) {
                        warn!(error = %e, "failed to store refreshed session token");
                    }
                }
                Ok(decrypted)
            }
            WalletResponse::PlaintextHandshake {
                public_key,
                session,
                peer_key,
            } => {
                // The peer key must be usable before the session is trusted
                self.vault.create_shared_secret(&peer_key)?;
                self.persist_handshake(public_key, session, &peer_key)?;
                let fields = params
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                    .collect();
                Ok(Value::Object(fields))
            }
            WalletResponse::Unrecognized => Err(DeeplinkError::MalformedResponse(
                "no response fields".to_string(),
            )),
        }
    }

    fn session_secret(&self) -> Result<SharedSecret, DeeplinkError> {
        self.sessions
            .load()
            .and_then(|session| session.shared_secret().cloned())
            .ok_or(DeeplinkError::NotConnected)
    }

    fn persist_handshake(
        &self,
        wallet_address: Option<String>,
        session_token: Option<String>,
        peer_key: &str,
    ) -> Result<(), DeeplinkError> {
        let session = Session::from(SessionRecord {
            wallet_address,
            session_token,
            peer_public_key_base58: Some(peer_key.to_string()),
        });
        self.sessions.save(&session, Some(peer_key))?;
        info!(
            wallet = session.wallet_address.as_deref().unwrap_or("<unknown>"),
            "wallet session established"
        );
        Ok(())
    }

    /// A handshake arriving with nothing pending (the tab reloaded while the
    /// user was in the wallet) still establishes the session.
    fn adopt_orphaned_handshake(&self, response: &WalletResponse) {
        let result = match response {
            WalletResponse::PlaintextHandshake {
                public_key,
                session,
                peer_key,
            } => self
                .vault
                .create_shared_secret(peer_key)
                .and_then(|_| self.persist_handshake(public_key.clone(), session.clone(), peer_key)),
            WalletResponse::Encrypted {
                payload,
                peer_key: Some(peer_key),
            } => self
                .vault
                .create_shared_secret(peer_key)
                .and_then(|secret| Ok(decrypt::<Value>(payload, &secret)?))
                .and_then(|decrypted| {
                    self.persist_handshake(
                        string_field(&decrypted, PUBLIC_KEY),
                        string_field(&decrypted, SESSION),
                        peer_key,
                    )
                }),
            _ => {
                debug!("no pending request for response");
                return;
            }
        };
        if let Err(e) = result {
            warn!(error = %e, "discarding unsolicited handshake");
        }
    }

    fn expire(&self, request_id: &str, generation: u64, timeout: Duration) {
        let expired = {
            let mut pending = self.pending.lock();
            match pending.get(request_id) {
                Some(request) if request.generation == generation => pending.remove(request_id),
                _ => None,
            }
        };
        let Some(request) = expired else { return };

        self.unregister(request_id);
        let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        warn!(request_id = short_id(request_id), timeout_ms, "wallet request timed out");
        let _ = request.tx.send(Err(DeeplinkError::Timeout {
            request_id: request_id.to_string(),
            timeout_ms,
        }));
    }

    fn unregister(&self, request_id: &str) {
        if let Err(e) = self.registry.remove(request_id, now_ms()) {
            warn!(error = %e, "failed to remove request from pending registry");
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(handle) = self.listener.get_mut().take() {
            handle.abort();
        }
        for (_, request) in self.pending.get_mut().drain() {
            request.timer.abort();
        }
    }
}

fn string_field(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::SimulatedTab;
    use crate::storage::MemoryOrigin;
    use crate::vault::MemoryKeyStore;
    use dlk_crypto::SealedKeyPair;

    const PAGE: &str = "https://dapp.example/app";

    struct Fixture {
        comm: Communicator,
        tab: Arc<SimulatedTab>,
        origin: MemoryOrigin,
    }

    async fn fixture() -> Fixture {
        let origin = MemoryOrigin::new();
        let tab = Arc::new(SimulatedTab::new(PAGE));
        let vault = Arc::new(KeyVault::new(Arc::new(MemoryKeyStore::new())).unwrap());
        vault.init().await.unwrap();
        let config = DeeplinkConfig::default();
        let sessions = Arc::new(SessionStore::new(
            Arc::new(origin.clone()),
            vault.clone(),
            config.storage_keys.session.clone(),
        ));
        let comm = Communicator::new(config, tab.clone(), Arc::new(origin.clone()), vault, sessions);
        Fixture { comm, tab, origin }
    }

    #[test]
    fn test_request_ids_are_unique() {
        let a = generate_request_id();
        let b = generate_request_id();
        assert_ne!(a, b);
        assert!(a.starts_with("req_"));
        assert_eq!(a.len(), 4 + 32);
    }

    #[tokio::test]
    async fn test_handshake_url_is_plaintext() {
        let f = fixture().await;
        let url = f
            .comm
            .build_url(
                DeeplinkMethod::Connect,
                "req_1",
                &serde_json::json!({"cluster": "mainnet-beta"}),
                None,
            )
            .unwrap();
        let query: ResponseParams = url.query_pairs().into_owned().collect();
        assert_eq!(
            query.get("redirect_link").map(String::as_str),
            Some("https://dapp.example/app#phantom_response")
        );
        assert_eq!(query.get("app_url").map(String::as_str), Some("https://dapp.example"));
        assert_eq!(query.get("cluster").map(String::as_str), Some("mainnet-beta"));
        assert!(query.get("data").is_none());
    }

    #[tokio::test]
    async fn test_encrypted_method_requires_session() {
        let f = fixture().await;
        let result = f.comm.build_url(
            DeeplinkMethod::SignMessage,
            "req_1",
            &serde_json::json!({"message": "abc"}),
            None,
        );
        assert_eq!(result.unwrap_err(), DeeplinkError::NotConnected);
    }

    #[tokio::test]
    async fn test_non_object_payload_rejected() {
        let f = fixture().await;
        let result = f.comm.build_url(
            DeeplinkMethod::Connect,
            "req_1",
            &serde_json::json!([1, 2]),
            None,
        );
        assert!(matches!(result, Err(DeeplinkError::Serialization(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_settles_request() {
        let f = fixture().await;
        let pending = f.comm.wait_for_response("req-2", Duration::from_millis(50));
        assert_eq!(f.comm.pending_count(), 1);

        let result = pending.await;
        assert_eq!(
            result,
            Err(DeeplinkError::Timeout {
                request_id: "req-2".to_string(),
                timeout_ms: 50
            })
        );
        assert_eq!(f.comm.pending_count(), 0);
        assert!(f.origin.get("phantom_pending_requests").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_stop_listening_cancels_everything() {
        let f = fixture().await;
        let a = f.comm.wait_for_response("req_a", Duration::from_secs(30));
        let b = f.comm.wait_for_response("req_b", Duration::from_secs(30));
        assert!(f.comm.is_listening());

        f.comm.stop_listening();
        assert!(!f.comm.is_listening());
        assert_eq!(a.await, Err(DeeplinkError::Cancelled));
        assert_eq!(b.await, Err(DeeplinkError::Cancelled));
        assert_eq!(f.comm.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_dropping_communicator_cancels() {
        let f = fixture().await;
        let pending = f.comm.wait_for_response("req_a", Duration::from_secs(30));
        drop(f.comm);
        assert_eq!(pending.await, Err(DeeplinkError::Cancelled));
    }

    #[tokio::test]
    async fn test_wallet_error_rejects_matching_request() {
        let f = fixture().await;
        let pending = f.comm.wait_for_response("req_1", Duration::from_secs(30));

        f.tab.deliver_redirect(format!(
            "{PAGE}#phantom_response?request_id=req_1&errorCode=4001&errorMessage=User%20rejected"
        ));
        assert_eq!(
            pending.await,
            Err(DeeplinkError::WalletReportedError {
                code: Some("4001".to_string()),
                message: "User rejected".to_string(),
            })
        );
    }

    #[tokio::test]
    async fn test_same_origin_message_delivers_response() {
        let f = fixture().await;
        let pending = f.comm.wait_for_response("req_1", Duration::from_secs(30));

        let message = serde_json::json!({
            "type": "phantom-deeplink-response",
            "response": "#request_id=req_1&errorMessage=nope",
        });
        // Other origins are ignored
        f.tab.post_message("https://evil.example", message.clone());
        tokio::task::yield_now().await;
        assert_eq!(f.comm.pending_count(), 1);

        f.tab.post_message("https://dapp.example", message);
        assert!(matches!(
            pending.await,
            Err(DeeplinkError::WalletReportedError { .. })
        ));
    }

    #[tokio::test]
    async fn test_plaintext_handshake_persists_session() {
        let f = fixture().await;
        let wallet = SealedKeyPair::generate(0);
        let pending = f.comm.wait_for_response("req_c", Duration::from_secs(60));

        f.tab.deliver_redirect(format!(
            "{PAGE}#phantom_response?public_key=Addr1&session=sess-123&phantom_encryption_public_key={}",
            wallet.public_key_base58()
        ));
        let value = pending.await.unwrap();
        assert_eq!(value["public_key"], "Addr1");

        let session = f.comm.sessions().load().unwrap();
        assert_eq!(session.wallet_address.as_deref(), Some("Addr1"));
        assert_eq!(session.session_token.as_deref(), Some("sess-123"));
        assert!(session.is_valid());
    }

    #[tokio::test]
    async fn test_clean_url_strips_response() {
        let f = fixture().await;
        f.tab.replace_location(&format!("{PAGE}?x=1#phantom_response?data=d")).unwrap();
        f.comm.clean_url();
        assert_eq!(f.tab.location(), PAGE);
        // Idempotent
        f.comm.clean_url();
        assert_eq!(f.tab.location(), PAGE);
    }
}
