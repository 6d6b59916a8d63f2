//! Deep-link URL construction.

use std::fmt;
use std::str::FromStr;

use url::Url;

use dlk_crypto::EncryptedPayload;

use crate::config::RESPONSE_FRAGMENT;
use crate::errors::DeeplinkError;

/// Wallet methods reachable through a deep link.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DeeplinkMethod {
    Connect,
    Disconnect,
    SignMessage,
    SignTransaction,
    SignAllTransactions,
    SignAndSendTransaction,
}

impl DeeplinkMethod {
    pub const ALL: [DeeplinkMethod; 6] = [
        DeeplinkMethod::Connect,
        DeeplinkMethod::Disconnect,
        DeeplinkMethod::SignMessage,
        DeeplinkMethod::SignTransaction,
        DeeplinkMethod::SignAllTransactions,
        DeeplinkMethod::SignAndSendTransaction,
    ];

    /// Path segment under the wallet base URL.
    pub fn as_str(self) -> &'static str {
        match self {
            DeeplinkMethod::Connect => "connect",
            DeeplinkMethod::Disconnect => "disconnect",
            DeeplinkMethod::SignMessage => "signMessage",
            DeeplinkMethod::SignTransaction => "signTransaction",
            DeeplinkMethod::SignAllTransactions => "signAllTransactions",
            DeeplinkMethod::SignAndSendTransaction => "signAndSendTransaction",
        }
    }
}

impl fmt::Display for DeeplinkMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeeplinkMethod {
    type Err = DeeplinkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DeeplinkMethod::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| DeeplinkError::UnsupportedOperation(format!("unknown method {s}")))
    }
}

/// `<base>/<method>`.
pub fn method_url(wallet_base_url: &str, method: DeeplinkMethod) -> Result<Url, DeeplinkError> {
    let mut url = Url::parse(wallet_base_url)
        .map_err(|e| DeeplinkError::Navigation(format!("invalid wallet base url: {e}")))?;
    url.path_segments_mut()
        .map_err(|_| DeeplinkError::Navigation("wallet base url cannot carry a path".to_string()))?
        .pop_if_empty()
        .push(method.as_str());
    Ok(url)
}

/// Default redirect target: the current page (query and fragment dropped)
/// with the response marker fragment.
pub fn default_redirect_link(location: &str) -> Result<Url, DeeplinkError> {
    let mut url = Url::parse(location)
        .map_err(|e| DeeplinkError::Navigation(format!("invalid page location: {e}")))?;
    url.set_query(None);
    url.set_fragment(Some(RESPONSE_FRAGMENT));
    Ok(url)
}

/// Deep link carrying an encrypted payload.
pub fn encrypted_url(
    wallet_base_url: &str,
    method: DeeplinkMethod,
    dapp_public_key: &str,
    payload: &EncryptedPayload,
    redirect_link: &str,
    request_id: &str,
) -> Result<Url, DeeplinkError> {
    let mut url = method_url(wallet_base_url, method)?;
    url.query_pairs_mut()
        .append_pair("dapp_encryption_public_key", dapp_public_key)
        .append_pair("nonce", &payload.nonce)
        .append_pair("data", &payload.data)
        .append_pair("redirect_link", redirect_link)
        .append_pair("request_id", request_id);
    Ok(url)
}

/// Plaintext handshake deep link. `extra` carries method-specific string
/// fields such as `cluster`.
pub fn handshake_url<'a>(
    wallet_base_url: &str,
    method: DeeplinkMethod,
    dapp_public_key: &str,
    redirect_link: &str,
    app_url: &str,
    request_id: &str,
    extra: impl IntoIterator<Item = (&'a str, &'a str)>,
) -> Result<Url, DeeplinkError> {
    let mut url = method_url(wallet_base_url, method)?;
    {
        let mut query = url.query_pairs_mut();
        query
            .append_pair("dapp_encryption_public_key", dapp_public_key)
            .append_pair("redirect_link", redirect_link)
            .append_pair("app_url", app_url)
            .append_pair("request_id", request_id);
        for (key, value) in extra {
            query.append_pair(key, value);
        }
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(url: &Url, key: &str) -> Option<String> {
        url.query_pairs()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
    }

    #[test]
    fn test_method_names_round_trip() {
        for method in DeeplinkMethod::ALL {
            assert_eq!(method.as_str().parse::<DeeplinkMethod>().unwrap(), method);
        }
        assert!("browse".parse::<DeeplinkMethod>().is_err());
    }

    #[test]
    fn test_method_url_appends_segment() {
        let url = method_url("https://phantom.app/ul/v1", DeeplinkMethod::SignMessage).unwrap();
        assert_eq!(url.as_str(), "https://phantom.app/ul/v1/signMessage");

        let url = method_url("https://phantom.app/ul/v1/", DeeplinkMethod::Connect).unwrap();
        assert_eq!(url.as_str(), "https://phantom.app/ul/v1/connect");
    }

    #[test]
    fn test_default_redirect_link() {
        let url = default_redirect_link("https://dapp.example/app?x=1#old").unwrap();
        assert_eq!(url.as_str(), "https://dapp.example/app#phantom_response");
    }

    #[test]
    fn test_handshake_url_fields() {
        let url = handshake_url(
            "https://phantom.app/ul/v1",
            DeeplinkMethod::Connect,
            "DappKey",
            "https://dapp.example/#phantom_response",
            "https://dapp.example",
            "req_1",
            [("cluster", "devnet")],
        )
        .unwrap();
        assert_eq!(url.path(), "/ul/v1/connect");
        assert_eq!(query(&url, "dapp_encryption_public_key").as_deref(), Some("DappKey"));
        assert_eq!(
            query(&url, "redirect_link").as_deref(),
            Some("https://dapp.example/#phantom_response")
        );
        assert_eq!(query(&url, "app_url").as_deref(), Some("https://dapp.example"));
        assert_eq!(query(&url, "request_id").as_deref(), Some("req_1"));
        assert_eq!(query(&url, "cluster").as_deref(), Some("devnet"));
    }

    #[test]
    fn test_encrypted_url_fields() {
        let payload = EncryptedPayload {
            nonce: "N".to_string(),
            data: "D".to_string(),
        };
        let url = encrypted_url(
            "https://phantom.app/ul/v1",
            DeeplinkMethod::SignTransaction,
            "DappKey",
            &payload,
            "https://dapp.example/#phantom_response",
            "req_2",
        )
        .unwrap();
        assert_eq!(url.path(), "/ul/v1/signTransaction");
        assert_eq!(query(&url, "nonce").as_deref(), Some("N"));
        assert_eq!(query(&url, "data").as_deref(), Some("D"));
        assert_eq!(query(&url, "request_id").as_deref(), Some("req_2"));
        assert!(query(&url, "app_url").is_none());
    }
}
