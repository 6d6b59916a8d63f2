//! Wallet response parsing and classification.
//!
//! A wallet response arrives as loose key/value pairs in a URL query string
//! or fragment. [`params_from_location`] extracts them and [`classify`]
//! turns them into a [`WalletResponse`] exactly once per event.

use std::collections::BTreeMap;

use serde_json::Value;
use url::{form_urlencoded, Url};

use dlk_crypto::EncryptedPayload;

use crate::config::RESPONSE_FRAGMENT;

/// Raw response fields, keyed by parameter name.
pub type ResponseParams = BTreeMap<String, String>;

pub const REQUEST_ID: &str = "request_id";
pub const ERROR_CODE: &str = "errorCode";
pub const ERROR_MESSAGE: &str = "errorMessage";
pub const NONCE: &str = "nonce";
pub const DATA: &str = "data";
pub const PEER_PUBLIC_KEY: &str = "phantom_encryption_public_key";
pub const PUBLIC_KEY: &str = "public_key";
pub const SESSION: &str = "session";

// ============================================================================
// Parsing
// ============================================================================

/// Parse one URL component (`?query` or `#fragment`, leading marker optional).
///
/// Three shapes are understood:
/// - `phantom_response=<url-encoded JSON object>`
/// - `phantom_response?k=v&...` (the marker segment is dropped)
/// - plain `k=v&...`
pub fn parse_component(raw: &str) -> ResponseParams {
    let clean = raw
        .strip_prefix('#')
        .or_else(|| raw.strip_prefix('?'))
        .unwrap_or(raw);
    let marker_query = format!("{RESPONSE_FRAGMENT}?");
    let clean = clean.strip_prefix(marker_query.as_str()).unwrap_or(clean);
    if clean.is_empty() {
        return ResponseParams::new();
    }

    let pairs: Vec<(String, String)> = form_urlencoded::parse(clean.as_bytes())
        .into_owned()
        .collect();

    if let Some((_, encoded)) = pairs.iter().find(|(k, _)| k == RESPONSE_FRAGMENT) {
        if let Ok(Value::Object(object)) = serde_json::from_str::<Value>(encoded) {
            return flatten_object(&object);
        }
    }

    pairs
        .into_iter()
        .filter(|(k, v)| !k.is_empty() && !v.is_empty())
        .collect()
}

/// Collect response fields from a full location: query first, then the
/// fragment, whose values win on conflict.
pub fn params_from_location(location: &str) -> ResponseParams {
    let Ok(url) = Url::parse(location) else {
        return parse_component(location);
    };
    let mut params = url.query().map(parse_component).unwrap_or_default();
    if let Some(fragment) = url.fragment() {
        params.extend(parse_component(fragment));
    }
    params
}

/// Extract response fields from a window message of type `message_type`.
///
/// The message's `response` may be a location, a bare URL component, or an
/// object of fields.
pub fn params_from_message(data: &Value, message_type: &str) -> Option<ResponseParams> {
    if data.get("type").and_then(Value::as_str) != Some(message_type) {
        return None;
    }
    match data.get("response")? {
        Value::String(raw) => Some(params_from_location(raw)),
        Value::Object(object) => Some(flatten_object(object)),
        _ => None,
    }
}

/// Render any JSON object as response fields. Strings are kept verbatim,
/// nulls dropped, everything else is JSON encoded.
pub fn flatten_object(object: &serde_json::Map<String, Value>) -> ResponseParams {
    object
        .iter()
        .filter_map(|(k, v)| match v {
            Value::Null => None,
            Value::String(s) => Some((k.clone(), s.clone())),
            other => Some((k.clone(), other.to_string())),
        })
        .collect()
}

/// The request id echoed by the wallet, if any.
pub fn request_id(params: &ResponseParams) -> Option<&str> {
    params
        .get(REQUEST_ID)
        .map(String::as_str)
        .filter(|id| !id.is_empty())
}

// ============================================================================
// Classification
// ============================================================================

/// A classified wallet response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WalletResponse {
    /// The wallet reported an error
    Error {
        code: Option<String>,
        message: Option<String>,
    },
    /// An encrypted payload. `peer_key` is present on an encrypted connect
    /// handshake, where the payload is sealed with a key derived from it.
    Encrypted {
        payload: EncryptedPayload,
        peer_key: Option<String>,
    },
    /// A plaintext connect handshake.
    PlaintextHandshake {
        public_key: Option<String>,
        session: Option<String>,
        peer_key: String,
    },
    Unrecognized,
}

impl WalletResponse {
    pub fn kind(&self) -> &'static str {
        match self {
            WalletResponse::Error { .. } => "error",
            WalletResponse::Encrypted { .. } => "encrypted",
            WalletResponse::PlaintextHandshake { .. } => "handshake",
            WalletResponse::Unrecognized => "unrecognized",
        }
    }
}

/// Classify raw response fields. Error fields take priority over an
/// encrypted payload, which takes priority over a plaintext handshake.
pub fn classify(params: &ResponseParams) -> WalletResponse {
    let field = |name: &str| params.get(name).filter(|v| !v.is_empty()).cloned();

    let code = field(ERROR_CODE);
    let message = field(ERROR_MESSAGE);
    if code.is_some() || message.is_some() {
        return WalletResponse::Error { code, message };
    }

    let peer_key = field(PEER_PUBLIC_KEY);
    if let (Some(nonce), Some(data)) = (field(NONCE), field(DATA)) {
        return WalletResponse::Encrypted {
            payload: EncryptedPayload { nonce, data },
            peer_key,
        };
    }

    if let Some(peer_key) = peer_key {
        return WalletResponse::PlaintextHandshake {
            public_key: field(PUBLIC_KEY),
            session: field(SESSION),
            peer_key,
        };
    }

    WalletResponse::Unrecognized
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> ResponseParams {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_parse_plain_pairs() {
        let p = parse_component("?nonce=abc&data=def&request_id=req_1");
        assert_eq!(p, params(&[("nonce", "abc"), ("data", "def"), ("request_id", "req_1")]));
    }

    #[test]
    fn test_parse_marker_segment() {
        let p = parse_component("#phantom_response?errorCode=4001&errorMessage=User%20rejected");
        assert_eq!(
            p,
            params(&[("errorCode", "4001"), ("errorMessage", "User rejected")])
        );
    }

    #[test]
    fn test_parse_json_response() {
        let encoded: String =
            form_urlencoded::byte_serialize(br#"{"nonce":"n","data":"d","count":3,"gone":null}"#)
                .collect();
        let p = parse_component(&format!("#phantom_response={encoded}"));
        assert_eq!(p, params(&[("nonce", "n"), ("data", "d"), ("count", "3")]));
    }

    #[test]
    fn test_bare_marker_and_empty_values() {
        assert!(parse_component("#phantom_response").is_empty());
        assert!(parse_component("").is_empty());
        assert_eq!(parse_component("a=&b=2"), params(&[("b", "2")]));
    }

    #[test]
    fn test_location_merges_query_and_fragment() {
        let p = params_from_location(
            "https://dapp.example/app?request_id=req_q&x=1#phantom_response?request_id=req_f&nonce=n",
        );
        assert_eq!(p.get("request_id").map(String::as_str), Some("req_f"));
        assert_eq!(p.get("x").map(String::as_str), Some("1"));
        assert_eq!(p.get("nonce").map(String::as_str), Some("n"));
    }

    #[test]
    fn test_message_params() {
        let data = serde_json::json!({
            "type": "phantom-deeplink-response",
            "response": "#nonce=n&data=d",
        });
        let p = params_from_message(&data, "phantom-deeplink-response").unwrap();
        assert_eq!(p, params(&[("nonce", "n"), ("data", "d")]));

        let other = serde_json::json!({"type": "something-else", "response": "#nonce=n"});
        assert!(params_from_message(&other, "phantom-deeplink-response").is_none());
    }

    #[test]
    fn test_classify_priority() {
        let p = params(&[("errorCode", "4001"), ("nonce", "n"), ("data", "d")]);
        assert_eq!(
            classify(&p),
            WalletResponse::Error {
                code: Some("4001".to_string()),
                message: None
            }
        );

        let p = params(&[("nonce", "n"), ("data", "d"), ("phantom_encryption_public_key", "K")]);
        assert_eq!(
            classify(&p),
            WalletResponse::Encrypted {
                payload: EncryptedPayload {
                    nonce: "n".to_string(),
                    data: "d".to_string()
                },
                peer_key: Some("K".to_string()),
            }
        );

        let p = params(&[
            ("public_key", "Addr1"),
            ("session", "sess-123"),
            ("phantom_encryption_public_key", "K"),
        ]);
        assert_eq!(
            classify(&p),
            WalletResponse::PlaintextHandshake {
                public_key: Some("Addr1".to_string()),
                session: Some("sess-123".to_string()),
                peer_key: "K".to_string(),
            }
        );
    }

    #[test]
    fn test_classify_unrecognized() {
        assert_eq!(classify(&params(&[("foo", "bar")])), WalletResponse::Unrecognized);
        // Half an encrypted payload is not a response
        assert_eq!(classify(&params(&[("data", "d")])), WalletResponse::Unrecognized);
        assert_eq!(classify(&ResponseParams::new()), WalletResponse::Unrecognized);
    }

    #[test]
    fn test_request_id() {
        assert_eq!(request_id(&params(&[("request_id", "req_1")])), Some("req_1"));
        assert_eq!(request_id(&params(&[("request_id", "")])), None);
        assert_eq!(request_id(&ResponseParams::new()), None);
    }
}
