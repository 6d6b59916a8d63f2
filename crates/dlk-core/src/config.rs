//! Deep-link engine configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

/// Default wallet deep-link namespace.
pub const DEFAULT_WALLET_BASE_URL: &str = "https://phantom.app/ul/v1";

/// Fragment appended to the redirect link so responses are recognizable.
pub const RESPONSE_FRAGMENT: &str = "phantom_response";

/// Default timeout for ordinary requests (ms).
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Default timeout for the connect handshake (ms).
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 60_000;

/// Configuration errors.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Storage keys shared by every tab of an origin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageKeys {
    pub session: String,
    pub pending_registry: String,
    pub response_channel: String,
}

impl Default for StorageKeys {
    fn default() -> Self {
        Self {
            session: "phantom-deeplinks-session".to_string(),
            pending_registry: "phantom_pending_requests".to_string(),
            response_channel: "phantom_deeplink_response".to_string(),
        }
    }
}

/// Settings for building deep links and awaiting responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeeplinkConfig {
    /// Wallet deep-link namespace; the method name is appended as a path segment
    pub wallet_base_url: String,
    /// Origin announced to the wallet; defaults to the page origin
    pub app_url: Option<String>,
    /// Where the wallet sends the user back; defaults to the current page
    /// with a `#phantom_response` fragment
    pub redirect_link: Option<String>,
    pub cluster: String,
    pub default_timeout_ms: u64,
    pub connect_timeout_ms: u64,
    /// `type` of same-origin window messages carrying a response
    pub message_type: String,
    pub storage_keys: StorageKeys,
}

impl Default for DeeplinkConfig {
    fn default() -> Self {
        Self {
            wallet_base_url: DEFAULT_WALLET_BASE_URL.to_string(),
            app_url: None,
            redirect_link: None,
            cluster: "mainnet-beta".to_string(),
            default_timeout_ms: DEFAULT_TIMEOUT_MS,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            message_type: "phantom-deeplink-response".to_string(),
            storage_keys: StorageKeys::default(),
        }
    }
}

impl DeeplinkConfig {
    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "default_timeout_ms",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.connect_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "connect_timeout_ms",
                reason: "must be greater than zero".to_string(),
            });
        }

        let base = Url::parse(&self.wallet_base_url).map_err(|e| ConfigError::Invalid {
            field: "wallet_base_url",
            reason: e.to_string(),
        })?;
        if base.cannot_be_a_base() {
            return Err(ConfigError::Invalid {
                field: "wallet_base_url",
                reason: "cannot carry a path".to_string(),
            });
        }

        for (field, value) in [
            ("app_url", &self.app_url),
            ("redirect_link", &self.redirect_link),
        ] {
            if let Some(value) = value {
                Url::parse(value).map_err(|e| ConfigError::Invalid {
                    field,
                    reason: e.to_string(),
                })?;
            }
        }

        if self.cluster.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "cluster",
                reason: "must not be empty".to_string(),
            });
        }

        let keys = &self.storage_keys;
        if keys.session.is_empty() || keys.pending_registry.is_empty() || keys.response_channel.is_empty()
        {
            return Err(ConfigError::Invalid {
                field: "storage_keys",
                reason: "keys must not be empty".to_string(),
            });
        }
        Ok(())
    }
}
