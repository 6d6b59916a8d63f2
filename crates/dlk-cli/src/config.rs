//! `dlk` settings file.
//!
//! A TOML file in the platform config directory, e.g.
//! `~/.config/dlk/config.toml` on Linux:
//!
//! ```toml
//! [wallet]
//! wallet_base_url = "https://phantom.app/ul/v1"
//! cluster = "mainnet-beta"
//! connect_timeout_ms = 60000
//!
//! [page]
//! url = "http://localhost:3000/"
//!
//! [storage]
//! db_path = "/var/lib/dlk/dlk.db"
//!
//! [output]
//! format = "json"
//!
//! [logging]
//! level = "warn"
//! ```
//!
//! Every section is optional. Command-line flags win over the file.

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use dlk_core::DeeplinkConfig;

use crate::output::OutputFormat;

const CONFIG_FILE: &str = "config.toml";
const DB_FILE: &str = "dlk.db";
const LOG_LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot access config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("cannot encode config: {0}")]
    Encode(#[from] toml::ser::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// Sections
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub wallet: DeeplinkConfig,
    /// The page this terminal stands in for
    pub page: PageConfig,
    pub storage: StorageConfig,
    pub output: OutputConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PageConfig {
    /// Location the wallet redirects back to; its origin is the dapp origin.
    pub url: String,
}

impl Default for PageConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:3000/".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Key and session database. Unset or empty means the data directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub db_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub format: OutputFormat,
    pub verbose: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
        }
    }
}

// ============================================================================
// Loading
// ============================================================================

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("io", "dlk", "dlk")
}

impl Config {
    /// Read and validate the file at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(&std::fs::read_to_string(path)?)?;
        config.validate()?;
        Ok(config)
    }

    /// Read `custom_path`, or the default file. A missing default file
    /// yields the built-in defaults; a missing custom file is an error.
    pub fn load_from(custom_path: Option<&Path>) -> Result<Self, ConfigError> {
        match (custom_path, Self::default_path()) {
            (Some(path), _) => Self::load(path),
            (None, Some(path)) if path.exists() => Self::load(&path),
            (None, _) => Ok(Self::default()),
        }
    }

    pub fn default_path() -> Option<PathBuf> {
        project_dirs().map(|dirs| dirs.config_dir().join(CONFIG_FILE))
    }

    pub fn data_dir() -> Option<PathBuf> {
        project_dirs().map(|dirs| dirs.data_dir().to_path_buf())
    }

    /// Database location after applying the fallback chain.
    pub fn db_path(&self) -> PathBuf {
        match &self.storage.db_path {
            Some(path) if !path.as_os_str().is_empty() => path.clone(),
            _ => Self::data_dir()
                .map(|dir| dir.join(DB_FILE))
                .unwrap_or_else(|| PathBuf::from(DB_FILE)),
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Write the defaults to the default path on first run. Returns whether
    /// a file was created.
    pub fn create_default_if_missing() -> Result<bool, ConfigError> {
        match Self::default_path() {
            Some(path) if !path.exists() => {
                Self::default().save(&path)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.wallet
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;

        match url::Url::parse(&self.page.url) {
            Ok(page) if matches!(page.scheme(), "http" | "https") => {}
            Ok(_) => {
                return Err(ConfigError::Invalid(format!(
                    "page url {} is not http(s)",
                    self.page.url
                )))
            }
            Err(e) => {
                return Err(ConfigError::Invalid(format!(
                    "page url {}: {e}",
                    self.page.url
                )))
            }
        }

        if !LOG_LEVELS.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "log level {} is not one of {}",
                self.logging.level,
                LOG_LEVELS.join(", ")
            )));
        }
        Ok(())
    }
}

// ============================================================================
// Command-line overrides
// ============================================================================

/// Values given on the command line. `None` keeps the file value.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub output_format: Option<OutputFormat>,
    pub verbose: Option<bool>,
    pub debug: Option<bool>,
    pub db_path: Option<PathBuf>,
    pub cluster: Option<String>,
    pub wallet_url: Option<String>,
    pub page_url: Option<String>,
}

impl Config {
    pub fn with_overrides(mut self, overrides: &CliOverrides) -> Self {
        let CliOverrides {
            output_format,
            verbose,
            debug,
            db_path,
            cluster,
            wallet_url,
            page_url,
        } = overrides.clone();

        if let Some(cluster) = cluster {
            self.wallet.cluster = cluster;
        }
        if let Some(url) = wallet_url {
            self.wallet.wallet_base_url = url;
        }
        if let Some(url) = page_url {
            self.page.url = url;
        }
        if db_path.is_some() {
            self.storage.db_path = db_path;
        }
        self.output.format = output_format.unwrap_or(self.output.format);
        self.output.verbose |= verbose.unwrap_or(false);
        if debug == Some(true) {
            self.logging.level = "debug".to_string();
        }
        self
    }
}
