//! Output formatting for CLI results
//!
//! Three formats:
//! - Table: Human-readable tables (default)
//! - JSON: Structured JSON for scripting
//! - Quiet: Minimal output, exit codes only

use std::str::FromStr;

use comfy_table::{presets::UTF8_FULL, Table};
use serde::{Deserialize, Serialize};

use dlk_chains::WalletAddress;

use crate::ExitCode;

/// Output format options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
    Quiet,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" => Ok(Self::Table),
            "json" => Ok(Self::Json),
            "quiet" => Ok(Self::Quiet),
            _ => Err(format!("Unknown output format: {s}")),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Table => write!(f, "table"),
            Self::Json => write!(f, "json"),
            Self::Quiet => write!(f, "quiet"),
        }
    }
}

/// Standard JSON response wrapper
#[derive(Serialize)]
pub struct JsonResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// ISO 8601 timestamp
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
}

impl<T: Serialize> JsonResponse<T> {
    pub fn success_with_command(data: T, command: &str) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
            command: Some(command.to_string()),
        }
    }
}

impl JsonResponse<()> {
    pub fn error(message: &str) -> JsonResponse<()> {
        JsonResponse {
            success: false,
            data: None,
            error: Some(message.to_string()),
            timestamp: chrono::Utc::now().to_rfc3339(),
            command: None,
        }
    }
}

// ============================================================================
// Result Types
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct ConnectOutput {
    pub addresses: Vec<WalletAddress>,
    pub dapp_public_key: String,
}

/// Signature over a message or transaction, base58 encoded
#[derive(Debug, Clone, Serialize)]
pub struct SignatureOutput {
    pub signature: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TransactionsOutput {
    pub transactions: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusInfo {
    pub connected: bool,
    pub wallet_address: Option<String>,
    pub dapp_public_key: Option<String>,
    pub key_created_at: Option<i64>,
    pub cluster: String,
    pub wallet_base_url: String,
    pub db_path: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DisconnectOutput {
    pub forgot_keys: bool,
}

// ============================================================================
// Formatter
// ============================================================================

/// Formats output for different modes
pub struct OutputFormatter {
    format: OutputFormat,
    verbose: bool,
}

impl OutputFormatter {
    pub fn new(format: OutputFormat, verbose: bool) -> Self {
        Self { format, verbose }
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    pub fn is_quiet(&self) -> bool {
        self.format == OutputFormat::Quiet
    }

    pub fn format_connect(&self, result: &ConnectOutput) -> String {
        match self.format {
            OutputFormat::Table => {
                let mut table = Table::new();
                table.load_preset(UTF8_FULL);
                table.set_header(vec!["Chain", "Address"]);
                for address in &result.addresses {
                    table.add_row(vec![address.address_type.as_str(), address.address.as_str()]);
                }
                table.to_string()
            }
            OutputFormat::Json => self.to_json_response(result, "connect"),
            OutputFormat::Quiet => String::new(),
        }
    }

    pub fn format_signature(&self, result: &SignatureOutput, command: &str) -> String {
        match self.format {
            OutputFormat::Table => {
                let mut table = Table::new();
                table.load_preset(UTF8_FULL);
                table.set_header(vec!["Property", "Value"]);
                table.add_row(vec!["Signature", result.signature.as_str()]);
                if let Some(public_key) = &result.public_key {
                    table.add_row(vec!["Public Key", public_key.as_str()]);
                }
                table.to_string()
            }
            OutputFormat::Json => self.to_json_response(result, command),
            OutputFormat::Quiet => String::new(),
        }
    }

    pub fn format_transactions(&self, result: &TransactionsOutput, command: &str) -> String {
        match self.format {
            OutputFormat::Table => {
                let mut table = Table::new();
                table.load_preset(UTF8_FULL);
                table.set_header(vec!["#", "Signed Transaction"]);
                for (i, tx) in result.transactions.iter().enumerate() {
                    table.add_row(vec![(i + 1).to_string(), tx.clone()]);
                }
                table.to_string()
            }
            OutputFormat::Json => self.to_json_response(result, command),
            OutputFormat::Quiet => String::new(),
        }
    }

    pub fn format_status(&self, status: &StatusInfo) -> String {
        match self.format {
            OutputFormat::Table => {
                let mut table = Table::new();
                table.load_preset(UTF8_FULL);
                table.set_header(vec!["Property", "Value"]);
                table.add_row(vec!["Connected", if status.connected { "yes" } else { "no" }]);
                table.add_row(vec!["Wallet Address", status.wallet_address.as_deref().unwrap_or("-")]);
                table.add_row(vec!["Dapp Public Key", status.dapp_public_key.as_deref().unwrap_or("-")]);
                table.add_row(vec![
                    "Key Created At",
                    status.key_created_at.map(format_time).unwrap_or_else(|| "-".to_string()).as_str(),
                ]);
                table.add_row(vec!["Cluster", status.cluster.as_str()]);
                table.add_row(vec!["Wallet URL", status.wallet_base_url.as_str()]);
                table.add_row(vec!["Database", status.db_path.as_str()]);
                table.to_string()
            }
            OutputFormat::Json => self.to_json_response(status, "status"),
            OutputFormat::Quiet => String::new(),
        }
    }

    pub fn format_disconnect(&self, result: &DisconnectOutput) -> String {
        match self.format {
            OutputFormat::Table if result.forgot_keys => {
                "✓ Disconnected and removed the dapp key pair".to_string()
            }
            OutputFormat::Table => "✓ Disconnected".to_string(),
            OutputFormat::Json => self.to_json_response(result, "disconnect"),
            OutputFormat::Quiet => String::new(),
        }
    }

    /// Format error with exit code context
    pub fn format_error_with_code(&self, error: &dyn std::error::Error, code: ExitCode) -> String {
        match self.format {
            OutputFormat::Table => format!("Error: {error}"),
            OutputFormat::Json => {
                let response = JsonResponse::<()>::error(&error.to_string());
                let mut output = match serde_json::to_value(&response) {
                    Ok(value) => value,
                    Err(e) => return format!("{{\"error\": \"{e}\"}}"),
                };
                output["exit_code"] = serde_json::json!(code as i32);
                output["exit_code_name"] = serde_json::json!(code.name());
                self.to_json(&output)
            }
            OutputFormat::Quiet => String::new(),
        }
    }

    /// Progress message (verbose table mode only)
    pub fn progress(&self, message: &str) {
        if self.verbose && self.format == OutputFormat::Table {
            eprintln!("... {message}");
        }
    }

    fn to_json<T: Serialize>(&self, value: &T) -> String {
        serde_json::to_string_pretty(value).unwrap_or_else(|e| format!("{{\"error\": \"{e}\"}}"))
    }

    fn to_json_response<T: Serialize>(&self, value: &T, command: &str) -> String {
        self.to_json(&JsonResponse::success_with_command(value, command))
    }
}

fn format_time(unix_seconds: i64) -> String {
    chrono::DateTime::from_timestamp(unix_seconds, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| unix_seconds.to_string())
}
