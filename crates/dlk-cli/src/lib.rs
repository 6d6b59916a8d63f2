//! DLK CLI - drive deep-link wallet exchanges from a terminal
//!
//! The terminal stands in for the browser tab: deep links are printed for
//! the user to open on the wallet device, and the redirect URL the wallet
//! produces is pasted back on stdin. Keys and the wallet session persist in
//! a SQLite database between runs.

pub mod cli;
pub mod config;
pub mod output;
pub mod terminal;
pub mod wallet;

#[cfg(test)]
mod proptests;

pub use cli::Cli;
pub use config::{CliOverrides, Config};
pub use output::{JsonResponse, OutputFormat, OutputFormatter};

use dlk_core::DeeplinkError;

/// Exit codes for CLI operations
///
/// - 0: Success
/// - 1: General error
/// - 2: The wallet rejected the request
/// - 3: No wallet response before the deadline
/// - 4: No wallet session; run `dlk connect` first
/// - 5: Bad arguments or data
/// - 6: The wallet response could not be decrypted or understood
/// - 7: Operation not supported
/// - 8: Local key or session storage failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,
    GeneralError = 1,
    WalletRejected = 2,
    Timeout = 3,
    NotConnected = 4,
    InvalidInput = 5,
    ProtocolError = 6,
    Unsupported = 7,
    StorageError = 8,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

impl From<&DeeplinkError> for ExitCode {
    fn from(error: &DeeplinkError) -> Self {
        match error {
            DeeplinkError::WalletReportedError { .. } => ExitCode::WalletRejected,
            DeeplinkError::Timeout { .. } => ExitCode::Timeout,
            DeeplinkError::NotConnected | DeeplinkError::NotInitialized => ExitCode::NotConnected,
            DeeplinkError::Serialization(_) => ExitCode::InvalidInput,
            DeeplinkError::DecryptionFailure
            | DeeplinkError::InvalidPublicKey(_)
            | DeeplinkError::MalformedResponse(_) => ExitCode::ProtocolError,
            DeeplinkError::UnsupportedOperation(_) | DeeplinkError::EnvironmentUnsupported(_) => {
                ExitCode::Unsupported
            }
            DeeplinkError::Storage(_) => ExitCode::StorageError,
            DeeplinkError::Cancelled | DeeplinkError::Navigation(_) => ExitCode::GeneralError,
        }
    }
}

impl ExitCode {
    /// Convert to process exit code
    pub fn to_exit_code(self) -> std::process::ExitCode {
        std::process::ExitCode::from(self as u8)
    }

    pub fn name(&self) -> &'static str {
        match self {
            ExitCode::Success => "SUCCESS",
            ExitCode::GeneralError => "GENERAL_ERROR",
            ExitCode::WalletRejected => "WALLET_REJECTED",
            ExitCode::Timeout => "TIMEOUT",
            ExitCode::NotConnected => "NOT_CONNECTED",
            ExitCode::InvalidInput => "INVALID_INPUT",
            ExitCode::ProtocolError => "PROTOCOL_ERROR",
            ExitCode::Unsupported => "UNSUPPORTED",
            ExitCode::StorageError => "STORAGE_ERROR",
        }
    }
}
