//! CLI command definitions and argument parsing

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::Config;
use crate::output::{OutputFormat, OutputFormatter};
use crate::wallet::WalletContext;
use crate::ExitCode;

/// DLK - talk to a mobile wallet through deep links
#[derive(Parser, Debug)]
#[command(name = "dlk")]
#[command(version, about = "Drive deep-link wallet exchanges from a terminal")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output format [default: the config file's, else table]
    #[arg(long, global = true)]
    pub output: Option<OutputFormat>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Config file path
    #[arg(long, global = true, env = "DLK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Key and session database path
    #[arg(long, global = true, env = "DLK_DB")]
    pub db: Option<PathBuf>,

    /// Solana cluster announced on connect
    #[arg(long, global = true)]
    pub cluster: Option<String>,

    /// Wallet deep-link base URL
    #[arg(long = "wallet-url", global = true)]
    pub wallet_url: Option<String>,

    /// Page URL the wallet redirects back to
    #[arg(long = "page-url", global = true)]
    pub page_url: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Connect to the wallet (reuses a stored session)
    Connect,

    /// Ask the wallet to sign a UTF-8 message
    SignMessage {
        message: String,
    },

    /// Ask the wallet to sign a base58 serialized transaction
    SignTransaction {
        transaction: String,
    },

    /// Ask the wallet to sign several transactions at once
    SignAll {
        #[arg(required = true)]
        transactions: Vec<String>,
    },

    /// Ask the wallet to sign and submit a transaction
    SignAndSend {
        transaction: String,
    },

    /// Show the stored key and session
    Status,

    /// End the wallet session
    Disconnect {
        /// Also delete the dapp key pair
        #[arg(long)]
        forget_keys: bool,
    },
}

impl Commands {
    pub fn name(&self) -> &'static str {
        match self {
            Commands::Connect => "connect",
            Commands::SignMessage { .. } => "sign-message",
            Commands::SignTransaction { .. } => "sign-transaction",
            Commands::SignAll { .. } => "sign-all",
            Commands::SignAndSend { .. } => "sign-and-send",
            Commands::Status => "status",
            Commands::Disconnect { .. } => "disconnect",
        }
    }

    /// Whether the command needs the user to paste a wallet redirect.
    pub fn reads_stdin(&self) -> bool {
        !matches!(self, Commands::Status | Commands::Disconnect { .. })
    }
}

impl Cli {
    /// Execute the CLI command with a pre-loaded configuration
    pub async fn execute_with_config(self, config: Config) -> anyhow::Result<ExitCode> {
        let formatter = OutputFormatter::new(config.output.format, config.output.verbose);
        let (context, page) = WalletContext::open(&config).await?;

        let reader = self.command.reads_stdin().then(|| page.spawn_stdin_reader());
        formatter.progress(&format!("running {}", self.command.name()));

        let result = tokio::select! {
            result = run(&self.command, &context, &formatter) => result,
            _ = tokio::signal::ctrl_c() => Err(dlk_core::DeeplinkError::Cancelled),
        };

        context.close();
        if let Some(reader) = reader {
            reader.abort();
        }

        match result {
            Ok(rendered) => {
                if !rendered.is_empty() {
                    println!("{rendered}");
                }
                Ok(ExitCode::Success)
            }
            Err(e) => {
                let code = ExitCode::from(&e);
                if !formatter.is_quiet() {
                    eprintln!("{}", formatter.format_error_with_code(&e, code));
                }
                Ok(code)
            }
        }
    }
}

async fn run(
    command: &Commands,
    context: &WalletContext,
    formatter: &OutputFormatter,
) -> Result<String, dlk_core::DeeplinkError> {
    let name = command.name();
    Ok(match command {
        Commands::Connect => formatter.format_connect(&context.connect().await?),
        Commands::SignMessage { message } => {
            formatter.format_signature(&context.sign_message(message).await?, name)
        }
        Commands::SignTransaction { transaction } => {
            formatter.format_transactions(&context.sign_transaction(transaction).await?, name)
        }
        Commands::SignAll { transactions } => {
            formatter.format_transactions(&context.sign_all(transactions).await?, name)
        }
        Commands::SignAndSend { transaction } => {
            formatter.format_signature(&context.sign_and_send(transaction).await?, name)
        }
        Commands::Status => formatter.format_status(&context.status()),
        Commands::Disconnect { forget_keys } => {
            formatter.format_disconnect(&context.disconnect(*forget_keys).await?)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CliOverrides;

    #[test]
    fn test_parse_sign_all() {
        let cli = Cli::try_parse_from(["dlk", "sign-all", "abc", "def", "--output", "json"]).unwrap();
        assert_eq!(cli.output, Some(OutputFormat::Json));
        match cli.command {
            Commands::SignAll { transactions } => assert_eq!(transactions, vec!["abc", "def"]),
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_sign_all_requires_transactions() {
        assert!(Cli::try_parse_from(["dlk", "sign-all"]).is_err());
    }

    #[test]
    fn test_global_overrides() {
        let cli = Cli::try_parse_from([
            "dlk",
            "--cluster",
            "devnet",
            "disconnect",
            "--forget-keys",
            "--db",
            "/tmp/x.db",
        ])
        .unwrap();
        assert_eq!(cli.cluster.as_deref(), Some("devnet"));
        assert_eq!(cli.db, Some(PathBuf::from("/tmp/x.db")));
        assert!(cli.output.is_none());
        assert!(matches!(cli.command, Commands::Disconnect { forget_keys: true }));
        assert!(!cli.command.reads_stdin());
    }

    #[test]
    fn test_command_names() {
        let cli = Cli::try_parse_from(["dlk", "sign-and-send", "9Ajdvzr"]).unwrap();
        assert_eq!(cli.command.name(), "sign-and-send");
        assert!(cli.command.reads_stdin());
    }

    #[test]
    fn test_config_file_format_applies_without_flag() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[output]\nformat = \"json\"\n").unwrap();

        let cli = Cli::try_parse_from(["dlk", "status"]).unwrap();
        let overrides = CliOverrides {
            output_format: cli.output,
            ..Default::default()
        };
        let config = Config::load(&path).unwrap().with_overrides(&overrides);
        assert_eq!(config.output.format, OutputFormat::Json);

        let cli = Cli::try_parse_from(["dlk", "status", "--output", "quiet"]).unwrap();
        let overrides = CliOverrides {
            output_format: cli.output,
            ..Default::default()
        };
        let config = Config::load(&path).unwrap().with_overrides(&overrides);
        assert_eq!(config.output.format, OutputFormat::Quiet);
    }
}
