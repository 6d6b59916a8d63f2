//! DLK Chains - chain adapters and the provider facade.
//!
//! - [`SolanaAdapter`]: connect, sign and send over encrypted deep links
//! - [`EthereumAdapter`]: placeholder until the wallet ships Ethereum links
//! - [`DeeplinkProvider`]: one entry point per tab with lifecycle events

#![forbid(unsafe_code)]

pub mod adapter;
pub mod ethereum;
pub mod provider;
pub mod solana;

pub use adapter::{AddressType, ChainAdapter, SignedMessage, WalletAddress};
pub use ethereum::EthereumAdapter;
pub use provider::{ConnectSource, DeeplinkProvider, ProviderConfig, ProviderError, ProviderEvent};
pub use solana::SolanaAdapter;
