//! DLK Core - deep-link request/response engine.
//!
//! This crate implements:
//! - The per-origin key vault and its storage seam
//! - Wallet session persistence
//! - Deep-link URL construction and response classification
//! - Request correlation with timeouts and cross-tab forwarding
//! - In-process page and origin storage for tests and headless drivers

#![forbid(unsafe_code)]

// Engine
pub mod communicator;
pub mod session;
pub mod vault;

// Protocol
pub mod deeplink;
pub mod registry;
pub mod response;

// Environment seams
pub mod page;
pub mod storage;

// Supporting modules
pub mod config;
pub mod errors;
pub mod harness;

#[cfg(test)]
mod proptests;

// Optional storage implementations
#[cfg(feature = "sqlite")]
pub mod sqlite_store;

pub use communicator::{generate_request_id, Communicator, PendingResponse, ResponseResult};
pub use config::{DeeplinkConfig, StorageKeys};
pub use deeplink::DeeplinkMethod;
pub use errors::{DeeplinkError, StorageError};
pub use page::{PageEvent, PageHost, SimulatedTab};
pub use registry::{resolve_tab_role, TabRole};
pub use response::{classify, ResponseParams, WalletResponse};
pub use session::{Session, SessionRecord, SessionStore};
pub use storage::{MemoryOrigin, OriginStorage, StorageEvent, StorageSubscription};
pub use vault::{KeyStore, KeyVault, MemoryKeyStore};

#[cfg(feature = "sqlite")]
pub use sqlite_store::SqliteStore;
