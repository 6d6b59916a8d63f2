//! Cryptography for deep-link wallet exchanges.
//!
//! - X25519 key pairs whose private half stays inside [`SealedKeyPair`]
//! - Shared-secret derivation (X25519 + HSalsa20, NaCl `box.before`)
//! - Authenticated secret-box encryption of JSON payloads (XSalsa20-Poly1305)
//! - Base58 helpers for URL-safe transport

#![forbid(unsafe_code)]

pub mod cipher;
pub mod encoding;
pub mod error;
pub mod keys;

#[cfg(test)]
mod proptests;

pub use cipher::{decrypt, encrypt, open, seal, EncryptedPayload, NONCE_LEN};
pub use error::CryptoError;
pub use keys::{decode_public_key, SealedKeyPair, SharedSecret, PUBLIC_KEY_LEN, SHARED_SECRET_LEN};
