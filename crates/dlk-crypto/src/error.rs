/// Error type for key agreement and payload encryption.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CryptoError {
    /// The ciphertext did not authenticate, or its envelope could not be read.
    #[error("decryption failed")]
    DecryptionFailure,
    #[error("encryption failed")]
    EncryptionFailed,
    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),
    #[error("invalid base58 encoding")]
    InvalidEncoding,
    #[error("serialization failed: {0}")]
    Serialization(String),
    #[error("RNG failed")]
    Rng,
}
