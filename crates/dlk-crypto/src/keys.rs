//! Key pair and shared-secret handling.
//!
//! The dapp holds one X25519 key pair per origin. The private scalar lives
//! inside [`SealedKeyPair`] and is only ever used through
//! [`SealedKeyPair::diffie_hellman`]; no accessor returns it. Durable stores
//! persist the pair through its serde representation without needing to
//! look inside it.

use rand_core::OsRng;
use salsa20::cipher::consts::U10;
use salsa20::cipher::generic_array::GenericArray;
use salsa20::hsalsa;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::encoding::{from_base58_array, to_base58};
use crate::error::CryptoError;

/// Length of an X25519 public key in bytes.
pub const PUBLIC_KEY_LEN: usize = 32;

/// Length of a derived shared secret in bytes.
pub const SHARED_SECRET_LEN: usize = 32;

// ============================================================================
// Shared Secret
// ============================================================================

/// Symmetric key agreed between the dapp and the wallet.
///
/// This is the NaCl `box.before` value, so it opens payloads produced by
/// any NaCl-compatible wallet.
///
/// Zeroized on drop, compared in constant time, and never printed.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SharedSecret([u8; SHARED_SECRET_LEN]);

impl SharedSecret {
    /// Wrap raw key bytes.
    pub fn from_bytes(bytes: [u8; SHARED_SECRET_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; SHARED_SECRET_LEN] {
        &self.0
    }
}

impl PartialEq for SharedSecret {
    fn eq(&self, other: &Self) -> bool {
        constant_time_eq::constant_time_eq(&self.0, &other.0)
    }
}

impl Eq for SharedSecret {}

impl std::fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SharedSecret(<redacted>)")
    }
}

// ============================================================================
// Sealed Key Pair
// ============================================================================

/// An X25519 key pair whose private half cannot be read back out.
#[derive(Clone)]
pub struct SealedKeyPair {
    secret: StaticSecret,
    public: X25519PublicKey,
    created_at_unix: i64,
}

impl SealedKeyPair {
    /// Generate a fresh key pair from the OS RNG.
    pub fn generate(created_at_unix: i64) -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = X25519PublicKey::from(&secret);
        Self {
            secret,
            public,
            created_at_unix,
        }
    }

    /// Raw public key bytes.
    pub fn public_key(&self) -> [u8; PUBLIC_KEY_LEN] {
        self.public.to_bytes()
    }

    /// Public key in the base58 form carried by deep links.
    pub fn public_key_base58(&self) -> String {
        to_base58(self.public.as_bytes())
    }

    /// Unix timestamp (seconds) at which the pair was generated.
    pub fn created_at_unix(&self) -> i64 {
        self.created_at_unix
    }

    /// Agree on a shared secret with a peer public key.
    ///
    /// The raw X25519 output goes through HSalsa20 with a zero input, as in
    /// NaCl's `crypto_box_beforenm`.
    /// Both sides compute the same value: `a × B == b × A`.
    ///
    /// # Errors
    /// * `InvalidPublicKey` if the peer key is a low-order point, which
    ///   would make the result independent of our private key
    pub fn diffie_hellman(
        &self,
        their_public: &[u8; PUBLIC_KEY_LEN],
    ) -> Result<SharedSecret, CryptoError> {
        let their_public = X25519PublicKey::from(*their_public);
        let shared = self.secret.diffie_hellman(&their_public);
        if !shared.was_contributory() {
            return Err(CryptoError::InvalidPublicKey(
                "non-contributory peer key".to_string(),
            ));
        }
        Ok(precompute_box_key(shared.as_bytes()))
    }

    /// Agree on a shared secret with a base58-encoded peer public key.
    pub fn diffie_hellman_base58(&self, their_public: &str) -> Result<SharedSecret, CryptoError> {
        let their_public = decode_public_key(their_public)?;
        self.diffie_hellman(&their_public)
    }
}

impl std::fmt::Debug for SealedKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SealedKeyPair")
            .field("public_key", &self.public_key_base58())
            .field("created_at_unix", &self.created_at_unix)
            .finish_non_exhaustive()
    }
}

fn precompute_box_key(raw: &[u8; 32]) -> SharedSecret {
    let mut derived = hsalsa::<U10>(GenericArray::from_slice(raw), &GenericArray::default());
    let mut key = [0u8; SHARED_SECRET_LEN];
    key.copy_from_slice(&derived);
    derived.as_mut_slice().zeroize();
    SharedSecret(key)
}

/// Decode and length-check a base58 X25519 public key.
pub fn decode_public_key(base58: &str) -> Result<[u8; PUBLIC_KEY_LEN], CryptoError> {
    from_base58_array::<PUBLIC_KEY_LEN>(base58)
        .map_err(|_| CryptoError::InvalidPublicKey(format!("expected {PUBLIC_KEY_LEN} base58 bytes")))
}

// ============================================================================
// Persistence
// ============================================================================

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SealedKeyPairRepr {
    sealed: String,
    public_key: String,
    created_at: i64,
}

impl Serialize for SealedKeyPair {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let secret = Zeroizing::new(self.secret.to_bytes());
        SealedKeyPairRepr {
            sealed: to_base58(&secret[..]),
            public_key: self.public_key_base58(),
            created_at: self.created_at_unix,
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for SealedKeyPair {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let repr = SealedKeyPairRepr::deserialize(deserializer)?;
        let secret_bytes = Zeroizing::new(
            from_base58_array::<32>(&repr.sealed).map_err(serde::de::Error::custom)?,
        );
        let secret = StaticSecret::from(*secret_bytes);
        let public = X25519PublicKey::from(&secret);
        if to_base58(public.as_bytes()) != repr.public_key {
            return Err(serde::de::Error::custom(
                "stored public key does not match private key",
            ));
        }
        Ok(Self {
            secret,
            public,
            created_at_unix: repr.created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shared_secret_symmetry() {
        let alice = SealedKeyPair::generate(0);
        let bob = SealedKeyPair::generate(0);

        let ab = alice.diffie_hellman(&bob.public_key()).unwrap();
        let ba = bob.diffie_hellman(&alice.public_key()).unwrap();
        assert_eq!(ab, ba);
    }

    #[test]
    fn test_distinct_peers_give_distinct_secrets() {
        let alice = SealedKeyPair::generate(0);
        let bob = SealedKeyPair::generate(0);
        let carol = SealedKeyPair::generate(0);

        let ab = alice.diffie_hellman(&bob.public_key()).unwrap();
        let ac = alice.diffie_hellman(&carol.public_key()).unwrap();
        assert_ne!(ab, ac);
    }

    // Keys from RFC 7748 section 6.1; the box key is `firstkey` from the NaCl test suite
    #[test]
    fn test_nacl_before_known_answer() {
        let alice: SealedKeyPair = serde_json::from_value(serde_json::json!({
            "sealed": "91e5r98drPSsxzLHWEa83gKyGgpSRcQezLWUNX656vaM",
            "publicKey": "9xgMXw7nrN39BoN9rJuGV6B9LwBNYXAJAMfeACcdyLMP",
            "createdAt": 0,
        }))
        .unwrap();

        let secret = alice
            .diffie_hellman_base58("Fz21Bh7WKCb2CUZNm9WbhhuqBqVR4bXJzEMpb3PpfCCe")
            .unwrap();
        assert_eq!(
            hex::encode(secret.as_bytes()),
            "1b27556473e985d462cd51197a9a46c76009549eac6474f206c4ee0844f68389"
        );
    }

    #[test]
    fn test_low_order_key_rejected() {
        let alice = SealedKeyPair::generate(0);
        let result = alice.diffie_hellman(&[0u8; 32]);
        assert!(matches!(result, Err(CryptoError::InvalidPublicKey(_))));
    }

    #[test]
    fn test_base58_peer_key() {
        let alice = SealedKeyPair::generate(0);
        let bob = SealedKeyPair::generate(0);

        let via_b58 = alice.diffie_hellman_base58(&bob.public_key_base58()).unwrap();
        let via_raw = alice.diffie_hellman(&bob.public_key()).unwrap();
        assert_eq!(via_b58, via_raw);

        assert!(alice.diffie_hellman_base58("not-base58!").is_err());
        assert!(alice.diffie_hellman_base58(&to_base58(&[1u8; 16])).is_err());
    }

    #[test]
    fn test_serde_preserves_key_agreement() {
        let alice = SealedKeyPair::generate(1_700_000_000);
        let bob = SealedKeyPair::generate(0);

        let json = serde_json::to_string(&alice).unwrap();
        let restored: SealedKeyPair = serde_json::from_str(&json).unwrap();

        assert_eq!(restored.public_key(), alice.public_key());
        assert_eq!(restored.created_at_unix(), 1_700_000_000);
        assert_eq!(
            restored.diffie_hellman(&bob.public_key()).unwrap(),
            alice.diffie_hellman(&bob.public_key()).unwrap()
        );
    }

    #[test]
    fn test_serde_rejects_mismatched_public_key() {
        let alice = SealedKeyPair::generate(0);
        let bob = SealedKeyPair::generate(0);

        let mut value = serde_json::to_value(&alice).unwrap();
        value["publicKey"] = serde_json::Value::String(bob.public_key_base58());
        assert!(serde_json::from_value::<SealedKeyPair>(value).is_err());
    }

    #[test]
    fn test_debug_output_is_redacted() {
        let secret = SharedSecret::from_bytes([0x42; 32]);
        assert_eq!(format!("{secret:?}"), "SharedSecret(<redacted>)");

        let pair = SealedKeyPair::generate(0);
        let rendered = format!("{pair:?}");
        assert!(rendered.contains(&pair.public_key_base58()));
        assert!(!rendered.contains("secret"));
    }
}
