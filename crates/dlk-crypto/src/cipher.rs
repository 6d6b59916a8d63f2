//! Secret-box encryption of structured payloads.
//!
//! Values are serialized to JSON, sealed with XSalsa20-Poly1305 (NaCl
//! `box.after`) under the shared secret with a fresh random 24-byte nonce,
//! and carried as a pair of base58 strings. The ciphertext is laid out as
//! NaCl does it, tag first. Opening never yields plaintext that failed
//! authentication.

use crypto_secretbox::{
    aead::{Aead, KeyInit},
    Key, Nonce, XSalsa20Poly1305,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::encoding::{from_base58, to_base58};
use crate::error::CryptoError;
use crate::keys::SharedSecret;

/// Nonce length of the secret box.
pub const NONCE_LEN: usize = 24;

/// Ciphertext plus nonce, both base58 encoded.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedPayload {
    pub nonce: String,
    pub data: String,
}

/// Seal raw bytes under `secret` with a fresh random nonce.
pub fn seal(plaintext: &[u8], secret: &SharedSecret) -> Result<EncryptedPayload, CryptoError> {
    let mut nonce = [0u8; NONCE_LEN];
    getrandom::getrandom(&mut nonce).map_err(|_| CryptoError::Rng)?;
    seal_with_nonce(plaintext, secret, &nonce)
}

fn seal_with_nonce(
    plaintext: &[u8],
    secret: &SharedSecret,
    nonce: &[u8; NONCE_LEN],
) -> Result<EncryptedPayload, CryptoError> {
    let aead = XSalsa20Poly1305::new(Key::from_slice(secret.as_bytes()));
    let ct = aead
        .encrypt(Nonce::from_slice(nonce), plaintext)
        .map_err(|_| CryptoError::EncryptionFailed)?;

    Ok(EncryptedPayload {
        nonce: to_base58(nonce),
        data: to_base58(&ct),
    })
}

/// Open a sealed payload, returning the authenticated plaintext bytes.
pub fn open(payload: &EncryptedPayload, secret: &SharedSecret) -> Result<Vec<u8>, CryptoError> {
    let nonce = from_base58(&payload.nonce).map_err(|_| CryptoError::DecryptionFailure)?;
    if nonce.len() != NONCE_LEN {
        return Err(CryptoError::DecryptionFailure);
    }
    let ct = from_base58(&payload.data).map_err(|_| CryptoError::DecryptionFailure)?;

    let aead = XSalsa20Poly1305::new(Key::from_slice(secret.as_bytes()));
    aead.decrypt(Nonce::from_slice(&nonce), ct.as_slice())
        .map_err(|_| CryptoError::DecryptionFailure)
}

/// Serialize `value` to JSON and seal it.
pub fn encrypt<T>(value: &T, secret: &SharedSecret) -> Result<EncryptedPayload, CryptoError>
where
    T: Serialize + ?Sized,
{
    let plaintext =
        serde_json::to_vec(value).map_err(|e| CryptoError::Serialization(e.to_string()))?;
    seal(&plaintext, secret)
}

/// Open a sealed payload and deserialize the JSON inside it.
///
/// Authentication failures, malformed envelopes and plaintext that is not
/// the expected JSON all surface as `DecryptionFailure`.
pub fn decrypt<T: DeserializeOwned>(
    payload: &EncryptedPayload,
    secret: &SharedSecret,
) -> Result<T, CryptoError> {
    let plaintext = open(payload, secret)?;
    serde_json::from_slice(&plaintext).map_err(|_| CryptoError::DecryptionFailure)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn secret(byte: u8) -> SharedSecret {
        SharedSecret::from_bytes([byte; 32])
    }

    #[test]
    fn test_round_trip_json_value() {
        let value = json!({ "message": [72, 101, 108, 108, 111], "session": "sess-123" });
        let payload = encrypt(&value, &secret(0x42)).unwrap();
        let decrypted: Value = decrypt(&payload, &secret(0x42)).unwrap();
        assert_eq!(decrypted, value);
    }

    #[test]
    fn test_nonce_is_24_bytes_and_fresh() {
        let a = encrypt(&json!({"x": 1}), &secret(1)).unwrap();
        let b = encrypt(&json!({"x": 1}), &secret(1)).unwrap();

        assert_eq!(from_base58(&a.nonce).unwrap().len(), NONCE_LEN);
        assert_ne!(a.nonce, b.nonce);
        assert_ne!(a.data, b.data);
    }

    #[test]
    fn test_wrong_key_fails() {
        let payload = encrypt(&json!({"x": 1}), &secret(1)).unwrap();
        let result: Result<Value, _> = decrypt(&payload, &secret(2));
        assert_eq!(result, Err(CryptoError::DecryptionFailure));
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let payload = encrypt(&json!({"x": 1}), &secret(1)).unwrap();
        let mut ct = from_base58(&payload.data).unwrap();
        ct[0] ^= 0x01;
        let tampered = EncryptedPayload {
            nonce: payload.nonce.clone(),
            data: to_base58(&ct),
        };
        assert_eq!(open(&tampered, &secret(1)), Err(CryptoError::DecryptionFailure));
    }

    #[test]
    fn test_tampered_nonce_fails() {
        let payload = encrypt(&json!({"x": 1}), &secret(1)).unwrap();
        let mut nonce = from_base58(&payload.nonce).unwrap();
        nonce[NONCE_LEN - 1] ^= 0x80;
        let tampered = EncryptedPayload {
            nonce: to_base58(&nonce),
            data: payload.data.clone(),
        };
        assert_eq!(open(&tampered, &secret(1)), Err(CryptoError::DecryptionFailure));
    }

    #[test]
    fn test_malformed_envelope_fails() {
        let payload = encrypt(&json!({"x": 1}), &secret(1)).unwrap();

        let short_nonce = EncryptedPayload {
            nonce: to_base58(&[0u8; 12]),
            data: payload.data.clone(),
        };
        assert_eq!(open(&short_nonce, &secret(1)), Err(CryptoError::DecryptionFailure));

        let bad_b58 = EncryptedPayload {
            nonce: payload.nonce.clone(),
            data: "0OIl".to_string(),
        };
        assert_eq!(open(&bad_b58, &secret(1)), Err(CryptoError::DecryptionFailure));
    }

    // NaCl `firstkey` and `nonce` from the crypto_box test suite
    const NACL_FIRSTKEY: &str = "1b27556473e985d462cd51197a9a46c76009549eac6474f206c4ee0844f68389";
    const NACL_NONCE_B58: &str = "AcNFmpKDtfAh9TMLGe7vSkpbzMQmQRAoQ";
    const SIGNATURE_BOX_HEX: &str =
        "42a45f54ec2d75827b5dfeed040317964bbc1733138781d278f0268ee34c4b992837d8d027";

    fn nacl_secret() -> SharedSecret {
        let bytes: [u8; 32] = hex::decode(NACL_FIRSTKEY).unwrap().try_into().unwrap();
        SharedSecret::from_bytes(bytes)
    }

    #[test]
    fn test_nacl_box_known_answer() {
        let nonce: [u8; NONCE_LEN] = from_base58(NACL_NONCE_B58).unwrap().try_into().unwrap();
        let payload = seal_with_nonce(br#"{"signature":[1,2,3]}"#, &nacl_secret(), &nonce).unwrap();
        assert_eq!(payload.nonce, NACL_NONCE_B58);
        assert_eq!(hex::encode(from_base58(&payload.data).unwrap()), SIGNATURE_BOX_HEX);
    }

    #[test]
    fn test_opens_nacl_box_from_wallet() {
        let payload = EncryptedPayload {
            nonce: NACL_NONCE_B58.to_string(),
            data: "3EYXKHW46MfgMRABmMQu3fWtzM5ijTtUuire3DxUivvjVYydNjp".to_string(),
        };
        let value: Value = decrypt(&payload, &nacl_secret()).unwrap();
        assert_eq!(value, json!({ "signature": [1, 2, 3] }));
    }

    #[test]
    fn test_authentic_but_unexpected_plaintext_fails() {
        let payload = seal(b"not json", &secret(1)).unwrap();
        let result: Result<Value, _> = decrypt(&payload, &secret(1));
        assert_eq!(result, Err(CryptoError::DecryptionFailure));
    }
}
