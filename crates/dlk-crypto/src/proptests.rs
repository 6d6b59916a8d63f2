#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use serde_json::{json, Value};

    use crate::cipher::{decrypt, encrypt, open, EncryptedPayload};
    use crate::encoding::{from_base58, to_base58};
    use crate::error::CryptoError;
    use crate::keys::{SealedKeyPair, SharedSecret};

    fn arb_json() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(|n| json!(n)),
            ".{0,24}".prop_map(Value::String),
        ];
        leaf.prop_recursive(3, 32, 6, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
                prop::collection::btree_map("[a-z_]{1,10}", inner, 0..6)
                    .prop_map(|m| Value::Object(m.into_iter().collect())),
            ]
        })
    }

    proptest! {
        // Both sides of an exchange derive the same box key
        #[test]
        fn test_shared_secret_symmetry(_seed in any::<u8>()) {
            let a = SealedKeyPair::generate(0);
            let b = SealedKeyPair::generate(0);
            prop_assert_eq!(
                a.diffie_hellman(&b.public_key()).unwrap(),
                b.diffie_hellman(&a.public_key()).unwrap()
            );
        }

        #[test]
        fn test_encrypt_decrypt_round_trip(
            key in any::<[u8; 32]>(),
            value in arb_json()
        ) {
            let secret = SharedSecret::from_bytes(key);
            let payload = encrypt(&value, &secret).unwrap();
            let decrypted: Value = decrypt(&payload, &secret).unwrap();
            prop_assert_eq!(decrypted, value);
        }

        // Any single flipped bit in ciphertext or nonce is detected
        #[test]
        fn test_tamper_detection(
            key in any::<[u8; 32]>(),
            value in arb_json(),
            index in any::<prop::sample::Index>(),
            bit in 0u8..8,
            flip_nonce in any::<bool>()
        ) {
            let secret = SharedSecret::from_bytes(key);
            let payload = encrypt(&value, &secret).unwrap();

            let mut nonce = from_base58(&payload.nonce).unwrap();
            let mut data = from_base58(&payload.data).unwrap();
            let target = if flip_nonce { &mut nonce } else { &mut data };
            let i = index.index(target.len());
            target[i] ^= 1 << bit;

            let tampered = EncryptedPayload {
                nonce: to_base58(&nonce),
                data: to_base58(&data),
            };
            prop_assert_eq!(open(&tampered, &secret), Err(CryptoError::DecryptionFailure));
        }
    }
}
