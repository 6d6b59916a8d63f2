//! Payloads exchanged with an independent NaCl box implementation.

use crypto_box::aead::{Aead, AeadCore, OsRng};
use crypto_box::{Nonce, PublicKey, SalsaBox, SecretKey};
use serde_json::{json, Value};

use dlk_crypto::encoding::{from_base58, to_base58};
use dlk_crypto::{decrypt, encrypt, EncryptedPayload, SealedKeyPair};

#[test]
fn wallet_box_opens_with_dapp_secret() {
    let dapp = SealedKeyPair::generate(0);
    let wallet = SecretKey::generate(&mut OsRng);
    let wallet_box = SalsaBox::new(&PublicKey::from(dapp.public_key()), &wallet);

    let nonce = SalsaBox::generate_nonce(&mut OsRng);
    let ct = wallet_box
        .encrypt(&nonce, &br#"{"signature":[1,2,3]}"#[..])
        .unwrap();
    let payload = EncryptedPayload {
        nonce: to_base58(&nonce),
        data: to_base58(&ct),
    };

    let secret = dapp.diffie_hellman(wallet.public_key().as_bytes()).unwrap();
    let value: Value = decrypt(&payload, &secret).unwrap();
    assert_eq!(value, json!({ "signature": [1, 2, 3] }));
}

#[test]
fn dapp_payload_opens_in_wallet_box() {
    let dapp = SealedKeyPair::generate(0);
    let wallet = SecretKey::generate(&mut OsRng);
    let secret = dapp.diffie_hellman(wallet.public_key().as_bytes()).unwrap();

    let request = json!({ "message": "9Ajdvzr", "session": "sess-1" });
    let payload = encrypt(&request, &secret).unwrap();

    let wallet_box = SalsaBox::new(&PublicKey::from(dapp.public_key()), &wallet);
    let nonce = from_base58(&payload.nonce).unwrap();
    let ct = from_base58(&payload.data).unwrap();
    let plaintext = wallet_box
        .decrypt(Nonce::from_slice(&nonce), ct.as_slice())
        .unwrap();
    assert_eq!(serde_json::from_slice::<Value>(&plaintext).unwrap(), request);
}
