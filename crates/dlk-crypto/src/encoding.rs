//! Base58 helpers.
//!
//! Every binary value that crosses a deep link (keys, nonces, ciphertext,
//! signatures) travels as base58 so it survives URL query strings untouched.

use crate::error::CryptoError;

/// Encode bytes as base58 (Bitcoin alphabet).
pub fn to_base58(bytes: &[u8]) -> String {
    bs58::encode(bytes).into_string()
}

/// Decode a base58 string.
pub fn from_base58(s: &str) -> Result<Vec<u8>, CryptoError> {
    bs58::decode(s)
        .into_vec()
        .map_err(|_| CryptoError::InvalidEncoding)
}

/// Decode a base58 string that must hold exactly `N` bytes.
pub fn from_base58_array<const N: usize>(s: &str) -> Result<[u8; N], CryptoError> {
    let bytes = from_base58(s)?;
    bytes.try_into().map_err(|_| CryptoError::InvalidEncoding)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_vector() {
        assert_eq!(to_base58(b"Hello"), "9Ajdvzr");
        assert_eq!(from_base58("9Ajdvzr").unwrap(), b"Hello".to_vec());
    }

    #[test]
    fn test_rejects_invalid_alphabet() {
        // '0', 'O', 'I' and 'l' are not part of the alphabet
        assert_eq!(from_base58("0OIl"), Err(CryptoError::InvalidEncoding));
    }

    #[test]
    fn test_fixed_length_decode() {
        let encoded = to_base58(&[7u8; 32]);
        let decoded: [u8; 32] = from_base58_array(&encoded).unwrap();
        assert_eq!(decoded, [7u8; 32]);

        let short = to_base58(&[7u8; 31]);
        assert!(from_base58_array::<32>(&short).is_err());
    }
}
