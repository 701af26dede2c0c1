//! HMAC-SHA256 signing, used for member badges and payment webhooks.

use ring::{digest, hmac};

#[derive(thiserror::Error, Debug)]
pub enum SignatureError {
    #[error("Signature is not valid hex")]
    InvalidEncoding,

    #[error("Signature mismatch")]
    Mismatch,
}

/// Signs `payload` and returns the lowercase hex tag
pub fn sign(payload: &[u8], key: &[u8]) -> String {
    let key = hmac::Key::new(hmac::HMAC_SHA256, key);
    hex::encode(hmac::sign(&key, payload).as_ref())
}

/// Verifies a hex tag in constant time
pub fn verify(payload: &[u8], signature: &str, key: &[u8]) -> Result<(), SignatureError> {
    let tag = hex::decode(signature.trim()).map_err(|_| SignatureError::InvalidEncoding)?;
    let key = hmac::Key::new(hmac::HMAC_SHA256, key);
    hmac::verify(&key, payload, &tag).map_err(|_| SignatureError::Mismatch)
}

/// Derives a 32-byte key from configured key material
pub fn derive_key(key_string: &str) -> [u8; 32] {
    let hash = digest::digest(&digest::SHA256, key_string.as_bytes());
    let mut key = [0u8; 32];
    key.copy_from_slice(hash.as_ref());
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_and_verify() {
        let key = derive_key("badge-secret");
        let signature = sign(b"payload", &key);

        assert_eq!(signature.len(), 64);
        assert!(signature.chars().all(|c| c.is_ascii_hexdigit()));
        assert!(verify(b"payload", &signature, &key).is_ok());
    }

    #[test]
    fn test_tampered_payload_fails() {
        let key = derive_key("badge-secret");
        let signature = sign(b"payload", &key);

        assert!(matches!(
            verify(b"payload!", &signature, &key),
            Err(SignatureError::Mismatch)
        ));
    }

    #[test]
    fn test_wrong_key_fails() {
        let signature = sign(b"payload", &derive_key("one"));
        assert!(verify(b"payload", &signature, &derive_key("two")).is_err());
    }

    #[test]
    fn test_non_hex_signature() {
        let key = derive_key("k");
        assert!(matches!(
            verify(b"payload", "not-hex", &key),
            Err(SignatureError::InvalidEncoding)
        ));
    }
}
