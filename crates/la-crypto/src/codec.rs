//! AES-256-GCM secret codec.
//!
//! ## Token Format
//!
//! `Base64(nonce[12] || ciphertext || tag[16])` using the standard alphabet.
//! A fresh random nonce is drawn for every encryption.

use std::fmt;

use aws_lc_rs::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use aws_lc_rs::rand::{SecureRandom, SystemRandom};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::error::{CryptoError, CryptoResult};

/// Length of the GCM authentication tag.
const TAG_LEN: usize = 16;

/// Encrypt/decrypt boundary for stored secrets.
pub trait SecretCodec: Send + Sync {
    /// Encrypts `plaintext` into an opaque token.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::Encryption` if the cipher fails.
    fn encrypt(&self, plaintext: &str) -> CryptoResult<String>;

    /// Decrypts a token produced by [`SecretCodec::encrypt`].
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::Decryption` for malformed or tampered tokens.
    fn decrypt(&self, token: &str) -> CryptoResult<String>;
}

/// AES-256-GCM implementation of [`SecretCodec`].
pub struct AesGcmSecretCodec {
    key: LessSafeKey,
    rng: SystemRandom,
}

impl AesGcmSecretCodec {
    /// Creates a codec from a raw 32-byte key.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::InvalidKey` if the key is not 32 bytes.
    pub fn new(key: &[u8]) -> CryptoResult<Self> {
        if key.len() != AES_256_GCM.key_len() {
            return Err(CryptoError::InvalidKey(format!(
                "expected {} bytes, got {}",
                AES_256_GCM.key_len(),
                key.len()
            )));
        }
        let unbound = UnboundKey::new(&AES_256_GCM, key)
            .map_err(|_| CryptoError::InvalidKey("key rejected by cipher".to_string()))?;
        Ok(Self {
            key: LessSafeKey::new(unbound),
            rng: SystemRandom::new(),
        })
    }

    /// Creates a codec from a Base64-encoded 32-byte key.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::InvalidKey` if the value is not Base64 or has the
    /// wrong length.
    pub fn from_base64_key(encoded: &str) -> CryptoResult<Self> {
        let raw = STANDARD
            .decode(encoded.trim())
            .map_err(|e| CryptoError::InvalidKey(format!("key is not valid Base64: {e}")))?;
        Self::new(&raw)
    }
}

impl fmt::Debug for AesGcmSecretCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AesGcmSecretCodec")
            .field("algorithm", &"AES-256-GCM")
            .finish_non_exhaustive()
    }
}

impl SecretCodec for AesGcmSecretCodec {
    fn encrypt(&self, plaintext: &str) -> CryptoResult<String> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        self.rng
            .fill(&mut nonce_bytes)
            .map_err(|_| CryptoError::Encryption)?;

        let mut in_out = plaintext.as_bytes().to_vec();
        self.key
            .seal_in_place_append_tag(
                Nonce::assume_unique_for_key(nonce_bytes),
                Aad::empty(),
                &mut in_out,
            )
            .map_err(|_| CryptoError::Encryption)?;

        let mut token = Vec::with_capacity(NONCE_LEN + in_out.len());
        token.extend_from_slice(&nonce_bytes);
        token.extend_from_slice(&in_out);
        Ok(STANDARD.encode(token))
    }

    fn decrypt(&self, token: &str) -> CryptoResult<String> {
        let raw = STANDARD
            .decode(token.trim())
            .map_err(|_| CryptoError::decryption("token is not valid Base64"))?;
        if raw.len() < NONCE_LEN + TAG_LEN {
            return Err(CryptoError::decryption("token too short"));
        }

        let (nonce_bytes, sealed) = raw.split_at(NONCE_LEN);
        let nonce = Nonce::try_assume_unique_for_key(nonce_bytes)
            .map_err(|_| CryptoError::decryption("invalid nonce"))?;
        let mut in_out = sealed.to_vec();
        let plaintext = self
            .key
            .open_in_place(nonce, Aad::empty(), &mut in_out)
            .map_err(|_| CryptoError::decryption("authentication failed"))?;

        String::from_utf8(plaintext.to_vec())
            .map_err(|_| CryptoError::decryption("plaintext is not UTF-8"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> AesGcmSecretCodec {
        AesGcmSecretCodec::new(&[7u8; 32]).unwrap()
    }

    #[test]
    fn decrypts_what_it_encrypts() {
        let codec = codec();
        let token = codec.encrypt("s3cret!").unwrap();
        assert_ne!(token, "s3cret!");
        assert_eq!(codec.decrypt(&token).unwrap(), "s3cret!");
    }

    #[test]
    fn every_encryption_uses_a_fresh_nonce() {
        let codec = codec();
        let a = codec.encrypt("same").unwrap();
        let b = codec.encrypt("same").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn token_layout_is_nonce_ciphertext_tag() {
        let token = codec().encrypt("abcd").unwrap();
        let raw = STANDARD.decode(token).unwrap();
        assert_eq!(raw.len(), NONCE_LEN + 4 + TAG_LEN);
    }

    #[test]
    fn tampered_token_is_rejected() {
        let codec = codec();
        let mut raw = STANDARD.decode(codec.encrypt("payload").unwrap()).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0x01;
        let err = codec.decrypt(&STANDARD.encode(raw)).unwrap_err();
        assert!(matches!(err, CryptoError::Decryption(_)));
    }

    #[test]
    fn wrong_key_cannot_decrypt() {
        let token = codec().encrypt("payload").unwrap();
        let other = AesGcmSecretCodec::new(&[9u8; 32]).unwrap();
        assert!(other.decrypt(&token).is_err());
    }

    #[test]
    fn key_must_be_32_bytes() {
        assert!(matches!(
            AesGcmSecretCodec::new(&[0u8; 16]),
            Err(CryptoError::InvalidKey(_))
        ));
        assert!(AesGcmSecretCodec::from_base64_key("not base64!").is_err());

        let encoded = STANDARD.encode([1u8; 32]);
        assert!(AesGcmSecretCodec::from_base64_key(&encoded).is_ok());
    }

    #[test]
    fn garbage_tokens_are_decryption_errors() {
        let codec = codec();
        assert!(matches!(codec.decrypt("%%%"), Err(CryptoError::Decryption(_))));
        assert!(matches!(codec.decrypt("AAAA"), Err(CryptoError::Decryption(_))));
    }
}
