//! Secret codec errors.
//!
//! ## Security Note
//!
//! Errors never include plaintext or key material.

use thiserror::Error;

/// Errors raised by a secret codec.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// The configured key is unusable.
    #[error("invalid encryption key: {0}")]
    InvalidKey(String),

    /// Encryption failed.
    #[error("encryption failed")]
    Encryption,

    /// The token is malformed or fails authentication.
    #[error("decryption failed: {0}")]
    Decryption(String),
}

impl CryptoError {
    /// Creates a decryption error.
    #[must_use]
    pub fn decryption(msg: impl Into<String>) -> Self {
        Self::Decryption(msg.into())
    }
}

/// Result type for codec operations.
pub type CryptoResult<T> = Result<T, CryptoError>;

impl From<CryptoError> for la_core::Error {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::InvalidKey(msg) => Self::Config(msg),
            CryptoError::Encryption => Self::Internal("encryption failed".to_string()),
            CryptoError::Decryption(msg) => Self::Decryption(msg),
        }
    }
}
