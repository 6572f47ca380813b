//! # la-crypto
//!
//! Encryption boundary for directory bind credentials using aws-lc-rs.
//!
//! Credentials are stored only in encrypted form and decrypted when a
//! connection pool (or a changelog connection) is built. Consumers depend on
//! the [`SecretCodec`] trait; [`AesGcmSecretCodec`] is the production
//! implementation.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod codec;
pub mod error;

pub use codec::{AesGcmSecretCodec, SecretCodec};
pub use error::{CryptoError, CryptoResult};
