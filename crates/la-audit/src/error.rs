//! Audit error types.

use la_crypto::CryptoError;
use la_directory::DirectoryError;
use la_storage::StorageError;
use thiserror::Error;

/// Errors raised while recording or ingesting audit events.
#[derive(Debug, Error)]
pub enum AuditError {
    /// Audit storage failed.
    #[error("Audit storage error: {0}")]
    Storage(#[from] StorageError),

    /// The changelog source could not be read.
    #[error("Changelog read failed: {0}")]
    Directory(#[from] DirectoryError),

    /// The source's bind credential could not be decrypted.
    #[error("Audit source credential unavailable: {0}")]
    Credential(#[from] CryptoError),

    /// The dispatcher no longer accepts events.
    #[error("Audit dispatcher is shut down")]
    Closed,
}

impl AuditError {
    /// Checks if the failure came from the changelog connection.
    #[must_use]
    pub const fn is_connection_error(&self) -> bool {
        match self {
            Self::Directory(err) => err.is_connection_error(),
            _ => false,
        }
    }
}

/// Result type for audit operations.
pub type AuditResult<T> = Result<T, AuditError>;

impl From<AuditError> for la_core::Error {
    fn from(err: AuditError) -> Self {
        match err {
            AuditError::Storage(e) => e.into(),
            AuditError::Directory(e) => e.into(),
            AuditError::Credential(e) => e.into(),
            AuditError::Closed => Self::Internal("audit dispatcher is shut down".to_string()),
        }
    }
}
