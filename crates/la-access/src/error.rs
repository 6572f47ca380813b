//! Authorization error types.

use la_storage::StorageError;
use thiserror::Error;

/// Errors raised by access checks.
#[derive(Debug, Error)]
pub enum AccessError {
    /// The operator lacks the required grant.
    #[error("Access denied: {0}")]
    Denied(String),

    /// Permission records could not be loaded.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl AccessError {
    /// Creates a denial.
    #[must_use]
    pub fn denied(msg: impl Into<String>) -> Self {
        Self::Denied(msg.into())
    }

    /// Checks if this is a denial.
    #[must_use]
    pub const fn is_denied(&self) -> bool {
        matches!(self, Self::Denied(_))
    }
}

/// Result type for access checks.
pub type AccessResult<T> = Result<T, AccessError>;

impl From<AccessError> for la_core::Error {
    fn from(err: AccessError) -> Self {
        match err {
            AccessError::Denied(msg) => Self::AccessDenied(msg),
            AccessError::Storage(e) => e.into(),
        }
    }
}
