//! Directory access error types.
//!
//! ## Security Note
//!
//! Error messages must not leak bind credentials. Diagnostic text returned
//! by the server is carried verbatim on rejections.

use la_crypto::CryptoError;
use thiserror::Error;

/// Directory access errors.
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// Invalid connection settings.
    #[error("LDAP configuration error: {0}")]
    Configuration(String),

    /// Transport could not be established or broke mid-operation.
    #[error("LDAP connection failed: {0}")]
    Connection(String),

    /// TLS setup or handshake failure.
    #[error("LDAP TLS error: {0}")]
    Tls(String),

    /// Service account bind failed.
    #[error("LDAP bind failed: {0}")]
    Bind(String),

    /// Operation exceeded its response timeout.
    #[error("LDAP operation timed out")]
    Timeout,

    /// No connection became available within the connect timeout.
    #[error("Connection pool exhausted")]
    PoolExhausted,

    /// The pool was closed.
    #[error("Connection pool closed")]
    PoolClosed,

    /// The server rejected a request.
    #[error("{verb} failed for [{dn}]: {code} - {message}")]
    Rejected {
        /// Protocol verb.
        verb: &'static str,
        /// Target DN.
        dn: String,
        /// Native result code.
        code: u32,
        /// Server diagnostic text.
        message: String,
    },

    /// Entry does not exist.
    #[error("Entry not found: {0}")]
    NotFound(String),

    /// Stored bind credential could not be decrypted.
    #[error("Bind credential unavailable: {0}")]
    Credential(String),
}

impl DirectoryError {
    /// Creates a configuration error.
    #[must_use]
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Creates a connection error.
    #[must_use]
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Creates a TLS error.
    #[must_use]
    pub fn tls(msg: impl Into<String>) -> Self {
        Self::Tls(msg.into())
    }

    /// Creates a rejection error.
    #[must_use]
    pub fn rejected(
        verb: &'static str,
        dn: impl Into<String>,
        code: u32,
        message: impl Into<String>,
    ) -> Self {
        Self::Rejected {
            verb,
            dn: dn.into(),
            code,
            message: message.into(),
        }
    }

    /// Creates a not found error.
    #[must_use]
    pub fn not_found(dn: impl Into<String>) -> Self {
        Self::NotFound(dn.into())
    }

    /// Checks if the connection that produced this error must be discarded.
    #[must_use]
    pub const fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection(_)
                | Self::Tls(_)
                | Self::Bind(_)
                | Self::Timeout
                | Self::PoolExhausted
                | Self::PoolClosed
        )
    }

    /// Checks if this is a not found error.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Result type for directory operations.
pub type DirectoryResult<T> = Result<T, DirectoryError>;

impl From<CryptoError> for DirectoryError {
    fn from(err: CryptoError) -> Self {
        Self::Credential(err.to_string())
    }
}

impl From<DirectoryError> for la_core::Error {
    fn from(err: DirectoryError) -> Self {
        match err {
            DirectoryError::Configuration(msg) => Self::Config(msg),
            DirectoryError::Rejected {
                verb,
                dn,
                code,
                message,
            } => Self::Rejected {
                verb: verb.to_string(),
                dn,
                code,
                message,
            },
            DirectoryError::NotFound(dn) => Self::NotFound(dn),
            DirectoryError::Credential(msg) => Self::Decryption(msg),
            other @ (DirectoryError::Connection(_)
            | DirectoryError::Tls(_)
            | DirectoryError::Bind(_)
            | DirectoryError::Timeout
            | DirectoryError::PoolExhausted
            | DirectoryError::PoolClosed) => Self::Connection(other.to_string()),
        }
    }
}
