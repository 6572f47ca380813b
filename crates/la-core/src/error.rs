//! Workspace error taxonomy.
//!
//! Every component error converts into [`Error`] at the facade boundary.
//! Callers only need to distinguish the classes below:
//!
//! | Class | Meaning |
//! |---|---|
//! | `Connection` | upstream directory unavailable |
//! | `Rejected` | the directory refused the request |
//! | `NotFound` | entity missing, disabled, or outside the caller's tenant |
//! | `AccessDenied` | authorization failed |
//! | `Decryption` | a stored secret could not be decoded |
//! | `Storage` | repository failure |
//!
//! ## Security Note
//!
//! Messages must never carry bind credentials or decrypted secrets.

use thiserror::Error;

/// Result type alias using the workspace error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for directory administration operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The upstream directory could not be reached or the connection broke.
    #[error("directory unavailable: {0}")]
    Connection(String),

    /// The directory rejected a protocol request.
    #[error("{verb} failed for [{dn}]: {code} - {message}")]
    Rejected {
        /// Protocol verb ("add", "modify", "delete", "modifyDN", "search").
        verb: String,
        /// Target distinguished name.
        dn: String,
        /// Native LDAP result code.
        code: u32,
        /// Diagnostic text returned by the server.
        message: String,
    },

    /// Resource not found (also used for disabled or out-of-tenant resources).
    #[error("resource not found: {0}")]
    NotFound(String),

    /// Authorization failed.
    #[error("access denied: {0}")]
    AccessDenied(String),

    /// A stored secret could not be decrypted.
    #[error("decryption failed: {0}")]
    Decryption(String),

    /// Repository failure.
    #[error("storage error: {0}")]
    Storage(String),

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Creates an access-denied error.
    #[must_use]
    pub fn access_denied(msg: impl Into<String>) -> Self {
        Self::AccessDenied(msg.into())
    }

    /// Creates a not-found error.
    #[must_use]
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// Creates a rejected-request error from a native result.
    #[must_use]
    pub fn rejected(
        verb: impl Into<String>,
        dn: impl Into<String>,
        code: u32,
        message: impl Into<String>,
    ) -> Self {
        Self::Rejected {
            verb: verb.into(),
            dn: dn.into(),
            code,
            message: message.into(),
        }
    }

    /// Returns whether the upstream directory was unavailable.
    #[must_use]
    pub const fn is_connection_error(&self) -> bool {
        matches!(self, Self::Connection(_))
    }

    /// Returns whether this error represents a client error.
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Rejected { .. } | Self::NotFound(_) | Self::AccessDenied(_)
        )
    }

    /// Returns whether this error should be logged at error level.
    #[must_use]
    pub const fn is_server_error(&self) -> bool {
        matches!(
            self,
            Self::Decryption(_) | Self::Storage(_) | Self::Config(_) | Self::Internal(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejected_message_carries_verb_dn_and_code() {
        let err = Error::rejected("add", "cn=x,dc=co", 68, "Entry Already Exists");
        assert_eq!(
            err.to_string(),
            "add failed for [cn=x,dc=co]: 68 - Entry Already Exists"
        );
        assert!(err.is_client_error());
        assert!(!err.is_connection_error());
    }

    #[test]
    fn error_classes() {
        assert!(Error::Connection("refused".into()).is_connection_error());
        assert!(Error::access_denied("no role").is_client_error());
        assert!(Error::not_found("directory").is_client_error());
        assert!(Error::Decryption("bad tag".into()).is_server_error());
        assert!(!Error::Storage("down".into()).is_client_error());
    }
}
