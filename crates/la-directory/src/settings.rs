//! Resolved connection settings.
//!
//! A [`ConnectionSettings`] is what a pool (or a one-shot changelog
//! connection) is built from: the network [`Endpoint`], the service
//! account with its credential already decrypted, and the pool bounds.

use std::fmt;
use std::time::Duration;

use la_model::{AuditSourceConfig, DirectoryConfig, TlsMode, TrustPolicy};
use serde::{Deserialize, Serialize};

use crate::error::{DirectoryError, DirectoryResult};

// ============================================================================
// Endpoint
// ============================================================================

/// Where and how to open the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Server host name.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Transport security mode.
    pub tls_mode: TlsMode,
    /// Certificate trust policy.
    pub trust: TrustPolicy,
    /// Connect timeout.
    pub connect_timeout: Duration,
}

impl Endpoint {
    /// Returns the server URL.
    #[must_use]
    pub fn url(&self) -> String {
        format!("{}://{}:{}", self.tls_mode.scheme(), self.host, self.port)
    }
}

// ============================================================================
// Connection Settings
// ============================================================================

/// Everything needed to open bound connections to one directory.
#[derive(Clone)]
pub struct ConnectionSettings {
    /// Network endpoint.
    pub endpoint: Endpoint,
    /// Service account DN.
    pub bind_dn: String,
    /// Decrypted service account password.
    pub bind_password: String,
    /// Connections opened eagerly when the pool is built.
    pub pool_min_size: usize,
    /// Maximum concurrent borrows.
    pub pool_max_size: usize,
    /// Per-operation response timeout.
    pub response_timeout: Duration,
}

impl ConnectionSettings {
    /// Builds pool settings for a directory.
    #[must_use]
    pub fn for_directory(config: &DirectoryConfig, bind_password: String) -> Self {
        Self {
            endpoint: Endpoint {
                host: config.host.clone(),
                port: config.port,
                tls_mode: config.tls_mode,
                trust: config.trust.clone(),
                connect_timeout: config.connect_timeout(),
            },
            bind_dn: config.bind_dn.clone(),
            bind_password,
            pool_min_size: config.pool_min_size,
            pool_max_size: config.pool_max_size,
            response_timeout: config.response_timeout(),
        }
    }

    /// Builds single-connection settings for a changelog source.
    #[must_use]
    pub fn for_audit_source(
        source: &AuditSourceConfig,
        bind_password: String,
        connect_timeout: Duration,
        response_timeout: Duration,
    ) -> Self {
        Self {
            endpoint: Endpoint {
                host: source.host.clone(),
                port: source.port,
                tls_mode: source.tls_mode,
                trust: source.trust.clone(),
                connect_timeout,
            },
            bind_dn: source.bind_dn.clone(),
            bind_password,
            pool_min_size: 1,
            pool_max_size: 1,
            response_timeout,
        }
    }

    /// Validates the settings.
    ///
    /// ## Errors
    ///
    /// Returns `DirectoryError::Configuration` for an empty host, a zero
    /// maximum pool size, or a minimum above the maximum.
    pub fn validate(&self) -> DirectoryResult<()> {
        if self.endpoint.host.trim().is_empty() {
            return Err(DirectoryError::config("host cannot be empty"));
        }
        if self.pool_max_size == 0 {
            return Err(DirectoryError::config("pool_max_size must be at least 1"));
        }
        if self.pool_min_size > self.pool_max_size {
            return Err(DirectoryError::config(format!(
                "pool_min_size ({}) exceeds pool_max_size ({})",
                self.pool_min_size, self.pool_max_size
            )));
        }
        Ok(())
    }

    /// Number of connections opened when the pool is built.
    #[must_use]
    pub fn initial_connections(&self) -> usize {
        self.pool_min_size.max(1).min(self.pool_max_size)
    }
}

impl fmt::Debug for ConnectionSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionSettings")
            .field("endpoint", &self.endpoint)
            .field("bind_dn", &self.bind_dn)
            .field("bind_password", &"[REDACTED]")
            .field("pool_min_size", &self.pool_min_size)
            .field("pool_max_size", &self.pool_max_size)
            .field("response_timeout", &self.response_timeout)
            .finish()
    }
}

// ============================================================================
// Search Scope
// ============================================================================

/// LDAP search scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SearchScope {
    /// Search only the base DN.
    Base,
    /// Search one level below the base DN.
    OneLevel,
    /// Search the entire subtree.
    #[default]
    Subtree,
}

impl SearchScope {
    /// Converts to ldap3 scope.
    #[must_use]
    pub const fn to_ldap3(&self) -> ldap3::Scope {
        match self {
            Self::Base => ldap3::Scope::Base,
            Self::OneLevel => ldap3::Scope::OneLevel,
            Self::Subtree => ldap3::Scope::Subtree,
        }
    }
}

/// Escapes special characters in LDAP filter values.
#[must_use]
pub fn ldap_escape(value: &str) -> String {
    let mut result = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => result.push_str("\\5c"),
            '*' => result.push_str("\\2a"),
            '(' => result.push_str("\\28"),
            ')' => result.push_str("\\29"),
            '\0' => result.push_str("\\00"),
            _ => result.push(c),
        }
    }
    result
}
