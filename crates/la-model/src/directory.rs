//! Backend directory connection records.
//!
//! A [`DirectoryConfig`] describes one external LDAP directory: where it
//! lives, how the transport is secured, which service account binds, and
//! how the connection pool for it is sized. Exactly one live pool exists
//! per config identity.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Transport Security
// ============================================================================

/// How the transport to a directory is secured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TlsMode {
    /// Cleartext LDAP.
    #[default]
    Plain,
    /// TLS from the first byte (`ldaps://`).
    Implicit,
    /// Cleartext connect followed by the StartTLS extended operation.
    StartTls,
}

impl TlsMode {
    /// Returns the conventional port for this mode.
    #[must_use]
    pub const fn default_port(&self) -> u16 {
        match self {
            Self::Implicit => 636,
            Self::Plain | Self::StartTls => 389,
        }
    }

    /// Returns the URL scheme used to reach the server.
    #[must_use]
    pub const fn scheme(&self) -> &'static str {
        match self {
            Self::Implicit => "ldaps",
            Self::Plain | Self::StartTls => "ldap",
        }
    }

    /// Returns true if the session is encrypted at some point before bind.
    #[must_use]
    pub const fn is_encrypted(&self) -> bool {
        !matches!(self, Self::Plain)
    }
}

/// Which server certificates are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TrustPolicy {
    /// Accept any certificate and host name.
    TrustAll,
    /// Trust only the given PEM certificate(s); built-in roots are disabled.
    PinnedCertificate {
        /// PEM-encoded certificate or chain.
        pem: String,
    },
    /// Use the platform trust store.
    #[default]
    SystemTrustStore,
}

// ============================================================================
// Account Enable/Disable Mapping
// ============================================================================

/// How an account's enabled state is stored in the directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ToggleEncoding {
    /// LDAP boolean syntax (`TRUE` / `FALSE`).
    Boolean,
    /// Free-form literal values.
    Literal {
        /// Value written when enabling.
        enable_value: String,
        /// Value written when disabling.
        disable_value: String,
    },
}

/// Attribute mapping used to enable or disable accounts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountToggle {
    /// Attribute that carries the state.
    pub attribute: String,
    /// Value encoding.
    pub encoding: ToggleEncoding,
}

impl AccountToggle {
    /// Creates a boolean-valued mapping.
    #[must_use]
    pub fn boolean(attribute: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
            encoding: ToggleEncoding::Boolean,
        }
    }

    /// Creates a literal-valued mapping.
    #[must_use]
    pub fn literal(
        attribute: impl Into<String>,
        enable_value: impl Into<String>,
        disable_value: impl Into<String>,
    ) -> Self {
        Self {
            attribute: attribute.into(),
            encoding: ToggleEncoding::Literal {
                enable_value: enable_value.into(),
                disable_value: disable_value.into(),
            },
        }
    }

    /// Returns the value to write for the requested state.
    #[must_use]
    pub fn value_for(&self, enabled: bool) -> String {
        match (&self.encoding, enabled) {
            (ToggleEncoding::Boolean, true) => "TRUE".to_string(),
            (ToggleEncoding::Boolean, false) => "FALSE".to_string(),
            (ToggleEncoding::Literal { enable_value, .. }, true) => enable_value.clone(),
            (ToggleEncoding::Literal { disable_value, .. }, false) => disable_value.clone(),
        }
    }
}

// ============================================================================
// Directory Configuration
// ============================================================================

/// Connection record for one backend directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryConfig {
    // === Identity ===
    /// Unique identifier; one pool exists per id.
    pub id: Uuid,

    /// Owning tenant.
    pub tenant_id: Uuid,

    /// Human-readable name, denormalized into audit events.
    pub display_name: String,

    // === Network ===
    /// Server host name.
    pub host: String,

    /// Server port.
    pub port: u16,

    /// Transport security mode.
    pub tls_mode: TlsMode,

    /// Certificate trust policy.
    pub trust: TrustPolicy,

    // === Service Account ===
    /// Bind DN of the service account.
    pub bind_dn: String,

    /// Service account password as produced by the secret codec.
    pub bind_credential_encrypted: String,

    // === Directory Layout ===
    /// Default search base.
    pub base_dn: String,

    /// Page size for paged searches.
    pub page_size: i32,

    // === Pool ===
    /// Connections opened when the pool is built.
    pub pool_min_size: usize,

    /// Maximum concurrent borrows.
    pub pool_max_size: usize,

    /// Connect and borrow timeout (seconds).
    pub connect_timeout_secs: u64,

    /// Per-operation response timeout (seconds).
    pub response_timeout_secs: u64,

    // === Optional Features ===
    /// Enable/disable mapping, when the directory supports it.
    pub account_toggle: Option<AccountToggle>,

    /// Changelog source feeding audit events for this directory.
    pub audit_source_id: Option<Uuid>,

    /// Disabled directories are treated as not found.
    pub enabled: bool,
}

impl DirectoryConfig {
    /// Default page size for paged searches.
    pub const DEFAULT_PAGE_SIZE: i32 = 500;
    /// Default minimum pool size.
    pub const DEFAULT_POOL_MIN: usize = 2;
    /// Default maximum pool size.
    pub const DEFAULT_POOL_MAX: usize = 20;
    /// Default connect timeout in seconds.
    pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
    /// Default response timeout in seconds.
    pub const DEFAULT_RESPONSE_TIMEOUT_SECS: u64 = 30;

    /// Creates a plain-LDAP config on port 389 with default pool settings.
    #[must_use]
    pub fn new(
        tenant_id: Uuid,
        display_name: impl Into<String>,
        host: impl Into<String>,
        bind_dn: impl Into<String>,
        bind_credential_encrypted: impl Into<String>,
        base_dn: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            tenant_id,
            display_name: display_name.into(),
            host: host.into(),
            port: TlsMode::Plain.default_port(),
            tls_mode: TlsMode::Plain,
            trust: TrustPolicy::SystemTrustStore,
            bind_dn: bind_dn.into(),
            bind_credential_encrypted: bind_credential_encrypted.into(),
            base_dn: base_dn.into(),
            page_size: Self::DEFAULT_PAGE_SIZE,
            pool_min_size: Self::DEFAULT_POOL_MIN,
            pool_max_size: Self::DEFAULT_POOL_MAX,
            connect_timeout_secs: Self::DEFAULT_CONNECT_TIMEOUT_SECS,
            response_timeout_secs: Self::DEFAULT_RESPONSE_TIMEOUT_SECS,
            account_toggle: None,
            audit_source_id: None,
            enabled: true,
        }
    }

    /// Sets the transport mode and its conventional port.
    #[must_use]
    pub const fn with_tls(mut self, tls_mode: TlsMode) -> Self {
        self.tls_mode = tls_mode;
        self.port = tls_mode.default_port();
        self
    }

    /// Sets the port.
    #[must_use]
    pub const fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the trust policy.
    #[must_use]
    pub fn with_trust(mut self, trust: TrustPolicy) -> Self {
        self.trust = trust;
        self
    }

    /// Sets pool bounds.
    #[must_use]
    pub const fn with_pool_size(mut self, min: usize, max: usize) -> Self {
        self.pool_min_size = min;
        self.pool_max_size = max;
        self
    }

    /// Sets the search page size.
    #[must_use]
    pub const fn with_page_size(mut self, page_size: i32) -> Self {
        self.page_size = page_size;
        self
    }

    /// Sets connect and response timeouts (seconds).
    #[must_use]
    pub const fn with_timeouts(mut self, connect_secs: u64, response_secs: u64) -> Self {
        self.connect_timeout_secs = connect_secs;
        self.response_timeout_secs = response_secs;
        self
    }

    /// Sets the account enable/disable mapping.
    #[must_use]
    pub fn with_account_toggle(mut self, toggle: AccountToggle) -> Self {
        self.account_toggle = Some(toggle);
        self
    }

    /// Links a changelog audit source.
    #[must_use]
    pub const fn with_audit_source(mut self, source_id: Uuid) -> Self {
        self.audit_source_id = Some(source_id);
        self
    }

    /// Sets the enabled flag.
    #[must_use]
    pub const fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Returns the connect timeout.
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Returns the response timeout.
    #[must_use]
    pub const fn response_timeout(&self) -> Duration {
        Duration::from_secs(self.response_timeout_secs)
    }

    /// Returns the server URL.
    #[must_use]
    pub fn url(&self) -> String {
        format!("{}://{}:{}", self.tls_mode.scheme(), self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DirectoryConfig {
        DirectoryConfig::new(
            Uuid::now_v7(),
            "Corp",
            "ldap.corp.example",
            "cn=svc,dc=corp",
            "token",
            "dc=corp",
        )
    }

    #[test]
    fn defaults_follow_plain_ldap() {
        let config = sample();
        assert_eq!(config.port, 389);
        assert_eq!(config.page_size, 500);
        assert_eq!(config.pool_min_size, 2);
        assert_eq!(config.pool_max_size, 20);
        assert_eq!(config.connect_timeout(), Duration::from_secs(10));
        assert_eq!(config.url(), "ldap://ldap.corp.example:389");
        assert!(config.enabled);
    }

    #[test]
    fn implicit_tls_switches_scheme_and_port() {
        let config = sample().with_tls(TlsMode::Implicit);
        assert_eq!(config.url(), "ldaps://ldap.corp.example:636");

        let config = sample().with_tls(TlsMode::StartTls);
        assert_eq!(config.url(), "ldap://ldap.corp.example:389");
        assert!(config.tls_mode.is_encrypted());
    }

    #[test]
    fn account_toggle_values() {
        let boolean = AccountToggle::boolean("accountEnabled");
        assert_eq!(boolean.value_for(true), "TRUE");
        assert_eq!(boolean.value_for(false), "FALSE");

        let literal = AccountToggle::literal("nsAccountLock", "false", "true");
        assert_eq!(literal.value_for(true), "false");
        assert_eq!(literal.value_for(false), "true");
    }

    #[test]
    fn trust_policy_serializes_with_kind_tag() {
        let json = serde_json::to_value(TrustPolicy::PinnedCertificate {
            pem: "PEM".to_string(),
        })
        .unwrap();
        assert_eq!(json["kind"], "pinned_certificate");
        assert_eq!(json["pem"], "PEM");
    }
}
