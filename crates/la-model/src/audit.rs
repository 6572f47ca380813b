//! Audit records.
//!
//! Audit events come from two origins:
//!
//! - **Internal writes** performed through the operation facade; these carry
//!   the acting operator.
//! - **External changelog** entries read from a directory's native change
//!   log; these carry the change number and are recorded at most once per
//!   [`ChangelogPosition`].
//!
//! Events are append-only.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::directory::{TlsMode, TrustPolicy};
use crate::operator::{Operator, OperatorKind};

// ============================================================================
// Audit Source
// ============================================================================

/// Connection record for a directory changelog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditSourceConfig {
    /// Unique identifier.
    pub id: Uuid,
    /// Owning tenant.
    pub tenant_id: Uuid,
    /// Human-readable name.
    pub display_name: String,
    /// Server host name.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Transport security mode.
    pub tls_mode: TlsMode,
    /// Certificate trust policy.
    pub trust: TrustPolicy,
    /// Bind DN with read access to the changelog.
    pub bind_dn: String,
    /// Bind password as produced by the secret codec.
    pub bind_credential_encrypted: String,
    /// Base of the changelog subtree.
    pub changelog_base_dn: String,
    /// Only entries whose `targetDN` starts with this prefix are read.
    pub target_dn_prefix: Option<String>,
    /// Disabled sources are skipped by the poller.
    pub enabled: bool,
}

impl AuditSourceConfig {
    /// Changelog base used when none is configured.
    pub const DEFAULT_CHANGELOG_BASE: &'static str = "cn=changelog";

    /// Creates an enabled plain-LDAP source reading `cn=changelog`.
    #[must_use]
    pub fn new(
        tenant_id: Uuid,
        display_name: impl Into<String>,
        host: impl Into<String>,
        bind_dn: impl Into<String>,
        bind_credential_encrypted: impl Into<String>,
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
            changelog_base_dn: Self::DEFAULT_CHANGELOG_BASE.to_string(),
            target_dn_prefix: None,
            enabled: true,
        }
    }

    /// Narrows the source to targets starting with `prefix`.
    #[must_use]
    pub fn with_target_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.target_dn_prefix = Some(prefix.into());
        self
    }

    /// Sets the transport mode and its conventional port.
    #[must_use]
    pub const fn with_tls(mut self, tls_mode: TlsMode) -> Self {
        self.tls_mode = tls_mode;
        self.port = tls_mode.default_port();
        self
    }

    /// Sets the enabled flag.
    #[must_use]
    pub const fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

// ============================================================================
// Audit Event
// ============================================================================

/// Where an audit event came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOrigin {
    /// Write performed through the operation facade.
    InternalWrite,
    /// Entry read from a directory changelog.
    ExternalChangelog,
}

/// Audited action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuditAction {
    /// User created.
    #[serde(rename = "user.create")]
    UserCreate,
    /// User attributes changed.
    #[serde(rename = "user.update")]
    UserUpdate,
    /// User deleted.
    #[serde(rename = "user.delete")]
    UserDelete,
    /// Account enabled.
    #[serde(rename = "user.enable")]
    UserEnable,
    /// Account disabled.
    #[serde(rename = "user.disable")]
    UserDisable,
    /// User moved to another subtree.
    #[serde(rename = "user.move")]
    UserMove,
    /// Group created.
    #[serde(rename = "group.create")]
    GroupCreate,
    /// Group deleted.
    #[serde(rename = "group.delete")]
    GroupDelete,
    /// Member added to a group.
    #[serde(rename = "group.member_add")]
    GroupMemberAdd,
    /// Member removed from a group.
    #[serde(rename = "group.member_remove")]
    GroupMemberRemove,
    /// Change observed in a directory changelog.
    #[serde(rename = "ldap.change")]
    LdapChange,
}

impl AuditAction {
    /// Returns the stable string key.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::UserCreate => "user.create",
            Self::UserUpdate => "user.update",
            Self::UserDelete => "user.delete",
            Self::UserEnable => "user.enable",
            Self::UserDisable => "user.disable",
            Self::UserMove => "user.move",
            Self::GroupCreate => "group.create",
            Self::GroupDelete => "group.delete",
            Self::GroupMemberAdd => "group.member_add",
            Self::GroupMemberRemove => "group.member_remove",
            Self::LdapChange => "ldap.change",
        }
    }
}

/// Operator recorded on internal-write events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditActor {
    /// Operator id.
    pub id: Uuid,
    /// Operator class.
    pub kind: OperatorKind,
    /// Operator login name.
    pub username: String,
}

impl From<&Operator> for AuditActor {
    fn from(operator: &Operator) -> Self {
        Self {
            id: operator.id,
            kind: operator.kind,
            username: operator.username.clone(),
        }
    }
}

/// Idempotency key of a changelog-origin event.
///
/// `scope_id` is the matched directory, or the audit source when no linked
/// directory claims the target DN.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChangelogPosition {
    /// Directory (or audit source) the change number belongs to.
    pub scope_id: Uuid,
    /// Changelog `changeNumber`.
    pub change_number: String,
}

/// Immutable audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Unique event identifier.
    pub id: Uuid,
    /// Tenant the event belongs to.
    pub tenant_id: Option<Uuid>,
    /// Event origin.
    pub origin: AuditOrigin,
    /// Acting operator (internal writes only).
    pub actor: Option<AuditActor>,
    /// Directory the change applies to.
    pub directory_id: Option<Uuid>,
    /// Directory name at the time of the event.
    pub directory_name: Option<String>,
    /// Audited action.
    pub action: AuditAction,
    /// Target entry.
    pub target_dn: Option<String>,
    /// Free-form JSON detail.
    pub detail: serde_json::Value,
    /// Changelog position (changelog origin only).
    pub changelog: Option<ChangelogPosition>,
    /// When the change happened.
    pub occurred_at: DateTime<Utc>,
    /// When the event was built.
    pub recorded_at: DateTime<Utc>,
}

impl AuditEvent {
    /// Starts an internal-write event.
    #[must_use]
    pub fn internal(action: AuditAction) -> AuditEventBuilder {
        AuditEventBuilder::new(AuditOrigin::InternalWrite, action)
    }

    /// Starts a changelog-origin event.
    #[must_use]
    pub fn changelog(scope_id: Uuid, change_number: impl Into<String>) -> AuditEventBuilder {
        let mut builder = AuditEventBuilder::new(AuditOrigin::ExternalChangelog, AuditAction::LdapChange);
        builder.changelog = Some(ChangelogPosition {
            scope_id,
            change_number: change_number.into(),
        });
        builder
    }
}

/// Builder for audit events.
#[derive(Debug)]
pub struct AuditEventBuilder {
    origin: AuditOrigin,
    action: AuditAction,
    tenant_id: Option<Uuid>,
    actor: Option<AuditActor>,
    directory_id: Option<Uuid>,
    directory_name: Option<String>,
    target_dn: Option<String>,
    detail: serde_json::Map<String, serde_json::Value>,
    changelog: Option<ChangelogPosition>,
    occurred_at: Option<DateTime<Utc>>,
}

impl AuditEventBuilder {
    fn new(origin: AuditOrigin, action: AuditAction) -> Self {
        Self {
            origin,
            action,
            tenant_id: None,
            actor: None,
            directory_id: None,
            directory_name: None,
            target_dn: None,
            detail: serde_json::Map::new(),
            changelog: None,
            occurred_at: None,
        }
    }

    /// Sets the tenant.
    #[must_use]
    pub const fn tenant(mut self, tenant_id: Uuid) -> Self {
        self.tenant_id = Some(tenant_id);
        self
    }

    /// Sets the acting operator.
    #[must_use]
    pub fn actor(mut self, operator: &Operator) -> Self {
        self.actor = Some(AuditActor::from(operator));
        self
    }

    /// Sets the directory.
    #[must_use]
    pub fn directory(mut self, directory_id: Uuid, name: impl Into<String>) -> Self {
        self.directory_id = Some(directory_id);
        self.directory_name = Some(name.into());
        self
    }

    /// Sets the target DN.
    #[must_use]
    pub fn target(mut self, dn: impl Into<String>) -> Self {
        self.target_dn = Some(dn.into());
        self
    }

    /// Adds a detail entry.
    #[must_use]
    pub fn detail(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.detail.insert(key.into(), value.into());
        self
    }

    /// Sets when the change happened (defaults to now).
    #[must_use]
    pub fn occurred_at(mut self, at: DateTime<Utc>) -> Self {
        self.occurred_at = Some(at);
        self
    }

    /// Builds the event.
    #[must_use]
    pub fn build(self) -> AuditEvent {
        let recorded_at = Utc::now();
        AuditEvent {
            id: Uuid::now_v7(),
            tenant_id: self.tenant_id,
            origin: self.origin,
            actor: self.actor,
            directory_id: self.directory_id,
            directory_name: self.directory_name,
            action: self.action,
            target_dn: self.target_dn,
            detail: serde_json::Value::Object(self.detail),
            changelog: self.changelog,
            occurred_at: self.occurred_at.unwrap_or(recorded_at),
            recorded_at,
        }
    }
}
