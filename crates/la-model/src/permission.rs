//! Admin permission records.
//!
//! Authorization is decided over four independent dimensions:
//!
//! 1. [`AdminRealmRole`] grants access to a realm with a [`BaseRole`].
//! 2. Realm roles under a directory grant read access to that directory.
//! 3. [`BranchRestriction`] rows confine an admin to subtrees of a realm.
//! 4. [`FeatureOverride`] rows switch individual [`FeatureKey`]s on or off.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Base role an admin holds in a realm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BaseRole {
    /// Every feature is allowed unless overridden.
    Full,
    /// Only read/export features are allowed unless overridden.
    ReadOnly,
}

/// Realm role assignment. At most one row exists per (admin, realm).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminRealmRole {
    /// Admin account.
    pub admin_id: Uuid,
    /// Realm the role applies to.
    pub realm_id: Uuid,
    /// Granted base role.
    pub base_role: BaseRole,
}

/// Subtree restriction for an admin within a realm.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchRestriction {
    /// Admin account.
    pub admin_id: Uuid,
    /// Realm the restriction applies to.
    pub realm_id: Uuid,
    /// Root of the permitted subtree.
    pub branch_dn: String,
}

/// Per-admin feature switch; authoritative when present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureOverride {
    /// Admin account.
    pub admin_id: Uuid,
    /// Feature being switched.
    pub feature: FeatureKey,
    /// Whether the feature is allowed.
    pub enabled: bool,
}

/// Individually grantable admin feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FeatureKey {
    /// Create users.
    #[serde(rename = "user.create")]
    UserCreate,
    /// Edit user attributes.
    #[serde(rename = "user.edit")]
    UserEdit,
    /// Delete users.
    #[serde(rename = "user.delete")]
    UserDelete,
    /// Enable or disable user accounts.
    #[serde(rename = "user.enable_disable")]
    UserEnableDisable,
    /// Move users between subtrees.
    #[serde(rename = "user.move")]
    UserMove,
    /// Add or remove group members.
    #[serde(rename = "group.manage_members")]
    GroupManageMembers,
    /// Create or delete groups.
    #[serde(rename = "group.create_delete")]
    GroupCreateDelete,
    /// Bulk import.
    #[serde(rename = "bulk.import")]
    BulkImport,
    /// Bulk export.
    #[serde(rename = "bulk.export")]
    BulkExport,
    /// Run reports.
    #[serde(rename = "reports.run")]
    ReportsRun,
    /// Export report output.
    #[serde(rename = "reports.export")]
    ReportsExport,
    /// Schedule reports.
    #[serde(rename = "reports.schedule")]
    ReportsSchedule,
}

impl FeatureKey {
    /// Every feature key.
    pub const ALL: [Self; 12] = [
        Self::UserCreate,
        Self::UserEdit,
        Self::UserDelete,
        Self::UserEnableDisable,
        Self::UserMove,
        Self::GroupManageMembers,
        Self::GroupCreateDelete,
        Self::BulkImport,
        Self::BulkExport,
        Self::ReportsRun,
        Self::ReportsExport,
        Self::ReportsSchedule,
    ];

    /// Features a read-only admin holds by default.
    pub const READ_ONLY_DEFAULTS: [Self; 3] = [Self::BulkExport, Self::ReportsRun, Self::ReportsExport];

    /// Returns the stable string key.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::UserCreate => "user.create",
            Self::UserEdit => "user.edit",
            Self::UserDelete => "user.delete",
            Self::UserEnableDisable => "user.enable_disable",
            Self::UserMove => "user.move",
            Self::GroupManageMembers => "group.manage_members",
            Self::GroupCreateDelete => "group.create_delete",
            Self::BulkImport => "bulk.import",
            Self::BulkExport => "bulk.export",
            Self::ReportsRun => "reports.run",
            Self::ReportsExport => "reports.export",
            Self::ReportsSchedule => "reports.schedule",
        }
    }

    /// Returns true if a read-only base role allows this feature by default.
    #[must_use]
    pub const fn allowed_for_read_only(&self) -> bool {
        matches!(self, Self::BulkExport | Self::ReportsRun | Self::ReportsExport)
    }
}

impl fmt::Display for FeatureKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when parsing an unknown feature key.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown feature key: {0}")]
pub struct UnknownFeature(pub String);

impl FromStr for FeatureKey {
    type Err = UnknownFeature;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|key| key.as_str() == s)
            .ok_or_else(|| UnknownFeature(s.to_string()))
    }
}
