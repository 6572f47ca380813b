//! Authenticated operator principal.
//!
//! The operator is passed explicitly to every facade and access-control
//! call; there is no ambient request principal.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Class of operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperatorKind {
    /// Platform operator; bypasses every permission check and tenant scope.
    Superadmin,
    /// Tenant admin; subject to realm roles, branches and feature overrides.
    Admin,
}

/// Authenticated principal performing an operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operator {
    /// Account id.
    pub id: Uuid,
    /// Operator class.
    pub kind: OperatorKind,
    /// Tenant of an admin; `None` for superadmins.
    pub tenant_id: Option<Uuid>,
    /// Login name.
    pub username: String,
}

impl Operator {
    /// Creates a superadmin principal.
    #[must_use]
    pub fn superadmin(username: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            kind: OperatorKind::Superadmin,
            tenant_id: None,
            username: username.into(),
        }
    }

    /// Creates a tenant admin principal.
    #[must_use]
    pub fn admin(tenant_id: Uuid, username: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            kind: OperatorKind::Admin,
            tenant_id: Some(tenant_id),
            username: username.into(),
        }
    }

    /// Returns true for superadmins.
    #[must_use]
    pub const fn is_superadmin(&self) -> bool {
        matches!(self.kind, OperatorKind::Superadmin)
    }

    /// Returns true if resources of `tenant_id` are visible to this operator.
    #[must_use]
    pub fn can_see_tenant(&self, tenant_id: Uuid) -> bool {
        self.is_superadmin() || self.tenant_id == Some(tenant_id)
    }
}
