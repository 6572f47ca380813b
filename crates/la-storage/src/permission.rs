//! Admin permission repository trait.

use async_trait::async_trait;
use la_model::{AdminRealmRole, BranchRestriction, FeatureKey, FeatureOverride};
use uuid::Uuid;

use crate::error::StorageResult;

/// Loads realm roles, branch restrictions and feature overrides.
///
/// Each method returns plain records; callers join them with realms
/// themselves.
#[async_trait]
pub trait PermissionRepository: Send + Sync {
    /// Gets the role an admin holds in a realm, if any.
    async fn find_realm_role(
        &self,
        admin_id: Uuid,
        realm_id: Uuid,
    ) -> StorageResult<Option<AdminRealmRole>>;

    /// Lists every realm role held by an admin.
    async fn list_realm_roles(&self, admin_id: Uuid) -> StorageResult<Vec<AdminRealmRole>>;

    /// Lists the branch restrictions of an admin in a realm.
    async fn list_branch_restrictions(
        &self,
        admin_id: Uuid,
        realm_id: Uuid,
    ) -> StorageResult<Vec<BranchRestriction>>;

    /// Gets the override of one feature for an admin, if any.
    async fn find_feature_override(
        &self,
        admin_id: Uuid,
        feature: FeatureKey,
    ) -> StorageResult<Option<FeatureOverride>>;
}
