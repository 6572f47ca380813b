//! Access decision procedure.

use std::sync::Arc;

use la_model::{dn, BaseRole, FeatureKey, Operator};
use la_storage::{PermissionRepository, RealmRepository};
use uuid::Uuid;

use crate::error::{AccessError, AccessResult};

/// What a feature check is evaluated against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessScope {
    /// A single realm.
    Realm(Uuid),
    /// Every realm of a directory.
    Directory(Uuid),
}

/// Outcome of a successful realm or directory check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grant {
    /// Superadmin; no role row was consulted.
    Superadmin,
    /// Tenant admin holding the given effective base role.
    Role(BaseRole),
}

impl Grant {
    /// Returns the base role, if the grant came from a role row.
    #[must_use]
    pub const fn base_role(&self) -> Option<BaseRole> {
        match self {
            Self::Superadmin => None,
            Self::Role(role) => Some(*role),
        }
    }
}

/// Decides whether an operator may act on a realm, directory, entry or
/// feature.
#[derive(Clone)]
pub struct AccessControlEngine {
    permissions: Arc<dyn PermissionRepository>,
    realms: Arc<dyn RealmRepository>,
}

impl AccessControlEngine {
    /// Creates an engine over the given repositories.
    #[must_use]
    pub fn new(permissions: Arc<dyn PermissionRepository>, realms: Arc<dyn RealmRepository>) -> Self {
        Self { permissions, realms }
    }

    /// Requires a role in the realm.
    ///
    /// ## Errors
    ///
    /// Returns `AccessError::Denied` if the admin holds no role there.
    pub async fn require_realm_access(&self, operator: &Operator, realm_id: Uuid) -> AccessResult<Grant> {
        if operator.is_superadmin() {
            return Ok(Grant::Superadmin);
        }
        match self.permissions.find_realm_role(operator.id, realm_id).await? {
            Some(role) => Ok(Grant::Role(role.base_role)),
            None => {
                tracing::debug!(admin = %operator.id, realm = %realm_id, "no realm role");
                Err(AccessError::denied(format!("No access to realm [{realm_id}]")))
            }
        }
    }

    /// Requires a role in at least one realm of the directory.
    ///
    /// The effective base role is `Full` if any of those roles is full,
    /// otherwise `ReadOnly`.
    ///
    /// ## Errors
    ///
    /// Returns `AccessError::Denied` if no realm role lies under the
    /// directory.
    pub async fn require_directory_access(
        &self,
        operator: &Operator,
        directory_id: Uuid,
    ) -> AccessResult<Grant> {
        if operator.is_superadmin() {
            return Ok(Grant::Superadmin);
        }

        let roles = self.permissions.list_realm_roles(operator.id).await?;
        let mut effective: Option<BaseRole> = None;
        for role in roles {
            let Some(realm) = self.realms.get_by_id(role.realm_id).await? else {
                continue;
            };
            if realm.directory_id != directory_id {
                continue;
            }
            effective = match (effective, role.base_role) {
                (Some(BaseRole::Full), _) | (_, BaseRole::Full) => Some(BaseRole::Full),
                _ => Some(BaseRole::ReadOnly),
            };
        }

        effective.map(Grant::Role).ok_or_else(|| {
            tracing::debug!(admin = %operator.id, directory = %directory_id, "no realm role under directory");
            AccessError::denied(format!("No access to directory [{directory_id}]"))
        })
    }

    /// Requires the entry to lie inside one of the admin's branches in the
    /// realm. An admin without branch restrictions passes.
    ///
    /// ## Errors
    ///
    /// Returns `AccessError::Denied` if restrictions exist and none contains
    /// the entry.
    pub async fn require_branch_access(
        &self,
        operator: &Operator,
        realm_id: Uuid,
        entry_dn: &str,
    ) -> AccessResult<()> {
        if operator.is_superadmin() {
            return Ok(());
        }

        let restrictions = self
            .permissions
            .list_branch_restrictions(operator.id, realm_id)
            .await?;
        if restrictions.is_empty()
            || restrictions
                .iter()
                .any(|r| dn::is_within(entry_dn, &r.branch_dn))
        {
            return Ok(());
        }

        tracing::debug!(admin = %operator.id, dn = %entry_dn, "entry outside allowed branches");
        Err(AccessError::denied(format!(
            "Entry [{entry_dn}] is not within any allowed branch for this admin"
        )))
    }

    /// Requires a feature in the given scope.
    ///
    /// Access to the scope is checked first. An override for the feature is
    /// then authoritative in both directions; without one, a full role
    /// allows everything and a read-only role allows only the read/export
    /// features.
    ///
    /// ## Errors
    ///
    /// Returns `AccessError::Denied` if the scope is not accessible or the
    /// feature is not granted.
    pub async fn require_feature(
        &self,
        operator: &Operator,
        scope: AccessScope,
        feature: FeatureKey,
    ) -> AccessResult<()> {
        let grant = match scope {
            AccessScope::Realm(realm_id) => self.require_realm_access(operator, realm_id).await?,
            AccessScope::Directory(directory_id) => {
                self.require_directory_access(operator, directory_id).await?
            }
        };
        let Some(base_role) = grant.base_role() else {
            return Ok(());
        };

        if let Some(feature_override) = self
            .permissions
            .find_feature_override(operator.id, feature)
            .await?
        {
            return if feature_override.enabled {
                Ok(())
            } else {
                Err(AccessError::denied(format!(
                    "Feature [{feature}] is disabled for this admin"
                )))
            };
        }

        match base_role {
            BaseRole::Full => Ok(()),
            BaseRole::ReadOnly if feature.allowed_for_read_only() => Ok(()),
            BaseRole::ReadOnly => Err(AccessError::denied(format!(
                "Read-only role does not grant feature [{feature}]"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use la_model::{AdminRealmRole, BranchRestriction, FeatureOverride, Realm};
    use la_storage::InMemoryStore;

    use super::*;

    struct Fixture {
        store: Arc<InMemoryStore>,
        engine: AccessControlEngine,
        admin: Operator,
        directory_id: Uuid,
        realm: Realm,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryStore::new());
        let directory_id = Uuid::now_v7();
        let realm = Realm::new(directory_id, "staff", "ou=people,dc=co", "ou=groups,dc=co");
        store.put_realm(realm.clone());
        let engine = AccessControlEngine::new(store.clone(), store.clone());
        Fixture {
            store,
            engine,
            admin: Operator::admin(Uuid::now_v7(), "alice"),
            directory_id,
            realm,
        }
    }

    impl Fixture {
        fn grant(&self, base_role: BaseRole) {
            self.store.grant_realm_role(AdminRealmRole {
                admin_id: self.admin.id,
                realm_id: self.realm.id,
                base_role,
            });
        }

        fn restrict(&self, branch: &str) {
            self.store.add_branch_restriction(BranchRestriction {
                admin_id: self.admin.id,
                realm_id: self.realm.id,
                branch_dn: branch.to_string(),
            });
        }

        fn set_override(&self, feature: FeatureKey, enabled: bool) {
            self.store.set_feature_override(FeatureOverride {
                admin_id: self.admin.id,
                feature,
                enabled,
            });
        }
    }

    #[tokio::test]
    async fn realm_access_requires_role() {
        let f = fixture();
        let err = f.engine.require_realm_access(&f.admin, f.realm.id).await.unwrap_err();
        assert!(err.is_denied());

        f.grant(BaseRole::ReadOnly);
        let grant = f.engine.require_realm_access(&f.admin, f.realm.id).await.unwrap();
        assert_eq!(grant, Grant::Role(BaseRole::ReadOnly));
    }

    #[tokio::test]
    async fn directory_access_through_any_realm() {
        let f = fixture();
        assert!(f
            .engine
            .require_directory_access(&f.admin, f.directory_id)
            .await
            .is_err());

        f.grant(BaseRole::ReadOnly);
        let other = Realm::new(f.directory_id, "contractors", "ou=ext,dc=co", "ou=groups,dc=co");
        f.store.put_realm(other.clone());
        f.store.grant_realm_role(AdminRealmRole {
            admin_id: f.admin.id,
            realm_id: other.id,
            base_role: BaseRole::Full,
        });

        let grant = f
            .engine
            .require_directory_access(&f.admin, f.directory_id)
            .await
            .unwrap();
        assert_eq!(grant, Grant::Role(BaseRole::Full));

        let elsewhere = f
            .engine
            .require_directory_access(&f.admin, Uuid::now_v7())
            .await
            .unwrap_err();
        assert!(elsewhere.is_denied());
    }

    #[tokio::test]
    async fn branch_match_respects_comma_boundary() {
        let f = fixture();
        f.grant(BaseRole::Full);
        f.restrict("ou=users,dc=co");

        assert!(f
            .engine
            .require_branch_access(&f.admin, f.realm.id, "cn=x,ou=users,dc=co")
            .await
            .is_ok());
        assert!(f
            .engine
            .require_branch_access(&f.admin, f.realm.id, "cn=x,ou=usersExtra,dc=co")
            .await
            .unwrap_err()
            .is_denied());
    }

    #[tokio::test]
    async fn no_restrictions_allow_any_entry() {
        let f = fixture();
        f.grant(BaseRole::Full);
        assert!(f
            .engine
            .require_branch_access(&f.admin, f.realm.id, "cn=anything,o=elsewhere")
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn any_matching_branch_wins() {
        let f = fixture();
        f.restrict("ou=Sales,dc=co");
        f.restrict("ou=Support,dc=co");

        let engine = &f.engine;
        assert!(engine
            .require_branch_access(&f.admin, f.realm.id, "cn=x,ou=Sales,dc=co")
            .await
            .is_ok());
        assert!(engine
            .require_branch_access(&f.admin, f.realm.id, "CN=y,OU=support,DC=co")
            .await
            .is_ok());
        assert!(engine
            .require_branch_access(&f.admin, f.realm.id, "cn=x,ou=Marketing,dc=co")
            .await
            .is_err());
    }

    #[tokio::test]
    async fn read_only_defaults() {
        let f = fixture();
        f.grant(BaseRole::ReadOnly);
        let scope = AccessScope::Realm(f.realm.id);

        for feature in FeatureKey::ALL {
            let allowed = f.engine.require_feature(&f.admin, scope, feature).await.is_ok();
            assert_eq!(allowed, feature.allowed_for_read_only(), "{feature}");
        }
    }

    #[tokio::test]
    async fn full_role_allows_everything() {
        let f = fixture();
        f.grant(BaseRole::Full);
        for feature in FeatureKey::ALL {
            assert!(f
                .engine
                .require_feature(&f.admin, AccessScope::Directory(f.directory_id), feature)
                .await
                .is_ok());
        }
    }

    #[tokio::test]
    async fn override_is_authoritative_both_ways() {
        let f = fixture();
        f.grant(BaseRole::ReadOnly);
        f.set_override(FeatureKey::UserDelete, true);
        f.set_override(FeatureKey::BulkExport, false);
        let scope = AccessScope::Realm(f.realm.id);

        assert!(f.engine.require_feature(&f.admin, scope, FeatureKey::UserDelete).await.is_ok());
        assert!(f
            .engine
            .require_feature(&f.admin, scope, FeatureKey::BulkExport)
            .await
            .unwrap_err()
            .is_denied());

        f.grant(BaseRole::Full);
        assert!(f.engine.require_feature(&f.admin, scope, FeatureKey::BulkExport).await.is_err());
    }

    #[tokio::test]
    async fn override_does_not_bypass_realm_access() {
        let f = fixture();
        f.set_override(FeatureKey::UserCreate, true);
        let err = f
            .engine
            .require_feature(&f.admin, AccessScope::Realm(f.realm.id), FeatureKey::UserCreate)
            .await
            .unwrap_err();
        assert!(err.is_denied());
    }

    #[tokio::test]
    async fn superadmin_never_reads_permissions() {
        let f = fixture();
        let root = Operator::superadmin("root");

        f.engine.require_realm_access(&root, f.realm.id).await.unwrap();
        f.engine.require_directory_access(&root, f.directory_id).await.unwrap();
        f.engine
            .require_branch_access(&root, f.realm.id, "cn=x,o=anywhere")
            .await
            .unwrap();
        f.engine
            .require_feature(&root, AccessScope::Realm(f.realm.id), FeatureKey::UserDelete)
            .await
            .unwrap();

        assert_eq!(f.store.permission_reads(), 0);
    }

    #[test]
    fn denial_maps_to_access_denied() {
        let err: la_core::Error = AccessError::denied("nope").into();
        assert!(matches!(err, la_core::Error::AccessDenied(_)));
    }
}
