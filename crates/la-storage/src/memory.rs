//! In-memory implementation of every repository trait.
//!
//! Backs the test suites and the seeded server. State lives behind
//! `parking_lot` locks that are never held across an await point.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use la_model::{
    AdminRealmRole, AuditEvent, AuditSourceConfig, BranchRestriction, DirectoryConfig, FeatureKey,
    FeatureOverride, Realm,
};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::audit::{AuditEventRepository, AuditSourceRepository};
use crate::directory::DirectoryConfigRepository;
use crate::error::{StorageError, StorageResult};
use crate::permission::PermissionRepository;
use crate::realm::RealmRepository;

/// Initial repository content, usually read from a JSON file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Seed {
    /// Directory connection records.
    pub directories: Vec<DirectoryConfig>,
    /// Realms.
    pub realms: Vec<Realm>,
    /// Realm roles.
    pub realm_roles: Vec<AdminRealmRole>,
    /// Branch restrictions.
    pub branch_restrictions: Vec<BranchRestriction>,
    /// Feature overrides.
    pub feature_overrides: Vec<FeatureOverride>,
    /// Changelog sources.
    pub audit_sources: Vec<AuditSourceConfig>,
}

impl Seed {
    /// Parses a seed from JSON and checks its references.
    ///
    /// ## Errors
    ///
    /// Returns `StorageError::Serialization` if the document is invalid, or
    /// `StorageError::NotFound` if a record points at a directory, realm or
    /// audit source the seed does not define.
    pub fn from_json(json: &str) -> StorageResult<Self> {
        let seed: Self =
            serde_json::from_str(json).map_err(|e| StorageError::Serialization(e.to_string()))?;
        seed.validate()?;
        Ok(seed)
    }

    /// Checks that every reference resolves within the seed.
    ///
    /// ## Errors
    ///
    /// Returns `StorageError::NotFound` for the first dangling reference.
    pub fn validate(&self) -> StorageResult<()> {
        let directories: HashSet<Uuid> = self.directories.iter().map(|d| d.id).collect();
        let realms: HashSet<Uuid> = self.realms.iter().map(|r| r.id).collect();
        let sources: HashSet<Uuid> = self.audit_sources.iter().map(|s| s.id).collect();

        let dangling = self
            .directories
            .iter()
            .filter_map(|d| d.audit_source_id)
            .find(|id| !sources.contains(id))
            .map(|id| StorageError::not_found("audit source", id))
            .or_else(|| {
                self.realms
                    .iter()
                    .map(|r| r.directory_id)
                    .find(|id| !directories.contains(id))
                    .map(|id| StorageError::not_found("directory", id))
            })
            .or_else(|| {
                self.realm_roles
                    .iter()
                    .map(|r| r.realm_id)
                    .chain(self.branch_restrictions.iter().map(|r| r.realm_id))
                    .find(|id| !realms.contains(id))
                    .map(|id| StorageError::not_found("realm", id))
            });

        match dangling {
            Some(err) => {
                tracing::warn!(error = %err, "seed has a dangling reference");
                Err(err)
            }
            None => Ok(()),
        }
    }
}

/// Thread-safe in-memory store.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    directories: RwLock<BTreeMap<Uuid, DirectoryConfig>>,
    realms: RwLock<BTreeMap<Uuid, Realm>>,
    realm_roles: RwLock<Vec<AdminRealmRole>>,
    branch_restrictions: RwLock<Vec<BranchRestriction>>,
    feature_overrides: RwLock<Vec<FeatureOverride>>,
    audit_sources: RwLock<BTreeMap<Uuid, AuditSourceConfig>>,
    events: RwLock<Vec<AuditEvent>>,
    permission_reads: AtomicUsize,
}

impl InMemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store populated from a seed.
    #[must_use]
    pub fn from_seed(seed: Seed) -> Self {
        let store = Self::new();
        for directory in seed.directories {
            store.put_directory(directory);
        }
        for realm in seed.realms {
            store.put_realm(realm);
        }
        for role in seed.realm_roles {
            store.grant_realm_role(role);
        }
        for restriction in seed.branch_restrictions {
            store.add_branch_restriction(restriction);
        }
        for feature in seed.feature_overrides {
            store.set_feature_override(feature);
        }
        for source in seed.audit_sources {
            store.put_audit_source(source);
        }
        tracing::debug!(
            realm_roles = store.realm_roles.read().len(),
            branch_restrictions = store.branch_restrictions.read().len(),
            feature_overrides = store.feature_overrides.read().len(),
            "in-memory store seeded"
        );
        store
    }

    // ========================================================================
    // Mutators
    // ========================================================================

    /// Inserts or replaces a directory config.
    pub fn put_directory(&self, directory: DirectoryConfig) {
        self.directories.write().insert(directory.id, directory);
    }

    /// Inserts or replaces a realm.
    pub fn put_realm(&self, realm: Realm) {
        self.realms.write().insert(realm.id, realm);
    }

    /// Grants a realm role, replacing any existing role for the same pair.
    pub fn grant_realm_role(&self, role: AdminRealmRole) {
        let mut roles = self.realm_roles.write();
        roles.retain(|r| !(r.admin_id == role.admin_id && r.realm_id == role.realm_id));
        roles.push(role);
    }

    /// Adds a branch restriction.
    pub fn add_branch_restriction(&self, restriction: BranchRestriction) {
        self.branch_restrictions.write().push(restriction);
    }

    /// Sets a feature override, replacing any existing one.
    pub fn set_feature_override(&self, feature: FeatureOverride) {
        let mut overrides = self.feature_overrides.write();
        overrides.retain(|o| !(o.admin_id == feature.admin_id && o.feature == feature.feature));
        overrides.push(feature);
    }

    /// Inserts or replaces a changelog source.
    pub fn put_audit_source(&self, source: AuditSourceConfig) {
        self.audit_sources.write().insert(source.id, source);
    }

    // ========================================================================
    // Inspection
    // ========================================================================

    /// Returns a snapshot of every recorded audit event.
    #[must_use]
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.read().clone()
    }

    /// Returns how many permission lookups have been served.
    #[must_use]
    pub fn permission_reads(&self) -> usize {
        self.permission_reads.load(Ordering::Relaxed)
    }

    fn note_permission_read(&self) {
        self.permission_reads.fetch_add(1, Ordering::Relaxed);
    }
}

#[async_trait]
impl DirectoryConfigRepository for InMemoryStore {
    async fn get_by_id(&self, id: Uuid) -> StorageResult<Option<DirectoryConfig>> {
        Ok(self.directories.read().get(&id).cloned())
    }

    async fn list(&self) -> StorageResult<Vec<DirectoryConfig>> {
        Ok(self.directories.read().values().cloned().collect())
    }
}

#[async_trait]
impl RealmRepository for InMemoryStore {
    async fn get_by_id(&self, id: Uuid) -> StorageResult<Option<Realm>> {
        Ok(self.realms.read().get(&id).cloned())
    }

    async fn list_by_directory(&self, directory_id: Uuid) -> StorageResult<Vec<Realm>> {
        Ok(self
            .realms
            .read()
            .values()
            .filter(|r| r.directory_id == directory_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl PermissionRepository for InMemoryStore {
    async fn find_realm_role(
        &self,
        admin_id: Uuid,
        realm_id: Uuid,
    ) -> StorageResult<Option<AdminRealmRole>> {
        self.note_permission_read();
        Ok(self
            .realm_roles
            .read()
            .iter()
            .find(|r| r.admin_id == admin_id && r.realm_id == realm_id)
            .cloned())
    }

    async fn list_realm_roles(&self, admin_id: Uuid) -> StorageResult<Vec<AdminRealmRole>> {
        self.note_permission_read();
        Ok(self
            .realm_roles
            .read()
            .iter()
            .filter(|r| r.admin_id == admin_id)
            .cloned()
            .collect())
    }

    async fn list_branch_restrictions(
        &self,
        admin_id: Uuid,
        realm_id: Uuid,
    ) -> StorageResult<Vec<BranchRestriction>> {
        self.note_permission_read();
        Ok(self
            .branch_restrictions
            .read()
            .iter()
            .filter(|b| b.admin_id == admin_id && b.realm_id == realm_id)
            .cloned()
            .collect())
    }

    async fn find_feature_override(
        &self,
        admin_id: Uuid,
        feature: FeatureKey,
    ) -> StorageResult<Option<FeatureOverride>> {
        self.note_permission_read();
        Ok(self
            .feature_overrides
            .read()
            .iter()
            .find(|o| o.admin_id == admin_id && o.feature == feature)
            .cloned())
    }
}

#[async_trait]
impl AuditSourceRepository for InMemoryStore {
    async fn get_by_id(&self, id: Uuid) -> StorageResult<Option<AuditSourceConfig>> {
        Ok(self.audit_sources.read().get(&id).cloned())
    }

    async fn list(&self) -> StorageResult<Vec<AuditSourceConfig>> {
        Ok(self.audit_sources.read().values().cloned().collect())
    }
}

#[async_trait]
impl AuditEventRepository for InMemoryStore {
    async fn append(&self, event: &AuditEvent) -> StorageResult<()> {
        let mut events = self.events.write();
        if let Some(position) = &event.changelog {
            if events.iter().any(|e| e.changelog.as_ref() == Some(position)) {
                tracing::debug!(
                    scope = %position.scope_id,
                    change_number = %position.change_number,
                    "changelog change already recorded"
                );
                return Err(StorageError::duplicate(position));
            }
        }
        events.push(event.clone());
        Ok(())
    }

    async fn exists_changelog(&self, scope_id: Uuid, change_number: &str) -> StorageResult<bool> {
        Ok(self.events.read().iter().any(|e| {
            e.changelog
                .as_ref()
                .is_some_and(|p| p.scope_id == scope_id && p.change_number == change_number)
        }))
    }
}

#[cfg(test)]
mod tests {
    use la_model::{AuditAction, BaseRole};

    use super::*;

    #[tokio::test]
    async fn realm_role_grant_replaces_existing_pair() {
        let store = InMemoryStore::new();
        let admin = Uuid::now_v7();
        let realm = Uuid::now_v7();

        store.grant_realm_role(AdminRealmRole {
            admin_id: admin,
            realm_id: realm,
            base_role: BaseRole::Full,
        });
        store.grant_realm_role(AdminRealmRole {
            admin_id: admin,
            realm_id: realm,
            base_role: BaseRole::ReadOnly,
        });

        let roles = store.list_realm_roles(admin).await.unwrap();
        assert_eq!(roles.len(), 1);
        assert_eq!(roles[0].base_role, BaseRole::ReadOnly);
        assert_eq!(store.permission_reads(), 1);
    }

    #[tokio::test]
    async fn changelog_position_is_unique() {
        let store = InMemoryStore::new();
        let scope = Uuid::now_v7();

        store
            .append(&AuditEvent::changelog(scope, "7").build())
            .await
            .unwrap();
        assert!(store.exists_changelog(scope, "7").await.unwrap());
        assert!(!store.exists_changelog(scope, "8").await.unwrap());
        assert!(!store.exists_changelog(Uuid::now_v7(), "7").await.unwrap());

        let err = store
            .append(&AuditEvent::changelog(scope, "7").build())
            .await
            .unwrap_err();
        assert!(err.is_duplicate());
        assert_eq!(store.events().len(), 1);
    }

    #[tokio::test]
    async fn internal_events_are_never_deduplicated() {
        let store = InMemoryStore::new();
        let event = AuditEvent::internal(AuditAction::UserDelete).build();
        store.append(&event).await.unwrap();
        store.append(&event).await.unwrap();
        assert_eq!(store.events().len(), 2);
    }

    #[tokio::test]
    async fn seed_loads_from_json() {
        let tenant = Uuid::now_v7();
        let directory = DirectoryConfig::new(tenant, "Corp", "ldap", "cn=svc", "tok", "dc=co");
        let seed = Seed {
            directories: vec![directory.clone()],
            ..Seed::default()
        };
        let json = serde_json::to_string(&seed).unwrap();

        let store = InMemoryStore::from_seed(Seed::from_json(&json).unwrap());
        let loaded = DirectoryConfigRepository::get_by_id(&store, directory.id)
            .await
            .unwrap();
        assert_eq!(loaded, Some(directory));
        assert!(Seed::from_json("{\"directories\": 3}").is_err());
    }

    #[test]
    fn seed_rejects_dangling_references() {
        let tenant = Uuid::now_v7();
        let directory = DirectoryConfig::new(tenant, "Corp", "ldap", "cn=svc", "tok", "dc=co");
        let orphan = Realm::new(Uuid::now_v7(), "staff", "ou=people,dc=co", "ou=groups,dc=co");
        let seed = Seed {
            directories: vec![directory.clone()],
            realms: vec![orphan.clone()],
            ..Seed::default()
        };
        let err = Seed::from_json(&serde_json::to_string(&seed).unwrap()).unwrap_err();
        assert!(err.is_not_found());
        assert!(err.to_string().contains(&orphan.directory_id.to_string()));

        let unlinked = directory.with_audit_source(Uuid::now_v7());
        let seed = Seed {
            directories: vec![unlinked],
            ..Seed::default()
        };
        assert!(seed.validate().unwrap_err().to_string().starts_with("audit source"));
    }

    #[tokio::test]
    async fn directories_by_audit_source() {
        let store = InMemoryStore::new();
        let tenant = Uuid::now_v7();
        let source = Uuid::now_v7();
        let linked = DirectoryConfig::new(tenant, "A", "a", "cn=svc", "tok", "dc=a")
            .with_audit_source(source);
        let unlinked = DirectoryConfig::new(tenant, "B", "b", "cn=svc", "tok", "dc=b");
        store.put_directory(linked.clone());
        store.put_directory(unlinked);

        let found = store.list_by_audit_source(source).await.unwrap();
        assert_eq!(found, vec![linked]);
    }
}
