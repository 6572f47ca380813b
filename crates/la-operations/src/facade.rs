//! Directory operation facade.
//!
//! Every public method follows the same sequence:
//!
//! 1. **Guard**: the realm, directory or feature check for the operator.
//! 2. **Resolve**: load the realm and its directory config. Disabled and
//!    out-of-tenant directories are reported as not found.
//! 3. **Branch check** for every DN the protocol call will touch.
//! 4. **Delegate** to the pooled connection.
//! 5. **Audit** a successful write through the background dispatcher.
//!
//! Writes that return the entry read it back on a second borrow, after the
//! audit event has been submitted.
//!
//! Searches are allowed directory-wide; writes are always realm-scoped.

use std::sync::Arc;

use la_access::{AccessControlEngine, AccessScope};
use la_audit::AuditDispatcher;
use la_core::{Error, Result};
use la_directory::{
    find_entry, AttributeChange, ConnectionPoolRegistry, DirectoryEntry, DirectoryProtocolOps,
    PagedSearchExecutor,
};
use la_model::{AuditAction, AuditEvent, AuditEventBuilder, DirectoryConfig, FeatureKey, Operator, Realm};
use la_storage::{DirectoryConfigRepository, RealmRepository};
use uuid::Uuid;

use crate::request::{NewEntry, SearchQuery, SearchTarget};

#[derive(Clone, Copy)]
enum EntryKind {
    Users,
    Groups,
}

/// Authorized, audited access to tenant directories.
pub struct DirectoryOperationFacade {
    directories: Arc<dyn DirectoryConfigRepository>,
    realms: Arc<dyn RealmRepository>,
    access: AccessControlEngine,
    registry: Arc<ConnectionPoolRegistry>,
    audit: Arc<AuditDispatcher>,
}

impl DirectoryOperationFacade {
    /// Creates a facade.
    #[must_use]
    pub fn new(
        directories: Arc<dyn DirectoryConfigRepository>,
        realms: Arc<dyn RealmRepository>,
        access: AccessControlEngine,
        registry: Arc<ConnectionPoolRegistry>,
        audit: Arc<AuditDispatcher>,
    ) -> Self {
        Self {
            directories,
            realms,
            access,
            registry,
            audit,
        }
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Searches users under a directory or realm.
    ///
    /// ## Errors
    ///
    /// Returns `AccessDenied`, `NotFound`, or the directory error.
    pub async fn search_users(
        &self,
        operator: &Operator,
        target: SearchTarget,
        query: &SearchQuery,
    ) -> Result<Vec<DirectoryEntry>> {
        self.search(operator, target, query, EntryKind::Users).await
    }

    /// Searches groups under a directory or realm.
    ///
    /// ## Errors
    ///
    /// Returns `AccessDenied`, `NotFound`, or the directory error.
    pub async fn search_groups(
        &self,
        operator: &Operator,
        target: SearchTarget,
        query: &SearchQuery,
    ) -> Result<Vec<DirectoryEntry>> {
        self.search(operator, target, query, EntryKind::Groups).await
    }

    /// Reads users for export.
    ///
    /// ## Errors
    ///
    /// Returns `AccessDenied` without the export feature, `NotFound`, or the
    /// directory error.
    pub async fn export_users(
        &self,
        operator: &Operator,
        target: SearchTarget,
        query: &SearchQuery,
    ) -> Result<Vec<DirectoryEntry>> {
        self.access
            .require_feature(operator, target.scope(), FeatureKey::BulkExport)
            .await?;
        let entries = self.search(operator, target, query, EntryKind::Users).await?;
        tracing::info!(admin = %operator.username, entries = entries.len(), "users exported");
        Ok(entries)
    }

    /// Reads one entry of a realm.
    ///
    /// ## Errors
    ///
    /// Returns `AccessDenied` if the realm or branch is not accessible, or
    /// `NotFound` if the entry does not exist.
    pub async fn get_entry(
        &self,
        operator: &Operator,
        realm_id: Uuid,
        dn: &str,
        attributes: &[String],
    ) -> Result<DirectoryEntry> {
        self.access.require_realm_access(operator, realm_id).await?;
        let (_, directory) = self.resolve_realm(operator, realm_id).await?;
        self.access.require_branch_access(operator, realm_id, dn).await?;

        let dn = dn.to_string();
        let attributes = attributes.to_vec();
        let entry = self
            .registry
            .with_connection(&directory, move |session| {
                Box::pin(async move { find_entry(session, &dn, &attributes).await })
            })
            .await?;
        Ok(entry)
    }

    /// Lists the values of a group's membership attribute.
    ///
    /// ## Errors
    ///
    /// Returns `AccessDenied` if the realm or branch is not accessible, or
    /// `NotFound` if the group does not exist.
    pub async fn group_members(
        &self,
        operator: &Operator,
        realm_id: Uuid,
        group_dn: &str,
        member_attribute: &str,
    ) -> Result<Vec<String>> {
        self.access.require_realm_access(operator, realm_id).await?;
        let (_, directory) = self.resolve_realm(operator, realm_id).await?;
        self.access
            .require_branch_access(operator, realm_id, group_dn)
            .await?;

        let group_dn = group_dn.to_string();
        let member_attribute = member_attribute.to_string();
        let members = self
            .registry
            .with_connection(&directory, move |session| {
                Box::pin(async move {
                    DirectoryProtocolOps::members(session, &group_dn, &member_attribute).await
                })
            })
            .await?;
        Ok(members)
    }

    // ========================================================================
    // User writes
    // ========================================================================

    /// Creates a user and returns the stored entry.
    ///
    /// When the request carries no `objectClass`, the realm's primary and
    /// auxiliary user classes are added.
    ///
    /// ## Errors
    ///
    /// Returns `AccessDenied`, `NotFound`, or `Rejected` (for example code
    /// 68 when the entry exists).
    pub async fn create_user(
        &self,
        operator: &Operator,
        realm_id: Uuid,
        entry: NewEntry,
    ) -> Result<DirectoryEntry> {
        self.access
            .require_feature(operator, AccessScope::Realm(realm_id), FeatureKey::UserCreate)
            .await?;
        let (realm, directory) = self.resolve_realm(operator, realm_id).await?;
        self.access
            .require_branch_access(operator, realm_id, &entry.dn)
            .await?;

        let mut entry = entry;
        if !entry.has_object_classes() {
            entry
                .attributes
                .insert(0, ("objectClass".to_string(), realm.user_object_classes()));
        }
        let names = entry.attribute_names();
        let dn = entry.dn.clone();

        self.registry
            .with_connection(&directory, move |session| {
                Box::pin(async move {
                    DirectoryProtocolOps::add_entry(session, &entry.dn, &entry.attributes).await
                })
            })
            .await?;

        self.record(
            event(operator, &directory, AuditAction::UserCreate, &dn)
                .detail("realm", realm.name.as_str())
                .detail("attributes", names),
        );
        self.read_back(&directory, &dn).await
    }

    /// Applies attribute changes and returns the updated entry.
    ///
    /// ## Errors
    ///
    /// Returns `AccessDenied`, `NotFound`, or `Rejected`.
    pub async fn update_entry(
        &self,
        operator: &Operator,
        realm_id: Uuid,
        dn: &str,
        changes: Vec<AttributeChange>,
    ) -> Result<DirectoryEntry> {
        self.access
            .require_feature(operator, AccessScope::Realm(realm_id), FeatureKey::UserEdit)
            .await?;
        let (_, directory) = self.resolve_realm(operator, realm_id).await?;
        self.access.require_branch_access(operator, realm_id, dn).await?;

        let changed: Vec<String> = changes.iter().map(|c| c.attribute.clone()).collect();
        let target = dn.to_string();
        self.registry
            .with_connection(&directory, move |session| {
                Box::pin(async move {
                    DirectoryProtocolOps::modify_entry(session, &target, &changes).await
                })
            })
            .await?;

        self.record(
            event(operator, &directory, AuditAction::UserUpdate, dn)
                .detail("changes", changed),
        );
        self.read_back(&directory, dn).await
    }

    /// Deletes a user.
    ///
    /// ## Errors
    ///
    /// Returns `AccessDenied`, `NotFound`, or `Rejected`.
    pub async fn delete_user(&self, operator: &Operator, realm_id: Uuid, dn: &str) -> Result<()> {
        self.access
            .require_feature(operator, AccessScope::Realm(realm_id), FeatureKey::UserDelete)
            .await?;
        self.delete(operator, realm_id, dn, AuditAction::UserDelete).await
    }

    /// Enables or disables an account through the directory's toggle
    /// mapping.
    ///
    /// ## Errors
    ///
    /// Returns `Config` if the directory has no toggle mapping, otherwise
    /// `AccessDenied`, `NotFound`, or `Rejected`.
    pub async fn set_user_enabled(
        &self,
        operator: &Operator,
        realm_id: Uuid,
        dn: &str,
        enabled: bool,
    ) -> Result<()> {
        self.access
            .require_feature(
                operator,
                AccessScope::Realm(realm_id),
                FeatureKey::UserEnableDisable,
            )
            .await?;
        let (_, directory) = self.resolve_realm(operator, realm_id).await?;
        let change = DirectoryProtocolOps::account_toggle_change(&directory, enabled)?;
        self.access.require_branch_access(operator, realm_id, dn).await?;

        let value = change.values.first().cloned().unwrap_or_default();
        let target = dn.to_string();
        self.registry
            .with_connection(&directory, move |session| {
                Box::pin(async move {
                    DirectoryProtocolOps::modify_entry(session, &target, &[change]).await
                })
            })
            .await?;

        let action = if enabled {
            AuditAction::UserEnable
        } else {
            AuditAction::UserDisable
        };
        self.record(event(operator, &directory, action, dn).detail("value", value));
        Ok(())
    }

    /// Moves a user under `new_parent` and returns the new DN.
    ///
    /// Both the current DN and the destination must be within the operator's
    /// branches.
    ///
    /// ## Errors
    ///
    /// Returns `AccessDenied`, `NotFound`, or `Rejected`.
    pub async fn move_user(
        &self,
        operator: &Operator,
        realm_id: Uuid,
        dn: &str,
        new_parent: &str,
    ) -> Result<String> {
        self.access
            .require_feature(operator, AccessScope::Realm(realm_id), FeatureKey::UserMove)
            .await?;
        let (_, directory) = self.resolve_realm(operator, realm_id).await?;
        self.access.require_branch_access(operator, realm_id, dn).await?;
        self.access
            .require_branch_access(operator, realm_id, new_parent)
            .await?;

        let source = dn.to_string();
        let parent = new_parent.to_string();
        let moved = self
            .registry
            .with_connection(&directory, move |session| {
                Box::pin(async move { DirectoryProtocolOps::move_entry(session, &source, &parent).await })
            })
            .await?;

        self.record(
            event(operator, &directory, AuditAction::UserMove, dn)
                .detail("newParentDn", new_parent)
                .detail("newDn", moved.as_str()),
        );
        Ok(moved)
    }

    // ========================================================================
    // Group writes
    // ========================================================================

    /// Creates a group and returns the stored entry.
    ///
    /// ## Errors
    ///
    /// Returns `AccessDenied`, `NotFound`, or `Rejected`.
    pub async fn create_group(
        &self,
        operator: &Operator,
        realm_id: Uuid,
        entry: NewEntry,
    ) -> Result<DirectoryEntry> {
        self.access
            .require_feature(
                operator,
                AccessScope::Realm(realm_id),
                FeatureKey::GroupCreateDelete,
            )
            .await?;
        let (_, directory) = self.resolve_realm(operator, realm_id).await?;
        self.access
            .require_branch_access(operator, realm_id, &entry.dn)
            .await?;

        let names = entry.attribute_names();
        let dn = entry.dn.clone();
        self.registry
            .with_connection(&directory, move |session| {
                Box::pin(async move {
                    DirectoryProtocolOps::add_entry(session, &entry.dn, &entry.attributes).await
                })
            })
            .await?;

        self.record(
            event(operator, &directory, AuditAction::GroupCreate, &dn)
                .detail("attributes", names),
        );
        self.read_back(&directory, &dn).await
    }

    /// Deletes a group.
    ///
    /// ## Errors
    ///
    /// Returns `AccessDenied`, `NotFound`, or `Rejected`.
    pub async fn delete_group(&self, operator: &Operator, realm_id: Uuid, dn: &str) -> Result<()> {
        self.access
            .require_feature(
                operator,
                AccessScope::Realm(realm_id),
                FeatureKey::GroupCreateDelete,
            )
            .await?;
        self.delete(operator, realm_id, dn, AuditAction::GroupDelete).await
    }

    /// Adds a member value to a group.
    ///
    /// ## Errors
    ///
    /// Returns `AccessDenied`, `NotFound`, or `Rejected` (for example code
    /// 20 when the value is already present).
    pub async fn add_group_member(
        &self,
        operator: &Operator,
        realm_id: Uuid,
        group_dn: &str,
        member_attribute: &str,
        member_value: &str,
    ) -> Result<()> {
        self.change_membership(
            operator,
            realm_id,
            group_dn,
            member_attribute,
            member_value,
            AuditAction::GroupMemberAdd,
        )
        .await
    }

    /// Removes a member value from a group.
    ///
    /// ## Errors
    ///
    /// Returns `AccessDenied`, `NotFound`, or `Rejected`.
    pub async fn remove_group_member(
        &self,
        operator: &Operator,
        realm_id: Uuid,
        group_dn: &str,
        member_attribute: &str,
        member_value: &str,
    ) -> Result<()> {
        self.change_membership(
            operator,
            realm_id,
            group_dn,
            member_attribute,
            member_value,
            AuditAction::GroupMemberRemove,
        )
        .await
    }

    // ========================================================================
    // Internals
    // ========================================================================

    /// Reads an entry after a write that has already been audited, on a
    /// fresh borrow.
    async fn read_back(&self, directory: &DirectoryConfig, dn: &str) -> Result<DirectoryEntry> {
        let target = dn.to_string();
        self.registry
            .with_connection(directory, move |session| {
                Box::pin(async move { find_entry(session, &target, &[]).await })
            })
            .await
            .map_err(|e| {
                tracing::warn!(dn = %dn, error = %e, "entry written but read-back failed");
                Error::from(e)
            })
    }

    async fn search(
        &self,
        operator: &Operator,
        target: SearchTarget,
        query: &SearchQuery,
        kind: EntryKind,
    ) -> Result<Vec<DirectoryEntry>> {
        let (directory, base) = match target {
            SearchTarget::Directory(directory_id) => {
                self.access
                    .require_directory_access(operator, directory_id)
                    .await?;
                let directory = self.resolve_directory(operator, directory_id).await?;
                let base = directory.base_dn.clone();
                (directory, base)
            }
            SearchTarget::Realm(realm_id) => {
                self.access.require_realm_access(operator, realm_id).await?;
                let (realm, directory) = self.resolve_realm(operator, realm_id).await?;
                let base = match kind {
                    EntryKind::Users => realm.user_base_dn,
                    EntryKind::Groups => realm.group_base_dn,
                };
                (directory, base)
            }
        };

        let executor = PagedSearchExecutor::new(directory.page_size);
        let filter = query.filter().to_string();
        let attributes = query.attributes.clone();
        let entries = self
            .registry
            .with_connection(&directory, move |session| {
                Box::pin(async move { executor.execute(session, &base, &filter, &attributes).await })
            })
            .await?;
        Ok(entries)
    }

    async fn delete(
        &self,
        operator: &Operator,
        realm_id: Uuid,
        dn: &str,
        action: AuditAction,
    ) -> Result<()> {
        let (_, directory) = self.resolve_realm(operator, realm_id).await?;
        self.access.require_branch_access(operator, realm_id, dn).await?;

        let target = dn.to_string();
        self.registry
            .with_connection(&directory, move |session| {
                Box::pin(async move { DirectoryProtocolOps::delete_entry(session, &target).await })
            })
            .await?;

        self.record(event(operator, &directory, action, dn));
        Ok(())
    }

    async fn change_membership(
        &self,
        operator: &Operator,
        realm_id: Uuid,
        group_dn: &str,
        member_attribute: &str,
        member_value: &str,
        action: AuditAction,
    ) -> Result<()> {
        self.access
            .require_feature(
                operator,
                AccessScope::Realm(realm_id),
                FeatureKey::GroupManageMembers,
            )
            .await?;
        let (_, directory) = self.resolve_realm(operator, realm_id).await?;
        self.access
            .require_branch_access(operator, realm_id, group_dn)
            .await?;

        let group = group_dn.to_string();
        let attribute = member_attribute.to_string();
        let value = member_value.to_string();
        let adding = matches!(action, AuditAction::GroupMemberAdd);
        self.registry
            .with_connection(&directory, move |session| {
                Box::pin(async move {
                    if adding {
                        DirectoryProtocolOps::add_member(session, &group, &attribute, &value).await
                    } else {
                        DirectoryProtocolOps::remove_member(session, &group, &attribute, &value).await
                    }
                })
            })
            .await?;

        self.record(
            event(operator, &directory, action, group_dn)
                .detail("memberAttribute", member_attribute)
                .detail("member", member_value),
        );
        Ok(())
    }

    /// Loads a directory visible to the operator.
    async fn resolve_directory(&self, operator: &Operator, directory_id: Uuid) -> Result<DirectoryConfig> {
        match self.directories.get_by_id(directory_id).await? {
            Some(directory) if directory.enabled && operator.can_see_tenant(directory.tenant_id) => {
                Ok(directory)
            }
            _ => Err(Error::not_found(format!("directory {directory_id}"))),
        }
    }

    async fn resolve_realm(&self, operator: &Operator, realm_id: Uuid) -> Result<(Realm, DirectoryConfig)> {
        let realm = self
            .realms
            .get_by_id(realm_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("realm {realm_id}")))?;
        let directory = self.resolve_directory(operator, realm.directory_id).await?;
        Ok((realm, directory))
    }

    fn record(&self, builder: AuditEventBuilder) {
        self.audit.submit(builder.build());
    }
}

fn event(
    operator: &Operator,
    directory: &DirectoryConfig,
    action: AuditAction,
    dn: &str,
) -> AuditEventBuilder {
    AuditEvent::internal(action)
        .tenant(directory.tenant_id)
        .actor(operator)
        .directory(directory.id, directory.display_name.clone())
        .target(dn)
}
