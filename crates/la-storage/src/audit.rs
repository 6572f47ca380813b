//! Audit source and audit event repository traits.

use async_trait::async_trait;
use la_model::{AuditEvent, AuditSourceConfig};
use uuid::Uuid;

use crate::error::StorageResult;

/// Loads changelog source records.
#[async_trait]
pub trait AuditSourceRepository: Send + Sync {
    /// Gets a source by ID.
    async fn get_by_id(&self, id: Uuid) -> StorageResult<Option<AuditSourceConfig>>;

    /// Lists every source.
    async fn list(&self) -> StorageResult<Vec<AuditSourceConfig>>;

    /// Lists enabled sources.
    async fn list_enabled(&self) -> StorageResult<Vec<AuditSourceConfig>> {
        Ok(self.list().await?.into_iter().filter(|s| s.enabled).collect())
    }
}

/// Append-only audit trail.
#[async_trait]
pub trait AuditEventRepository: Send + Sync {
    /// Appends an event.
    ///
    /// ## Errors
    ///
    /// Returns `StorageError::Duplicate` if a changelog-origin event with the
    /// same position already exists.
    async fn append(&self, event: &AuditEvent) -> StorageResult<()>;

    /// Checks whether a changelog entry has been recorded for a scope.
    async fn exists_changelog(&self, scope_id: Uuid, change_number: &str) -> StorageResult<bool>;
}
