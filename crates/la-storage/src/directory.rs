//! Directory configuration repository trait.

use async_trait::async_trait;
use la_model::DirectoryConfig;
use uuid::Uuid;

use crate::error::StorageResult;

/// Loads directory connection records.
///
/// Implementations must be thread-safe and support concurrent access.
#[async_trait]
pub trait DirectoryConfigRepository: Send + Sync {
    /// Gets a directory config by ID, regardless of tenant or enabled flag.
    async fn get_by_id(&self, id: Uuid) -> StorageResult<Option<DirectoryConfig>>;

    /// Lists every directory config.
    async fn list(&self) -> StorageResult<Vec<DirectoryConfig>>;

    /// Lists directories fed by the given changelog source.
    async fn list_by_audit_source(&self, source_id: Uuid) -> StorageResult<Vec<DirectoryConfig>> {
        Ok(self
            .list()
            .await?
            .into_iter()
            .filter(|d| d.audit_source_id == Some(source_id))
            .collect())
    }
}
