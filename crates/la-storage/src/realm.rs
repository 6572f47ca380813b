//! Realm repository trait.

use async_trait::async_trait;
use la_model::Realm;
use uuid::Uuid;

use crate::error::StorageResult;

/// Loads realms.
///
/// Implementations must be thread-safe and support concurrent access.
#[async_trait]
pub trait RealmRepository: Send + Sync {
    /// Gets a realm by ID.
    async fn get_by_id(&self, id: Uuid) -> StorageResult<Option<Realm>>;

    /// Lists realms belonging to a directory.
    async fn list_by_directory(&self, directory_id: Uuid) -> StorageResult<Vec<Realm>>;
}
