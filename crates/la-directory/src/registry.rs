//! Pool-by-directory registry.
//!
//! Exactly one [`ConnectionPool`] exists per directory config id. The first
//! use of an id builds the pool; concurrent first uses share that single
//! construction. A cached pool also remembers a fingerprint of the network
//! and credential parameters it was built from, and a lookup with a changed
//! config replaces the stale pool before use.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::BoxFuture;
use la_crypto::SecretCodec;
use la_model::DirectoryConfig;
use tokio::sync::OnceCell;
use uuid::Uuid;

use crate::error::DirectoryResult;
use crate::pool::{connect_bound, ConnectionPool, PooledConnection};
use crate::session::{DirectoryConnector, DirectorySession};
use crate::settings::ConnectionSettings;

struct PoolSlot {
    fingerprint: u64,
    pool: OnceCell<ConnectionPool>,
}

impl PoolSlot {
    fn new(fingerprint: u64) -> Arc<Self> {
        Arc::new(Self {
            fingerprint,
            pool: OnceCell::new(),
        })
    }
}

/// Registry of directory connection pools.
pub struct ConnectionPoolRegistry {
    connector: Arc<dyn DirectoryConnector>,
    codec: Arc<dyn SecretCodec>,
    slots: DashMap<Uuid, Arc<PoolSlot>>,
}

impl ConnectionPoolRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new(connector: Arc<dyn DirectoryConnector>, codec: Arc<dyn SecretCodec>) -> Self {
        Self {
            connector,
            codec,
            slots: DashMap::new(),
        }
    }

    /// Returns the pool for a directory, building it on first use.
    ///
    /// ## Errors
    ///
    /// Returns `DirectoryError::Credential` if the bind credential cannot be
    /// decrypted, or the connect/bind error of the initial connections.
    pub async fn pool_for(&self, config: &DirectoryConfig) -> DirectoryResult<ConnectionPool> {
        loop {
            let (slot, stale) = self.slot_for(config.id, fingerprint(config));
            if let Some(stale) = stale {
                tracing::info!(directory = %config.id, "directory settings changed, replacing pool");
                if let Some(pool) = stale.pool.get() {
                    pool.close().await;
                }
            }

            let pool = slot
                .pool
                .get_or_try_init(|| self.build_pool(config))
                .await?
                .clone();
            if self.is_current(config.id, &slot) {
                return Ok(pool);
            }

            // Evicted or replaced while the pool was being built.
            tracing::debug!(directory = %config.id, "discarding pool built for a removed slot");
            pool.close().await;
        }
    }

    /// Borrows a connection from the directory's pool.
    ///
    /// ## Errors
    ///
    /// See [`ConnectionPoolRegistry::pool_for`] and [`ConnectionPool::acquire`].
    pub async fn acquire(&self, config: &DirectoryConfig) -> DirectoryResult<PooledConnection> {
        self.pool_for(config).await?.acquire().await
    }

    /// Runs `operation` on a borrowed connection of the directory's pool.
    ///
    /// ## Errors
    ///
    /// See [`ConnectionPool::with_connection`].
    pub async fn with_connection<T, F>(&self, config: &DirectoryConfig, operation: F) -> DirectoryResult<T>
    where
        T: Send,
        F: for<'c> FnOnce(&'c mut dyn DirectorySession) -> BoxFuture<'c, DirectoryResult<T>>
            + Send,
    {
        self.pool_for(config).await?.with_connection(operation).await
    }

    /// Opens a bound connection that is not cached.
    ///
    /// ## Errors
    ///
    /// Returns the connect or bind error.
    pub async fn open_unpooled(
        &self,
        settings: &ConnectionSettings,
    ) -> DirectoryResult<Box<dyn DirectorySession>> {
        connect_bound(self.connector.as_ref(), settings).await
    }

    /// Closes and forgets the pool of a directory. The next use rebuilds it
    /// from the current config.
    pub async fn evict(&self, directory_id: Uuid) {
        if let Some((_, slot)) = self.slots.remove(&directory_id) {
            if let Some(pool) = slot.pool.get() {
                pool.close().await;
            }
            tracing::info!(directory = %directory_id, "directory pool evicted");
        }
    }

    /// Closes every pool.
    pub async fn close_all(&self) {
        let ids: Vec<Uuid> = self.slots.iter().map(|slot| *slot.key()).collect();
        for id in ids {
            self.evict(id).await;
        }
    }

    /// Returns true if a pool is cached for the directory.
    #[must_use]
    pub fn contains(&self, directory_id: Uuid) -> bool {
        self.slots
            .get(&directory_id)
            .is_some_and(|slot| slot.pool.initialized())
    }

    /// Number of cached slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns true if no slot is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn is_current(&self, id: Uuid, slot: &Arc<PoolSlot>) -> bool {
        self.slots
            .get(&id)
            .is_some_and(|current| Arc::ptr_eq(current.value(), slot))
    }

    fn slot_for(&self, id: Uuid, fingerprint: u64) -> (Arc<PoolSlot>, Option<Arc<PoolSlot>>) {
        match self.slots.entry(id) {
            Entry::Occupied(mut entry) => {
                if entry.get().fingerprint == fingerprint {
                    (Arc::clone(entry.get()), None)
                } else {
                    let fresh = PoolSlot::new(fingerprint);
                    let stale = entry.insert(Arc::clone(&fresh));
                    (fresh, Some(stale))
                }
            }
            Entry::Vacant(entry) => {
                let fresh = PoolSlot::new(fingerprint);
                entry.insert(Arc::clone(&fresh));
                (fresh, None)
            }
        }
    }

    async fn build_pool(&self, config: &DirectoryConfig) -> DirectoryResult<ConnectionPool> {
        let password = self.codec.decrypt(&config.bind_credential_encrypted)?;
        let settings = ConnectionSettings::for_directory(config, password);
        ConnectionPool::establish(config.display_name.clone(), Arc::clone(&self.connector), settings)
            .await
    }
}

/// Hash of every parameter a pool is built from.
fn fingerprint(config: &DirectoryConfig) -> u64 {
    let mut hasher = DefaultHasher::new();
    config.host.hash(&mut hasher);
    config.port.hash(&mut hasher);
    config.tls_mode.hash(&mut hasher);
    config.trust.hash(&mut hasher);
    config.bind_dn.hash(&mut hasher);
    config.bind_credential_encrypted.hash(&mut hasher);
    config.pool_min_size.hash(&mut hasher);
    config.pool_max_size.hash(&mut hasher);
    config.connect_timeout_secs.hash(&mut hasher);
    config.response_timeout_secs.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use la_crypto::{CryptoError, CryptoResult};
    use la_model::TlsMode;

    use super::*;
    use crate::error::DirectoryError;
    use crate::testing::{FakeDirectory, Recorded};

    /// Codec that counts decryptions and returns the token unchanged.
    #[derive(Default)]
    struct CountingCodec {
        decrypts: AtomicUsize,
    }

    impl SecretCodec for CountingCodec {
        fn encrypt(&self, plaintext: &str) -> CryptoResult<String> {
            Ok(plaintext.to_string())
        }

        fn decrypt(&self, token: &str) -> CryptoResult<String> {
            self.decrypts.fetch_add(1, Ordering::SeqCst);
            if token == "corrupt" {
                return Err(CryptoError::decryption("authentication failed"));
            }
            Ok(token.to_string())
        }
    }

    fn registry(directory: &FakeDirectory) -> (ConnectionPoolRegistry, Arc<CountingCodec>) {
        let codec = Arc::new(CountingCodec::default());
        let registry = ConnectionPoolRegistry::new(Arc::new(directory.clone()), codec.clone());
        (registry, codec)
    }

    fn config() -> DirectoryConfig {
        DirectoryConfig::new(Uuid::now_v7(), "Corp", "fake", "cn=svc,dc=co", "secret", "dc=co")
            .with_pool_size(1, 3)
    }

    #[tokio::test]
    async fn sequential_uses_share_one_pool() {
        let directory = FakeDirectory::new();
        let (registry, codec) = registry(&directory);
        let config = config();

        let first = registry.pool_for(&config).await.unwrap();
        let second = registry.pool_for(&config).await.unwrap();
        assert!(first.ptr_eq(&second));
        assert_eq!(codec.decrypts.load(Ordering::SeqCst), 1);

        registry
            .with_connection(&config, |session| {
                Box::pin(async move { session.delete("cn=x,dc=co").await.map(|_| ()) })
            })
            .await
            .unwrap();
        assert!(registry.pool_for(&config).await.unwrap().ptr_eq(&first));
    }

    #[tokio::test]
    async fn evict_rebuilds_and_decrypts_once_more() {
        let directory = FakeDirectory::new();
        let (registry, codec) = registry(&directory);
        let config = config();

        let before = registry.pool_for(&config).await.unwrap();
        registry.evict(config.id).await;
        assert!(before.is_closed());
        assert!(!registry.contains(config.id));

        let after = registry.pool_for(&config).await.unwrap();
        assert!(!after.ptr_eq(&before));
        assert_eq!(codec.decrypts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn concurrent_first_use_builds_once() {
        let directory = FakeDirectory::new();
        let (registry, codec) = registry(&directory);
        let config = config();

        let (a, b) = tokio::join!(registry.pool_for(&config), registry.pool_for(&config));
        assert!(a.unwrap().ptr_eq(&b.unwrap()));
        assert_eq!(codec.decrypts.load(Ordering::SeqCst), 1);
        assert_eq!(directory.connects(), 1);
    }

    #[tokio::test]
    async fn changed_settings_replace_stale_pool() {
        let directory = FakeDirectory::new();
        let (registry, _codec) = registry(&directory);
        let config = config();

        let before = registry.pool_for(&config).await.unwrap();
        let moved = config.clone().with_tls(TlsMode::StartTls);
        let after = registry.pool_for(&moved).await.unwrap();

        assert!(!after.ptr_eq(&before));
        assert!(before.is_closed());
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn failed_build_leaves_no_pool_and_retries() {
        let directory = FakeDirectory::new();
        directory.refuse_connections("connection refused");
        let (registry, _codec) = registry(&directory);
        let config = config();

        let err = registry.pool_for(&config).await.err().unwrap();
        assert!(err.is_connection_error());
        assert!(!registry.contains(config.id));

        directory.accept_connections();
        assert!(registry.pool_for(&config).await.is_ok());
        assert!(registry.contains(config.id));
    }

    #[tokio::test]
    async fn undecryptable_credential_is_reported() {
        let directory = FakeDirectory::new();
        let (registry, _codec) = registry(&directory);
        let mut config = config();
        config.bind_credential_encrypted = "corrupt".to_string();

        let err = registry.pool_for(&config).await.err().unwrap();
        assert!(matches!(err, DirectoryError::Credential(_)));
        assert_eq!(directory.connects(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn eviction_during_build_closes_the_orphaned_pool() {
        let directory = FakeDirectory::new();
        directory.delay_connections(Duration::from_millis(500));
        let (registry, codec) = registry(&directory);
        let config = config();

        let (built, ()) = tokio::join!(registry.pool_for(&config), async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            registry.evict(config.id).await;
        });
        let pool = built.unwrap();

        assert!(!pool.is_closed());
        assert!(registry.contains(config.id));
        assert!(registry.pool_for(&config).await.unwrap().ptr_eq(&pool));
        assert_eq!(codec.decrypts.load(Ordering::SeqCst), 2);
        assert_eq!(directory.connects(), 2);
        assert!(directory.journal().contains(&Recorded::Unbind));
    }

    #[tokio::test]
    async fn close_all_closes_every_pool() {
        let directory = FakeDirectory::new();
        let (registry, _codec) = registry(&directory);
        let a = registry.pool_for(&config()).await.unwrap();
        let b = registry.pool_for(&config()).await.unwrap();

        registry.close_all().await;
        assert!(a.is_closed());
        assert!(b.is_closed());
        assert!(registry.is_empty());
    }
}
