//! # la-server
//!
//! Process wiring for the LDAP administration layer.
//!
//! [`Server`] assembles the repositories, the secret codec, the connection
//! pool registry, the audit dispatcher, the operation facade and the
//! changelog scheduler, and tears them down in order on shutdown:
//!
//! 1. stop the changelog scheduler (a pass in progress completes),
//! 2. drain the audit queue,
//! 3. close every directory pool.
//!
//! ## Usage
//!
//! ```ignore
//! use la_server::{Server, ServerConfig};
//!
//! let config = ServerConfig::from_env()?;
//! let server = Server::new(config).await?;
//! server.run_until(tokio::signal::ctrl_c()).await;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;

pub use config::ServerConfig;

use std::future::Future;
use std::sync::Arc;

use la_access::AccessControlEngine;
use la_audit::{
    AuditDispatcher, ChangelogAuditPoller, ChangelogScheduler, RepositoryAuditRecorder,
    SchedulerHandle,
};
use la_core::AuditConfig;
use la_crypto::{AesGcmSecretCodec, SecretCodec};
use la_directory::{ConnectionPoolRegistry, DirectoryConnector, Ldap3Connector};
use la_operations::DirectoryOperationFacade;
use la_storage::{InMemoryStore, Seed};

/// The assembled administration layer.
pub struct Server {
    audit_config: AuditConfig,
    store: Arc<InMemoryStore>,
    registry: Arc<ConnectionPoolRegistry>,
    audit: Arc<AuditDispatcher>,
    facade: Arc<DirectoryOperationFacade>,
    poller: Arc<ChangelogAuditPoller>,
    scheduler: Option<SchedulerHandle>,
}

impl Server {
    /// Creates a server talking to real directories over `ldap3`.
    ///
    /// The in-memory repositories are seeded from `seed_file` when one is
    /// configured.
    ///
    /// ## Errors
    ///
    /// Returns an error if the seed cannot be read or parsed, or the
    /// encryption key is invalid.
    pub async fn new(config: ServerConfig) -> anyhow::Result<Self> {
        let store = match &config.seed_file {
            Some(path) => {
                let json = tokio::fs::read_to_string(path).await.map_err(|e| {
                    anyhow::anyhow!("failed to read seed file {}: {e}", path.display())
                })?;
                let seed = Seed::from_json(&json)?;
                tracing::info!(
                    path = %path.display(),
                    directories = seed.directories.len(),
                    realms = seed.realms.len(),
                    audit_sources = seed.audit_sources.len(),
                    "repositories seeded"
                );
                InMemoryStore::from_seed(seed)
            }
            None => InMemoryStore::new(),
        };

        Self::with_connector(&config, Arc::new(store), Arc::new(Ldap3Connector::new()))
    }

    /// Creates a server over the given store and directory connector.
    /// Must be called inside a tokio runtime.
    ///
    /// ## Errors
    ///
    /// Returns an error if the encryption key is invalid.
    pub fn with_connector(
        config: &ServerConfig,
        store: Arc<InMemoryStore>,
        connector: Arc<dyn DirectoryConnector>,
    ) -> anyhow::Result<Self> {
        let audit_config = config.config.audit.clone();
        let codec: Arc<dyn SecretCodec> = Arc::new(AesGcmSecretCodec::from_base64_key(
            &config.config.crypto.encryption_key,
        )?);

        let registry = Arc::new(ConnectionPoolRegistry::new(connector, Arc::clone(&codec)));
        let audit = Arc::new(AuditDispatcher::start(
            Arc::new(RepositoryAuditRecorder::new(store.clone())),
            audit_config.queue_capacity,
            audit_config.workers,
        ));
        let access = AccessControlEngine::new(store.clone(), store.clone());
        let facade = Arc::new(DirectoryOperationFacade::new(
            store.clone(),
            store.clone(),
            access,
            Arc::clone(&registry),
            Arc::clone(&audit),
        ));
        let poller = Arc::new(ChangelogAuditPoller::new(
            store.clone(),
            store.clone(),
            store.clone(),
            Arc::clone(&registry),
            codec,
            audit_config.clone(),
        ));

        Ok(Self {
            audit_config,
            store,
            registry,
            audit,
            facade,
            poller,
            scheduler: None,
        })
    }

    /// Returns the operation facade.
    #[must_use]
    pub fn facade(&self) -> Arc<DirectoryOperationFacade> {
        Arc::clone(&self.facade)
    }

    /// Returns the changelog poller.
    #[must_use]
    pub fn poller(&self) -> Arc<ChangelogAuditPoller> {
        Arc::clone(&self.poller)
    }

    /// Returns the backing store.
    #[must_use]
    pub const fn store(&self) -> &Arc<InMemoryStore> {
        &self.store
    }

    /// Returns the pool registry.
    #[must_use]
    pub const fn registry(&self) -> &Arc<ConnectionPoolRegistry> {
        &self.registry
    }

    /// Starts the changelog scheduler. Calling it twice has no effect.
    pub fn start_scheduler(&mut self) {
        if self.scheduler.is_some() {
            return;
        }
        self.scheduler = Some(ChangelogScheduler::spawn(
            Arc::clone(&self.poller),
            self.audit_config.initial_delay(),
            self.audit_config.poll_interval(),
        ));
    }

    /// Starts the scheduler, waits for `signal`, then shuts down.
    pub async fn run_until<F>(mut self, signal: F)
    where
        F: Future,
    {
        self.start_scheduler();
        tracing::info!("LDAP administration layer running");
        signal.await;
        tracing::info!("shutdown requested");
        self.shutdown().await;
    }

    /// Stops the scheduler, drains the audit queue and closes every pool.
    pub async fn shutdown(mut self) {
        if let Some(scheduler) = self.scheduler.take() {
            scheduler.stop().await;
        }
        self.audit.shutdown().await;
        self.registry.close_all().await;
        tracing::info!("LDAP administration layer stopped");
    }
}
