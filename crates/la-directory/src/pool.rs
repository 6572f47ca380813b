//! Bounded connection pool for one directory.
//!
//! The pool opens `max(min, 1)` bound connections when it is built so that
//! a misconfigured directory fails immediately. Borrows are limited to
//! `pool_max_size` by a semaphore; a borrower waits at most the connect
//! timeout. Idle connections are reused LIFO; missing ones are opened on
//! demand.
//!
//! Every bound session enforces the response timeout on each protocol
//! request separately, so a paged search or a write followed by a read-back
//! gets one budget per round trip.
//!
//! A borrowed connection goes back to the pool unless the operation failed
//! with a connection-class error, in which case it is unbound and dropped.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::timeout;

use crate::error::{DirectoryError, DirectoryResult};
use crate::session::{
    result_code, AttributeChange, DirectoryConnector, DirectorySession, ProtocolOutcome,
    SearchPage, SearchRequest,
};
use crate::settings::ConnectionSettings;

/// Opens a transport and binds it with the service account.
///
/// ## Errors
///
/// Returns a connection-class error if the transport cannot be opened in
/// time, or `DirectoryError::Bind` if the server refuses the credentials.
///
/// The returned session times out every later request after
/// `settings.response_timeout`.
pub async fn connect_bound(
    connector: &dyn DirectoryConnector,
    settings: &ConnectionSettings,
) -> DirectoryResult<Box<dyn DirectorySession>> {
    let endpoint = &settings.endpoint;
    let mut session = timeout(endpoint.connect_timeout, connector.connect(endpoint))
        .await
        .map_err(|_| {
            DirectoryError::connection(format!("connect to {} timed out", endpoint.url()))
        })??;

    let bound = timeout(
        settings.response_timeout,
        session.simple_bind(&settings.bind_dn, &settings.bind_password),
    )
    .await;

    match bound {
        Ok(Ok(outcome)) if outcome.is_success() => Ok(Box::new(TimedSession {
            inner: session,
            limit: settings.response_timeout,
        })),
        Ok(Ok(outcome)) => {
            let _ = session.unbind().await;
            let reason = if outcome.code == result_code::INVALID_CREDENTIALS {
                format!("invalid credentials for {}", settings.bind_dn)
            } else {
                format!("{} - {}", outcome.code, outcome.diagnostic)
            };
            Err(DirectoryError::Bind(reason))
        }
        Ok(Err(err)) => Err(err),
        Err(_) => Err(DirectoryError::Timeout),
    }
}

/// Session wrapper bounding each request by the response timeout.
struct TimedSession {
    inner: Box<dyn DirectorySession>,
    limit: Duration,
}

impl TimedSession {
    async fn bounded<T>(
        limit: Duration,
        request: impl Future<Output = DirectoryResult<T>>,
    ) -> DirectoryResult<T> {
        timeout(limit, request)
            .await
            .unwrap_or(Err(DirectoryError::Timeout))
    }
}

#[async_trait]
impl DirectorySession for TimedSession {
    async fn simple_bind(&mut self, dn: &str, password: &str) -> DirectoryResult<ProtocolOutcome> {
        Self::bounded(self.limit, self.inner.simple_bind(dn, password)).await
    }

    async fn search(&mut self, request: &SearchRequest) -> DirectoryResult<SearchPage> {
        Self::bounded(self.limit, self.inner.search(request)).await
    }

    async fn add(
        &mut self,
        dn: &str,
        attributes: &[(String, Vec<String>)],
    ) -> DirectoryResult<ProtocolOutcome> {
        Self::bounded(self.limit, self.inner.add(dn, attributes)).await
    }

    async fn modify(
        &mut self,
        dn: &str,
        changes: &[AttributeChange],
    ) -> DirectoryResult<ProtocolOutcome> {
        Self::bounded(self.limit, self.inner.modify(dn, changes)).await
    }

    async fn delete(&mut self, dn: &str) -> DirectoryResult<ProtocolOutcome> {
        Self::bounded(self.limit, self.inner.delete(dn)).await
    }

    async fn modify_dn(
        &mut self,
        dn: &str,
        new_rdn: &str,
        delete_old_rdn: bool,
        new_superior: Option<&str>,
    ) -> DirectoryResult<ProtocolOutcome> {
        Self::bounded(
            self.limit,
            self.inner.modify_dn(dn, new_rdn, delete_old_rdn, new_superior),
        )
        .await
    }

    async fn unbind(&mut self) -> DirectoryResult<()> {
        Self::bounded(self.limit, self.inner.unbind()).await
    }
}

struct PoolShared {
    name: String,
    connector: Arc<dyn DirectoryConnector>,
    settings: ConnectionSettings,
    permits: Arc<Semaphore>,
    idle: Mutex<Vec<Box<dyn DirectorySession>>>,
    closed: AtomicBool,
}

impl PoolShared {
    fn give_back(&self, session: Box<dyn DirectorySession>) {
        let mut idle = self.idle.lock();
        if !self.closed.load(Ordering::Acquire) {
            idle.push(session);
        }
    }
}

/// Connection pool for one directory.
///
/// Cloning is cheap; clones share the same connections.
#[derive(Clone)]
pub struct ConnectionPool {
    shared: Arc<PoolShared>,
}

impl ConnectionPool {
    /// Validates the settings and opens the initial connections.
    ///
    /// ## Errors
    ///
    /// Returns the first connect or bind failure. Connections opened before
    /// the failure are unbound; no pool is returned.
    pub async fn establish(
        name: impl Into<String>,
        connector: Arc<dyn DirectoryConnector>,
        settings: ConnectionSettings,
    ) -> DirectoryResult<Self> {
        settings.validate()?;
        let name = name.into();

        let initial = settings.initial_connections();
        let mut opened = Vec::with_capacity(initial);
        for _ in 0..initial {
            match connect_bound(connector.as_ref(), &settings).await {
                Ok(session) => opened.push(session),
                Err(err) => {
                    for mut session in opened {
                        let _ = session.unbind().await;
                    }
                    tracing::warn!(pool = %name, error = %err, "failed to build directory pool");
                    return Err(err);
                }
            }
        }

        tracing::info!(
            pool = %name,
            url = %settings.endpoint.url(),
            initial,
            max = settings.pool_max_size,
            "directory pool ready"
        );

        Ok(Self {
            shared: Arc::new(PoolShared {
                name,
                permits: Arc::new(Semaphore::new(settings.pool_max_size)),
                idle: Mutex::new(opened),
                closed: AtomicBool::new(false),
                connector,
                settings,
            }),
        })
    }

    /// Borrows a connection, waiting up to the connect timeout.
    ///
    /// ## Errors
    ///
    /// Returns `PoolExhausted` when no connection frees up in time,
    /// `PoolClosed` after [`ConnectionPool::close`], or the connect/bind
    /// error when a fresh connection has to be opened.
    pub async fn acquire(&self) -> DirectoryResult<PooledConnection> {
        if self.is_closed() {
            return Err(DirectoryError::PoolClosed);
        }

        let wait = self.shared.settings.endpoint.connect_timeout;
        let permit = match timeout(wait, Arc::clone(&self.shared.permits).acquire_owned()).await {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => return Err(DirectoryError::PoolClosed),
            Err(_) => return Err(DirectoryError::PoolExhausted),
        };

        let reused = self.shared.idle.lock().pop();
        let session = match reused {
            Some(session) => session,
            None => {
                tracing::debug!(pool = %self.shared.name, "opening additional directory connection");
                connect_bound(self.shared.connector.as_ref(), &self.shared.settings).await?
            }
        };

        Ok(PooledConnection {
            session,
            shared: Arc::clone(&self.shared),
            _permit: permit,
        })
    }

    /// Borrows a connection, runs `operation`, and returns or discards the
    /// connection depending on the outcome.
    ///
    /// ## Errors
    ///
    /// Returns the borrow error or the operation's error. A request that
    /// exceeds the response timeout yields `DirectoryError::Timeout`.
    pub async fn with_connection<T, F>(&self, operation: F) -> DirectoryResult<T>
    where
        T: Send,
        F: for<'c> FnOnce(&'c mut dyn DirectorySession) -> BoxFuture<'c, DirectoryResult<T>>
            + Send,
    {
        let mut conn = self.acquire().await?;
        let result = operation(conn.session()).await;

        match &result {
            Err(err) if err.is_connection_error() => {
                tracing::warn!(
                    pool = %self.shared.name,
                    error = %err,
                    "discarding defunct directory connection"
                );
                conn.discard().await;
            }
            _ => conn.release(),
        }
        result
    }

    /// Closes the pool and unbinds every idle connection.
    ///
    /// Borrowed connections are dropped when their borrowers finish.
    pub async fn close(&self) {
        let sessions = {
            let mut idle = self.shared.idle.lock();
            self.shared.closed.store(true, Ordering::Release);
            std::mem::take(&mut *idle)
        };
        self.shared.permits.close();

        let count = sessions.len();
        for mut session in sessions {
            let _ = session.unbind().await;
        }
        tracing::info!(pool = %self.shared.name, closed = count, "directory pool closed");
    }

    /// Returns true after [`ConnectionPool::close`].
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// Number of idle connections.
    #[must_use]
    pub fn idle_count(&self) -> usize {
        self.shared.idle.lock().len()
    }

    /// Number of borrows currently possible without waiting.
    #[must_use]
    pub fn available_permits(&self) -> usize {
        self.shared.permits.available_permits()
    }

    /// Returns true if both handles refer to the same pool.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}

/// A connection borrowed from a [`ConnectionPool`].
///
/// Call [`PooledConnection::release`] to return it or
/// [`PooledConnection::discard`] to close it. Dropping it without either
/// closes the transport and frees the borrow slot.
pub struct PooledConnection {
    session: Box<dyn DirectorySession>,
    shared: Arc<PoolShared>,
    _permit: OwnedSemaphorePermit,
}

impl PooledConnection {
    /// Returns the session.
    pub fn session(&mut self) -> &mut dyn DirectorySession {
        self.session.as_mut()
    }

    /// Returns the connection to the pool.
    pub fn release(self) {
        let Self {
            session,
            shared,
            _permit,
        } = self;
        shared.give_back(session);
    }

    /// Unbinds and drops the connection.
    pub async fn discard(mut self) {
        let _ = self.session.unbind().await;
    }
}
