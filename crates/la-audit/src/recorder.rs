//! Audit event persistence.

use std::sync::Arc;

use async_trait::async_trait;
use la_model::AuditEvent;
use la_storage::AuditEventRepository;

use crate::error::AuditResult;

/// Persists audit events.
#[async_trait]
pub trait AuditRecorder: Send + Sync {
    /// Records one event.
    async fn record(&self, event: AuditEvent) -> AuditResult<()>;
}

/// Records events through an [`AuditEventRepository`].
#[derive(Clone)]
pub struct RepositoryAuditRecorder {
    events: Arc<dyn AuditEventRepository>,
}

impl RepositoryAuditRecorder {
    /// Creates a recorder.
    #[must_use]
    pub fn new(events: Arc<dyn AuditEventRepository>) -> Self {
        Self { events }
    }
}

#[async_trait]
impl AuditRecorder for RepositoryAuditRecorder {
    async fn record(&self, event: AuditEvent) -> AuditResult<()> {
        self.events.append(&event).await?;
        tracing::debug!(
            event = %event.id,
            action = event.action.as_str(),
            target = event.target_dn.as_deref().unwrap_or(""),
            "audit event recorded"
        );
        Ok(())
    }
}
