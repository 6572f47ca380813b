//! Bounded background audit queue.
//!
//! [`AuditDispatcher::submit`] never waits: when the queue is full the event
//! is dropped and logged. Workers share one receiver and record events in
//! arrival order; recording failures are logged and swallowed.

use std::sync::Arc;

use la_model::AuditEvent;
use parking_lot::Mutex;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;

use crate::recorder::AuditRecorder;

/// Hands audit events to background workers.
pub struct AuditDispatcher {
    sender: Mutex<Option<mpsc::Sender<AuditEvent>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl AuditDispatcher {
    /// Starts `workers` background tasks draining a queue of `capacity`
    /// events. Must be called inside a tokio runtime.
    #[must_use]
    pub fn start(recorder: Arc<dyn AuditRecorder>, capacity: usize, workers: usize) -> Self {
        let (sender, receiver) = mpsc::channel::<AuditEvent>(capacity.max(1));
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));

        let handles = (0..workers.max(1))
            .map(|worker| {
                let receiver = Arc::clone(&receiver);
                let recorder = Arc::clone(&recorder);
                tokio::spawn(async move {
                    loop {
                        let next = receiver.lock().await.recv().await;
                        let Some(event) = next else {
                            break;
                        };
                        let id = event.id;
                        if let Err(e) = recorder.record(event).await {
                            tracing::error!(worker, event = %id, error = %e, "failed to record audit event");
                        }
                    }
                    tracing::debug!(worker, "audit worker stopped");
                })
            })
            .collect();

        tracing::info!(capacity, workers, "audit dispatcher started");
        Self {
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(handles),
        }
    }

    /// Queues an event without waiting. Returns false if the event was
    /// dropped.
    pub fn submit(&self, event: AuditEvent) -> bool {
        let sender = self.sender.lock();
        let Some(sender) = sender.as_ref() else {
            tracing::warn!(action = event.action.as_str(), "audit dispatcher closed, event dropped");
            return false;
        };

        match sender.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(event)) => {
                tracing::warn!(
                    event = %event.id,
                    action = event.action.as_str(),
                    target = event.target_dn.as_deref().unwrap_or(""),
                    "audit queue full, event dropped"
                );
                false
            }
            Err(TrySendError::Closed(event)) => {
                tracing::warn!(event = %event.id, "audit workers gone, event dropped");
                false
            }
        }
    }

    /// Stops accepting events and waits until every queued event has been
    /// handled.
    pub async fn shutdown(&self) {
        drop(self.sender.lock().take());
        let handles = std::mem::take(&mut *self.workers.lock());
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "audit worker panicked");
            }
        }
        tracing::info!("audit dispatcher drained");
    }
}
