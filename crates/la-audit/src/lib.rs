//! # la-audit
//!
//! Audit trail capture for the LDAP administration layer.
//!
//! - [`AuditRecorder`] persists events; [`RepositoryAuditRecorder`] writes
//!   them through an [`la_storage::AuditEventRepository`].
//! - [`AuditDispatcher`] hands internal-write events to background workers
//!   over a bounded queue so that recording never delays or fails the write
//!   that produced it.
//! - [`ChangelogAuditPoller`] reads the native change log of every enabled
//!   audit source and records each change exactly once.
//! - [`ChangelogScheduler`] runs the poller with a fixed delay.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod dispatcher;
pub mod error;
pub mod poller;
pub mod recorder;
pub mod scheduler;

pub use dispatcher::AuditDispatcher;
pub use error::{AuditError, AuditResult};
pub use poller::{ChangelogAuditPoller, PollSummary, SourceFailure, CHANGELOG_ATTRIBUTES};
pub use recorder::{AuditRecorder, RepositoryAuditRecorder};
pub use scheduler::{ChangelogScheduler, SchedulerHandle};
