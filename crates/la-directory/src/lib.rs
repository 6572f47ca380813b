//! # la-directory
//!
//! Directory access for the LDAP administration layer, built on `ldap3`.
//!
//! - [`registry::ConnectionPoolRegistry`] keeps exactly one bounded pool per
//!   directory config and builds it single-flight on first use.
//! - [`search::PagedSearchExecutor`] drives the RFC 2696 paged-results loop.
//! - [`ops::DirectoryProtocolOps`] wraps add/modify/delete/modify-DN with
//!   result-code checking.
//!
//! Everything above the wire talks to the [`session::DirectorySession`]
//! seam; [`ldap::Ldap3Connector`] is the production implementation.
//!
//! ## Security
//!
//! Bind credentials are decrypted only while a pool is being built and are
//! never logged. TLS trust is decided per directory: trust-all, a pinned
//! PEM certificate, or the system trust store.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod ldap;
pub mod ops;
pub mod pool;
pub mod registry;
pub mod search;
pub mod session;
pub mod settings;
pub mod tls;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use error::{DirectoryError, DirectoryResult};
pub use ldap::Ldap3Connector;
pub use ops::DirectoryProtocolOps;
pub use pool::{connect_bound, ConnectionPool, PooledConnection};
pub use registry::ConnectionPoolRegistry;
pub use search::{find_entry, DirectoryEntry, PagedSearchExecutor, DEFAULT_PAGE_SIZE};
pub use session::{
    result_code, AttributeChange, ChangeOp, DirectoryConnector, DirectorySession, PageControl,
    ProtocolOutcome, RawEntry, SearchPage, SearchRequest,
};
pub use settings::{ldap_escape, ConnectionSettings, Endpoint, SearchScope};
