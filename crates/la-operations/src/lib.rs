//! # la-operations
//!
//! The single entry point for tenant administrators acting on their
//! directories. [`DirectoryOperationFacade`] authorizes each call with the
//! [`la_access::AccessControlEngine`], runs it on a pooled connection from
//! the [`la_directory::ConnectionPoolRegistry`], and hands an audit event
//! for every successful write to the [`la_audit::AuditDispatcher`].
//!
//! All methods take the acting [`la_model::Operator`] explicitly and return
//! [`la_core::Result`].
//!
//! ## Security
//!
//! - Directories of other tenants, and disabled directories, are reported
//!   as not found rather than forbidden.
//! - Branch restrictions are checked for every DN a write touches before
//!   any protocol request is sent.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod facade;
pub mod request;

pub use facade::DirectoryOperationFacade;
pub use request::{NewEntry, SearchQuery, SearchTarget, MATCH_ALL_FILTER};
