//! # la-storage
//!
//! Storage abstraction layer for the LDAP administration layer.
//!
//! This crate defines the repository traits the rest of the workspace loads
//! records through. Persistence schema and ORM mapping are outside this
//! workspace; [`memory::InMemoryStore`] backs tests and the seeded server.
//!
//! ## Traits
//!
//! - [`DirectoryConfigRepository`] - Directory connection records
//! - [`RealmRepository`] - Realms
//! - [`PermissionRepository`] - Realm roles, branch restrictions, feature overrides
//! - [`AuditSourceRepository`] - Changelog sources
//! - [`AuditEventRepository`] - Append-only audit trail

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod audit;
pub mod directory;
pub mod error;
pub mod memory;
pub mod permission;
pub mod realm;

pub use audit::{AuditEventRepository, AuditSourceRepository};
pub use directory::DirectoryConfigRepository;
pub use error::{StorageError, StorageResult};
pub use memory::{InMemoryStore, Seed};
pub use permission::PermissionRepository;
pub use realm::RealmRepository;
