//! # la-model
//!
//! Plain domain records for the LDAP administration layer.
//!
//! Records reference each other by id only. Related rows are resolved by
//! explicit secondary loads through the repository contracts in
//! `la-storage`; nothing here reaches into storage.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod audit;
pub mod directory;
pub mod dn;
pub mod operator;
pub mod permission;
pub mod realm;

pub use audit::{
    AuditAction, AuditActor, AuditEvent, AuditEventBuilder, AuditOrigin, AuditSourceConfig,
    ChangelogPosition,
};
pub use directory::{AccountToggle, DirectoryConfig, TlsMode, ToggleEncoding, TrustPolicy};
pub use operator::{Operator, OperatorKind};
pub use permission::{
    AdminRealmRole, BaseRole, BranchRestriction, FeatureKey, FeatureOverride, UnknownFeature,
};
pub use realm::Realm;
