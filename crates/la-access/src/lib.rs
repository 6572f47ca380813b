//! # la-access
//!
//! Authorization for tenant admins.
//!
//! [`AccessControlEngine`] answers four questions, each of which short
//! circuits to "allowed" for superadmins without reading permission
//! storage:
//!
//! 1. Does the admin hold a role in this realm?
//! 2. Does the admin hold a role in any realm of this directory?
//! 3. Does the entry DN lie inside one of the admin's branches?
//! 4. Is the feature enabled, by override or by base role?
//!
//! Branch access is checked separately from the others because the target
//! DN is only known once the protocol request is assembled.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod engine;
pub mod error;

pub use engine::{AccessControlEngine, AccessScope, Grant};
pub use error::{AccessError, AccessResult};
