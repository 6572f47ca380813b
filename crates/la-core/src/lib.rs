//! # la-core
//!
//! Core types shared by every crate of the LDAP administration layer:
//! the workspace error taxonomy and the application configuration.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;

pub use config::{AuditConfig, Config, CryptoConfig};
pub use error::{Error, Result};
