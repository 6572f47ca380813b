//! End-to-end scenarios for the LDAP administration layer.
//!
//! The scenarios live under `tests/` and run the fully wired
//! `la_server::Server` against an in-process scripted directory.
