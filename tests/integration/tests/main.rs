//! End-to-End Integration Tests
//!
//! These tests drive the fully wired server (facade, access control, pool
//! registry, audit dispatcher and changelog poller) against an in-process
//! scripted directory.

mod common;
mod access_scenarios;
mod changelog;
mod pooling;
