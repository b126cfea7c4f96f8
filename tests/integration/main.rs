//! Integration Tests
//!
//! Cross-layer tests through the `annals` facade:
//! - Queries: revision/date lookups and entity reconstruction
//! - Lifecycle: reopen, recovery and multi-entity transactions

#[path = "../common/mod.rs"]
mod common;

mod lifecycle;
mod queries;
