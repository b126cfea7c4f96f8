//! Storage layer for Annals
//!
//! Three in-memory structures, each safe for concurrent readers:
//! - `EntityStore`: live entity rows with per-key versions and id sequences
//! - `AuditStore`: per-entity snapshot chains, sharded by entity type
//! - `RevisionLog`: the revision table, ordered by number and timestamp
//!
//! Writers are serialized by the transaction manager; these types only
//! check the ordering invariants they depend on.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod audit_store;
pub mod entity_store;
pub mod revision_log;

pub use audit_store::{AuditChain, AuditShard, AuditStore};
pub use entity_store::EntityStore;
pub use revision_log::RevisionLog;
