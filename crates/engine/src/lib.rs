//! Database engine for Annals
//!
//! This crate orchestrates all lower layers:
//! - Database: open/close, configuration, the transaction API
//! - Recovery: replay of the revision log on open
//! - AuditReader: revision and entity-history queries
//!
//! The engine is the only component that knows about:
//! - The data directory layout (`annals.toml`, `LOCK`, `revisions.wal`)
//! - Cross-layer coordination (stores + revision log + recovery)

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod database;
pub mod reader;
pub mod recovery;

pub use database::config::CONFIG_FILE_NAME;
pub use database::{AnnalsConfig, Database, DatabaseBuilder, RetryConfig, LOCK_FILE_NAME};
pub use reader::{AuditReader, HistoryEntry};
pub use recovery::{RecoveryOutcome, RevisionLogRecovery};
