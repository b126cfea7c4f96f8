//! Durability layer for Annals
//!
//! Everything that touches disk:
//!
//! - Revision log: one checksummed frame per committed transaction
//! - Durability modes: Always, Standard (default), Cache
//! - Torn-tail detection and truncation for crash recovery

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod format;
pub mod wal;

pub use format::{WalHeader, WAL_FILE_NAME};
pub use wal::{
    truncate_wal, DurabilityMode, ReadStopReason, WalCounters, WalReadResult, WalReader,
    WalWriter,
};
