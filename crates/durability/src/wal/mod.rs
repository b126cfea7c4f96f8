//! Revision log (write-ahead log)
//!
//! - `mode`: durability modes (Cache, Always, Standard)
//! - `writer`: appends committed transactions
//! - `reader`: reads them back for recovery

pub mod mode;
pub mod reader;
pub mod writer;

pub use mode::DurabilityMode;
pub use reader::{truncate_wal, ReadStopReason, WalReadResult, WalReader};
pub use writer::{WalCounters, WalWriter};
