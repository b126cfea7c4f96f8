//! Concurrency layer for Annals
//!
//! Optimistic concurrency control over the entity store:
//! - `TransactionContext`: buffered, merged entity changes and read set
//! - Validation: first committer wins on the read set
//! - `TransactionManager`: serialized commit that assigns revision numbers
//!   and timestamps, writes the revision log, then applies to the stores
//! - `Clock`: pluggable commit time source

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod clock;
pub mod manager;
pub mod transaction;
pub mod validation;

pub use clock::{Clock, ManualClock, SystemClock};
pub use manager::{AuditSettings, CommitInfo, ResumePoint, Stores, TransactionManager};
pub use transaction::{PendingOperations, TransactionContext, TransactionStatus};
pub use validation::{validate_read_set, ReadConflict, ValidationResult};
