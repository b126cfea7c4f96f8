//! Contract types shared by every layer
//!
//! - `timestamp`: commit timestamps
//! - `revision`: revision numbers, revision metadata, revision types
//! - `snapshot`: entity changes and audit snapshots
//! - `commit`: the durable record of a committed transaction
//!
//! ```
//! use annals_core::contract::{Revision, RevisionNumber, Timestamp};
//!
//! let rev = Revision::new(RevisionNumber::FIRST, Timestamp::from_millis(10));
//! assert_eq!(rev.number.as_u64(), 1);
//! ```

pub mod commit;
pub mod revision;
pub mod snapshot;
pub mod timestamp;

pub use commit::CommitRecord;
pub use revision::{PendingRevision, Revision, RevisionNumber, RevisionType};
pub use snapshot::{ChangedEntity, EntityChange, Snapshot};
pub use timestamp::Timestamp;
