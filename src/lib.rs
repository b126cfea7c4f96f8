//! Annals - embedded transactional entity store with revision auditing
//!
//! Every committed transaction that changes audited entities produces one
//! immutable revision (number, commit timestamp, custom columns) and one
//! snapshot per changed entity. The [`AuditReader`] answers revision and
//! timestamp queries and rebuilds entities as of any revision.
//!
//! # Quick Start
//!
//! ```
//! use annals::{AnnalsResult, Database, Entity, EntityId, Fields, RevisionNumber};
//!
//! #[derive(Debug, PartialEq)]
//! struct Note {
//!     id: Option<EntityId>,
//!     text: String,
//! }
//!
//! impl Entity for Note {
//!     const NAME: &'static str = "Note";
//!
//!     fn id(&self) -> Option<EntityId> {
//!         self.id
//!     }
//!
//!     fn set_id(&mut self, id: EntityId) {
//!         self.id = Some(id);
//!     }
//!
//!     fn to_fields(&self) -> Fields {
//!         Fields::new().with("text", self.text.as_str())
//!     }
//!
//!     fn from_fields(id: EntityId, fields: &Fields) -> AnnalsResult<Self> {
//!         Ok(Note { id: Some(id), text: fields.str("text")?.to_string() })
//!     }
//! }
//!
//! # fn main() -> AnnalsResult<()> {
//! let db = Database::ephemeral()?;
//! let id = db.transaction(|txn| {
//!     txn.persist(&mut Note { id: None, text: "draft".into() })
//! })?;
//! db.transaction(|txn| txn.update(&Note { id: Some(id), text: "final".into() }))?;
//!
//! let reader = db.audit_reader();
//! assert_eq!(reader.revisions::<Note>(id)?.len(), 2);
//! let first = reader.find::<Note>(id, RevisionNumber::new(1))?.unwrap();
//! assert_eq!(first.text, "draft");
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! The workspace is layered; this crate only re-exports:
//!
//! - `annals-core`: contract types, mapping traits, errors
//! - `annals-storage`: entity, snapshot and revision stores
//! - `annals-durability`: the revision log on disk
//! - `annals-concurrency`: transactions and the commit protocol
//! - `annals-engine`: `Database`, recovery, `AuditReader`

pub use annals_concurrency::{Clock, CommitInfo, ManualClock, SystemClock, TransactionContext};
pub use annals_core::{
    AnnalsError, AnnalsResult, ChangedEntity, DefaultRevisionEntity, Entity, EntityId, EntityKey,
    EntityName, Fields, PendingRevision, Revision, RevisionEntity, RevisionListener,
    RevisionLookup, RevisionNumber, RevisionType, Snapshot, Timestamp, Value,
};
pub use annals_durability::DurabilityMode;
pub use annals_engine::{
    AnnalsConfig, AuditReader, Database, DatabaseBuilder, HistoryEntry, RetryConfig,
};
