//! Core types and traits for Annals
//!
//! This crate defines the vocabulary shared by every layer:
//! - Contract types: `RevisionNumber`, `Timestamp`, `Revision`, `Snapshot`,
//!   `EntityChange`, `CommitRecord`
//! - Addressing: `EntityName`, `EntityId`, `EntityKey`
//! - Values: `Value`, `Fields`
//! - Mapping traits: `Entity`, `RevisionEntity`, `RevisionListener`
//! - Errors: `AnnalsError`, `AnnalsResult`

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod contract;
pub mod error;
pub mod traits;
pub mod types;
pub mod value;

pub use contract::{
    ChangedEntity, CommitRecord, EntityChange, PendingRevision, Revision, RevisionNumber,
    RevisionType, Snapshot, Timestamp,
};
pub use error::{AnnalsError, AnnalsResult, RevisionLookup};
pub use traits::{decode_entity, DefaultRevisionEntity, Entity, RevisionEntity, RevisionListener};
pub use types::{EntityId, EntityKey, EntityName};
pub use value::{Fields, Value};
