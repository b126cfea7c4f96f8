//! Entity changes and audit snapshots
//!
//! A transaction produces [`EntityChange`]s. When the transaction is
//! committed under a revision, each change to an audited entity becomes a
//! [`Snapshot`]: the entity's full state as of that revision.

use super::{RevisionNumber, RevisionType};
use crate::types::{EntityId, EntityKey, EntityName};
use crate::value::Fields;
use serde::{Deserialize, Serialize};

/// One merged change to one entity inside a transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityChange {
    /// Entity that changed
    pub key: EntityKey,
    /// Kind of change
    pub revision_type: RevisionType,
    /// Full state after the change; for deletions, the last state when
    /// data is stored at delete, otherwise `None`
    pub fields: Option<Fields>,
    /// Whether the entity type is audited
    pub audited: bool,
}

impl EntityChange {
    /// True for a deletion
    pub fn is_delete(&self) -> bool {
        self.revision_type == RevisionType::Del
    }
}

/// Entity state recorded at one revision
///
/// Deletion snapshots carry no fields unless the database stores data at
/// delete, in which case they hold the last state before removal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Entity this snapshot belongs to
    pub key: EntityKey,
    /// Revision that produced it
    pub revision: RevisionNumber,
    /// Kind of change at that revision
    pub revision_type: RevisionType,
    /// Entity state, if recorded
    pub fields: Option<Fields>,
}

impl Snapshot {
    /// Entity type
    pub fn entity(&self) -> &EntityName {
        &self.key.entity
    }

    /// Entity identifier
    pub fn id(&self) -> EntityId {
        self.key.id
    }

    /// True when the entity was removed at this revision
    pub fn is_deletion(&self) -> bool {
        self.revision_type == RevisionType::Del
    }
}

/// Entity touched by a revision, as tracked for changed-entity queries
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChangedEntity {
    /// Entity that changed
    pub key: EntityKey,
    /// Kind of change
    pub revision_type: RevisionType,
}
