//! Traits at the mapping seams
//!
//! - [`Entity`]: maps a Rust type to a stored, optionally audited row
//! - [`RevisionEntity`]: maps a revision row to a Rust type
//! - [`RevisionListener`]: fills custom revision columns at commit

use crate::contract::{PendingRevision, Revision, RevisionNumber, Timestamp};
use crate::error::{AnnalsError, AnnalsResult};
use crate::types::{EntityId, EntityKey, EntityName};
use crate::value::Fields;

/// A persistent entity type
///
/// The identifier is kept outside [`Fields`]; `to_fields` must not include
/// it. `from_fields` receives the identifier and the stored columns.
///
/// # Example
///
/// ```
/// use annals_core::{AnnalsResult, Entity, EntityId, Fields};
///
/// #[derive(Debug, PartialEq)]
/// struct Note {
///     id: Option<EntityId>,
///     text: String,
/// }
///
/// impl Entity for Note {
///     const NAME: &'static str = "Note";
///
///     fn id(&self) -> Option<EntityId> {
///         self.id
///     }
///
///     fn set_id(&mut self, id: EntityId) {
///         self.id = Some(id);
///     }
///
///     fn to_fields(&self) -> Fields {
///         Fields::new().with("text", self.text.as_str())
///     }
///
///     fn from_fields(id: EntityId, fields: &Fields) -> AnnalsResult<Self> {
///         Ok(Note { id: Some(id), text: fields.str("text")?.to_string() })
///     }
/// }
/// ```
pub trait Entity: Sized {
    /// Entity type name; unique per database
    const NAME: &'static str;

    /// Whether changes to this type produce revisions
    const AUDITED: bool = true;

    /// Identifier, `None` before the first persist
    fn id(&self) -> Option<EntityId>;

    /// Called by `persist` when an identifier is generated
    fn set_id(&mut self, id: EntityId);

    /// Column values (without the identifier)
    fn to_fields(&self) -> Fields;

    /// Rebuild from stored columns
    fn from_fields(id: EntityId, fields: &Fields) -> AnnalsResult<Self>;

    /// Entity type name as an [`EntityName`]
    fn entity_name() -> EntityName {
        EntityName::from(Self::NAME)
    }

    /// Key for an identifier of this type
    fn key(id: EntityId) -> EntityKey {
        EntityKey::new(Self::NAME, id)
    }
}

/// A user-defined view of revision rows
///
/// Implementations choose which columns to expose, e.g. a revision number
/// stored under a custom column name or a timestamp kept in milliseconds.
pub trait RevisionEntity: Sized {
    /// Build from a committed revision
    fn from_revision(revision: &Revision) -> AnnalsResult<Self>;
}

/// Hook invoked once for every new revision, inside the commit
///
/// Listeners run while the commit lock is held; they must be fast and must
/// not start transactions on the same database.
pub trait RevisionListener: Send + Sync {
    /// Populate custom columns of the revision being created
    fn new_revision(&self, revision: &mut PendingRevision);
}

/// Revision entity exposing only the number and timestamp
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DefaultRevisionEntity {
    /// Revision number
    pub id: RevisionNumber,
    /// Commit timestamp
    pub timestamp: Timestamp,
}

impl RevisionEntity for DefaultRevisionEntity {
    fn from_revision(revision: &Revision) -> AnnalsResult<Self> {
        Ok(DefaultRevisionEntity {
            id: revision.number,
            timestamp: revision.timestamp,
        })
    }
}

impl RevisionEntity for Revision {
    fn from_revision(revision: &Revision) -> AnnalsResult<Self> {
        Ok(revision.clone())
    }
}

/// Rebuild an entity from a stored row, naming the key on failure
pub fn decode_entity<E: Entity>(id: EntityId, fields: &Fields) -> AnnalsResult<E> {
    E::from_fields(id, fields).map_err(|e| match e {
        AnnalsError::InvalidInput { message } => AnnalsError::corruption(format!(
            "cannot decode {}: {}",
            E::key(id),
            message
        )),
        other => other,
    })
}
