//! Entity addressing
//!
//! Every stored entity is addressed by an [`EntityKey`]: the entity type
//! name plus a numeric identifier unique within that type.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Entity type name, e.g. `"StrTestEntity"`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityName(String);

impl EntityName {
    /// Wrap a type name
    pub fn new(name: impl Into<String>) -> Self {
        EntityName(name.into())
    }

    /// Name as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityName {
    fn from(name: &str) -> Self {
        EntityName(name.to_string())
    }
}

impl From<String> for EntityName {
    fn from(name: String) -> Self {
        EntityName(name)
    }
}

/// Entity identifier, unique per entity type
///
/// Generated identifiers start at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityId(u64);

impl EntityId {
    /// Wrap a raw identifier
    #[inline]
    pub const fn new(value: u64) -> Self {
        EntityId(value)
    }

    /// Raw value
    #[inline]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for EntityId {
    fn from(value: u64) -> Self {
        EntityId(value)
    }
}

/// Full address of one entity
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityKey {
    /// Entity type
    pub entity: EntityName,
    /// Identifier within the type
    pub id: EntityId,
}

impl EntityKey {
    /// Build a key
    pub fn new(entity: impl Into<EntityName>, id: impl Into<EntityId>) -> Self {
        EntityKey {
            entity: entity.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.entity, self.id)
    }
}
