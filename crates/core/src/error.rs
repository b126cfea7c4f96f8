//! Error types
//!
//! All fallible operations return [`AnnalsResult`]. `thiserror` derives the
//! `Display` and `Error` implementations.

use crate::contract::{RevisionNumber, Timestamp};
use crate::types::{EntityKey, EntityName};
use std::fmt;
use std::io;
use thiserror::Error;

/// Result alias used across the workspace
pub type AnnalsResult<T> = std::result::Result<T, AnnalsError>;

/// What a failed revision lookup was searching for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevisionLookup {
    /// Lookup by revision number
    Number(RevisionNumber),
    /// Lookup of the latest revision at or before a timestamp
    Date(Timestamp),
}

impl fmt::Display for RevisionLookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RevisionLookup::Number(n) => write!(f, "no revision numbered {}", n.as_u64()),
            RevisionLookup::Date(t) => write!(f, "no revision at or before {}", t),
        }
    }
}

/// Error type for every layer
#[derive(Debug, Error)]
pub enum AnnalsError {
    /// A revision number or date could not be resolved to a revision
    #[error("Revision does not exist: {0}")]
    RevisionDoesNotExist(RevisionLookup),

    /// Entity is not live
    #[error("Entity not found: {key}")]
    EntityNotFound {
        /// Missing entity
        key: EntityKey,
    },

    /// Entity is already live
    #[error("Entity already exists: {key}")]
    EntityExists {
        /// Existing entity
        key: EntityKey,
    },

    /// Audit query against an entity type that is not audited
    #[error("Entity type '{entity}' is not audited")]
    NotAudited {
        /// Entity type
        entity: EntityName,
    },

    /// Entity changed between read and commit
    #[error("Conflict on {key}: read version {expected:?}, committed version {actual:?}")]
    Conflict {
        /// Contended entity
        key: EntityKey,
        /// Version observed by the transaction
        expected: Option<u64>,
        /// Version found at commit
        actual: Option<u64>,
    },

    /// Caller passed an argument that can never succeed
    #[error("Invalid input: {message}")]
    InvalidInput {
        /// Details
        message: String,
    },

    /// Operation not allowed in the current state
    #[error("Invalid state: {message}")]
    InvalidState {
        /// Details
        message: String,
    },

    /// Persistent data failed validation
    #[error("Data corruption: {message}")]
    Corruption {
        /// Details
        message: String,
    },

    /// Encoding or decoding failed
    #[error("Serialization error: {message}")]
    Serialization {
        /// Details
        message: String,
    },

    /// I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Broken internal invariant
    #[error("Internal error: {message}")]
    Internal {
        /// Details
        message: String,
    },

    /// Database no longer accepts transactions
    #[error("Database is shutting down")]
    Shutdown,
}

impl AnnalsError {
    /// Revision lookup by number failed
    pub fn revision_not_found(number: RevisionNumber) -> Self {
        AnnalsError::RevisionDoesNotExist(RevisionLookup::Number(number))
    }

    /// Revision lookup by date failed
    pub fn no_revision_at(date: Timestamp) -> Self {
        AnnalsError::RevisionDoesNotExist(RevisionLookup::Date(date))
    }

    /// Invalid argument
    pub fn invalid_input(message: impl Into<String>) -> Self {
        AnnalsError::InvalidInput {
            message: message.into(),
        }
    }

    /// Invalid state
    pub fn invalid_state(message: impl Into<String>) -> Self {
        AnnalsError::InvalidState {
            message: message.into(),
        }
    }

    /// Corrupted persistent data
    pub fn corruption(message: impl Into<String>) -> Self {
        AnnalsError::Corruption {
            message: message.into(),
        }
    }

    /// Serialization failure
    pub fn serialization(message: impl Into<String>) -> Self {
        AnnalsError::Serialization {
            message: message.into(),
        }
    }

    /// Internal invariant violation
    pub fn internal(message: impl Into<String>) -> Self {
        AnnalsError::Internal {
            message: message.into(),
        }
    }

    /// True for optimistic-concurrency conflicts; these are safe to retry
    pub fn is_conflict(&self) -> bool {
        matches!(self, AnnalsError::Conflict { .. })
    }

    /// True for failed revision lookups
    pub fn is_revision_not_found(&self) -> bool {
        matches!(self, AnnalsError::RevisionDoesNotExist(_))
    }
}
