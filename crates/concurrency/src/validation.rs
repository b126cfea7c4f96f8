//! Transaction validation for OCC
//!
//! First committer wins, judged on the read set: every entity a
//! transaction looked at must still carry the version it observed. Writes
//! in this crate always read the key first, so there are no blind writes.

use annals_core::{AnnalsError, EntityKey};
use annals_storage::EntityStore;
use std::collections::HashMap;

/// A key whose version moved after the transaction read it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadConflict {
    /// Entity that changed
    pub key: EntityKey,
    /// Version observed by the transaction (`0` = never written)
    pub read_version: u64,
    /// Version at validation time
    pub current_version: u64,
}

/// Result of transaction validation
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    /// All conflicts detected, in key order
    pub conflicts: Vec<ReadConflict>,
}

impl ValidationResult {
    /// No conflicts
    pub fn ok() -> Self {
        ValidationResult {
            conflicts: Vec::new(),
        }
    }

    /// True when the transaction may commit
    pub fn is_valid(&self) -> bool {
        self.conflicts.is_empty()
    }

    /// Number of conflicts
    pub fn conflict_count(&self) -> usize {
        self.conflicts.len()
    }

    /// Error for the first conflict, if any
    pub fn into_error(self) -> Option<AnnalsError> {
        self.conflicts
            .into_iter()
            .next()
            .map(|c| AnnalsError::Conflict {
                key: c.key,
                expected: Some(c.read_version),
                actual: Some(c.current_version),
            })
    }
}

/// Compare every read version against the store
pub fn validate_read_set(read_set: &HashMap<EntityKey, u64>, store: &EntityStore) -> ValidationResult {
    let mut conflicts: Vec<ReadConflict> = read_set
        .iter()
        .filter_map(|(key, read_version)| {
            let current_version = store.version(key);
            (current_version != *read_version).then(|| ReadConflict {
                key: key.clone(),
                read_version: *read_version,
                current_version,
            })
        })
        .collect();
    conflicts.sort_by(|a, b| a.key.cmp(&b.key));
    ValidationResult { conflicts }
}
