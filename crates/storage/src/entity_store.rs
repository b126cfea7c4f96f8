//! Current entity state
//!
//! The live rows that transactions read and write. Every key carries a
//! version counter that survives deletion; optimistic validation compares
//! the version a transaction observed with the version at commit.
//!
//! Identifier sequences are kept per entity type. A generated identifier is
//! never reused, even when the transaction that drew it rolls back.

use annals_core::{EntityChange, EntityId, EntityKey, EntityName, Fields, RevisionType};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::trace;

/// Stored row plus its version
#[derive(Debug, Clone, Default)]
struct Slot {
    fields: Option<Fields>,
    version: u64,
}

/// Thread-safe map of live entities
#[derive(Debug, Default)]
pub struct EntityStore {
    rows: DashMap<EntityKey, Slot>,
    sequences: DashMap<EntityName, AtomicU64>,
}

impl EntityStore {
    /// Empty store
    pub fn new() -> Self {
        Self {
            rows: DashMap::new(),
            sequences: DashMap::new(),
        }
    }

    /// Live columns of an entity
    pub fn get(&self, key: &EntityKey) -> Option<Fields> {
        self.rows.get(key).and_then(|slot| slot.fields.clone())
    }

    /// Live columns together with the version they were read at
    ///
    /// Version `0` means the key was never written.
    pub fn read(&self, key: &EntityKey) -> (Option<Fields>, u64) {
        match self.rows.get(key) {
            Some(slot) => (slot.fields.clone(), slot.version),
            None => (None, 0),
        }
    }

    /// Current version of a key, `0` if never written
    pub fn version(&self, key: &EntityKey) -> u64 {
        self.rows.get(key).map_or(0, |slot| slot.version)
    }

    /// True if the entity is live
    pub fn contains(&self, key: &EntityKey) -> bool {
        self.rows
            .get(key)
            .map_or(false, |slot| slot.fields.is_some())
    }

    /// Apply a committed change and return the key's new version
    pub fn apply(&self, change: &EntityChange) -> u64 {
        let mut slot = self.rows.entry(change.key.clone()).or_default();
        slot.fields = match change.revision_type {
            RevisionType::Add | RevisionType::Mod => change.fields.clone(),
            RevisionType::Del => None,
        };
        slot.version += 1;
        trace!(
            target: "annals::storage",
            key = %change.key,
            version = slot.version,
            "Applied change"
        );
        slot.version
    }

    /// Draw the next identifier for an entity type
    pub fn next_id(&self, entity: &EntityName) -> EntityId {
        let sequence = self
            .sequences
            .entry(entity.clone())
            .or_insert_with(|| AtomicU64::new(0));
        EntityId::new(sequence.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Advance the type's sequence past an identifier seen elsewhere
    ///
    /// Used for caller-assigned identifiers and during recovery.
    pub fn observe_id(&self, key: &EntityKey) {
        let sequence = self
            .sequences
            .entry(key.entity.clone())
            .or_insert_with(|| AtomicU64::new(0));
        sequence.fetch_max(key.id.as_u64(), Ordering::SeqCst);
    }

    /// Number of live entities of a type
    pub fn live_count(&self, entity: &EntityName) -> usize {
        self.rows
            .iter()
            .filter(|r| &r.key().entity == entity && r.value().fields.is_some())
            .count()
    }

    /// Live identifiers of a type, ascending
    pub fn live_ids(&self, entity: &EntityName) -> Vec<EntityId> {
        let mut ids: Vec<EntityId> = self
            .rows
            .iter()
            .filter(|r| &r.key().entity == entity && r.value().fields.is_some())
            .map(|r| r.key().id)
            .collect();
        ids.sort_unstable();
        ids
    }
}
