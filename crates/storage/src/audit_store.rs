//! Audit snapshot storage
//!
//! Keeps, for every audited entity, the chain of snapshots written at each
//! revision that modified it.
//!
//! # Design
//!
//! - DashMap keyed by entity type: each type is its own shard, so queries
//!   on one type never contend with commits to another
//! - FxHashMap inside a shard: O(1) lookup of an entity's chain
//! - `AuditChain`: snapshots ordered oldest-first; revision numbers are
//!   appended in increasing order, so lookups are binary searches

use annals_core::{
    AnnalsError, AnnalsResult, EntityId, EntityKey, EntityName, RevisionNumber, Snapshot,
};
use dashmap::DashMap;
use rustc_hash::FxHashMap;

/// Snapshot history of one entity
///
/// Snapshots are stored in ascending revision order. Each revision appears
/// at most once.
#[derive(Debug, Clone, Default)]
pub struct AuditChain {
    snapshots: Vec<Snapshot>,
}

impl AuditChain {
    /// Empty chain
    pub fn new() -> Self {
        Self {
            snapshots: Vec::new(),
        }
    }

    /// Append a snapshot; its revision must be newer than every stored one
    pub fn push(&mut self, snapshot: Snapshot) -> AnnalsResult<()> {
        if let Some(last) = self.snapshots.last() {
            if snapshot.revision <= last.revision {
                return Err(AnnalsError::internal(format!(
                    "snapshot for {} at {} is not newer than {}",
                    snapshot.key, snapshot.revision, last.revision
                )));
            }
        }
        self.snapshots.push(snapshot);
        Ok(())
    }

    /// Snapshot written by the latest revision at or before `revision`
    pub fn at_revision(&self, revision: RevisionNumber) -> Option<&Snapshot> {
        let idx = self.snapshots.partition_point(|s| s.revision <= revision);
        idx.checked_sub(1).map(|i| &self.snapshots[i])
    }

    /// Snapshot written exactly at `revision`
    pub fn exact(&self, revision: RevisionNumber) -> Option<&Snapshot> {
        self.snapshots
            .binary_search_by_key(&revision, |s| s.revision)
            .ok()
            .map(|i| &self.snapshots[i])
    }

    /// Latest snapshot
    pub fn latest(&self) -> Option<&Snapshot> {
        self.snapshots.last()
    }

    /// Revisions that modified the entity, ascending
    pub fn revisions(&self) -> Vec<RevisionNumber> {
        self.snapshots.iter().map(|s| s.revision).collect()
    }

    /// All snapshots, ascending
    pub fn snapshots(&self) -> &[Snapshot] {
        &self.snapshots
    }

    /// Number of snapshots
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    /// True when nothing was recorded
    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }
}

/// Per-entity-type shard
#[derive(Debug, Default)]
pub struct AuditShard {
    pub(crate) chains: FxHashMap<EntityId, AuditChain>,
}

/// Thread-safe snapshot store for all audited entities
#[derive(Debug, Default)]
pub struct AuditStore {
    shards: DashMap<EntityName, AuditShard>,
}

impl AuditStore {
    /// Empty store
    pub fn new() -> Self {
        Self {
            shards: DashMap::new(),
        }
    }

    /// Record a snapshot
    ///
    /// Callers append in commit order; an out-of-order snapshot is an
    /// internal error and leaves the chain untouched.
    pub fn record(&self, snapshot: Snapshot) -> AnnalsResult<()> {
        let mut shard = self.shards.entry(snapshot.key.entity.clone()).or_default();
        shard
            .chains
            .entry(snapshot.key.id)
            .or_default()
            .push(snapshot)
    }

    /// Snapshot visible at `revision` (latest at or before it)
    pub fn at_revision(&self, key: &EntityKey, revision: RevisionNumber) -> Option<Snapshot> {
        let shard = self.shards.get(&key.entity)?;
        shard.chains.get(&key.id)?.at_revision(revision).cloned()
    }

    /// Snapshot written exactly at `revision`
    pub fn exact(&self, key: &EntityKey, revision: RevisionNumber) -> Option<Snapshot> {
        let shard = self.shards.get(&key.entity)?;
        shard.chains.get(&key.id)?.exact(revision).cloned()
    }

    /// Revisions at which the entity changed, ascending; empty if never audited
    pub fn revisions(&self, key: &EntityKey) -> Vec<RevisionNumber> {
        self.shards
            .get(&key.entity)
            .and_then(|shard| shard.chains.get(&key.id).map(AuditChain::revisions))
            .unwrap_or_default()
    }

    /// Full snapshot history of the entity, ascending
    pub fn history(&self, key: &EntityKey) -> Vec<Snapshot> {
        self.shards
            .get(&key.entity)
            .and_then(|shard| shard.chains.get(&key.id).map(|c| c.snapshots().to_vec()))
            .unwrap_or_default()
    }

    /// Number of entities with at least one snapshot
    pub fn entity_count(&self) -> usize {
        self.shards.iter().map(|s| s.chains.len()).sum()
    }

    /// Total snapshots stored
    pub fn snapshot_count(&self) -> usize {
        self.shards
            .iter()
            .map(|s| s.chains.values().map(AuditChain::len).sum::<usize>())
            .sum()
    }
}
