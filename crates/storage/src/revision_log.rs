//! Revision table
//!
//! Holds every committed revision in commit order and answers the two
//! inverse lookups of the audit contract:
//!
//! - number → timestamp
//! - timestamp → greatest number whose timestamp is at or before it
//!
//! # Invariants
//!
//! Revisions are appended with numbers `1, 2, 3, ...` and strictly
//! increasing timestamps. Both lookups are therefore binary searches over a
//! single ordered vector; no secondary index is needed.

use annals_core::{AnnalsError, AnnalsResult, ChangedEntity, Revision, RevisionNumber, Timestamp};
use parking_lot::RwLock;

#[derive(Debug, Clone)]
struct RevisionEntry {
    revision: Revision,
    /// `None` when changed-entity tracking was disabled for this revision
    changed: Option<Vec<ChangedEntity>>,
}

/// Thread-safe, append-only revision table
#[derive(Debug, Default)]
pub struct RevisionLog {
    entries: RwLock<Vec<RevisionEntry>>,
}

impl RevisionLog {
    /// Empty log
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
        }
    }

    /// Append the next revision
    ///
    /// Rejects a number other than `latest + 1` and a timestamp not strictly
    /// after the latest one.
    pub fn append(
        &self,
        revision: Revision,
        changed: Option<Vec<ChangedEntity>>,
    ) -> AnnalsResult<()> {
        let mut entries = self.entries.write();
        let expected = RevisionNumber::new(entries.len() as u64 + 1);
        if revision.number != expected {
            return Err(AnnalsError::internal(format!(
                "revision {} appended out of order, expected {}",
                revision.number, expected
            )));
        }
        if let Some(last) = entries.last() {
            if revision.timestamp <= last.revision.timestamp {
                return Err(AnnalsError::internal(format!(
                    "revision {} timestamp {} is not after {}",
                    revision.number, revision.timestamp, last.revision.timestamp
                )));
            }
        }
        entries.push(RevisionEntry { revision, changed });
        Ok(())
    }

    /// Revision by number
    pub fn get(&self, number: RevisionNumber) -> Option<Revision> {
        let entries = self.entries.read();
        Self::index_of(number)
            .and_then(|i| entries.get(i))
            .map(|e| e.revision.clone())
    }

    /// Commit timestamp of a revision
    pub fn timestamp_of(&self, number: RevisionNumber) -> Option<Timestamp> {
        let entries = self.entries.read();
        Self::index_of(number)
            .and_then(|i| entries.get(i))
            .map(|e| e.revision.timestamp)
    }

    /// Greatest revision whose timestamp is at or before `timestamp`
    pub fn number_at_or_before(&self, timestamp: Timestamp) -> Option<RevisionNumber> {
        let entries = self.entries.read();
        let count = entries.partition_point(|e| e.revision.timestamp <= timestamp);
        count
            .checked_sub(1)
            .map(|i| entries[i].revision.number)
    }

    /// Entities changed in a revision
    ///
    /// Outer `None`: no such revision. Inner `None`: tracking was disabled.
    pub fn changed_entities(&self, number: RevisionNumber) -> Option<Option<Vec<ChangedEntity>>> {
        let entries = self.entries.read();
        Self::index_of(number)
            .and_then(|i| entries.get(i))
            .map(|e| e.changed.clone())
    }

    /// Latest revision
    pub fn latest(&self) -> Option<Revision> {
        self.entries.read().last().map(|e| e.revision.clone())
    }

    /// Number of the latest revision, `ZERO` when empty
    pub fn latest_number(&self) -> RevisionNumber {
        RevisionNumber::new(self.entries.read().len() as u64)
    }

    /// Number of revisions
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// True before the first revision
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    fn index_of(number: RevisionNumber) -> Option<usize> {
        number
            .as_u64()
            .checked_sub(1)
            .and_then(|i| usize::try_from(i).ok())
    }
}
