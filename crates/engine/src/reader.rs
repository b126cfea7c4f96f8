//! Audit queries over committed revisions
//!
//! The reader answers two families of questions:
//!
//! - Revision metadata: number ↔ date, custom revision entities, the
//!   entities a revision touched
//! - Entity history: at which revisions an entity changed, and what it
//!   looked like as of any revision
//!
//! Queries read the shared stores directly and never take the commit lock.
//! Snapshots are recorded before their revision is appended, so entity
//! queries first fix the latest visible revision and ignore anything newer.

use std::collections::BTreeMap;

use annals_concurrency::{AuditSettings, Stores};
use annals_core::{
    decode_entity, AnnalsError, AnnalsResult, ChangedEntity, Entity, EntityId, EntityKey, EntityName,
    Revision, RevisionEntity, RevisionNumber, RevisionType, Snapshot, Timestamp,
};

/// One entry of an entity's audit history
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry<E> {
    /// Revision that changed the entity
    pub revision: Revision,
    /// Kind of change
    pub revision_type: RevisionType,
    /// State recorded at that revision; `None` for deletions unless data is
    /// stored at delete
    pub entity: Option<E>,
}

/// Read-only view of the audit history
///
/// Cheap to clone; obtained from `Database::audit_reader()`.
#[derive(Debug, Clone)]
pub struct AuditReader {
    stores: Stores,
    settings: AuditSettings,
}

impl AuditReader {
    pub(crate) fn new(stores: Stores, settings: AuditSettings) -> Self {
        AuditReader { stores, settings }
    }

    // ========================================================================
    // Revision metadata
    // ========================================================================

    /// Highest revision whose timestamp is at or before `date`
    ///
    /// # Errors
    /// `RevisionDoesNotExist` if every revision is later than `date`, or
    /// there are none.
    pub fn revision_number_for_date(&self, date: Timestamp) -> AnnalsResult<RevisionNumber> {
        self.stores
            .revisions
            .number_at_or_before(date)
            .ok_or_else(|| AnnalsError::no_revision_at(date))
    }

    /// Commit timestamp of revision `number`
    ///
    /// # Errors
    /// `InvalidInput` for `0`, `RevisionDoesNotExist` if not committed.
    pub fn revision_date(&self, number: RevisionNumber) -> AnnalsResult<Timestamp> {
        check_revision(number)?;
        self.stores
            .revisions
            .timestamp_of(number)
            .ok_or_else(|| AnnalsError::revision_not_found(number))
    }

    /// Revision `number` mapped into `R`
    ///
    /// # Errors
    /// As [`revision_date`](Self::revision_date), plus whatever
    /// `R::from_revision` returns.
    pub fn find_revision<R: RevisionEntity>(&self, number: RevisionNumber) -> AnnalsResult<R> {
        check_revision(number)?;
        let revision = self
            .stores
            .revisions
            .get(number)
            .ok_or_else(|| AnnalsError::revision_not_found(number))?;
        R::from_revision(&revision)
    }

    /// Revisions that exist among `numbers`, keyed by number
    ///
    /// Missing numbers (including `0`) are left out.
    pub fn find_revisions<R, I>(&self, numbers: I) -> AnnalsResult<BTreeMap<RevisionNumber, R>>
    where
        R: RevisionEntity,
        I: IntoIterator<Item = RevisionNumber>,
    {
        let mut found = BTreeMap::new();
        for number in numbers {
            if let Some(revision) = self.stores.revisions.get(number) {
                found.insert(number, R::from_revision(&revision)?);
            }
        }
        Ok(found)
    }

    /// Highest committed revision, if any
    pub fn latest_revision(&self) -> Option<RevisionNumber> {
        let latest = self.stores.revisions.latest_number();
        (!latest.is_zero()).then_some(latest)
    }

    /// Entities changed in revision `number`
    ///
    /// # Errors
    /// - `InvalidState` if changed entities are not tracked
    /// - `InvalidInput` for `0`, `RevisionDoesNotExist` if not committed
    pub fn changed_entities(&self, number: RevisionNumber) -> AnnalsResult<Vec<ChangedEntity>> {
        if !self.settings.track_changed_entities {
            return Err(AnnalsError::invalid_state(
                "Changed entities are not tracked; enable track_changed_entities",
            ));
        }
        check_revision(number)?;
        match self.stores.revisions.changed_entities(number) {
            Some(Some(changed)) => Ok(changed),
            // Committed before tracking was switched on
            Some(None) => Ok(Vec::new()),
            None => Err(AnnalsError::revision_not_found(number)),
        }
    }

    // ========================================================================
    // Entity history
    // ========================================================================

    /// Whether changes to `E` create revisions
    pub fn is_entity_audited<E: Entity>(&self) -> bool {
        E::AUDITED
    }

    /// Ascending revisions at which entity `id` changed, deletions included
    ///
    /// Empty if the entity was never audited under this id.
    pub fn revisions<E: Entity>(&self, id: EntityId) -> AnnalsResult<Vec<RevisionNumber>> {
        ensure_audited::<E>()?;
        let visible = self.stores.revisions.latest_number();
        let mut numbers = self.stores.audit.revisions(&E::key(id));
        numbers.retain(|n| *n <= visible);
        Ok(numbers)
    }

    /// Entity `id` as of revision `number`
    ///
    /// Uses the latest snapshot at or before `number`. Returns `None` if the
    /// entity did not exist yet or had been deleted by then.
    ///
    /// # Errors
    /// `NotAudited` for non-audited types, `InvalidInput` for revision `0`.
    pub fn find<E: Entity>(&self, id: EntityId, number: RevisionNumber) -> AnnalsResult<Option<E>> {
        ensure_audited::<E>()?;
        check_revision(number)?;

        let Some(snapshot) = self.visible_snapshot(&E::key(id), number) else {
            return Ok(None);
        };
        if snapshot.is_deletion() {
            return Ok(None);
        }
        let fields = snapshot.fields.as_ref().ok_or_else(|| {
            AnnalsError::corruption(format!(
                "{} snapshot at {} has no state",
                snapshot.key, snapshot.revision
            ))
        })?;
        decode_entity(id, fields).map(Some)
    }

    /// Every recorded change of entity `id`, oldest first
    pub fn history<E: Entity>(&self, id: EntityId) -> AnnalsResult<Vec<HistoryEntry<E>>> {
        ensure_audited::<E>()?;
        let visible = self.stores.revisions.latest_number();
        self.stores
            .audit
            .history(&E::key(id))
            .into_iter()
            .filter(|snapshot| snapshot.revision <= visible)
            .map(|snapshot| {
                let revision = self.stores.revisions.get(snapshot.revision).ok_or_else(|| {
                    AnnalsError::internal(format!(
                        "snapshot of {} refers to missing {}",
                        snapshot.key, snapshot.revision
                    ))
                })?;
                let entity = snapshot
                    .fields
                    .as_ref()
                    .map(|fields| decode_entity(id, fields))
                    .transpose()?;
                Ok(HistoryEntry {
                    revision,
                    revision_type: snapshot.revision_type,
                    entity,
                })
            })
            .collect()
    }

    /// Raw snapshot of `entity#id` visible at revision `number`
    ///
    /// Unlike [`find`](Self::find), deletion markers are returned as-is.
    pub fn snapshot(
        &self,
        entity: impl Into<EntityName>,
        id: EntityId,
        number: RevisionNumber,
    ) -> AnnalsResult<Option<Snapshot>> {
        check_revision(number)?;
        Ok(self.visible_snapshot(&EntityKey::new(entity, id), number))
    }

    fn visible_snapshot(&self, key: &EntityKey, number: RevisionNumber) -> Option<Snapshot> {
        let visible = self.stores.revisions.latest_number().min(number);
        if visible.is_zero() {
            return None;
        }
        self.stores.audit.at_revision(key, visible)
    }
}

fn check_revision(number: RevisionNumber) -> AnnalsResult<()> {
    if number.is_zero() {
        return Err(AnnalsError::invalid_input("Revision numbers start at 1"));
    }
    Ok(())
}

fn ensure_audited<E: Entity>() -> AnnalsResult<()> {
    if E::AUDITED {
        Ok(())
    } else {
        Err(AnnalsError::NotAudited {
            entity: E::entity_name(),
        })
    }
}
