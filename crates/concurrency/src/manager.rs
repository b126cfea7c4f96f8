//! Transaction manager for coordinating commit operations
//!
//! Commits are serialized by one lock. Inside it:
//!
//! ```text
//! 1. Active → Validating
//! 2. Validate read set (first committer wins)
//! 3. Merge changes; nothing to do → Committed, no revision
//! 4. Allocate timestamp = max(clock, last + 1µs)
//! 5. If any audited entity changed: allocate revision number, run listener
//! 6. Append CommitRecord to the revision log (DURABILITY POINT)
//! 7. Apply to entity store, audit store, revision table
//! 8. Validating → Committed
//! ```
//!
//! A failure before step 6 aborts the transaction and leaves no trace.
//! Step 7 is also what recovery runs for each replayed record, so a
//! committed transaction reaches the same in-memory state either way.
//! If step 7 fails the stores no longer match the log and the manager
//! refuses every later commit until the database is reopened.

use crate::clock::Clock;
use crate::transaction::{TransactionContext, TransactionStatus};
use crate::validation::validate_read_set;
use annals_core::{
    AnnalsError, AnnalsResult, ChangedEntity, CommitRecord, PendingRevision, RevisionListener,
    RevisionNumber, Snapshot, Timestamp,
};
use annals_durability::WalWriter;
use annals_storage::{AuditStore, EntityStore, RevisionLog};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error};

/// Outcome of a successful commit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitInfo {
    /// Revision created, `None` if no audited entity changed
    pub revision: Option<RevisionNumber>,
    /// Commit timestamp (the revision's timestamp when one was created)
    pub timestamp: Timestamp,
}

/// Auditing switches applied at commit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuditSettings {
    /// Keep the last state in deletion snapshots
    pub store_data_at_delete: bool,
    /// Record which entities each revision changed
    pub track_changed_entities: bool,
}

impl Default for AuditSettings {
    fn default() -> Self {
        AuditSettings {
            store_data_at_delete: false,
            track_changed_entities: true,
        }
    }
}

/// The in-memory stores a commit is applied to
#[derive(Debug, Clone, Default)]
pub struct Stores {
    /// Live entities
    pub entities: Arc<EntityStore>,
    /// Audit snapshots
    pub audit: Arc<AuditStore>,
    /// Revision table
    pub revisions: Arc<RevisionLog>,
}

impl Stores {
    /// Empty stores
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one committed record
    ///
    /// Snapshots are recorded before the revision is appended, so a reader
    /// that can see a revision can also see its snapshots.
    pub fn apply(&self, record: &CommitRecord, settings: AuditSettings) -> AnnalsResult<()> {
        for change in &record.changes {
            self.entities.observe_id(&change.key);
            self.entities.apply(change);
        }

        let Some(revision) = &record.revision else {
            return Ok(());
        };

        let mut changed = Vec::new();
        for change in record.changes.iter().filter(|c| c.audited) {
            self.audit.record(Snapshot {
                key: change.key.clone(),
                revision: revision.number,
                revision_type: change.revision_type,
                fields: change.fields.clone(),
            })?;
            changed.push(ChangedEntity {
                key: change.key.clone(),
                revision_type: change.revision_type,
            });
        }

        let changed = settings.track_changed_entities.then_some(changed);
        self.revisions.append(revision.clone(), changed)
    }
}

/// State guarded by the commit lock
#[derive(Debug)]
struct CommitState {
    wal: WalWriter,
    last_timestamp: Timestamp,
    /// Set when a logged commit could not be applied
    halted: Option<String>,
}

/// Starting point recovered from the revision log
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResumePoint {
    /// Highest transaction id replayed
    pub max_txn_id: u64,
    /// Timestamp of the last replayed commit
    pub last_timestamp: Timestamp,
}

/// Manages transaction lifecycle and atomic commits
pub struct TransactionManager {
    stores: Stores,
    settings: AuditSettings,
    clock: Arc<dyn Clock>,
    listener: Option<Arc<dyn RevisionListener>>,
    commit: Mutex<CommitState>,
    next_txn_id: AtomicU64,
}

impl std::fmt::Debug for TransactionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionManager")
            .field("settings", &self.settings)
            .field("clock", &self.clock)
            .field("has_listener", &self.listener.is_some())
            .field("next_txn_id", &self.next_txn_id.load(Ordering::Relaxed))
            .finish()
    }
}

impl TransactionManager {
    /// Manager committing into `stores` and `wal`
    ///
    /// `resume` carries the maxima replayed from the log; new transaction
    /// ids and timestamps start past them.
    pub fn new(
        stores: Stores,
        wal: WalWriter,
        settings: AuditSettings,
        clock: Arc<dyn Clock>,
        listener: Option<Arc<dyn RevisionListener>>,
        resume: ResumePoint,
    ) -> Self {
        TransactionManager {
            stores,
            settings,
            clock,
            listener,
            commit: Mutex::new(CommitState {
                wal,
                last_timestamp: resume.last_timestamp,
                halted: None,
            }),
            next_txn_id: AtomicU64::new(resume.max_txn_id + 1),
        }
    }

    /// Allocate next transaction ID
    pub fn next_txn_id(&self) -> u64 {
        self.next_txn_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Start a transaction
    pub fn begin(&self) -> TransactionContext {
        TransactionContext::new(self.next_txn_id(), Arc::clone(&self.stores.entities))
    }

    /// Stores this manager commits into
    pub fn stores(&self) -> &Stores {
        &self.stores
    }

    /// Auditing switches
    pub fn settings(&self) -> AuditSettings {
        self.settings
    }

    /// Commit a transaction atomically
    ///
    /// # Errors
    /// - `InvalidState` if the transaction is not active
    /// - `Conflict` if a row it read was committed by someone else since;
    ///   the transaction is aborted
    /// - I/O or serialization errors from the revision log; the transaction
    ///   is aborted and nothing is applied
    /// - `InvalidState` once an earlier logged commit failed to apply
    pub fn commit(&self, txn: &mut TransactionContext) -> AnnalsResult<CommitInfo> {
        let mut state = self.commit.lock();

        if let Some(reason) = &state.halted {
            txn.mark_aborted("Commits are halted")?;
            return Err(AnnalsError::invalid_state(format!(
                "Commits are halted until the database is reopened: {}",
                reason
            )));
        }

        txn.mark_validating()?;
        let validation = validate_read_set(txn.read_set(), &self.stores.entities);
        if let Some(conflict) = validation.into_error() {
            txn.mark_aborted(format!("Validation failed: {}", conflict))?;
            debug!(target: "annals::txn", txn_id = txn.txn_id, "Commit aborted on conflict");
            return Err(conflict);
        }

        let changes = txn.changes(self.settings.store_data_at_delete);
        if changes.is_empty() {
            txn.mark_committed()?;
            return Ok(CommitInfo {
                revision: None,
                timestamp: self.clock.now().max(state.last_timestamp),
            });
        }

        let timestamp = self.clock.now().max(state.last_timestamp.next());
        let revision = if changes.iter().any(|c| c.audited) {
            let number = self.stores.revisions.latest_number().next();
            let mut pending =
                PendingRevision::new(number, timestamp, txn.revision_fields().clone());
            if let Some(listener) = &self.listener {
                listener.new_revision(&mut pending);
            }
            Some(pending.into_revision())
        } else {
            None
        };

        let record = CommitRecord {
            txn_id: txn.txn_id,
            revision,
            changes,
        };

        if let Err(e) = state.wal.append(&record) {
            txn.mark_aborted(format!("Revision log write failed: {}", e))?;
            return Err(e);
        }

        // DURABILITY POINT: replayed on recovery even if the apply below fails
        if let Err(e) = self.stores.apply(&record, self.settings) {
            error!(
                target: "annals::txn",
                txn_id = txn.txn_id,
                error = %e,
                "Store application failed after revision log write; halting commits"
            );
            state.halted = Some(e.to_string());
        }
        state.last_timestamp = timestamp;
        txn.mark_committed()?;

        let number = record.revision.as_ref().map(|r| r.number);
        debug!(
            target: "annals::txn",
            txn_id = txn.txn_id,
            revision = ?number.map(|n| n.as_u64()),
            changes = record.changes.len(),
            "Committed"
        );
        Ok(CommitInfo {
            revision: number,
            timestamp,
        })
    }

    /// Explicitly abort a transaction
    pub fn abort(&self, txn: &mut TransactionContext, reason: impl Into<String>) -> AnnalsResult<()> {
        txn.mark_aborted(reason)
    }

    /// Commit, aborting the transaction if the commit fails for any reason
    pub fn commit_or_rollback(&self, txn: &mut TransactionContext) -> AnnalsResult<CommitInfo> {
        match self.commit(txn) {
            Ok(info) => Ok(info),
            Err(e) => {
                if txn.is_active() || txn.status == TransactionStatus::Validating {
                    let _ = txn.mark_aborted(format!("Commit failed: {}", e));
                }
                Err(e)
            }
        }
    }

    /// True once a logged commit failed to apply
    pub fn is_halted(&self) -> bool {
        self.commit.lock().halted.is_some()
    }

    /// fsync the revision log
    pub fn sync(&self) -> AnnalsResult<()> {
        self.commit.lock().wal.sync()
    }

    /// Timestamp of the latest commit that changed anything
    pub fn last_commit_timestamp(&self) -> Timestamp {
        self.commit.lock().last_timestamp
    }
}
