//! Transaction context for OCC
//!
//! A `TransactionContext` buffers entity changes and records the version of
//! every committed row it reads. Nothing is visible to other transactions
//! until the manager commits it.
//!
//! # Change merging
//!
//! Each key keeps two facts: whether it was live in committed state when
//! the transaction first touched it, and its state now. The merged change
//! follows from those alone:
//!
//! | live before | state now | change |
//! |-------------|-----------|--------|
//! | no          | present   | `Add`  |
//! | no          | removed   | none   |
//! | yes         | present   | `Mod`  |
//! | yes         | removed   | `Del`  |
//!
//! So persist then update is one `Add`, persist then remove leaves nothing,
//! update then remove is a `Del`, and remove then persist is a `Mod`.

use annals_core::{
    decode_entity, AnnalsError, AnnalsResult, Entity, EntityChange, EntityId, EntityKey, Fields,
    RevisionType, Value,
};
use annals_storage::EntityStore;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Transaction lifecycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionStatus {
    /// Accepting reads and writes
    Active,
    /// Being validated by the manager
    Validating,
    /// Committed
    Committed,
    /// Aborted; nothing was written
    Aborted {
        /// Human-readable reason
        reason: String,
    },
}

/// Buffered state of one touched key
#[derive(Debug, Clone)]
struct PendingWrite {
    audited: bool,
    live_before: bool,
    /// `None` once removed
    state: Option<Fields>,
    /// Last present state, kept for deletion snapshots
    last_state: Option<Fields>,
}

/// Counts of buffered changes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PendingOperations {
    /// Keys that will be created
    pub adds: usize,
    /// Keys that will be modified
    pub mods: usize,
    /// Keys that will be removed
    pub dels: usize,
}

impl PendingOperations {
    /// Total changes
    pub fn total(&self) -> usize {
        self.adds + self.mods + self.dels
    }

    /// True when commit would write nothing
    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

/// One unit of work against the entity store
pub struct TransactionContext {
    /// Unique transaction identifier
    pub txn_id: u64,
    /// Current status
    pub status: TransactionStatus,
    store: Arc<EntityStore>,
    /// Versions observed in committed state
    read_set: HashMap<EntityKey, u64>,
    writes: HashMap<EntityKey, PendingWrite>,
    /// Keys in the order they were first written
    write_order: Vec<EntityKey>,
    revision_fields: Fields,
    start_time: Instant,
}

impl std::fmt::Debug for TransactionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionContext")
            .field("txn_id", &self.txn_id)
            .field("status", &self.status)
            .field("reads", &self.read_set.len())
            .field("writes", &self.writes.len())
            .finish()
    }
}

impl TransactionContext {
    /// New active transaction reading from `store`
    pub fn new(txn_id: u64, store: Arc<EntityStore>) -> Self {
        TransactionContext {
            txn_id,
            status: TransactionStatus::Active,
            store,
            read_set: HashMap::new(),
            writes: HashMap::new(),
            write_order: Vec::new(),
            revision_fields: Fields::new(),
            start_time: Instant::now(),
        }
    }

    // === Entity operations ===

    /// Make a new entity persistent
    ///
    /// Draws an identifier from the type's sequence when the entity has
    /// none and writes it back with `set_id`. Drawn identifiers are not
    /// returned to the sequence on abort.
    ///
    /// # Errors
    /// `EntityExists` if the key is live.
    pub fn persist<E: Entity>(&mut self, entity: &mut E) -> AnnalsResult<EntityId> {
        self.ensure_active()?;
        let id = match entity.id() {
            Some(id) => {
                self.store.observe_id(&E::key(id));
                id
            }
            None => {
                let id = self.store.next_id(&E::entity_name());
                entity.set_id(id);
                id
            }
        };

        let key = E::key(id);
        if self.current(&key).is_some() {
            return Err(AnnalsError::EntityExists { key });
        }
        self.write(key, E::AUDITED, Some(entity.to_fields()));
        Ok(id)
    }

    /// Current state of an entity as this transaction sees it
    pub fn find<E: Entity>(&mut self, id: EntityId) -> AnnalsResult<Option<E>> {
        self.ensure_active()?;
        match self.current(&E::key(id)) {
            Some(fields) => decode_entity::<E>(id, &fields).map(Some),
            None => Ok(None),
        }
    }

    /// Overwrite a live entity
    ///
    /// # Errors
    /// `InvalidInput` if the entity has no identifier, `EntityNotFound` if
    /// it is not live.
    pub fn update<E: Entity>(&mut self, entity: &E) -> AnnalsResult<()> {
        self.ensure_active()?;
        let id = entity.id().ok_or_else(|| {
            AnnalsError::invalid_input(format!("cannot update {} without an id", E::NAME))
        })?;
        let key = E::key(id);
        if self.current(&key).is_none() {
            return Err(AnnalsError::EntityNotFound { key });
        }
        self.write(key, E::AUDITED, Some(entity.to_fields()));
        Ok(())
    }

    /// Remove a live entity
    ///
    /// # Errors
    /// `EntityNotFound` if it is not live.
    pub fn remove<E: Entity>(&mut self, id: EntityId) -> AnnalsResult<()> {
        self.ensure_active()?;
        let key = E::key(id);
        if self.current(&key).is_none() {
            return Err(AnnalsError::EntityNotFound { key });
        }
        self.write(key, E::AUDITED, None);
        Ok(())
    }

    /// Set a custom column on the revision this transaction will create
    ///
    /// Ignored when the transaction changes no audited entity.
    pub fn set_revision_field(&mut self, name: impl Into<String>, value: impl Into<Value>) -> AnnalsResult<()> {
        self.ensure_active()?;
        self.revision_fields.insert(name, value);
        Ok(())
    }

    /// Custom revision columns set so far
    pub fn revision_fields(&self) -> &Fields {
        &self.revision_fields
    }

    fn current(&mut self, key: &EntityKey) -> Option<Fields> {
        if let Some(pending) = self.writes.get(key) {
            return pending.state.clone();
        }
        let (fields, version) = self.store.read(key);
        self.read_set.entry(key.clone()).or_insert(version);
        fields
    }

    fn write(&mut self, key: EntityKey, audited: bool, state: Option<Fields>) {
        match self.writes.get_mut(&key) {
            Some(pending) => {
                if state.is_some() {
                    pending.last_state = state.clone();
                }
                pending.state = state;
            }
            None => {
                // First write: `current` already read the committed row
                let committed = self.store.get(&key);
                let live_before = committed.is_some();
                let last_state = state.clone().or(committed);
                self.writes.insert(
                    key.clone(),
                    PendingWrite {
                        audited,
                        live_before,
                        state,
                        last_state,
                    },
                );
                self.write_order.push(key);
            }
        }
    }

    // === Commit support ===

    /// Merged changes in first-write order
    ///
    /// Deletions carry the last present state when `store_data_at_delete`
    /// is set, otherwise no fields.
    pub fn changes(&self, store_data_at_delete: bool) -> Vec<EntityChange> {
        self.write_order
            .iter()
            .filter_map(|key| {
                let pending = self.writes.get(key)?;
                let (revision_type, fields) = match (pending.live_before, &pending.state) {
                    (false, Some(state)) => (RevisionType::Add, Some(state.clone())),
                    (false, None) => return None,
                    (true, Some(state)) => (RevisionType::Mod, Some(state.clone())),
                    (true, None) => (
                        RevisionType::Del,
                        if store_data_at_delete {
                            pending.last_state.clone()
                        } else {
                            None
                        },
                    ),
                };
                Some(EntityChange {
                    key: key.clone(),
                    revision_type,
                    fields,
                    audited: pending.audited,
                })
            })
            .collect()
    }

    /// Versions observed in committed state
    pub fn read_set(&self) -> &HashMap<EntityKey, u64> {
        &self.read_set
    }

    /// Counts of buffered changes after merging
    pub fn pending_operations(&self) -> PendingOperations {
        let mut ops = PendingOperations::default();
        for change in self.changes(false) {
            match change.revision_type {
                RevisionType::Add => ops.adds += 1,
                RevisionType::Mod => ops.mods += 1,
                RevisionType::Del => ops.dels += 1,
            }
        }
        ops
    }

    /// True when the transaction only read
    pub fn is_read_only(&self) -> bool {
        self.writes.is_empty()
    }

    // === State management ===

    /// Check if transaction is in Active state
    pub fn is_active(&self) -> bool {
        matches!(self.status, TransactionStatus::Active)
    }

    /// Check if transaction is committed
    pub fn is_committed(&self) -> bool {
        matches!(self.status, TransactionStatus::Committed)
    }

    /// Check if transaction is aborted
    pub fn is_aborted(&self) -> bool {
        matches!(self.status, TransactionStatus::Aborted { .. })
    }

    /// Abort reason, if aborted
    pub fn abort_reason(&self) -> Option<&str> {
        match &self.status {
            TransactionStatus::Aborted { reason } => Some(reason),
            _ => None,
        }
    }

    /// Time since the transaction began
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Fail unless Active
    pub fn ensure_active(&self) -> AnnalsResult<()> {
        if self.is_active() {
            Ok(())
        } else {
            Err(AnnalsError::invalid_state(format!(
                "Transaction {} is not active: {:?}",
                self.txn_id, self.status
            )))
        }
    }

    /// `Active` → `Validating`
    pub fn mark_validating(&mut self) -> AnnalsResult<()> {
        self.ensure_active()?;
        self.status = TransactionStatus::Validating;
        Ok(())
    }

    /// `Validating` → `Committed`
    pub fn mark_committed(&mut self) -> AnnalsResult<()> {
        match &self.status {
            TransactionStatus::Validating => {
                self.status = TransactionStatus::Committed;
                Ok(())
            }
            _ => Err(AnnalsError::invalid_state(format!(
                "Cannot commit transaction {} from state {:?}",
                self.txn_id, self.status
            ))),
        }
    }

    /// `Active`/`Validating` → `Aborted`; buffered changes are discarded
    pub fn mark_aborted(&mut self, reason: impl Into<String>) -> AnnalsResult<()> {
        match &self.status {
            TransactionStatus::Committed => Err(AnnalsError::invalid_state(format!(
                "Cannot abort committed transaction {}",
                self.txn_id
            ))),
            TransactionStatus::Aborted { .. } => Err(AnnalsError::invalid_state(format!(
                "Transaction {} already aborted",
                self.txn_id
            ))),
            _ => {
                self.status = TransactionStatus::Aborted {
                    reason: reason.into(),
                };
                self.writes.clear();
                self.write_order.clear();
                self.revision_fields = Fields::new();
                Ok(())
            }
        }
    }
}
