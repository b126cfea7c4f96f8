//! Shared fixtures for engine integration tests

#![allow(dead_code)]

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use annals_concurrency::TransactionContext;
use annals_core::{
    AnnalsResult, Entity, EntityId, Fields, PendingRevision, Revision, RevisionEntity,
    RevisionListener, RevisionNumber, Timestamp,
};
use annals_engine::Database;

/// Route engine logs to the test harness; safe to call from every test
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

// ============================================================================
// Entities
// ============================================================================

/// Audited entity with one string column
#[derive(Debug, Clone, PartialEq)]
pub struct StrTestEntity {
    pub id: Option<EntityId>,
    pub str: String,
}

impl StrTestEntity {
    pub fn new(s: &str) -> Self {
        StrTestEntity {
            id: None,
            str: s.to_string(),
        }
    }

    pub fn with_id(id: EntityId, s: &str) -> Self {
        StrTestEntity {
            id: Some(id),
            str: s.to_string(),
        }
    }
}

impl Entity for StrTestEntity {
    const NAME: &'static str = "StrTestEntity";

    fn id(&self) -> Option<EntityId> {
        self.id
    }

    fn set_id(&mut self, id: EntityId) {
        self.id = Some(id);
    }

    fn to_fields(&self) -> Fields {
        Fields::new().with("str", self.str.as_str())
    }

    fn from_fields(id: EntityId, fields: &Fields) -> AnnalsResult<Self> {
        Ok(StrTestEntity {
            id: Some(id),
            str: fields.str("str")?.to_string(),
        })
    }
}

/// Entity that is stored but never audited
#[derive(Debug, Clone, PartialEq)]
pub struct Counter {
    pub id: Option<EntityId>,
    pub value: i64,
}

impl Entity for Counter {
    const NAME: &'static str = "Counter";
    const AUDITED: bool = false;

    fn id(&self) -> Option<EntityId> {
        self.id
    }

    fn set_id(&mut self, id: EntityId) {
        self.id = Some(id);
    }

    fn to_fields(&self) -> Fields {
        Fields::new().with("value", self.value)
    }

    fn from_fields(id: EntityId, fields: &Fields) -> AnnalsResult<Self> {
        Ok(Counter {
            id: Some(id),
            value: fields.int("value")?,
        })
    }
}

// ============================================================================
// Revision entities
// ============================================================================

/// Revision row exposed under custom column names, timestamp in millis
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomRevEntityColumnMapping {
    pub custom_id: u64,
    pub custom_timestamp: u64,
}

impl RevisionEntity for CustomRevEntityColumnMapping {
    fn from_revision(revision: &Revision) -> AnnalsResult<Self> {
        Ok(CustomRevEntityColumnMapping {
            custom_id: revision.number.as_u64(),
            custom_timestamp: revision.timestamp.as_millis(),
        })
    }
}

/// Revision row carrying the user recorded by [`UserListener`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRevision {
    pub number: RevisionNumber,
    pub username: Option<String>,
}

impl RevisionEntity for UserRevision {
    fn from_revision(revision: &Revision) -> AnnalsResult<Self> {
        Ok(UserRevision {
            number: revision.number,
            username: revision.fields.opt_str("username")?.map(str::to_string),
        })
    }
}

/// Listener stamping every revision with a fixed user name
#[derive(Debug)]
pub struct UserListener(pub &'static str);

impl RevisionListener for UserListener {
    fn new_revision(&self, revision: &mut PendingRevision) {
        if revision.fields().get("username").is_none() {
            revision.set_field("username", self.0);
        }
    }
}

// ============================================================================
// Harness
// ============================================================================

/// One step of [`in_transactions_with_timeouts`]
pub type Step = Box<dyn FnOnce(&mut TransactionContext) -> AnnalsResult<()>>;

/// Run each step in its own transaction, pausing `timeout` before each
///
/// Returns N+1 wall-clock timestamps: one before the first step and one
/// right after each commit. The commit of step `i` (1-based) lies after
/// `stamps[i - 1]` and at or before `stamps[i]`.
pub fn in_transactions_with_timeouts(
    db: &Arc<Database>,
    timeout: Duration,
    steps: Vec<Step>,
) -> Vec<Timestamp> {
    let mut stamps = Vec::with_capacity(steps.len() + 1);
    stamps.push(Timestamp::now());
    for step in steps {
        thread::sleep(timeout);
        db.transaction(step).unwrap();
        stamps.push(Timestamp::now());
    }
    stamps
}

/// Persist a new audited entity, returning its id
pub fn create(db: &Database, s: &str) -> EntityId {
    db.transaction(|txn| txn.persist(&mut StrTestEntity::new(s)))
        .unwrap()
}

/// Overwrite an audited entity
pub fn set_str(db: &Database, id: EntityId, s: &str) {
    db.transaction(|txn| txn.update(&StrTestEntity::with_id(id, s)))
        .unwrap();
}
