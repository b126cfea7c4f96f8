//! Audit reader tests
//!
//! Entity history as seen through `AuditReader`:
//!
//! 1. **Deletions** - Del snapshots, with and without stored data
//! 2. **Merging** - several changes to one entity in one transaction
//! 3. **Changed entities** - per-revision tracking
//! 4. **Non-audited types** - stored but never revisioned
//! 5. **Aborts and conflicts** - nothing leaks into the audit trail

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use annals_core::{AnnalsError, ChangedEntity, Entity, EntityKey, RevisionNumber, RevisionType};
use annals_engine::{Database, RetryConfig};
use common::*;

fn rev(n: u64) -> RevisionNumber {
    RevisionNumber::new(n)
}

// ============================================================================
// SECTION 1: Deletions
// ============================================================================

#[test]
fn test_deleted_entity_is_none_at_deletion_revision() {
    let db = Database::ephemeral().unwrap();
    let id = create(&db, "x");
    db.transaction(|txn| txn.remove::<StrTestEntity>(id)).unwrap();

    let reader = db.audit_reader();
    assert_eq!(reader.revisions::<StrTestEntity>(id).unwrap(), vec![rev(1), rev(2)]);
    assert_eq!(
        reader.find::<StrTestEntity>(id, rev(1)).unwrap(),
        Some(StrTestEntity::with_id(id, "x"))
    );
    assert_eq!(reader.find::<StrTestEntity>(id, rev(2)).unwrap(), None);

    let history = reader.history::<StrTestEntity>(id).unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[1].revision_type, RevisionType::Del);
    assert_eq!(history[1].entity, None);
}

#[test]
fn test_store_data_at_delete_keeps_last_state() {
    let db = Database::builder()
        .store_data_at_delete(true)
        .ephemeral()
        .unwrap();
    let id = create(&db, "x");
    set_str(&db, id, "y");
    db.transaction(|txn| txn.remove::<StrTestEntity>(id)).unwrap();

    let reader = db.audit_reader();
    // find still treats a deletion as absence
    assert_eq!(reader.find::<StrTestEntity>(id, rev(3)).unwrap(), None);

    let history = reader.history::<StrTestEntity>(id).unwrap();
    let types: Vec<_> = history.iter().map(|h| h.revision_type).collect();
    assert_eq!(types, vec![RevisionType::Add, RevisionType::Mod, RevisionType::Del]);
    assert_eq!(history[2].entity, Some(StrTestEntity::with_id(id, "y")));
}

#[test]
fn test_recreated_entity_is_visible_again() {
    let db = Database::ephemeral().unwrap();
    let id = create(&db, "x");
    db.transaction(|txn| txn.remove::<StrTestEntity>(id)).unwrap();
    db.transaction(|txn| txn.persist(&mut StrTestEntity::with_id(id, "again")))
        .unwrap();

    let reader = db.audit_reader();
    assert_eq!(reader.find::<StrTestEntity>(id, rev(2)).unwrap(), None);
    assert_eq!(
        reader.find::<StrTestEntity>(id, rev(3)).unwrap().unwrap().str,
        "again"
    );
    let history = reader.history::<StrTestEntity>(id).unwrap();
    assert_eq!(history[2].revision_type, RevisionType::Add);
}

// ============================================================================
// SECTION 2: Merging within a transaction
// ============================================================================

#[test]
fn test_persist_then_update_is_one_add() {
    let db = Database::ephemeral().unwrap();
    let id = db
        .transaction(|txn| {
            let mut entity = StrTestEntity::new("draft");
            let id = txn.persist(&mut entity)?;
            entity.str = "final".to_string();
            txn.update(&entity)?;
            Ok(id)
        })
        .unwrap();

    let history = db.audit_reader().history::<StrTestEntity>(id).unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].revision_type, RevisionType::Add);
    assert_eq!(history[0].entity.as_ref().unwrap().str, "final");
}

#[test]
fn test_persist_then_remove_creates_no_revision() {
    let db = Database::ephemeral().unwrap();
    let (_, info) = db
        .transaction_with_revision(|txn| {
            let id = txn.persist(&mut StrTestEntity::new("gone"))?;
            txn.remove::<StrTestEntity>(id)
        })
        .unwrap();

    assert_eq!(info.revision, None);
    assert_eq!(db.audit_reader().latest_revision(), None);
}

#[test]
fn test_update_then_remove_is_del() {
    let db = Database::ephemeral().unwrap();
    let id = create(&db, "x");
    db.transaction(|txn| {
        txn.update(&StrTestEntity::with_id(id, "y"))?;
        txn.remove::<StrTestEntity>(id)
    })
    .unwrap();

    let history = db.audit_reader().history::<StrTestEntity>(id).unwrap();
    assert_eq!(history[1].revision_type, RevisionType::Del);
}

#[test]
fn test_remove_then_persist_is_mod() {
    let db = Database::ephemeral().unwrap();
    let id = create(&db, "x");
    db.transaction(|txn| {
        txn.remove::<StrTestEntity>(id)?;
        txn.persist(&mut StrTestEntity::with_id(id, "replaced"))
    })
    .unwrap();

    let history = db.audit_reader().history::<StrTestEntity>(id).unwrap();
    assert_eq!(history[1].revision_type, RevisionType::Mod);
    assert_eq!(history[1].entity.as_ref().unwrap().str, "replaced");
}

#[test]
fn test_one_revision_per_transaction() {
    let db = Database::ephemeral().unwrap();
    let (ids, info) = db
        .transaction_with_revision(|txn| {
            let a = txn.persist(&mut StrTestEntity::new("a"))?;
            let b = txn.persist(&mut StrTestEntity::new("b"))?;
            Ok((a, b))
        })
        .unwrap();

    assert_eq!(info.revision, Some(rev(1)));
    let reader = db.audit_reader();
    assert_eq!(reader.revisions::<StrTestEntity>(ids.0).unwrap(), vec![rev(1)]);
    assert_eq!(reader.revisions::<StrTestEntity>(ids.1).unwrap(), vec![rev(1)]);
    assert_eq!(reader.revision_date(rev(1)).unwrap(), info.timestamp);
}

// ============================================================================
// SECTION 3: Changed entities
// ============================================================================

#[test]
fn test_changed_entities_per_revision() {
    let db = Database::ephemeral().unwrap();
    let a = create(&db, "a");
    let b = db
        .transaction(|txn| {
            txn.update(&StrTestEntity::with_id(a, "a2"))?;
            txn.persist(&mut StrTestEntity::new("b"))
        })
        .unwrap();

    let reader = db.audit_reader();
    assert_eq!(
        reader.changed_entities(rev(1)).unwrap(),
        vec![ChangedEntity {
            key: StrTestEntity::key(a),
            revision_type: RevisionType::Add,
        }]
    );
    assert_eq!(
        reader.changed_entities(rev(2)).unwrap(),
        vec![
            ChangedEntity {
                key: StrTestEntity::key(a),
                revision_type: RevisionType::Mod,
            },
            ChangedEntity {
                key: EntityKey::new("StrTestEntity", b),
                revision_type: RevisionType::Add,
            },
        ]
    );
    assert!(reader
        .changed_entities(rev(3))
        .unwrap_err()
        .is_revision_not_found());
}

#[test]
fn test_changed_entities_disabled() {
    let db = Database::builder()
        .track_changed_entities(false)
        .ephemeral()
        .unwrap();
    create(&db, "a");

    let err = db.audit_reader().changed_entities(rev(1)).unwrap_err();
    assert!(matches!(err, AnnalsError::InvalidState { .. }));
}

// ============================================================================
// SECTION 4: Non-audited types
// ============================================================================

#[test]
fn test_non_audited_changes_create_no_revision() {
    let db = Database::ephemeral().unwrap();
    let (id, info) = db
        .transaction_with_revision(|txn| txn.persist(&mut Counter { id: None, value: 1 }))
        .unwrap();

    assert_eq!(info.revision, None);
    let reader = db.audit_reader();
    assert!(!reader.is_entity_audited::<Counter>());
    assert!(reader.is_entity_audited::<StrTestEntity>());
    assert!(matches!(
        reader.revisions::<Counter>(id),
        Err(AnnalsError::NotAudited { .. })
    ));
    assert!(matches!(
        reader.find::<Counter>(id, rev(1)),
        Err(AnnalsError::NotAudited { .. })
    ));

    // The row itself is stored
    let stored = db.transaction(|txn| txn.find::<Counter>(id)).unwrap();
    assert_eq!(stored.unwrap().value, 1);
}

#[test]
fn test_mixed_transaction_snapshots_only_audited() {
    let db = Database::ephemeral().unwrap();
    db.transaction(|txn| {
        txn.persist(&mut Counter { id: None, value: 1 })?;
        txn.persist(&mut StrTestEntity::new("x"))
    })
    .unwrap();

    let changed = db.audit_reader().changed_entities(rev(1)).unwrap();
    assert_eq!(changed.len(), 1);
    assert_eq!(changed[0].key.entity.as_str(), "StrTestEntity");
}

// ============================================================================
// SECTION 5: Aborts and conflicts
// ============================================================================

#[test]
fn test_aborted_transaction_leaves_no_trace() {
    let db = Database::ephemeral().unwrap();
    let id = create(&db, "x");

    let result: Result<(), AnnalsError> = db.transaction(|txn| {
        txn.update(&StrTestEntity::with_id(id, "never"))?;
        Err(AnnalsError::invalid_input("rolled back"))
    });
    assert!(result.is_err());

    let reader = db.audit_reader();
    assert_eq!(reader.latest_revision(), Some(rev(1)));
    assert_eq!(reader.revisions::<StrTestEntity>(id).unwrap(), vec![rev(1)]);

    // A later commit takes the next number
    set_str(&db, id, "y");
    assert_eq!(reader.latest_revision(), Some(rev(2)));
}

#[test]
fn test_conflicting_update_is_rejected() {
    let db = Database::ephemeral().unwrap();
    let id = create(&db, "x");

    let mut slow = db.begin_transaction();
    let mut entity = slow.find::<StrTestEntity>(id).unwrap().unwrap();

    set_str(&db, id, "fast");

    entity.str = "slow".to_string();
    slow.update(&entity).unwrap();
    let err = db.commit_transaction(&mut slow).unwrap_err();
    assert!(err.is_conflict());
    assert!(slow.is_aborted());

    let reader = db.audit_reader();
    assert_eq!(reader.latest_revision(), Some(rev(2)));
    assert_eq!(
        reader.find::<StrTestEntity>(id, rev(2)).unwrap().unwrap().str,
        "fast"
    );
}

#[test]
fn test_retry_resolves_contention() {
    let db = Database::ephemeral().unwrap();
    let id = create(&db, "0");
    let threads = 4;
    let barrier = Arc::new(Barrier::new(threads));
    let attempts = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let db = Arc::clone(&db);
            let barrier = Arc::clone(&barrier);
            let attempts = Arc::clone(&attempts);
            thread::spawn(move || {
                barrier.wait();
                let config = RetryConfig::new()
                    .with_max_retries(50)
                    .with_base_delay_ms(1)
                    .with_max_delay_ms(5);
                db.transaction_with_retry(config, |txn| {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    let mut entity = txn.find::<StrTestEntity>(id)?.unwrap();
                    let n: u64 = entity.str.parse().unwrap();
                    entity.str = (n + 1).to_string();
                    txn.update(&entity)
                })
                .unwrap();
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let reader = db.audit_reader();
    assert_eq!(reader.latest_revision(), Some(rev(5)));
    assert_eq!(
        reader.find::<StrTestEntity>(id, rev(5)).unwrap().unwrap().str,
        "4"
    );
    assert!(attempts.load(Ordering::SeqCst) >= threads);
}

#[test]
fn test_no_retry_surfaces_conflict() {
    let db = Database::ephemeral().unwrap();
    let id = create(&db, "x");

    let err = db
        .transaction_with_retry(RetryConfig::no_retry(), |txn| {
            let mut entity = txn.find::<StrTestEntity>(id)?.unwrap();
            // Another writer commits between our read and our commit
            set_str(&db, id, "interloper");
            entity.str = "mine".to_string();
            txn.update(&entity)
        })
        .unwrap_err();
    assert!(err.is_conflict());
}
