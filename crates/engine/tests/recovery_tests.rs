//! Recovery Tests
//!
//! Revisions survive close + reopen. The recovery contract:
//! - Revision numbers: preserved and continued without gaps
//! - Timestamps: never go backwards across a restart
//! - Generated ids: never reused
//! - Torn tail: cut off, everything before it kept

mod common;

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::sync::Arc;

use annals_concurrency::ManualClock;
use annals_core::{AnnalsError, RevisionNumber, Timestamp};
use annals_durability::WAL_FILE_NAME;
use annals_engine::{AnnalsConfig, Database, CONFIG_FILE_NAME, LOCK_FILE_NAME};
use common::*;
use tempfile::TempDir;

fn rev(n: u64) -> RevisionNumber {
    RevisionNumber::new(n)
}

fn open_with_clock(dir: &TempDir, start: Timestamp) -> Arc<Database> {
    Database::builder()
        .path(dir.path())
        .clock(Arc::new(ManualClock::new(start)))
        .open()
        .unwrap()
}

// ============================================================================
// SECTION 1: Reopen
// ============================================================================

#[test]
fn test_revisions_survive_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let (id, t1, t2) = {
        let db = Database::open(temp_dir.path()).unwrap();
        let id = create(&db, "x");
        set_str(&db, id, "y");
        let reader = db.audit_reader();
        (
            id,
            reader.revision_date(rev(1)).unwrap(),
            reader.revision_date(rev(2)).unwrap(),
        )
    };

    let db = Database::open(temp_dir.path()).unwrap();
    let reader = db.audit_reader();
    assert_eq!(reader.latest_revision(), Some(rev(2)));
    assert_eq!(reader.revision_date(rev(1)).unwrap(), t1);
    assert_eq!(reader.revision_number_for_date(t2).unwrap(), rev(2));
    assert_eq!(reader.revisions::<StrTestEntity>(id).unwrap(), vec![rev(1), rev(2)]);
    assert_eq!(
        reader.find::<StrTestEntity>(id, rev(1)).unwrap().unwrap().str,
        "x"
    );

    // Live state is back too
    let live = db.transaction(|txn| txn.find::<StrTestEntity>(id)).unwrap();
    assert_eq!(live.unwrap().str, "y");
}

#[test]
fn test_numbering_and_ids_continue_after_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let first = {
        let db = Database::open(temp_dir.path()).unwrap();
        create(&db, "a")
    };

    let db = Database::open(temp_dir.path()).unwrap();
    let (second, info) = db
        .transaction_with_revision(|txn| txn.persist(&mut StrTestEntity::new("b")))
        .unwrap();

    assert_eq!(info.revision, Some(rev(2)));
    assert!(second > first);
}

#[test]
fn test_timestamps_never_go_backwards_across_restart() {
    let temp_dir = TempDir::new().unwrap();
    let before = {
        let db = open_with_clock(&temp_dir, Timestamp::from_secs(100));
        create(&db, "a");
        db.audit_reader().revision_date(rev(1)).unwrap()
    };

    // Clock now reads earlier than the last revision
    let db = open_with_clock(&temp_dir, Timestamp::from_secs(1));
    create(&db, "b");
    let after = db.audit_reader().revision_date(rev(2)).unwrap();
    assert!(after > before);
    assert_eq!(db.audit_reader().revision_number_for_date(before).unwrap(), rev(1));
}

#[test]
fn test_deletion_survives_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let id = {
        let db = Database::builder()
            .path(temp_dir.path())
            .store_data_at_delete(true)
            .open()
            .unwrap();
        let id = create(&db, "x");
        db.transaction(|txn| txn.remove::<StrTestEntity>(id)).unwrap();
        id
    };

    let db = Database::open(temp_dir.path()).unwrap();
    let history = db.audit_reader().history::<StrTestEntity>(id).unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[1].entity.as_ref().unwrap().str, "x");
    let live = db.transaction(|txn| txn.find::<StrTestEntity>(id)).unwrap();
    assert_eq!(live, None);
}

// ============================================================================
// SECTION 2: Damaged logs
// ============================================================================

#[test]
fn test_torn_tail_is_dropped() {
    init_tracing();
    let temp_dir = TempDir::new().unwrap();
    let id = {
        let db = Database::open(temp_dir.path()).unwrap();
        let id = create(&db, "x");
        set_str(&db, id, "y");
        id
    };

    // Half-written frame: length says 200 bytes, only 3 follow
    let wal_path = temp_dir.path().join(WAL_FILE_NAME);
    let intact_len = std::fs::metadata(&wal_path).unwrap().len();
    let mut file = OpenOptions::new().append(true).open(&wal_path).unwrap();
    file.write_all(&[200, 0, 0, 0, 1, 2, 3]).unwrap();
    drop(file);

    let db = Database::open(temp_dir.path()).unwrap();
    assert_eq!(std::fs::metadata(&wal_path).unwrap().len(), intact_len);
    assert_eq!(db.audit_reader().latest_revision(), Some(rev(2)));

    set_str(&db, id, "z");
    drop(db);

    let db = Database::open(temp_dir.path()).unwrap();
    let reader = db.audit_reader();
    assert_eq!(reader.revisions::<StrTestEntity>(id).unwrap(), vec![rev(1), rev(2), rev(3)]);
}

#[test]
fn test_bad_header_fails_open() {
    let temp_dir = TempDir::new().unwrap();
    std::fs::write(temp_dir.path().join(WAL_FILE_NAME), [0xEEu8; 64]).unwrap();

    let err = Database::open(temp_dir.path()).unwrap_err();
    assert!(matches!(err, AnnalsError::Corruption { .. }));
}

// ============================================================================
// SECTION 3: Configuration and locking
// ============================================================================

#[test]
fn test_cache_mode_keeps_nothing() {
    let temp_dir = TempDir::new().unwrap();
    let cfg = AnnalsConfig {
        durability: "cache".to_string(),
        ..AnnalsConfig::default()
    };
    {
        let db = Database::open_with_config(temp_dir.path(), cfg).unwrap();
        create(&db, "x");
        assert_eq!(db.audit_reader().latest_revision(), Some(rev(1)));
    }

    let db = Database::open(temp_dir.path()).unwrap();
    assert_eq!(db.audit_reader().latest_revision(), None);
}

#[test]
fn test_config_file_settings_apply() {
    let temp_dir = TempDir::new().unwrap();
    std::fs::write(
        temp_dir.path().join(CONFIG_FILE_NAME),
        "durability = \"always\"\ntrack_changed_entities = false\n",
    )
    .unwrap();

    let db = Database::open(temp_dir.path()).unwrap();
    assert_eq!(db.durability_mode().name(), "always");
    create(&db, "x");
    assert!(matches!(
        db.audit_reader().changed_entities(rev(1)),
        Err(AnnalsError::InvalidState { .. })
    ));
}

#[test]
fn test_lock_is_held_while_open() {
    let temp_dir = TempDir::new().unwrap();
    let db = Database::open(temp_dir.path()).unwrap();

    let other = File::open(temp_dir.path().join(LOCK_FILE_NAME)).unwrap();
    assert!(fs2::FileExt::try_lock_exclusive(&other).is_err());

    drop(db);
    assert!(fs2::FileExt::try_lock_exclusive(&other).is_ok());
}

#[test]
fn test_shutdown_then_reopen() {
    let temp_dir = TempDir::new().unwrap();
    {
        let db = Database::open(temp_dir.path()).unwrap();
        create(&db, "x");
        db.shutdown().unwrap();
        assert!(matches!(
            db.transaction(|txn| txn.persist(&mut StrTestEntity::new("late"))),
            Err(AnnalsError::Shutdown)
        ));
        // Queries still work
        assert_eq!(db.audit_reader().latest_revision(), Some(rev(1)));
    }

    let db = Database::open(temp_dir.path()).unwrap();
    assert!(db.is_open());
    assert_eq!(db.audit_reader().latest_revision(), Some(rev(1)));
}
