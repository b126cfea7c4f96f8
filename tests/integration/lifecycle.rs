//! Reopen and recovery through the facade

use crate::common::*;
use annals::{Database, RevisionNumber, RevisionType, Timestamp};

#[test]
fn history_survives_reopen() {
    let t = TestDb::new();
    let id = t.open_account_at(1_000, "ada", 10);
    t.set_balance_at(2_000, id, 20);

    let t = t.reopen();
    let reader = t.db.audit_reader();
    assert_eq!(reader.latest_revision(), Some(RevisionNumber::new(2)));
    assert_eq!(
        reader.revision_number_for_date(Timestamp::from_millis(1_500)).unwrap(),
        RevisionNumber::new(1)
    );
    assert_eq!(
        reader
            .find::<Account>(id, RevisionNumber::new(1))
            .unwrap()
            .map(|a| a.balance),
        Some(10)
    );

    t.set_balance_at(3_000, id, 30);
    assert_eq!(
        t.db.audit_reader().revisions::<Account>(id).unwrap(),
        vec![
            RevisionNumber::new(1),
            RevisionNumber::new(2),
            RevisionNumber::new(3)
        ]
    );
}

#[test]
fn deleted_account_is_gone_at_later_revisions() {
    let t = TestDb::new();
    let id = t.open_account_at(1_000, "ada", 10);
    t.clock.set(Timestamp::from_millis(2_000));
    t.db.transaction(|txn| txn.remove::<Account>(id)).unwrap();

    let t = t.reopen();
    let reader = t.db.audit_reader();
    let history = reader.history::<Account>(id).unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[1].revision_type, RevisionType::Del);
    assert!(history[1].entity.is_none());
    assert_eq!(reader.find::<Account>(id, RevisionNumber::new(2)).unwrap(), None);
    assert!(reader.find::<Account>(id, RevisionNumber::new(1)).unwrap().is_some());
}

#[test]
fn ephemeral_database_audits_in_memory() {
    let db = Database::ephemeral().unwrap();
    assert!(db.is_ephemeral());

    let id = db
        .transaction(|txn| txn.persist(&mut Account::new("ada", 1)))
        .unwrap();
    let reader = db.audit_reader();
    assert_eq!(reader.revisions::<Account>(id).unwrap(), vec![RevisionNumber::FIRST]);
}
