//! Revision and entity queries against a disk-backed database

use crate::common::*;
use annals::{DefaultRevisionEntity, RevisionNumber, RevisionType, Timestamp};

// ============================================================================
// Revision metadata
// ============================================================================

#[test]
fn revision_numbers_follow_commit_dates() {
    let t = TestDb::new();
    let id = t.open_account_at(1_000, "ada", 10);
    t.set_balance_at(2_000, id, 20);
    t.set_balance_at(3_000, id, 30);

    let reader = t.db.audit_reader();
    let at = |millis| reader.revision_number_for_date(Timestamp::from_millis(millis));

    assert!(at(999).unwrap_err().is_revision_not_found());
    assert_eq!(at(1_000).unwrap(), RevisionNumber::new(1));
    assert_eq!(at(2_500).unwrap(), RevisionNumber::new(2));
    assert_eq!(at(9_999).unwrap(), RevisionNumber::new(3));

    for n in 1..=3u64 {
        let number = RevisionNumber::new(n);
        assert_eq!(
            reader.revision_date(number).unwrap(),
            Timestamp::from_millis(n * 1_000)
        );
        let entity: DefaultRevisionEntity = reader.find_revision(number).unwrap();
        assert_eq!(entity.id, number);
    }
    assert!(reader
        .revision_date(RevisionNumber::new(4))
        .unwrap_err()
        .is_revision_not_found());
}

// ============================================================================
// Entity history
// ============================================================================

#[test]
fn find_rebuilds_each_version() {
    let t = TestDb::new();
    let ada = t.open_account_at(1_000, "ada", 10);
    let bob = t.open_account_at(2_000, "bob", 5);
    t.set_balance_at(3_000, ada, 15);

    let reader = t.db.audit_reader();
    assert_eq!(
        reader.revisions::<Account>(ada).unwrap(),
        vec![RevisionNumber::new(1), RevisionNumber::new(3)]
    );
    assert_eq!(
        reader.revisions::<Account>(bob).unwrap(),
        vec![RevisionNumber::new(2)]
    );

    let balance_at = |n| {
        reader
            .find::<Account>(ada, RevisionNumber::new(n))
            .unwrap()
            .map(|a| a.balance)
    };
    assert_eq!(balance_at(1), Some(10));
    assert_eq!(balance_at(2), Some(10));
    assert_eq!(balance_at(3), Some(15));
    assert_eq!(balance_at(50), Some(15));

    assert_eq!(reader.find::<Account>(bob, RevisionNumber::new(1)).unwrap(), None);
}

#[test]
fn transfer_changes_both_accounts_in_one_revision() {
    let t = TestDb::new();
    let ada = t.open_account_at(1_000, "ada", 100);
    let bob = t.open_account_at(1_500, "bob", 0);

    t.clock.set(Timestamp::from_millis(2_000));
    let (_, info) = t
        .db
        .transaction_with_revision(|txn| {
            let mut from = txn.find::<Account>(ada)?.expect("ada");
            let mut to = txn.find::<Account>(bob)?.expect("bob");
            from.balance -= 40;
            to.balance += 40;
            txn.update(&from)?;
            txn.update(&to)
        })
        .unwrap();

    assert_eq!(info.revision, Some(RevisionNumber::new(3)));
    assert_eq!(info.timestamp, Timestamp::from_millis(2_000));

    let reader = t.db.audit_reader();
    let changed = reader.changed_entities(RevisionNumber::new(3)).unwrap();
    assert_eq!(changed.len(), 2);
    assert!(changed.iter().all(|c| c.revision_type == RevisionType::Mod));

    let history = reader.history::<Account>(bob).unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].revision_type, RevisionType::Add);
    assert_eq!(history[1].entity.as_ref().map(|a| a.balance), Some(40));
}
