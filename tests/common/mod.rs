//! Shared test utilities for the integration suite.

#![allow(dead_code)]

use std::sync::Arc;

use annals::{AnnalsResult, Database, Entity, EntityId, Fields, ManualClock, Timestamp};
use tempfile::TempDir;

// ============================================================================
// Entities
// ============================================================================

/// Audited entity with a name and a balance
#[derive(Debug, Clone, PartialEq)]
pub struct Account {
    pub id: Option<EntityId>,
    pub owner: String,
    pub balance: i64,
}

impl Account {
    pub fn new(owner: &str, balance: i64) -> Self {
        Account {
            id: None,
            owner: owner.to_string(),
            balance,
        }
    }
}

impl Entity for Account {
    const NAME: &'static str = "Account";

    fn id(&self) -> Option<EntityId> {
        self.id
    }

    fn set_id(&mut self, id: EntityId) {
        self.id = Some(id);
    }

    fn to_fields(&self) -> Fields {
        Fields::new()
            .with("owner", self.owner.as_str())
            .with("balance", self.balance)
    }

    fn from_fields(id: EntityId, fields: &Fields) -> AnnalsResult<Self> {
        Ok(Account {
            id: Some(id),
            owner: fields.str("owner")?.to_string(),
            balance: fields.int("balance")?,
        })
    }
}

// ============================================================================
// TestDb
// ============================================================================

/// Disk-backed database driven by a manual clock
pub struct TestDb {
    pub db: Arc<Database>,
    pub clock: Arc<ManualClock>,
    pub dir: TempDir,
}

impl TestDb {
    /// Fresh database whose clock starts at 1s past the epoch
    pub fn new() -> Self {
        let dir = TempDir::new().expect("temp dir");
        let clock = Arc::new(ManualClock::new(Timestamp::from_secs(1)));
        let db = Database::builder()
            .path(dir.path())
            .always()
            .track_changed_entities(true)
            .clock(clock.clone())
            .open()
            .expect("open database");
        TestDb { db, clock, dir }
    }

    /// Drop the handle and open the same directory again
    pub fn reopen(self) -> Self {
        let TestDb { db, clock, dir } = self;
        drop(db);
        let db = Database::builder()
            .path(dir.path())
            .always()
            .track_changed_entities(true)
            .clock(clock.clone())
            .open()
            .expect("reopen database");
        TestDb { db, clock, dir }
    }

    /// Set the clock to `millis` and create an account
    pub fn open_account_at(&self, millis: u64, owner: &str, balance: i64) -> EntityId {
        self.clock.set(Timestamp::from_millis(millis));
        self.db
            .transaction(|txn| txn.persist(&mut Account::new(owner, balance)))
            .expect("persist account")
    }

    /// Set the clock to `millis` and change an account's balance
    pub fn set_balance_at(&self, millis: u64, id: EntityId, balance: i64) {
        self.clock.set(Timestamp::from_millis(millis));
        self.db
            .transaction(|txn| {
                let mut account = txn
                    .find::<Account>(id)?
                    .expect("account exists");
                account.balance = balance;
                txn.update(&account)
            })
            .expect("update account");
    }
}
