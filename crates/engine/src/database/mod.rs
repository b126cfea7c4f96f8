//! Database: open/close, transactions, and audit queries
//!
//! A `Database` owns the in-memory stores, the revision log and the
//! transaction manager. Opening a data directory:
//!
//! 1. Reads (or creates) `annals.toml`
//! 2. Takes an exclusive lock on `LOCK`
//! 3. Replays `revisions.wal` into empty stores, cutting off a torn tail
//! 4. Resumes revision numbers, timestamps, ids and txn ids past the replay
//!
//! Ephemeral databases skip all of it and never touch the filesystem.

mod builder;
pub mod config;
mod registry;
mod transactions;

pub use builder::DatabaseBuilder;
pub use config::AnnalsConfig;
pub use transactions::RetryConfig;

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use annals_concurrency::{
    Clock, CommitInfo, ResumePoint, Stores, SystemClock, TransactionContext, TransactionManager,
};
use annals_core::{AnnalsError, AnnalsResult, RevisionListener};
use annals_durability::{DurabilityMode, WalWriter, WAL_FILE_NAME};
use tracing::{info, warn};

use crate::reader::AuditReader;
use crate::recovery::RevisionLogRecovery;
use registry::OPEN_DATABASES;

/// Name of the lock file in the data directory
pub const LOCK_FILE_NAME: &str = "LOCK";

/// Everything needed to construct a database besides the directory
pub(crate) struct OpenParams {
    pub(crate) config: AnnalsConfig,
    /// Exact mode requested through the builder, if any
    pub(crate) durability: Option<DurabilityMode>,
    pub(crate) clock: Option<Arc<dyn Clock>>,
    pub(crate) listener: Option<Arc<dyn RevisionListener>>,
}

impl OpenParams {
    fn from_config(config: AnnalsConfig) -> Self {
        OpenParams {
            config,
            durability: None,
            clock: None,
            listener: None,
        }
    }

    fn durability_mode(&self) -> AnnalsResult<DurabilityMode> {
        match self.durability {
            Some(mode) => Ok(mode),
            None => self.config.durability_mode(),
        }
    }

    /// An open instance is only shared when these params would build the
    /// same database
    fn check_reusable(&self, db: &Database, path: &Path) -> AnnalsResult<()> {
        if self.clock.is_some() || self.listener.is_some() {
            return Err(AnnalsError::invalid_state(format!(
                "Database at {} is already open; a clock or revision listener \
                 can only be set by the first open",
                path.display()
            )));
        }
        if self.durability_mode()? != db.durability_mode
            || self.config.audit_settings() != db.manager.settings()
        {
            return Err(AnnalsError::invalid_state(format!(
                "Database at {} is already open with different settings",
                path.display()
            )));
        }
        Ok(())
    }

    fn clock(&self) -> Arc<dyn Clock> {
        self.clock.clone().unwrap_or_else(|| Arc::new(SystemClock))
    }
}

/// Embedded entity store with revision auditing
///
/// Every committed transaction that changes an audited entity creates one
/// revision. Use [`Database::audit_reader`] to query them.
///
/// # Example
///
/// ```text
/// use annals_engine::Database;
///
/// let db = Database::open("/path/to/data")?;
///
/// let id = db.transaction(|txn| txn.persist(&mut StrTestEntity::new("x")))?;
///
/// let reader = db.audit_reader();
/// assert_eq!(reader.revisions::<StrTestEntity>(id)?.len(), 1);
/// ```
pub struct Database {
    /// Data directory path (empty for ephemeral databases)
    data_dir: PathBuf,

    /// Effective configuration
    config: AnnalsConfig,

    /// Current durability mode
    durability_mode: DurabilityMode,

    /// Commit protocol, stores and revision log writer
    manager: TransactionManager,

    /// Cleared by shutdown; commits are refused afterwards
    accepting_transactions: AtomicBool,

    /// Exclusive lock on `LOCK`, held for the lifetime of the database.
    /// None for ephemeral databases.
    _lock_file: Option<File>,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("data_dir", &self.data_dir)
            .field("durability_mode", &self.durability_mode)
            .field("latest_revision", &self.manager.stores().revisions.latest_number())
            .field("is_open", &self.is_open())
            .finish()
    }
}

impl Database {
    /// Open database at given path with automatic recovery
    ///
    /// Reads `annals.toml` from the data directory, creating it with
    /// defaults if missing.
    ///
    /// Opening the same path again in this process returns the same
    /// `Arc<Database>`.
    ///
    /// # Errors
    ///
    /// Fails if the config is invalid, another process holds the lock, or
    /// the revision log is corrupt beyond its tail.
    pub fn open<P: AsRef<Path>>(path: P) -> AnnalsResult<Arc<Self>> {
        let data_dir = path.as_ref().to_path_buf();
        std::fs::create_dir_all(&data_dir)?;

        let config_path = data_dir.join(config::CONFIG_FILE_NAME);
        AnnalsConfig::write_default_if_missing(&config_path)?;
        let cfg = AnnalsConfig::from_file(&config_path)?;

        Self::open_at(&data_dir, OpenParams::from_config(cfg))
    }

    /// Open database at the given path with an explicit configuration
    ///
    /// The config is written to `annals.toml` so later `open()` calls pick
    /// up the same settings.
    pub fn open_with_config<P: AsRef<Path>>(path: P, cfg: AnnalsConfig) -> AnnalsResult<Arc<Self>> {
        let data_dir = path.as_ref().to_path_buf();
        std::fs::create_dir_all(&data_dir)?;

        cfg.durability_mode()?;
        cfg.write_to_file(&data_dir.join(config::CONFIG_FILE_NAME))?;

        Self::open_at(&data_dir, OpenParams::from_config(cfg))
    }

    /// In-memory database with default settings and no files
    ///
    /// Nothing survives a drop. Each call creates a new instance.
    pub fn ephemeral() -> AnnalsResult<Arc<Self>> {
        Self::ephemeral_with(OpenParams::from_config(AnnalsConfig::default()))
    }

    /// Builder for overrides and hooks
    pub fn builder() -> DatabaseBuilder {
        DatabaseBuilder::new()
    }

    pub(crate) fn open_at(path: &Path, params: OpenParams) -> AnnalsResult<Arc<Self>> {
        std::fs::create_dir_all(path)?;
        let canonical_path = path.canonicalize()?;

        // Held until the new instance is registered
        let mut registry = OPEN_DATABASES.lock();
        if let Some(db) = registry.get(&canonical_path).and_then(|weak| weak.upgrade()) {
            params.check_reusable(&db, &canonical_path)?;
            info!(target: "annals::db", path = ?canonical_path, "Database already open, sharing instance");
            return Ok(db);
        }

        let durability_mode = params.durability_mode()?;
        let lock_file = acquire_lock(&canonical_path)?;

        let settings = params.config.audit_settings();
        let stores = Stores::new();
        let wal_path = canonical_path.join(WAL_FILE_NAME);
        let outcome = RevisionLogRecovery::new(&wal_path, settings).run(&stores)?;

        let database_uuid = outcome
            .database_uuid
            .unwrap_or_else(|| *uuid::Uuid::new_v4().as_bytes());
        let wal = WalWriter::open(&wal_path, database_uuid, durability_mode)?;

        let manager = TransactionManager::new(
            stores,
            wal,
            settings,
            params.clock(),
            params.listener.clone(),
            outcome.resume,
        );

        info!(
            target: "annals::db",
            path = ?canonical_path,
            durability = %durability_mode,
            commits_replayed = outcome.commits_replayed,
            revisions_replayed = outcome.revisions_replayed,
            "Database opened"
        );

        let db = Arc::new(Self {
            data_dir: canonical_path.clone(),
            config: params.config,
            durability_mode,
            manager,
            accepting_transactions: AtomicBool::new(true),
            _lock_file: Some(lock_file),
        });

        registry.insert(canonical_path, Arc::downgrade(&db));
        Ok(db)
    }

    pub(crate) fn ephemeral_with(mut params: OpenParams) -> AnnalsResult<Arc<Self>> {
        params.config.durability = DurabilityMode::Cache.name().to_string();
        let settings = params.config.audit_settings();
        // Cache mode never creates the file
        let wal = WalWriter::open(PathBuf::new(), [0u8; 16], DurabilityMode::Cache)?;

        let manager = TransactionManager::new(
            Stores::new(),
            wal,
            settings,
            params.clock(),
            params.listener.clone(),
            ResumePoint::default(),
        );

        Ok(Arc::new(Self {
            data_dir: PathBuf::new(),
            config: params.config,
            durability_mode: DurabilityMode::Cache,
            manager,
            accepting_transactions: AtomicBool::new(true),
            _lock_file: None,
        }))
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Data directory (empty for ephemeral databases)
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// True when the database has no files
    pub fn is_ephemeral(&self) -> bool {
        self.data_dir.as_os_str().is_empty()
    }

    /// Effective configuration
    pub fn config(&self) -> &AnnalsConfig {
        &self.config
    }

    /// Current durability mode
    pub fn durability_mode(&self) -> DurabilityMode {
        self.durability_mode
    }

    /// False after `shutdown()`
    pub fn is_open(&self) -> bool {
        self.accepting_transactions.load(Ordering::SeqCst)
    }

    /// Query interface over committed revisions
    pub fn audit_reader(&self) -> AuditReader {
        AuditReader::new(self.manager.stores().clone(), self.manager.settings())
    }

    fn check_accepting(&self) -> AnnalsResult<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(AnnalsError::Shutdown)
        }
    }

    // ========================================================================
    // Transactions
    // ========================================================================

    /// Execute a transaction with the given closure
    ///
    /// Commits if the closure returns `Ok`, aborts if it returns `Err`.
    ///
    /// # Example
    /// ```text
    /// let id = db.transaction(|txn| {
    ///     let mut entity = StrTestEntity::new("x");
    ///     txn.persist(&mut entity)
    /// })?;
    /// ```
    pub fn transaction<F, T>(&self, f: F) -> AnnalsResult<T>
    where
        F: FnOnce(&mut TransactionContext) -> AnnalsResult<T>,
    {
        self.transaction_with_revision(f).map(|(value, _)| value)
    }

    /// Like `transaction()` but also reports the revision and timestamp
    /// assigned at commit
    ///
    /// `CommitInfo::revision` is `None` when no audited entity changed.
    pub fn transaction_with_revision<F, T>(&self, f: F) -> AnnalsResult<(T, CommitInfo)>
    where
        F: FnOnce(&mut TransactionContext) -> AnnalsResult<T>,
    {
        self.check_accepting()?;
        let mut txn = self.begin_transaction();
        let result = f(&mut txn);
        self.run_single_attempt(&mut txn, result)
    }

    /// Execute a transaction with automatic retry on conflict
    ///
    /// The closure runs in a fresh transaction on every attempt, so it must
    /// be `Fn`. Errors other than `Conflict` are returned immediately.
    pub fn transaction_with_retry<F, T>(&self, config: RetryConfig, f: F) -> AnnalsResult<T>
    where
        F: Fn(&mut TransactionContext) -> AnnalsResult<T>,
    {
        self.check_accepting()?;

        let mut attempt = 0;
        loop {
            let mut txn = self.begin_transaction();
            let result = f(&mut txn);
            match self.run_single_attempt(&mut txn, result) {
                Ok((value, _)) => return Ok(value),
                Err(e) if e.is_conflict() && attempt < config.max_retries => {
                    warn!(
                        target: "annals::db",
                        txn_id = txn.txn_id,
                        attempt,
                        "Transaction conflict, retrying"
                    );
                    std::thread::sleep(config.delay_for(attempt));
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn run_single_attempt<T>(
        &self,
        txn: &mut TransactionContext,
        result: AnnalsResult<T>,
    ) -> AnnalsResult<(T, CommitInfo)> {
        match result {
            Ok(value) => {
                let info = self.commit_transaction(txn)?;
                Ok((value, info))
            }
            Err(e) => {
                if txn.is_active() {
                    txn.mark_aborted(format!("Closure error: {}", e))?;
                }
                Err(e)
            }
        }
    }

    /// Begin a new transaction (for manual control)
    ///
    /// Prefer the closure API. A manual transaction must be finished with
    /// `commit_transaction()` or `abort_transaction()`.
    pub fn begin_transaction(&self) -> TransactionContext {
        self.manager.begin()
    }

    /// Commit a manual transaction
    ///
    /// # Errors
    /// - `Conflict` if an entity it read was changed by a later commit
    /// - `Shutdown` once the database is shut down
    /// - `InvalidState` if the transaction is not active
    ///
    /// The transaction is aborted on every error.
    pub fn commit_transaction(&self, txn: &mut TransactionContext) -> AnnalsResult<CommitInfo> {
        if let Err(e) = self.check_accepting() {
            if txn.is_active() {
                txn.mark_aborted("Database is shutting down")?;
            }
            return Err(e);
        }
        self.manager.commit_or_rollback(txn)
    }

    /// Abort a manual transaction, discarding its changes
    pub fn abort_transaction(&self, txn: &mut TransactionContext) -> AnnalsResult<()> {
        self.manager.abort(txn, "Aborted by caller")
    }

    // ========================================================================
    // Graceful Shutdown
    // ========================================================================

    /// fsync the revision log
    pub fn flush(&self) -> AnnalsResult<()> {
        self.manager.sync()
    }

    /// Stop accepting commits and flush the revision log
    ///
    /// Audit queries keep working after shutdown.
    ///
    /// ```text
    /// db.shutdown()?;
    /// assert!(!db.is_open());
    /// ```
    pub fn shutdown(&self) -> AnnalsResult<()> {
        self.accepting_transactions.store(false, Ordering::SeqCst);
        self.flush()?;
        info!(target: "annals::db", path = ?self.data_dir, "Database shut down");
        Ok(())
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            warn!(target: "annals::db", error = %e, "Failed to flush revision log on drop");
        }

        // Remove our own registry entry; a newer instance may have replaced it
        if !self.is_ephemeral() {
            let mut registry = OPEN_DATABASES.lock();
            if let Some(weak) = registry.get(&self.data_dir) {
                if weak.strong_count() == 0 {
                    registry.remove(&self.data_dir);
                }
            }
        }
    }
}

/// Take the exclusive process lock on `<dir>/LOCK`
fn acquire_lock(dir: &Path) -> AnnalsResult<File> {
    let lock_path = dir.join(LOCK_FILE_NAME);
    let lock_file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .read(true)
        .write(true)
        .open(&lock_path)?;
    fs2::FileExt::try_lock_exclusive(&lock_file).map_err(|_| {
        AnnalsError::invalid_state(format!(
            "Database at '{}' is already in use by another process",
            dir.display()
        ))
    })?;
    Ok(lock_file)
}
