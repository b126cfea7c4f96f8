//! Database builder for fluent configuration
//!
//! Starts from `annals.toml` (or the defaults for an ephemeral database)
//! and overrides individual settings for one open. Overrides are not
//! written back to the config file.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use annals_concurrency::Clock;
use annals_core::{AnnalsError, AnnalsResult, RevisionListener};
use annals_durability::DurabilityMode;

use super::config::{AnnalsConfig, CONFIG_FILE_NAME};
use super::{Database, OpenParams};

// ============================================================================
// Database Builder Pattern
// ============================================================================

/// Builder for Database configuration
///
/// # Ways to Open a Database
///
/// ```ignore
/// use annals_engine::Database;
///
/// // 1. Settings from annals.toml
/// let db = Database::open("/data/audit")?;
///
/// // 2. Builder with overrides and hooks
/// let db = Database::builder()
///     .path("/data/audit")
///     .always()
///     .store_data_at_delete(true)
///     .revision_listener(Arc::new(UserListener))
///     .open()?;
///
/// // 3. Ephemeral (no files)
/// let db = Database::builder().clock(clock).ephemeral()?;
/// ```
#[derive(Default)]
pub struct DatabaseBuilder {
    path: Option<PathBuf>,
    durability: Option<DurabilityMode>,
    store_data_at_delete: Option<bool>,
    track_changed_entities: Option<bool>,
    clock: Option<Arc<dyn Clock>>,
    listener: Option<Arc<dyn RevisionListener>>,
}

impl fmt::Debug for DatabaseBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseBuilder")
            .field("path", &self.path)
            .field("durability", &self.durability)
            .field("store_data_at_delete", &self.store_data_at_delete)
            .field("track_changed_entities", &self.track_changed_entities)
            .field("clock", &self.clock)
            .field("has_listener", &self.listener.is_some())
            .finish()
    }
}

impl DatabaseBuilder {
    /// Builder with nothing overridden
    pub fn new() -> Self {
        Self::default()
    }

    /// Set database path
    ///
    /// Required for `open()`.
    pub fn path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Override the durability mode
    pub fn durability(mut self, mode: DurabilityMode) -> Self {
        self.durability = Some(mode);
        self
    }

    /// fsync on every commit
    pub fn always(self) -> Self {
        self.durability(DurabilityMode::Always)
    }

    /// Periodic fsync (100ms or 1000 commits)
    pub fn standard(self) -> Self {
        self.durability(DurabilityMode::standard_default())
    }

    /// Keep the last entity state in deletion snapshots
    pub fn store_data_at_delete(mut self, enabled: bool) -> Self {
        self.store_data_at_delete = Some(enabled);
        self
    }

    /// Record which entities each revision changed
    pub fn track_changed_entities(mut self, enabled: bool) -> Self {
        self.track_changed_entities = Some(enabled);
        self
    }

    /// Source of commit timestamps
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Hook that fills custom revision columns
    pub fn revision_listener(mut self, listener: Arc<dyn RevisionListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Open the database at the configured path
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - No path was configured (use `.path()` or `.ephemeral()`)
    /// - `annals.toml` is unreadable or invalid
    /// - The directory is locked by another process
    /// - Revision log recovery fails
    pub fn open(self) -> AnnalsResult<Arc<Database>> {
        let path = self.path.clone().ok_or_else(|| {
            AnnalsError::invalid_input(
                "DatabaseBuilder::open() requires a path. Use ephemeral() for a database without files.",
            )
        })?;

        std::fs::create_dir_all(&path)?;
        let config_path = path.join(CONFIG_FILE_NAME);
        AnnalsConfig::write_default_if_missing(&config_path)?;
        let base = AnnalsConfig::from_file(&config_path)?;

        Database::open_at(&path, self.finish(base))
    }

    /// Open an in-memory database with no files
    ///
    /// The durability override is ignored; nothing is ever written.
    pub fn ephemeral(self) -> AnnalsResult<Arc<Database>> {
        Database::ephemeral_with(self.finish(AnnalsConfig::default()))
    }

    fn finish(self, mut config: AnnalsConfig) -> OpenParams {
        if let Some(mode) = self.durability {
            config.durability = mode.name().to_string();
        }
        if let Some(enabled) = self.store_data_at_delete {
            config.store_data_at_delete = enabled;
        }
        if let Some(enabled) = self.track_changed_entities {
            config.track_changed_entities = enabled;
        }
        OpenParams {
            config,
            durability: self.durability,
            clock: self.clock,
            listener: self.listener,
        }
    }
}
