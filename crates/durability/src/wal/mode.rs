//! Durability mode configuration
//!
//! Controls whether commits reach the revision log and when it is fsynced.

use std::fmt;

/// Durability mode for the revision log
///
/// | Mode | Log file | fsync | Data Loss Window |
/// |------|----------|-------|------------------|
/// | Cache | none | never | everything |
/// | Always | yes | every commit | none |
/// | Standard | yes | every N commits or T ms | up to interval/batch |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DurabilityMode {
    /// No log file; history lives only as long as the process
    Cache,

    /// fsync after every commit
    Always,

    /// fsync once `batch_size` commits or `interval_ms` have passed
    ///
    /// Frames are written to the file on every commit, so a process crash
    /// loses nothing; a machine crash may lose the unsynced tail.
    Standard {
        /// Maximum time between fsyncs in milliseconds
        interval_ms: u64,
        /// Maximum commits between fsyncs
        batch_size: usize,
    },
}

impl DurabilityMode {
    /// True unless the mode is `Cache`
    pub fn requires_wal(&self) -> bool {
        !matches!(self, DurabilityMode::Cache)
    }

    /// True only for `Always`
    pub fn requires_immediate_fsync(&self) -> bool {
        matches!(self, DurabilityMode::Always)
    }

    /// `Standard { interval_ms: 100, batch_size: 1000 }`
    pub fn standard_default() -> Self {
        DurabilityMode::Standard {
            interval_ms: 100,
            batch_size: 1000,
        }
    }

    /// Parse the name used in `annals.toml`
    ///
    /// Accepts `"cache"`, `"always"` and `"standard"` (case-insensitive).
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "cache" => Some(DurabilityMode::Cache),
            "always" => Some(DurabilityMode::Always),
            "standard" => Some(Self::standard_default()),
            _ => None,
        }
    }

    /// Name used in `annals.toml`
    pub fn name(&self) -> &'static str {
        match self {
            DurabilityMode::Cache => "cache",
            DurabilityMode::Always => "always",
            DurabilityMode::Standard { .. } => "standard",
        }
    }
}

impl Default for DurabilityMode {
    fn default() -> Self {
        Self::standard_default()
    }
}

impl fmt::Display for DurabilityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
