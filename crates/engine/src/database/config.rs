//! Database configuration via `annals.toml`
//!
//! On first open, a default `annals.toml` with comments is written to the
//! data directory. Edit the file and reopen to change settings. The
//! builder can override any of them for a single open.

use annals_concurrency::AuditSettings;
use annals_core::{AnnalsError, AnnalsResult};
use annals_durability::DurabilityMode;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Config file name placed in the database data directory.
pub const CONFIG_FILE_NAME: &str = "annals.toml";

/// Database configuration loaded from `annals.toml`.
///
/// # Example
///
/// ```toml
/// durability = "standard"
/// store_data_at_delete = false
/// track_changed_entities = true
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnalsConfig {
    /// Durability mode: `"standard"`, `"always"` or `"cache"`.
    #[serde(default = "default_durability_str")]
    pub durability: String,
    /// Keep the last entity state in deletion snapshots.
    #[serde(default)]
    pub store_data_at_delete: bool,
    /// Record which entities each revision changed.
    #[serde(default = "default_true")]
    pub track_changed_entities: bool,
}

fn default_durability_str() -> String {
    "standard".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for AnnalsConfig {
    fn default() -> Self {
        Self {
            durability: default_durability_str(),
            store_data_at_delete: false,
            track_changed_entities: true,
        }
    }
}

impl AnnalsConfig {
    /// Parse the durability string into a `DurabilityMode`.
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not a known mode.
    pub fn durability_mode(&self) -> AnnalsResult<DurabilityMode> {
        DurabilityMode::from_name(&self.durability).ok_or_else(|| {
            AnnalsError::invalid_input(format!(
                "Invalid durability mode '{}' in {}. Expected \"standard\", \"always\" or \"cache\".",
                self.durability, CONFIG_FILE_NAME
            ))
        })
    }

    /// Auditing switches for the transaction manager.
    pub fn audit_settings(&self) -> AuditSettings {
        AuditSettings {
            store_data_at_delete: self.store_data_at_delete,
            track_changed_entities: self.track_changed_entities,
        }
    }

    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# Annals database configuration
#
# Durability mode: "standard" (default), "always" or "cache"
#   "standard" = periodic fsync (~100ms), may lose last interval on OS crash
#   "always"   = fsync every commit, zero data loss
#   "cache"    = no revision log, history is lost on close
durability = "standard"

# Keep the entity's last state in deletion snapshots (default: false).
# When false, a deletion is recorded with no data.
store_data_at_delete = false

# Record which entities each revision changed (default: true).
# Required for changed-entity queries.
track_changed_entities = true
"#
    }

    /// Read and parse config from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> AnnalsResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            AnnalsError::internal(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        let config: AnnalsConfig = toml::from_str(&content).map_err(|e| {
            AnnalsError::invalid_input(format!(
                "Failed to parse config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        config.durability_mode()?;
        Ok(config)
    }

    /// Write the default config file if it does not already exist.
    pub fn write_default_if_missing(path: &Path) -> AnnalsResult<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml()).map_err(|e| {
                AnnalsError::internal(format!(
                    "Failed to write default config file '{}': {}",
                    path.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> AnnalsResult<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| AnnalsError::serialization(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content).map_err(|e| {
            AnnalsError::internal(format!(
                "Failed to write config file '{}': {}",
                path.display(),
                e
            ))
        })
    }
}
