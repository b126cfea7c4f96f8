//! Revision log replay on open
//!
//! Records are applied in log order with the same `Stores::apply` the
//! commit path uses, so a recovered database is indistinguishable from the
//! one that wrote the log. A torn or damaged tail is cut off before the
//! writer reopens the file; everything before it is kept.

use std::path::{Path, PathBuf};

use annals_concurrency::{AuditSettings, ResumePoint, Stores};
use annals_core::AnnalsResult;
use annals_durability::{truncate_wal, ReadStopReason, WalReader};
use tracing::{info, warn};

/// Summary of one replay
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RecoveryOutcome {
    /// Where transaction ids and timestamps resume
    pub resume: ResumePoint,
    /// Commit records applied
    pub commits_replayed: usize,
    /// Of those, records that created a revision
    pub revisions_replayed: usize,
    /// Bytes cut from the end of the log
    pub truncated_bytes: u64,
    /// UUID from the log header, `None` for a new log
    pub database_uuid: Option<[u8; 16]>,
}

/// Replays `revisions.wal` into empty stores
#[derive(Debug, Clone)]
pub struct RevisionLogRecovery {
    wal_path: PathBuf,
    settings: AuditSettings,
}

impl RevisionLogRecovery {
    /// Recovery for the log at `wal_path`
    pub fn new(wal_path: impl AsRef<Path>, settings: AuditSettings) -> Self {
        RevisionLogRecovery {
            wal_path: wal_path.as_ref().to_path_buf(),
            settings,
        }
    }

    /// Read, truncate if needed, and apply every intact record
    ///
    /// # Errors
    ///
    /// A bad header, an undecodable payload behind a valid checksum, or a
    /// record that breaks revision ordering is corruption and fails the
    /// open. Nothing is truncated in that case.
    pub fn run(&self, stores: &Stores) -> AnnalsResult<RecoveryOutcome> {
        let result = WalReader::new().read(&self.wal_path)?;

        let mut outcome = RecoveryOutcome {
            database_uuid: result.header.as_ref().map(|h| h.database_uuid),
            ..RecoveryOutcome::default()
        };

        for record in &result.records {
            stores.apply(record, self.settings)?;
            outcome.commits_replayed += 1;
            outcome.resume.max_txn_id = outcome.resume.max_txn_id.max(record.txn_id);
            if let Some(revision) = &record.revision {
                outcome.revisions_replayed += 1;
                outcome.resume.last_timestamp = revision.timestamp;
            }
        }

        if result.needs_truncation() {
            outcome.truncated_bytes = result.file_len - result.valid_end;
            let reason = match &result.stop_reason {
                ReadStopReason::PartialRecord { .. } => "torn write",
                ReadStopReason::Damaged { .. } => "damaged frame",
                ReadStopReason::EndOfData => "unknown",
            };
            warn!(
                target: "annals::recovery",
                path = ?self.wal_path,
                valid_end = result.valid_end,
                truncated_bytes = outcome.truncated_bytes,
                reason,
                "Truncating revision log tail"
            );
            truncate_wal(&self.wal_path, result.valid_end)?;
        }

        if outcome.commits_replayed > 0 {
            info!(
                target: "annals::recovery",
                commits = outcome.commits_replayed,
                revisions = outcome.revisions_replayed,
                latest_revision = stores.revisions.latest_number().as_u64(),
                "Replayed revision log"
            );
        }
        Ok(outcome)
    }
}
