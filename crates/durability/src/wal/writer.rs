//! Revision log writer
//!
//! Appends one frame per committed transaction and fsyncs according to the
//! configured [`DurabilityMode`]. In `Cache` mode the writer owns no file
//! and every call is a no-op.

use super::DurabilityMode;
use crate::format::{encode_frame, WalHeader, WAL_HEADER_SIZE};
use annals_core::{AnnalsError, AnnalsResult, CommitRecord, Timestamp};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, error, warn};

/// Cumulative writer counters, never reset
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WalCounters {
    /// Frames appended
    pub appends: u64,
    /// fsync calls
    pub syncs: u64,
    /// Bytes written, header excluded
    pub bytes_written: u64,
}

/// Append-only writer for `revisions.wal`
#[derive(Debug)]
pub struct WalWriter {
    /// `None` in `Cache` mode
    file: Option<File>,
    path: PathBuf,
    durability: DurabilityMode,
    database_uuid: [u8; 16],
    writes_since_sync: usize,
    last_sync_time: Instant,
    has_unsynced_data: bool,
    counters: WalCounters,
    /// Set when a failed append could not be rolled back
    poisoned: bool,
    #[cfg(test)]
    fail_next_append_after: Option<usize>,
}

impl WalWriter {
    /// Open the log at `path` for appending, creating it if needed
    ///
    /// A new or empty file gets a header carrying `database_uuid`. An
    /// existing file keeps its header and the UUID stored there wins.
    /// Callers truncate any torn tail before opening.
    pub fn open(
        path: impl AsRef<Path>,
        database_uuid: [u8; 16],
        durability: DurabilityMode,
    ) -> AnnalsResult<Self> {
        let path = path.as_ref().to_path_buf();
        let mut writer = WalWriter {
            file: None,
            path,
            durability,
            database_uuid,
            writes_since_sync: 0,
            last_sync_time: Instant::now(),
            has_unsynced_data: false,
            counters: WalCounters::default(),
            poisoned: false,
            #[cfg(test)]
            fail_next_append_after: None,
        };
        if !durability.requires_wal() {
            return Ok(writer);
        }

        if let Some(parent) = writer.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(&writer.path)?;

        let len = file.metadata()?.len();
        if len == 0 {
            let header = WalHeader::new(Timestamp::now().as_micros(), database_uuid);
            file.write_all(&header.to_bytes())?;
            file.sync_all()?;
            debug!(target: "annals::wal", path = ?writer.path, "Created revision log");
        } else {
            let mut bytes = [0u8; WAL_HEADER_SIZE];
            file.read_exact(&mut bytes)?;
            let header = WalHeader::from_bytes(&bytes).map_err(|e| {
                AnnalsError::corruption(format!("{}: {}", writer.path.display(), e))
            })?;
            writer.database_uuid = header.database_uuid;
        }
        file.seek(SeekFrom::End(0))?;

        writer.file = Some(file);
        Ok(writer)
    }

    /// Append one committed transaction
    ///
    /// A failed write is cut back off the file, so the next append starts
    /// on a frame boundary. If that rollback fails too the writer refuses
    /// every later append.
    pub fn append(&mut self, record: &CommitRecord) -> AnnalsResult<()> {
        if self.poisoned {
            return Err(AnnalsError::invalid_state(format!(
                "{}: revision log has a partial frame after a failed write; reopen the database",
                self.path.display()
            )));
        }
        if self.file.is_none() {
            return Ok(());
        }

        let frame = encode_frame(&record.to_bytes()?);
        self.write_frame_or_rewind(&frame)?;

        self.counters.appends += 1;
        self.counters.bytes_written += frame.len() as u64;
        self.writes_since_sync += 1;
        self.has_unsynced_data = true;

        self.maybe_sync()?;
        Ok(())
    }

    fn write_frame_or_rewind(&mut self, frame: &[u8]) -> AnnalsResult<()> {
        #[cfg(test)]
        let fail_after = self.fail_next_append_after.take();
        let Some(file) = self.file.as_mut() else {
            return Ok(());
        };

        let offset = file.stream_position()?;
        #[cfg(test)]
        let result = match fail_after {
            Some(n) => file
                .write_all(&frame[..n.min(frame.len())])
                .and_then(|_| {
                    Err(std::io::Error::new(
                        std::io::ErrorKind::Other,
                        "simulated write failure",
                    ))
                }),
            None => file.write_all(frame),
        };
        #[cfg(not(test))]
        let result = file.write_all(frame);

        let Err(write_err) = result else {
            return Ok(());
        };
        let rewind = file
            .set_len(offset)
            .and_then(|_| file.seek(SeekFrom::Start(offset)).map(|_| ()));
        match rewind {
            Ok(()) => warn!(
                target: "annals::wal",
                path = ?self.path,
                offset,
                error = %write_err,
                "Revision log append failed; partial frame removed"
            ),
            Err(rewind_err) => {
                self.poisoned = true;
                error!(
                    target: "annals::wal",
                    path = ?self.path,
                    offset,
                    error = %write_err,
                    rewind_error = %rewind_err,
                    "Revision log append failed and could not be rolled back"
                );
            }
        }
        Err(write_err.into())
    }

    fn maybe_sync(&mut self) -> AnnalsResult<()> {
        match self.durability {
            DurabilityMode::Always => self.sync(),
            DurabilityMode::Standard {
                interval_ms,
                batch_size,
            } => {
                let overdue = self.last_sync_time.elapsed().as_millis() as u64 >= interval_ms;
                if self.writes_since_sync >= batch_size || overdue {
                    self.sync()
                } else {
                    Ok(())
                }
            }
            DurabilityMode::Cache => Ok(()),
        }
    }

    /// fsync any unsynced frames
    pub fn sync(&mut self) -> AnnalsResult<()> {
        if !self.has_unsynced_data {
            return Ok(());
        }
        if let Some(file) = self.file.as_mut() {
            file.flush()?;
            file.sync_data()?;
            self.counters.syncs += 1;
        }
        self.writes_since_sync = 0;
        self.last_sync_time = Instant::now();
        self.has_unsynced_data = false;
        Ok(())
    }

    /// Path of the log file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Identity stored in the file header
    pub fn database_uuid(&self) -> [u8; 16] {
        self.database_uuid
    }

    /// Configured mode
    pub fn durability(&self) -> DurabilityMode {
        self.durability
    }

    /// True when frames were written but not fsynced
    pub fn has_unsynced_data(&self) -> bool {
        self.has_unsynced_data
    }

    /// Lifetime counters
    pub fn counters(&self) -> WalCounters {
        self.counters
    }
}

impl Drop for WalWriter {
    fn drop(&mut self) {
        if let Err(e) = self.sync() {
            tracing::warn!(target: "annals::wal", error = %e, "Final revision log sync failed");
        }
    }
}
