//! Revision log reader for recovery
//!
//! Reads every intact frame in order and reports where the intact prefix
//! ends. A crash during an append leaves a torn frame at the tail; the
//! reader stops there and the caller truncates the file to `valid_end`
//! before appending again.
//!
//! Frames after a checksum failure are not replayed: revisions must stay
//! contiguous, so nothing past the first damaged frame can be trusted.

use crate::format::{decode_frame, FrameError, WalHeader, WAL_HEADER_SIZE};
use annals_core::{AnnalsError, AnnalsResult, CommitRecord};
use std::fs::OpenOptions;
use std::io::Read;
use std::path::Path;
use tracing::warn;

/// Why reading stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadStopReason {
    /// Every byte was consumed
    EndOfData,
    /// The file ends inside a frame or inside the header
    PartialRecord {
        /// Byte offset of the torn frame
        offset: u64,
    },
    /// A frame failed its checksum or carried an impossible length
    Damaged {
        /// Byte offset of the damaged frame
        offset: u64,
        /// Decoder message
        detail: String,
    },
}

/// Result of reading a revision log
#[derive(Debug, Clone)]
pub struct WalReadResult {
    /// Header, `None` when the file is missing or shorter than a header
    pub header: Option<WalHeader>,
    /// Intact records, in commit order
    pub records: Vec<CommitRecord>,
    /// Offset just past the last intact frame
    pub valid_end: u64,
    /// File length on disk
    pub file_len: u64,
    /// Why reading stopped
    pub stop_reason: ReadStopReason,
}

impl WalReadResult {
    fn empty() -> Self {
        WalReadResult {
            header: None,
            records: Vec::new(),
            valid_end: 0,
            file_len: 0,
            stop_reason: ReadStopReason::EndOfData,
        }
    }

    /// True when bytes past `valid_end` must be cut off
    pub fn needs_truncation(&self) -> bool {
        self.valid_end < self.file_len
    }
}

/// Reader for `revisions.wal`
#[derive(Debug, Default, Clone, Copy)]
pub struct WalReader;

impl WalReader {
    /// New reader
    pub fn new() -> Self {
        WalReader
    }

    /// Read all intact records from the log at `path`
    ///
    /// A missing file reads as empty. A header with the wrong magic or
    /// version, or a frame whose checksum passes but whose payload does not
    /// decode, is reported as corruption.
    pub fn read(&self, path: &Path) -> AnnalsResult<WalReadResult> {
        if !path.exists() {
            return Ok(WalReadResult::empty());
        }

        let mut buffer = Vec::new();
        OpenOptions::new()
            .read(true)
            .open(path)?
            .read_to_end(&mut buffer)?;
        let file_len = buffer.len() as u64;

        if buffer.len() < WAL_HEADER_SIZE {
            if !buffer.is_empty() {
                warn!(
                    target: "annals::wal",
                    path = ?path,
                    len = file_len,
                    "Revision log header is torn"
                );
            }
            return Ok(WalReadResult {
                file_len,
                stop_reason: if buffer.is_empty() {
                    ReadStopReason::EndOfData
                } else {
                    ReadStopReason::PartialRecord { offset: 0 }
                },
                ..WalReadResult::empty()
            });
        }

        let mut header_bytes = [0u8; WAL_HEADER_SIZE];
        header_bytes.copy_from_slice(&buffer[..WAL_HEADER_SIZE]);
        let header = WalHeader::from_bytes(&header_bytes)
            .map_err(|e| AnnalsError::corruption(format!("{}: {}", path.display(), e)))?;

        let mut records = Vec::new();
        let mut offset = WAL_HEADER_SIZE;
        let mut stop_reason = ReadStopReason::EndOfData;

        while offset < buffer.len() {
            match decode_frame(&buffer[offset..]) {
                Ok((payload, consumed)) => {
                    let record = CommitRecord::from_bytes(payload).map_err(|e| {
                        AnnalsError::corruption(format!(
                            "{}: frame at offset {} does not decode: {}",
                            path.display(),
                            offset,
                            e
                        ))
                    })?;
                    records.push(record);
                    offset += consumed;
                }
                Err(FrameError::InsufficientData) => {
                    stop_reason = ReadStopReason::PartialRecord {
                        offset: offset as u64,
                    };
                    break;
                }
                Err(FrameError::UnsupportedVersion(v)) => {
                    return Err(AnnalsError::corruption(format!(
                        "{}: frame at offset {} has unsupported version {}",
                        path.display(),
                        offset,
                        v
                    )));
                }
                Err(e) => {
                    stop_reason = ReadStopReason::Damaged {
                        offset: offset as u64,
                        detail: e.to_string(),
                    };
                    break;
                }
            }
        }

        let valid_end = offset as u64;
        if valid_end < file_len {
            warn!(
                target: "annals::wal",
                path = ?path,
                valid_end,
                file_len,
                reason = ?stop_reason,
                "Revision log has an unreadable tail"
            );
        }

        Ok(WalReadResult {
            header: Some(header),
            records,
            valid_end,
            file_len,
            stop_reason,
        })
    }
}

/// Cut the log at `path` back to `len` bytes and fsync
pub fn truncate_wal(path: &Path, len: u64) -> AnnalsResult<()> {
    let file = OpenOptions::new().write(true).open(path)?;
    file.set_len(len)?;
    file.sync_all()?;
    Ok(())
}
