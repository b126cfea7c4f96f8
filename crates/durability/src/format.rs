//! Revision log file format
//!
//! The log is a single file, `revisions.wal`, holding one frame per
//! committed transaction.
//!
//! # File Layout
//!
//! ```text
//! ┌────────────────────────────────────┐
//! │ Header (32 bytes)                  │
//! ├────────────────────────────────────┤
//! │ Frame 1                            │
//! ├────────────────────────────────────┤
//! │ Frame 2                            │
//! ├────────────────────────────────────┤
//! │ ...                                │
//! └────────────────────────────────────┘
//! ```
//!
//! # Header Layout
//!
//! ```text
//! ┌────────────┬────────────────┬──────────────────┬──────────────────────┐
//! │ Magic (4)  │ Format Ver (4) │ Created µs (8)   │ Database UUID (16)   │
//! └────────────┴────────────────┴──────────────────┴──────────────────────┘
//! ```
//!
//! # Frame Layout
//!
//! ```text
//! ┌─────────────────┬──────────────────┬─────────────────────────┬──────────┐
//! │ Length (4 bytes)│ Format Ver (1)   │ Payload (variable)      │ CRC32 (4)│
//! └─────────────────┴──────────────────┴─────────────────────────┴──────────┘
//! ```
//!
//! Length covers format version, payload and CRC. The CRC covers format
//! version and payload. All integers are little-endian. The payload is a
//! MessagePack-encoded `CommitRecord`.

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use crc32fast::Hasher;
use std::io::{self, Write};
use thiserror::Error;

/// Magic bytes identifying a revision log: "ANLS"
pub const WAL_MAGIC: [u8; 4] = *b"ANLS";

/// Current file format version
pub const WAL_FORMAT_VERSION: u32 = 1;

/// Size of the file header in bytes
pub const WAL_HEADER_SIZE: usize = 32;

/// Current frame format version
pub const FRAME_FORMAT_VERSION: u8 = 1;

/// Frames larger than this are treated as corrupt length fields
pub const MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

/// File name of the revision log inside a database directory
pub const WAL_FILE_NAME: &str = "revisions.wal";

/// Revision log header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalHeader {
    /// Magic bytes: "ANLS"
    pub magic: [u8; 4],
    /// File format version
    pub format_version: u32,
    /// Creation time, microseconds since the Unix epoch
    pub created_micros: u64,
    /// Identity of the database that owns the file
    pub database_uuid: [u8; 16],
}

impl WalHeader {
    /// Header for a new file
    pub fn new(created_micros: u64, database_uuid: [u8; 16]) -> Self {
        WalHeader {
            magic: WAL_MAGIC,
            format_version: WAL_FORMAT_VERSION,
            created_micros,
            database_uuid,
        }
    }

    /// Serialize
    pub fn to_bytes(&self) -> [u8; WAL_HEADER_SIZE] {
        let mut bytes = [0u8; WAL_HEADER_SIZE];
        bytes[0..4].copy_from_slice(&self.magic);
        LittleEndian::write_u32(&mut bytes[4..8], self.format_version);
        LittleEndian::write_u64(&mut bytes[8..16], self.created_micros);
        bytes[16..32].copy_from_slice(&self.database_uuid);
        bytes
    }

    /// Deserialize and validate magic and version
    pub fn from_bytes(bytes: &[u8; WAL_HEADER_SIZE]) -> Result<Self, FrameError> {
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&bytes[0..4]);
        if magic != WAL_MAGIC {
            return Err(FrameError::BadMagic(magic));
        }

        let format_version = LittleEndian::read_u32(&bytes[4..8]);
        if format_version != WAL_FORMAT_VERSION {
            return Err(FrameError::UnsupportedFileVersion(format_version));
        }

        let mut database_uuid = [0u8; 16];
        database_uuid.copy_from_slice(&bytes[16..32]);

        Ok(WalHeader {
            magic,
            format_version,
            created_micros: LittleEndian::read_u64(&bytes[8..16]),
            database_uuid,
        })
    }
}

/// Frame decoding errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    /// Not enough bytes for a complete frame
    #[error("Insufficient data to parse frame")]
    InsufficientData,

    /// Length field is zero, too small, or implausibly large
    #[error("Invalid frame length: {0}")]
    InvalidLength(usize),

    /// Checksum verification failed
    #[error("Checksum mismatch: expected {expected:08x}, computed {computed:08x}")]
    ChecksumMismatch {
        /// Stored checksum
        expected: u32,
        /// Computed checksum
        computed: u32,
    },

    /// Frame written by an unknown format version
    #[error("Unsupported frame version: {0}")]
    UnsupportedVersion(u8),

    /// File does not start with the expected magic
    #[error("Bad magic bytes: {0:?}")]
    BadMagic([u8; 4]),

    /// File written by an unknown format version
    #[error("Unsupported file format version: {0}")]
    UnsupportedFileVersion(u32),
}

/// Write one frame around `payload`; returns bytes written
pub fn write_frame<W: Write>(writer: &mut W, payload: &[u8]) -> io::Result<usize> {
    let crc = {
        let mut hasher = Hasher::new();
        hasher.update(&[FRAME_FORMAT_VERSION]);
        hasher.update(payload);
        hasher.finalize()
    };
    let length = 1 + payload.len() + 4;

    writer.write_u32::<LittleEndian>(length as u32)?;
    writer.write_u8(FRAME_FORMAT_VERSION)?;
    writer.write_all(payload)?;
    writer.write_u32::<LittleEndian>(crc)?;
    Ok(4 + length)
}

/// Encode one frame into a new buffer
pub fn encode_frame(payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(payload.len() + 9);
    // Writing into a Vec cannot fail
    let _ = write_frame(&mut buf, payload);
    buf
}

/// Decode the frame at the start of `bytes`
///
/// Returns the payload and the number of bytes consumed.
pub fn decode_frame(bytes: &[u8]) -> Result<(&[u8], usize), FrameError> {
    if bytes.len() < 4 {
        return Err(FrameError::InsufficientData);
    }
    let length = LittleEndian::read_u32(&bytes[0..4]) as usize;
    if length < 5 || length > MAX_FRAME_LEN {
        return Err(FrameError::InvalidLength(length));
    }
    if bytes.len() < 4 + length {
        return Err(FrameError::InsufficientData);
    }

    let body = &bytes[4..4 + length - 4];
    let expected = LittleEndian::read_u32(&bytes[4 + length - 4..4 + length]);
    let computed = {
        let mut hasher = Hasher::new();
        hasher.update(body);
        hasher.finalize()
    };
    if expected != computed {
        return Err(FrameError::ChecksumMismatch { expected, computed });
    }

    let version = body[0];
    if version != FRAME_FORMAT_VERSION {
        return Err(FrameError::UnsupportedVersion(version));
    }

    Ok((&body[1..], 4 + length))
}
