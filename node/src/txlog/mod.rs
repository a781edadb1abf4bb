// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Durable Transaction Log
//!
//! One append-only file per database. It is the only durable state a database
//! has: the in-memory ledger is rebuilt from it on open, and a replica's
//! replication cursor is simply the id of its last record.
//!
//! # File Format
//! ```text
//! [Header: 16 bytes][Record][Record]...
//! ```
//!
//! Header:
//! - magic: "TSRA"
//! - version: u32 LE (1)
//! - reserved: u64 (0)
//!
//! Record:
//! - len: u32 LE (payload length)
//! - crc: u32 LE (CRC32 of payload)
//! - payload: bincode-encoded `Tx`
//!
//! # Guarantees
//! - A record is fsync'd before `append` returns
//! - A torn or corrupt tail is cut back to the last whole record on open

pub mod reader;
pub mod writer;

pub use reader::{scan_log, LogScan};
pub use writer::TxLogWriter;

use thiserror::Error;

pub const LOG_MAGIC: [u8; 4] = *b"TSRA";
pub const LOG_VERSION: u32 = 1;
pub const HEADER_LEN: usize = 16;
pub const RECORD_PREFIX_LEN: usize = 8;

#[derive(Error, Debug)]
pub enum TxLogError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid header")]
    InvalidHeader,

    #[error("Record too large: {0} bytes")]
    RecordTooLarge(usize),

    #[error("Log writer disabled after a failed rollback")]
    Poisoned,
}

pub type Result<T> = std::result::Result<T, TxLogError>;

pub(crate) fn header_bytes() -> [u8; HEADER_LEN] {
    let mut bytes = [0u8; HEADER_LEN];
    bytes[0..4].copy_from_slice(&LOG_MAGIC);
    bytes[4..8].copy_from_slice(&LOG_VERSION.to_le_bytes());
    bytes
}

pub(crate) fn validate_header(bytes: &[u8]) -> Result<()> {
    if bytes.len() < HEADER_LEN || bytes[0..4] != LOG_MAGIC {
        return Err(TxLogError::InvalidHeader);
    }
    let version = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
    if version != LOG_VERSION {
        return Err(TxLogError::InvalidHeader);
    }
    Ok(())
}
