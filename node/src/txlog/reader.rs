// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use std::path::Path;
use tessera_kernel::tx::Tx;

use super::{validate_header, Result, HEADER_LEN, RECORD_PREFIX_LEN};

/// Result of scanning a log file.
#[derive(Debug)]
pub struct LogScan {
    pub txs: Vec<Tx>,
    /// Byte offset just past the last whole, checksummed record.
    pub valid_len: u64,
    pub file_len: u64,
}

impl LogScan {
    pub fn has_torn_tail(&self) -> bool {
        self.valid_len < self.file_len
    }
}

/// Read every intact record of the log at `path`.
///
/// Scanning stops at the first short, corrupt or undecodable record; everything
/// from there on is reported as tail garbage through `valid_len`.
pub fn scan_log(path: impl AsRef<Path>) -> Result<LogScan> {
    let buffer = std::fs::read(path.as_ref())?;
    validate_header(&buffer)?;

    let mut txs = Vec::new();
    let mut offset = HEADER_LEN;

    while offset + RECORD_PREFIX_LEN <= buffer.len() {
        let len = u32::from_le_bytes(buffer[offset..offset + 4].try_into().unwrap_or([0; 4])) as usize;
        let crc = u32::from_le_bytes(buffer[offset + 4..offset + 8].try_into().unwrap_or([0; 4]));
        let start = offset + RECORD_PREFIX_LEN;
        let end = start + len;

        if end > buffer.len() {
            tracing::warn!("Tx log: truncated record at offset {}", offset);
            break;
        }

        let payload = &buffer[start..end];
        if crc32fast::hash(payload) != crc {
            tracing::warn!("Tx log: checksum mismatch at offset {}", offset);
            break;
        }

        match bincode::serde::decode_from_slice::<Tx, _>(payload, bincode::config::standard()) {
            Ok((tx, _)) => txs.push(tx),
            Err(e) => {
                tracing::warn!("Tx log: decode error at offset {}: {}", offset, e);
                break;
            }
        }

        offset = end;
    }

    Ok(LogScan {
        txs,
        valid_len: offset as u64,
        file_len: buffer.len() as u64,
    })
}
