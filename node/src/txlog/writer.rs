// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tessera_kernel::tx::Tx;

use super::{header_bytes, scan_log, Result, TxLogError, HEADER_LEN, RECORD_PREFIX_LEN};

/// Append-Only Transaction Log Writer
///
/// # Safety Guarantees
/// - Write + fsync before returning
/// - Only whole records survive a crash
/// - A failed append leaves nothing behind; if that cannot be guaranteed the
///   writer refuses further appends
pub struct TxLogWriter {
    path: PathBuf,
    file: BufWriter<File>,
    tx_count: u64,
    /// File length covered by durable records.
    len: u64,
    poisoned: bool,
}

impl TxLogWriter {
    /// Open or create a log file, returning the writer and the recovered history.
    ///
    /// If the file exists its header is validated, its records are read back and
    /// any torn tail is truncated away before new appends.
    pub fn open(path: impl AsRef<Path>) -> Result<(Self, Vec<Tx>)> {
        let path = path.as_ref().to_path_buf();

        let txs = if path.exists() {
            let scan = scan_log(&path)?;
            if scan.has_torn_tail() {
                tracing::warn!(
                    "Tx log {:?}: dropping {} bytes of torn tail after {} records",
                    path,
                    scan.file_len - scan.valid_len,
                    scan.txs.len()
                );
                let file = OpenOptions::new().write(true).open(&path)?;
                file.set_len(scan.valid_len)?;
                file.sync_all()?;
            }
            scan.txs
        } else {
            let mut file = OpenOptions::new().create_new(true).write(true).open(&path)?;
            file.write_all(&header_bytes())?;
            file.sync_all()?; // fsync header
            Vec::new()
        };

        let file = OpenOptions::new().append(true).open(&path)?;
        let len = file.metadata()?.len();

        Ok((
            Self {
                path,
                file: BufWriter::new(file),
                tx_count: txs.len() as u64,
                len,
                poisoned: false,
            },
            txs,
        ))
    }

    /// Append a transaction to the log
    ///
    /// Only returns Ok() after durable write
    pub fn append(&mut self, tx: &Tx) -> Result<()> {
        if self.poisoned {
            return Err(TxLogError::Poisoned);
        }

        let payload = bincode::serde::encode_to_vec(tx, bincode::config::standard())
            .map_err(|e| TxLogError::Serialization(e.to_string()))?;
        let len: u32 = payload
            .len()
            .try_into()
            .map_err(|_| TxLogError::RecordTooLarge(payload.len()))?;

        let mut prefix = [0u8; RECORD_PREFIX_LEN];
        prefix[0..4].copy_from_slice(&len.to_le_bytes());
        prefix[4..8].copy_from_slice(&crc32fast::hash(&payload).to_le_bytes());

        if let Err(e) = self.write_record(&prefix, &payload) {
            tracing::error!("Tx log {:?}: append of tx {} failed: {}", self.path, tx.id(), e);
            if let Err(rollback) = self.rollback() {
                tracing::error!("Tx log {:?}: rollback failed, refusing appends: {}", self.path, rollback);
                self.poisoned = true;
            }
            return Err(e.into());
        }

        self.len += (RECORD_PREFIX_LEN + payload.len()) as u64;
        self.tx_count += 1;
        Ok(())
    }

    fn write_record(&mut self, prefix: &[u8], payload: &[u8]) -> std::io::Result<()> {
        self.file.write_all(prefix)?;
        self.file.write_all(payload)?;

        // Flush buffer to OS
        self.file.flush()?;

        // Force fsync (critical for crash safety)
        self.file.get_ref().sync_data()
    }

    /// Cut the file back to the last durable record and drop anything still buffered.
    fn rollback(&mut self) -> std::io::Result<()> {
        let file = OpenOptions::new().append(true).open(&self.path)?;
        file.set_len(self.len)?;
        file.sync_all()?;

        let stale = std::mem::replace(&mut self.file, BufWriter::new(file));
        // into_parts hands back the unflushed bytes instead of writing them on drop
        let (_, _discarded) = stale.into_parts();
        Ok(())
    }

    pub fn tx_count(&self) -> u64 {
        self.tx_count
    }
}
