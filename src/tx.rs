// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Ledger Transactions
//!
//! A transaction is the unit of commit and of replication. Its identity is
//! `header.id`; its position in history is pinned by `header.prev_hash`, the
//! hash of the transaction right before it.

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use crate::error::{KernelError, KernelResult};
use crate::state::codec::TxHash;
use crate::state::immutable::ImmutableState;
use crate::verify::tx_hash;

pub const MAX_KEY_LEN: usize = 1024;
pub const MAX_VALUE_LEN: usize = 4 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    #[serde(with = "crate::encoding::base64_bytes")]
    pub key: Vec<u8>,
    #[serde(with = "crate::encoding::base64_bytes")]
    pub value: Vec<u8>,
}

impl Entry {
    pub fn new(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxHeader {
    pub id: u64,
    #[serde(with = "crate::encoding::hex32")]
    pub prev_hash: TxHash,
    pub nentries: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tx {
    pub header: TxHeader,
    pub entries: Vec<Entry>,
}

impl Tx {
    /// Build a transaction, rejecting entry sets that could never be committed.
    pub fn new(id: u64, prev_hash: TxHash, entries: Vec<Entry>) -> KernelResult<Self> {
        validate_entries(&entries)?;
        Ok(Self {
            header: TxHeader {
                id,
                prev_hash,
                nentries: entries.len() as u32,
            },
            entries,
        })
    }

    pub fn id(&self) -> u64 {
        self.header.id
    }

    pub fn hash(&self) -> TxHash {
        tx_hash(&self.header, &self.entries)
    }

    /// Unsigned head state this transaction produces.
    pub fn state(&self) -> ImmutableState {
        ImmutableState::new(self.header.id, self.hash())
    }

    pub fn entry(&self, key: &[u8]) -> Option<&Entry> {
        self.entries.iter().find(|e| e.key == key)
    }

    /// Structural checks for a transaction received from elsewhere.
    pub fn validate(&self) -> KernelResult<()> {
        validate_entries(&self.entries)?;
        if self.header.nentries as usize != self.entries.len() {
            return Err(KernelError::ContentHashMismatch { tx_id: self.header.id });
        }
        Ok(())
    }
}

pub fn validate_entries(entries: &[Entry]) -> KernelResult<()> {
    if entries.is_empty() {
        return Err(KernelError::EmptyTransaction);
    }

    let mut seen = FxHashSet::default();
    for entry in entries {
        if entry.key.is_empty() {
            return Err(KernelError::EmptyKey);
        }
        if entry.key.len() > MAX_KEY_LEN {
            return Err(KernelError::KeyTooLarge { max: MAX_KEY_LEN });
        }
        if entry.value.len() > MAX_VALUE_LEN {
            return Err(KernelError::ValueTooLarge { max: MAX_VALUE_LEN });
        }
        if !seen.insert(entry.key.as_slice()) {
            return Err(KernelError::DuplicateKey);
        }
    }
    Ok(())
}
