// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Ledger State definition.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::error::{KernelError, KernelResult};
use crate::state::codec::TxHash;
use crate::state::immutable::ImmutableState;
use crate::tx::{Entry, Tx};
use crate::verify::check_link;

/// One committed value of a key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyVersion {
    pub tx_id: u64,
    #[serde(with = "crate::encoding::base64_bytes")]
    pub value: Vec<u8>,
}

/// In-memory indexed view of a committed transaction history.
///
/// Transaction `n` lives at `txs[n - 1]`; `hashes` mirrors `txs` so the head
/// and any historical state are O(1).
#[derive(Debug, Clone, Default)]
pub struct LedgerState {
    txs: Vec<Tx>,
    hashes: Vec<TxHash>,
    index: FxHashMap<Vec<u8>, Vec<KeyVersion>>,
}

impl LedgerState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from a committed history, re-checking every link.
    pub fn from_txs(txs: impl IntoIterator<Item = Tx>) -> KernelResult<Self> {
        let mut state = Self::new();
        for tx in txs {
            state.apply(tx)?;
        }
        Ok(state)
    }

    // --- Read APIs ---

    pub fn height(&self) -> u64 {
        self.txs.len() as u64
    }

    pub fn head(&self) -> ImmutableState {
        match self.hashes.last() {
            Some(hash) => ImmutableState::new(self.height(), *hash),
            None => ImmutableState::genesis(),
        }
    }

    /// Head as of `tx_id`; `0` is the genesis state.
    pub fn state_at(&self, tx_id: u64) -> KernelResult<ImmutableState> {
        if tx_id == 0 {
            return Ok(ImmutableState::genesis());
        }
        self.hashes
            .get((tx_id - 1) as usize)
            .map(|hash| ImmutableState::new(tx_id, *hash))
            .ok_or(KernelError::TxNotFound(tx_id))
    }

    pub fn tx(&self, tx_id: u64) -> KernelResult<&Tx> {
        if tx_id == 0 {
            return Err(KernelError::TxNotFound(0));
        }
        self.txs
            .get((tx_id - 1) as usize)
            .ok_or(KernelError::TxNotFound(tx_id))
    }

    /// Latest committed value of `key`.
    pub fn get(&self, key: &[u8]) -> KernelResult<&KeyVersion> {
        self.index
            .get(key)
            .and_then(|versions| versions.last())
            .ok_or(KernelError::KeyNotFound)
    }

    /// Every committed value of `key`, oldest first.
    pub fn history(&self, key: &[u8]) -> KernelResult<&[KeyVersion]> {
        self.index
            .get(key)
            .map(|versions| versions.as_slice())
            .ok_or(KernelError::KeyNotFound)
    }

    // --- Write APIs ---

    /// Build the transaction that would extend the current head with `entries`.
    pub fn build_tx(&self, entries: Vec<Entry>) -> KernelResult<Tx> {
        let head = self.head();
        Tx::new(head.tx_id + 1, head.tx_hash, entries)
    }

    /// Check that `tx` extends the current head.
    pub fn check_link(&self, tx: &Tx) -> KernelResult<()> {
        tx.validate()?;
        check_link(&self.head(), tx)
    }

    /// Append `tx` to the in-memory history. The caller is responsible for
    /// having made it durable first.
    pub fn apply(&mut self, tx: Tx) -> KernelResult<ImmutableState> {
        self.check_link(&tx)?;

        let hash = tx.hash();
        let tx_id = tx.header.id;
        for entry in &tx.entries {
            self.index
                .entry(entry.key.clone())
                .or_default()
                .push(KeyVersion {
                    tx_id,
                    value: entry.value.clone(),
                });
        }
        self.txs.push(tx);
        self.hashes.push(hash);

        Ok(ImmutableState::new(tx_id, hash))
    }
}
