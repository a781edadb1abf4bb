// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Entry Inclusion Proofs.

use serde::{Deserialize, Serialize};

use crate::error::{KernelError, KernelResult};
use crate::state::immutable::ImmutableState;
use crate::tx::Tx;
use crate::verify::check_declared;

/// Everything a client needs to check a value against a signed head.
///
/// The transaction is shipped whole; the client recomputes its hash and compares
/// it with `state.tx_hash`, then checks `state`'s signature. No server cooperation
/// is needed past returning this struct.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EntryProof {
    pub tx: Tx,
    pub state: ImmutableState,
}

impl EntryProof {
    pub fn verify(&self, key: &[u8], value: &[u8]) -> KernelResult<()> {
        verify_inclusion(&self.tx, &self.state, key, value)
    }
}

/// Verify that `key = value` was committed by `tx` and that `tx` produced `state`.
pub fn verify_inclusion(tx: &Tx, state: &ImmutableState, key: &[u8], value: &[u8]) -> KernelResult<()> {
    check_declared(tx, state)?;
    match tx.entry(key) {
        Some(entry) if entry.value == value => Ok(()),
        Some(_) => Err(KernelError::ContentHashMismatch { tx_id: tx.header.id }),
        None => Err(KernelError::KeyNotFound),
    }
}
