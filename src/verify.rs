// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Deterministic Hashing and Chain Verification.

use crate::error::{KernelError, KernelResult};
use crate::state::codec::TxHash;
use crate::state::immutable::ImmutableState;
use crate::tx::{Entry, Tx, TxHeader};

/// Computes the content hash of a transaction.
///
/// **Scope**: the hash covers the header and every entry in order:
/// - id (u64 BE)
/// - prev_hash (the predecessor's hash, which chains the whole history)
/// - entry count (u32 BE)
/// - each entry as length-prefixed key then length-prefixed value
///
/// Since `prev_hash` is folded in, the result summarizes all entries up to
/// and including this transaction.
pub fn tx_hash(header: &TxHeader, entries: &[Entry]) -> TxHash {
    let mut hasher = blake3::Hasher::new();

    hasher.update(&header.id.to_be_bytes());
    hasher.update(&header.prev_hash);
    hasher.update(&header.nentries.to_be_bytes());

    for entry in entries {
        hasher.update(&(entry.key.len() as u32).to_be_bytes());
        hasher.update(&entry.key);
        hasher.update(&(entry.value.len() as u32).to_be_bytes());
        hasher.update(&entry.value);
    }

    *hasher.finalize().as_bytes()
}

/// Check that `tx` extends `head` by exactly one link.
pub fn check_link(head: &ImmutableState, tx: &Tx) -> KernelResult<()> {
    let expected = head.tx_id + 1;
    if tx.header.id != expected {
        return Err(KernelError::ChainDiscontinuity {
            expected,
            found: tx.header.id,
        });
    }
    if tx.header.prev_hash != head.tx_hash {
        return Err(KernelError::PredecessorMismatch { tx_id: tx.header.id });
    }
    Ok(())
}

/// Check that `tx` is the content behind `declared`.
pub fn check_declared(tx: &Tx, declared: &ImmutableState) -> KernelResult<()> {
    if declared.tx_id != tx.header.id {
        return Err(KernelError::ChainDiscontinuity {
            expected: tx.header.id,
            found: declared.tx_id,
        });
    }
    if tx.hash() != declared.tx_hash {
        return Err(KernelError::ContentHashMismatch { tx_id: tx.header.id });
    }
    Ok(())
}
