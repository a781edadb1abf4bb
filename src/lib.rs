// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.

//! tessera-kernel: deterministic core of a tamper-evident ledger.
//!
//! Everything in this crate is a pure function of its inputs: the 40-byte state
//! encoding, signature checks, the transaction hash chain and the in-memory
//! indexed ledger. Durability and networking live in `tessera-node`.

pub mod encoding;
pub mod error;
pub mod proof;
pub mod signer;
pub mod state;
pub mod tx;
pub mod verify;

pub use error::{KernelError, KernelResult, VerifyError};
pub use state::codec::{encode_state, TxHash, HASH_SIZE, STATE_ENCODED_LEN};
pub use state::immutable::{ImmutableState, StateSignature};
pub use state::ledger::{KeyVersion, LedgerState};
pub use tx::{Entry, Tx, TxHeader};

#[cfg(test)]
pub mod tests;
