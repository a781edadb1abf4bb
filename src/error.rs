// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Error types.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KernelError {
    /// A transaction must carry at least one entry.
    #[error("transaction has no entries")]
    EmptyTransaction,

    #[error("empty key")]
    EmptyKey,

    #[error("duplicate key in transaction")]
    DuplicateKey,

    #[error("key exceeds {max} bytes")]
    KeyTooLarge { max: usize },

    #[error("value exceeds {max} bytes")]
    ValueTooLarge { max: usize },

    /// The transaction index does not extend the local head by exactly one.
    #[error("chain discontinuity: expected tx {expected}, got tx {found}")]
    ChainDiscontinuity { expected: u64, found: u64 },

    /// The transaction's predecessor hash is not the local tail hash.
    #[error("predecessor hash mismatch at tx {tx_id}")]
    PredecessorMismatch { tx_id: u64 },

    /// Recomputed content hash differs from the declared state hash.
    #[error("content hash mismatch at tx {tx_id}")]
    ContentHashMismatch { tx_id: u64 },

    #[error("tx {0} not found")]
    TxNotFound(u64),

    #[error("key not found")]
    KeyNotFound,
}

impl KernelError {
    /// Errors meaning two ledgers disagree about history, as opposed to bad input.
    pub fn is_divergence(&self) -> bool {
        matches!(
            self,
            KernelError::ChainDiscontinuity { .. }
                | KernelError::PredecessorMismatch { .. }
                | KernelError::ContentHashMismatch { .. }
        )
    }
}

/// Failures of state signature verification.
///
/// These are always surfaced to the caller; none of them is ever treated as success.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VerifyError {
    #[error("no signature found")]
    MissingSignature,

    #[error("no public key found")]
    MissingPublicKey,

    #[error("signature was produced by a different public key")]
    SignatureMismatch,

    #[error("crypto failure: {0}")]
    Crypto(String),
}

pub type KernelResult<T> = core::result::Result<T, KernelError>;
