// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Canonical State Encoding
//!
//! The byte string that is signed by the server and checked by clients:
//!
//! ```text
//! [tx_id: u64 big-endian][tx_hash: 32 bytes]
//! ```
//!
//! This layout is frozen. Changing it invalidates every signature ever issued.

use byteorder::{BigEndian, ByteOrder};

pub const HASH_SIZE: usize = 32;
pub const STATE_ENCODED_LEN: usize = 8 + HASH_SIZE;

pub type TxHash = [u8; HASH_SIZE];

/// Encode a ledger head into its 40-byte signable form.
pub fn encode_state(tx_id: u64, tx_hash: &TxHash) -> [u8; STATE_ENCODED_LEN] {
    let mut out = [0u8; STATE_ENCODED_LEN];
    BigEndian::write_u64(&mut out[..8], tx_id);
    out[8..].copy_from_slice(tx_hash);
    out
}

/// Inverse of [`encode_state`]. Returns `None` unless `bytes` is exactly 40 bytes long.
pub fn decode_state(bytes: &[u8]) -> Option<(u64, TxHash)> {
    if bytes.len() != STATE_ENCODED_LEN {
        return None;
    }
    let tx_id = BigEndian::read_u64(&bytes[..8]);
    let mut tx_hash = [0u8; HASH_SIZE];
    tx_hash.copy_from_slice(&bytes[8..]);
    Some((tx_id, tx_hash))
}
