// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Immutable ledger head and its signature check.

use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};

use crate::error::VerifyError;
use crate::state::codec::{encode_state, TxHash, STATE_ENCODED_LEN};

/// Signature over the 40-byte state encoding, plus the key that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateSignature {
    #[serde(with = "crate::encoding::hex_bytes")]
    pub signature: Vec<u8>,
    #[serde(default, with = "crate::encoding::hex_opt")]
    pub public_key: Option<Vec<u8>>,
}

/// A ledger head: `(tx_id, tx_hash)` with an optional server signature.
///
/// Produced after every committed write or proof request and never mutated
/// afterwards. Anyone holding the public key can run [`ImmutableState::check_signature`]
/// without trusting the server that returned it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImmutableState {
    pub tx_id: u64,
    #[serde(with = "crate::encoding::hex32")]
    pub tx_hash: TxHash,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<StateSignature>,
}

impl ImmutableState {
    pub fn new(tx_id: u64, tx_hash: TxHash) -> Self {
        Self {
            tx_id,
            tx_hash,
            signature: None,
        }
    }

    /// Head of an empty ledger.
    pub fn genesis() -> Self {
        Self::new(0, [0u8; 32])
    }

    pub fn to_bytes(&self) -> [u8; STATE_ENCODED_LEN] {
        encode_state(self.tx_id, &self.tx_hash)
    }

    /// True when both states name the same head, signatures aside.
    pub fn same_head(&self, other: &ImmutableState) -> bool {
        self.tx_id == other.tx_id && self.tx_hash == other.tx_hash
    }

    pub fn unsigned(&self) -> Self {
        Self::new(self.tx_id, self.tx_hash)
    }

    /// Verify the embedded signature with the embedded public key.
    ///
    /// `Ok(false)` means the signature is well formed but does not match this state.
    pub fn check_signature(&self) -> Result<bool, VerifyError> {
        let sig = self.signature.as_ref().ok_or(VerifyError::MissingSignature)?;
        let public_key = sig
            .public_key
            .as_deref()
            .ok_or(VerifyError::MissingPublicKey)?;

        verify_signature(&self.to_bytes(), &sig.signature, public_key)
    }

    /// Verify against a key the caller already trusts.
    ///
    /// An embedded public key, if present, must be that same key.
    pub fn verify_with_key(&self, key: &VerifyingKey) -> Result<bool, VerifyError> {
        let sig = self.signature.as_ref().ok_or(VerifyError::MissingSignature)?;
        if let Some(embedded) = &sig.public_key {
            if embedded.as_slice() != key.as_bytes() {
                return Err(VerifyError::SignatureMismatch);
            }
        }
        verify_with(key, &self.to_bytes(), &sig.signature)
    }
}

/// Ed25519 check of `signature` over `message` by `public_key`.
pub fn verify_signature(
    message: &[u8],
    signature: &[u8],
    public_key: &[u8],
) -> Result<bool, VerifyError> {
    let key_bytes: [u8; 32] = public_key.try_into().map_err(|_| {
        VerifyError::Crypto(format!("invalid public key length {}", public_key.len()))
    })?;
    let key = VerifyingKey::from_bytes(&key_bytes).map_err(|e| VerifyError::Crypto(e.to_string()))?;
    verify_with(&key, message, signature)
}

fn verify_with(key: &VerifyingKey, message: &[u8], signature: &[u8]) -> Result<bool, VerifyError> {
    let sig = Signature::from_slice(signature).map_err(|e| VerifyError::Crypto(e.to_string()))?;
    Ok(key.verify(message, &sig).is_ok())
}
