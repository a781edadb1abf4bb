// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Server-side state signing.

use ed25519_dalek::{Signer, SigningKey, VerifyingKey};

use crate::error::VerifyError;
use crate::state::immutable::{ImmutableState, StateSignature};

/// Ed25519 signer for ledger heads.
#[derive(Clone)]
pub struct StateSigner {
    key: SigningKey,
}

impl StateSigner {
    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self {
            key: SigningKey::from_bytes(&seed),
        }
    }

    /// Parse a hex-encoded 32-byte seed (surrounding whitespace ignored).
    pub fn from_hex(seed_hex: &str) -> Result<Self, VerifyError> {
        let raw = hex::decode(seed_hex.trim()).map_err(|e| VerifyError::Crypto(e.to_string()))?;
        let seed: [u8; 32] = raw
            .try_into()
            .map_err(|v: Vec<u8>| VerifyError::Crypto(format!("expected 32 seed bytes, got {}", v.len())))?;
        Ok(Self::from_seed(seed))
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.key.verifying_key()
    }

    pub fn public_key_bytes(&self) -> [u8; 32] {
        self.key.verifying_key().to_bytes()
    }

    /// Attach a signature (and our public key) to `state`, replacing any existing one.
    pub fn sign(&self, state: &ImmutableState) -> ImmutableState {
        let signature = self.key.sign(&state.to_bytes());
        ImmutableState {
            tx_id: state.tx_id,
            tx_hash: state.tx_hash,
            signature: Some(StateSignature {
                signature: signature.to_bytes().to_vec(),
                public_key: Some(self.public_key_bytes().to_vec()),
            }),
        }
    }
}

impl std::fmt::Debug for StateSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateSigner")
            .field("public_key", &hex::encode(self.public_key_bytes()))
            .finish()
    }
}

pub use ed25519_dalek::VerifyingKey as PublicKey;

/// Parse a hex-encoded Ed25519 public key.
pub fn parse_public_key(key_hex: &str) -> Result<VerifyingKey, VerifyError> {
    let raw = hex::decode(key_hex.trim()).map_err(|e| VerifyError::Crypto(e.to_string()))?;
    let bytes: [u8; 32] = raw
        .try_into()
        .map_err(|v: Vec<u8>| VerifyError::Crypto(format!("expected 32 public key bytes, got {}", v.len())))?;
    VerifyingKey::from_bytes(&bytes).map_err(|e| VerifyError::Crypto(e.to_string()))
}
