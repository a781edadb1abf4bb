// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use crate::error::KernelError;
use crate::proof::{verify_inclusion, EntryProof};
use crate::signer::StateSigner;
use crate::state::ledger::LedgerState;
use crate::tx::Entry;

#[test]
fn test_inclusion_verifies_against_signed_state() {
    let mut ledger = LedgerState::new();
    let tx = ledger
        .build_tx(vec![Entry::new("key1", "value1"), Entry::new("key2", "value2")])
        .unwrap();
    let state = ledger.apply(tx.clone()).unwrap();

    let signer = StateSigner::from_seed([3; 32]);
    let proof = EntryProof {
        tx,
        state: signer.sign(&state),
    };

    assert_eq!(proof.verify(b"key2", b"value2"), Ok(()));
    assert_eq!(proof.state.check_signature(), Ok(true));
}

#[test]
fn test_inclusion_rejects_tampering() {
    let mut ledger = LedgerState::new();
    let tx = ledger.build_tx(vec![Entry::new("key1", "value1")]).unwrap();
    let state = ledger.apply(tx.clone()).unwrap();

    assert_eq!(
        verify_inclusion(&tx, &state, b"key1", b"forged"),
        Err(KernelError::ContentHashMismatch { tx_id: 1 })
    );
    assert_eq!(
        verify_inclusion(&tx, &state, b"nope", b"value1"),
        Err(KernelError::KeyNotFound)
    );

    let mut altered = tx.clone();
    altered.entries[0].value = b"forged".to_vec();
    assert_eq!(
        verify_inclusion(&altered, &state, b"key1", b"forged"),
        Err(KernelError::ContentHashMismatch { tx_id: 1 })
    );
}
