// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use crate::state::codec::{decode_state, encode_state, STATE_ENCODED_LEN};
use crate::state::immutable::ImmutableState;

#[test]
fn test_encode_layout_is_big_endian_id_then_hash() {
    let mut hash = [0u8; 32];
    for (i, b) in hash.iter_mut().enumerate() {
        *b = i as u8;
    }

    let encoded = encode_state(0x0102_0304_0506_0708, &hash);

    assert_eq!(encoded.len(), STATE_ENCODED_LEN);
    assert_eq!(&encoded[..8], &[1, 2, 3, 4, 5, 6, 7, 8]);
    assert_eq!(&encoded[8..], &hash);
}

#[test]
fn test_encode_is_deterministic() {
    let hash = [0xAB; 32];
    let a = encode_state(42, &hash);
    let b = encode_state(42, &hash);
    assert_eq!(a, b);

    let state = ImmutableState::new(42, hash);
    assert_eq!(state.to_bytes(), a);
}

#[test]
fn test_encode_distinguishes_inputs() {
    let hash = [7u8; 32];
    let mut other_hash = hash;
    other_hash[31] ^= 1;

    assert_ne!(encode_state(1, &hash), encode_state(2, &hash));
    assert_ne!(encode_state(1, &hash), encode_state(1, &other_hash));
}

#[test]
fn test_decode_inverts_encode() {
    let hash = [9u8; 32];
    let encoded = encode_state(u64::MAX, &hash);
    assert_eq!(decode_state(&encoded), Some((u64::MAX, hash)));

    assert_eq!(decode_state(&encoded[..39]), None);
}

#[test]
fn test_genesis_encoding() {
    let genesis = ImmutableState::genesis();
    assert_eq!(genesis.to_bytes(), [0u8; STATE_ENCODED_LEN]);
}
