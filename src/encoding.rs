// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Serde adapters for byte fields.
//!
//! Human-readable formats (JSON on the HTTP surface) get hex for hashes and
//! signatures and base64 for keys and values. Binary formats (bincode in the
//! tx log) keep the raw bytes.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::state::codec::{TxHash, HASH_SIZE};

pub mod hex32 {
    use super::*;

    pub fn serialize<S: Serializer>(bytes: &TxHash, s: S) -> Result<S::Ok, S::Error> {
        if s.is_human_readable() {
            s.serialize_str(&hex::encode(bytes))
        } else {
            bytes.serialize(s)
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<TxHash, D::Error> {
        if d.is_human_readable() {
            let s = String::deserialize(d)?;
            let raw = hex::decode(&s).map_err(D::Error::custom)?;
            raw.try_into().map_err(|v: Vec<u8>| {
                D::Error::custom(format!("expected {} hash bytes, got {}", HASH_SIZE, v.len()))
            })
        } else {
            <TxHash>::deserialize(d)
        }
    }
}

pub mod hex_bytes {
    use super::*;

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        if s.is_human_readable() {
            s.serialize_str(&hex::encode(bytes))
        } else {
            bytes.serialize(s)
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        if d.is_human_readable() {
            let s = String::deserialize(d)?;
            hex::decode(&s).map_err(D::Error::custom)
        } else {
            Vec::<u8>::deserialize(d)
        }
    }
}

pub mod hex_opt {
    use super::*;

    pub fn serialize<S: Serializer>(bytes: &Option<Vec<u8>>, s: S) -> Result<S::Ok, S::Error> {
        if s.is_human_readable() {
            bytes.as_ref().map(hex::encode).serialize(s)
        } else {
            bytes.serialize(s)
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Vec<u8>>, D::Error> {
        if d.is_human_readable() {
            match Option::<String>::deserialize(d)? {
                Some(s) => hex::decode(&s).map(Some).map_err(D::Error::custom),
                None => Ok(None),
            }
        } else {
            Option::<Vec<u8>>::deserialize(d)
        }
    }
}

pub mod base64_bytes {
    use super::*;
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        if s.is_human_readable() {
            s.serialize_str(&STANDARD.encode(bytes))
        } else {
            bytes.serialize(s)
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        if d.is_human_readable() {
            let s = String::deserialize(d)?;
            STANDARD.decode(s.as_bytes()).map_err(D::Error::custom)
        } else {
            Vec::<u8>::deserialize(d)
        }
    }
}
