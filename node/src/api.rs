// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use serde::{Deserialize, Serialize};
use tessera_kernel::proof::EntryProof;
use tessera_kernel::state::immutable::ImmutableState;
use tessera_kernel::state::ledger::KeyVersion;
use tessera_kernel::tx::Entry;

// Keys and values travel as base64; hashes and signatures as hex.

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UseDatabaseRequest {
    pub database: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseListResponse {
    pub databases: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateDatabaseResponse {
    pub database: String,
    pub replica: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetRequest {
    pub entries: Vec<Entry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyRequest {
    #[serde(with = "tessera_kernel::encoding::base64_bytes")]
    pub key: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryResponse {
    #[serde(with = "tessera_kernel::encoding::base64_bytes")]
    pub key: Vec<u8>,
    #[serde(with = "tessera_kernel::encoding::base64_bytes")]
    pub value: Vec<u8>,
    pub tx_id: u64,
}

impl EntryResponse {
    pub fn new(key: Vec<u8>, version: KeyVersion) -> Self {
        Self {
            key,
            value: version.value,
            tx_id: version.tx_id,
        }
    }
}

/// VerifiedGet: the entry, plus the committing tx and its signed state so the
/// client can run the inclusion and signature checks itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifiedEntryResponse {
    pub entry: EntryResponse,
    pub proof: EntryProof,
}

/// VerifiedSet: the new head plus the head it extends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifiedSetResponse {
    pub previous: ImmutableState,
    pub state: ImmutableState,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryResponse {
    #[serde(with = "tessera_kernel::encoding::base64_bytes")]
    pub key: Vec<u8>,
    pub versions: Vec<KeyVersion>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StreamParams {
    #[serde(default)]
    pub since: u64,
}
