// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tessera_kernel::signer::parse_public_key;
use tessera_kernel::state::immutable::ImmutableState;
use tessera_kernel::state::ledger::LedgerState;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check the signature on a state returned by a node (JSON)
    State {
        path: PathBuf,

        /// Trusted public key (hex). Without it the key embedded in the state is used.
        #[arg(long)]
        public_key: Option<String>,
    },
    /// Replay a database tx log and report the head it commits to
    Log {
        path: PathBuf,

        /// State JSON the replayed head must match
        #[arg(long)]
        expect: Option<PathBuf>,
    },
}

#[derive(Serialize, Debug)]
struct StateReport {
    tx_id: u64,
    tx_hash: String,
    public_key: Option<String>,
    signature_valid: bool,
}

#[derive(Serialize, Debug)]
struct LogReport {
    transactions: u64,
    tx_id: u64,
    tx_hash: String,
    torn_tail_bytes: u64,
    matches_expected: Option<bool>,
}

fn read_state(path: &Path) -> Result<ImmutableState> {
    let bytes = fs::read(path).with_context(|| format!("Failed to read {:?}", path))?;
    serde_json::from_slice(&bytes).context("Failed to parse state JSON")
}

fn verify_state(path: &Path, public_key: Option<&str>) -> Result<StateReport> {
    let state = read_state(path)?;

    let (verdict, key_hex) = match public_key {
        Some(hex_key) => {
            let key = parse_public_key(hex_key).context("Invalid --public-key")?;
            (state.verify_with_key(&key), Some(hex::encode(key.as_bytes())))
        }
        None => (
            state.check_signature(),
            state
                .signature
                .as_ref()
                .and_then(|s| s.public_key.as_ref())
                .map(hex::encode),
        ),
    };
    let signature_valid = verdict.map_err(|e| anyhow::anyhow!("Verification failed: {}", e))?;

    Ok(StateReport {
        tx_id: state.tx_id,
        tx_hash: hex::encode(state.tx_hash),
        public_key: key_hex,
        signature_valid,
    })
}

fn replay_log(path: &Path, expect: Option<&Path>) -> Result<LogReport> {
    let scan = tessera_node::txlog::scan_log(path).context("Failed to read tx log")?;
    let torn_tail_bytes = scan.file_len - scan.valid_len;
    let transactions = scan.txs.len() as u64;

    let ledger = LedgerState::from_txs(scan.txs).map_err(|e| anyhow::anyhow!("Replay failed: {}", e))?;
    let head = ledger.head();

    let matches_expected = match expect {
        Some(p) => Some(read_state(p)?.same_head(&head)),
        None => None,
    };

    Ok(LogReport {
        transactions,
        tx_id: head.tx_id,
        tx_hash: hex::encode(head.tx_hash),
        torn_tail_bytes,
        matches_expected,
    })
}

fn main() -> Result<()> {
    let args = Args::parse();
    eprintln!("Tessera Verifier v{}", env!("CARGO_PKG_VERSION"));

    match args.command {
        Command::State { path, public_key } => {
            let report = verify_state(&path, public_key.as_deref())?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.signature_valid {
                anyhow::bail!("Signature does not match state {}", report.tx_id);
            }
        }
        Command::Log { path, expect } => {
            let report = replay_log(&path, expect.as_deref())?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if report.matches_expected == Some(false) {
                anyhow::bail!("Replayed head does not match the expected state");
            }
        }
    }

    Ok(())
}
