// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! A single named ledger: durable tx log plus its in-memory index.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast;

use tessera_kernel::proof::EntryProof;
use tessera_kernel::signer::StateSigner;
use tessera_kernel::state::immutable::ImmutableState;
use tessera_kernel::state::ledger::{KeyVersion, LedgerState};
use tessera_kernel::tx::{Entry, Tx};
use tessera_kernel::verify::check_declared;

use crate::config::DatabaseSettings;
use crate::errors::EngineError;
use crate::txlog::TxLogWriter;

pub const SETTINGS_FILE: &str = "settings.json";
pub const TX_LOG_FILE: &str = "tx.log";

const FEED_CAPACITY: usize = 1024;

/// A committed transaction together with the (signed) head it produced.
///
/// This is the unit of the master's transaction stream and of `GET /v1/tx/:id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommittedTx {
    pub tx: Tx,
    pub state: ImmutableState,
}

pub struct Database {
    name: String,
    settings: DatabaseSettings,
    ledger: LedgerState,
    log: TxLogWriter,
    signer: Option<Arc<StateSigner>>,
    feed: broadcast::Sender<CommittedTx>,
}

impl Database {
    /// Open (or create) the database rooted at `dir`, persisting `settings`
    /// and rebuilding the ledger from the tx log.
    pub fn open(
        dir: impl AsRef<Path>,
        settings: DatabaseSettings,
        signer: Option<Arc<StateSigner>>,
    ) -> Result<Self, EngineError> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir).map_err(|e| EngineError::Internal(e.to_string()))?;
        write_settings(&dir, &settings)?;

        let (log, txs) = TxLogWriter::open(dir.join(TX_LOG_FILE))?;
        let ledger = LedgerState::from_txs(txs)?;
        let (feed, _) = broadcast::channel(FEED_CAPACITY);

        tracing::info!(
            "Database {:?} opened at height {} (replica: {})",
            settings.database_name,
            ledger.height(),
            settings.replica
        );

        Ok(Self {
            name: settings.database_name.clone(),
            settings,
            ledger,
            log,
            signer,
            feed,
        })
    }

    /// Reopen an existing database from its persisted settings.
    pub fn load(dir: impl AsRef<Path>, signer: Option<Arc<StateSigner>>) -> Result<Self, EngineError> {
        let dir = dir.as_ref();
        let raw = std::fs::read(dir.join(SETTINGS_FILE)).map_err(|e| EngineError::Internal(e.to_string()))?;
        let settings: DatabaseSettings =
            serde_json::from_slice(&raw).map_err(|e| EngineError::Internal(e.to_string()))?;
        Self::open(dir, settings, signer)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn settings(&self) -> &DatabaseSettings {
        &self.settings
    }

    pub fn is_replica(&self) -> bool {
        self.settings.replica
    }

    pub fn height(&self) -> u64 {
        self.ledger.height()
    }

    /// Unsigned head.
    pub fn head(&self) -> ImmutableState {
        self.ledger.head()
    }

    /// Head, signed when this node has a signing key.
    pub fn current_state(&self) -> ImmutableState {
        self.sign(self.ledger.head())
    }

    /// Client write. Replicas only accept transactions from their master.
    pub fn set(&mut self, entries: Vec<Entry>) -> Result<ImmutableState, EngineError> {
        if self.settings.replica {
            return Err(EngineError::ReadOnlyReplica(self.name.clone()));
        }
        let tx = self.ledger.build_tx(entries)?;
        self.commit(tx)
    }

    /// Append a transaction pulled from the master.
    ///
    /// `declared` is the master's state for `tx`; the recomputed hash must match
    /// it and `tx` must extend the local head, otherwise nothing is written.
    pub fn replicate_tx(&mut self, tx: Tx, declared: &ImmutableState) -> Result<ImmutableState, EngineError> {
        check_declared(&tx, declared)?;
        self.commit(tx)
    }

    fn commit(&mut self, tx: Tx) -> Result<ImmutableState, EngineError> {
        let start = Instant::now();

        // Nothing reaches the log unless it links to the current head.
        self.ledger.check_link(&tx)?;
        self.log.append(&tx)?;
        let state = self.ledger.apply(tx.clone())?;

        metrics::counter!("tessera_tx_committed_total", 1, "db" => self.name.clone());
        metrics::histogram!(
            "tessera_tx_commit_duration_seconds",
            start.elapsed().as_secs_f64(),
            "db" => self.name.clone()
        );
        tracing::debug!("Database {:?}: committed tx {}", self.name, state.tx_id);

        let state = self.sign(state);
        // No subscribers is fine.
        let _ = self.feed.send(CommittedTx {
            tx,
            state: state.clone(),
        });
        Ok(state)
    }

    pub fn get(&self, key: &[u8]) -> Result<KeyVersion, EngineError> {
        Ok(self.ledger.get(key)?.clone())
    }

    /// Latest value of `key` plus the transaction that wrote it and that
    /// transaction's signed state, enough for a client to check inclusion.
    pub fn verified_get(&self, key: &[u8]) -> Result<(KeyVersion, EntryProof), EngineError> {
        let version = self.ledger.get(key)?.clone();
        let CommittedTx { tx, state } = self.tx_by_id(version.tx_id)?;
        Ok((version, EntryProof { tx, state }))
    }

    pub fn history(&self, key: &[u8]) -> Result<Vec<KeyVersion>, EngineError> {
        Ok(self.ledger.history(key)?.to_vec())
    }

    pub fn tx_by_id(&self, tx_id: u64) -> Result<CommittedTx, EngineError> {
        let tx = self.ledger.tx(tx_id)?.clone();
        let state = self.sign(self.ledger.state_at(tx_id)?);
        Ok(CommittedTx { tx, state })
    }

    /// Committed transactions with id >= `since`, oldest first.
    pub fn txs_since(&self, since: u64) -> Result<Vec<CommittedTx>, EngineError> {
        let since = since.max(1);
        (since..=self.height()).map(|id| self.tx_by_id(id)).collect()
    }

    /// Live feed of commits made after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<CommittedTx> {
        self.feed.subscribe()
    }

    fn sign(&self, state: ImmutableState) -> ImmutableState {
        match &self.signer {
            Some(signer) => signer.sign(&state),
            None => state,
        }
    }
}

fn write_settings(dir: &Path, settings: &DatabaseSettings) -> Result<(), EngineError> {
    let bytes = serde_json::to_vec_pretty(settings).map_err(|e| EngineError::Internal(e.to_string()))?;
    let tmp = dir.join(format!("{}.tmp", SETTINGS_FILE));
    std::fs::write(&tmp, bytes).map_err(|e| EngineError::Internal(e.to_string()))?;
    std::fs::rename(&tmp, dir.join(SETTINGS_FILE)).map_err(|e| EngineError::Internal(e.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use tessera_kernel::error::KernelError;

    fn kv(k: &str, v: &str) -> Vec<Entry> {
        vec![Entry::new(k, v)]
    }

    fn signer() -> Arc<StateSigner> {
        Arc::new(StateSigner::from_seed([7u8; 32]))
    }

    #[test]
    fn test_set_get_and_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("defaultdb");

        let state = {
            let mut db = Database::open(&path, DatabaseSettings::primary("defaultdb"), None).unwrap();
            db.set(kv("a", "1")).unwrap();
            db.set(kv("a", "2")).unwrap();
            db.current_state()
        };
        assert_eq!(state.tx_id, 2);

        let db = Database::load(&path, None).unwrap();
        assert!(db.current_state().same_head(&state));
        assert_eq!(db.get(b"a").unwrap().value, b"2".to_vec());
        assert_eq!(db.history(b"a").unwrap().len(), 2);
        assert!(matches!(
            db.get(b"missing"),
            Err(EngineError::Kernel(KernelError::KeyNotFound))
        ));
    }

    #[test]
    fn test_states_are_signed() {
        let dir = tempdir().unwrap();
        let mut db = Database::open(dir.path(), DatabaseSettings::primary("db"), Some(signer())).unwrap();
        let state = db.set(kv("k", "v")).unwrap();
        assert_eq!(state.check_signature(), Ok(true));

        let (version, proof) = db.verified_get(b"k").unwrap();
        assert_eq!(version.tx_id, 1);
        assert_eq!(proof.state.check_signature(), Ok(true));
        proof.verify(b"k", b"v").unwrap();
    }

    #[test]
    fn test_replica_rejects_client_writes() {
        let dir = tempdir().unwrap();
        let settings = DatabaseSettings {
            replica: true,
            ..DatabaseSettings::primary("replicateddb")
        };
        let mut db = Database::open(dir.path(), settings, None).unwrap();
        assert!(matches!(db.set(kv("k", "v")), Err(EngineError::ReadOnlyReplica(_))));
    }

    #[test]
    fn test_replicate_tx_checks_declared_state() {
        let dir = tempdir().unwrap();
        let mut master = Database::open(dir.path().join("m"), DatabaseSettings::primary("m"), None).unwrap();
        let mut replica = Database::open(dir.path().join("r"), DatabaseSettings::primary("r"), None).unwrap();

        master.set(kv("a", "1")).unwrap();
        master.set(kv("b", "2")).unwrap();

        let first = master.tx_by_id(1).unwrap();
        let second = master.tx_by_id(2).unwrap();

        // Wrong declared state: nothing applied
        assert!(replica.replicate_tx(first.tx.clone(), &second.state).is_err());
        assert_eq!(replica.height(), 0);

        // Gap: nothing applied
        let err = replica.replicate_tx(second.tx.clone(), &second.state).unwrap_err();
        assert!(matches!(err, EngineError::Kernel(ref k) if k.is_divergence()));
        assert_eq!(replica.height(), 0);

        replica.replicate_tx(first.tx, &first.state).unwrap();
        replica.replicate_tx(second.tx, &second.state).unwrap();
        assert!(replica.head().same_head(&master.head()));
    }

    #[test]
    fn test_feed_and_txs_since() {
        let dir = tempdir().unwrap();
        let mut db = Database::open(dir.path(), DatabaseSettings::primary("db"), None).unwrap();
        let mut rx = db.subscribe();

        db.set(kv("a", "1")).unwrap();
        db.set(kv("b", "2")).unwrap();

        assert_eq!(rx.try_recv().unwrap().state.tx_id, 1);
        assert_eq!(rx.try_recv().unwrap().state.tx_id, 2);

        let since = db.txs_since(2).unwrap();
        assert_eq!(since.len(), 1);
        assert_eq!(since[0].tx.id(), 2);
        assert_eq!(db.txs_since(0).unwrap().len(), 2);
        assert!(db.txs_since(3).unwrap().is_empty());
    }
}
