// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use futures::StreamExt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use tessera_kernel::signer::PublicKey;
use tessera_kernel::state::immutable::ImmutableState;

use super::backoff::Backoff;
use super::source::MasterSource;
use super::status::ReplicationStatus;
use super::ReplicationError;
use crate::config::{FetchStrategy, ReplicationConfig};
use crate::database::CommittedTx;
use crate::errors::EngineError;
use crate::registry::SharedDatabase;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Connecting,
    Syncing,
    Streaming,
}

/// How a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionExit {
    Stopped,
    Failed { reason: String, fatal: bool },
}

/// Replicates one master database into one local replica database.
pub struct ReplicationSession {
    database: String,
    db: SharedDatabase,
    source: Arc<dyn MasterSource>,
    master_public_key: Option<PublicKey>,
    config: ReplicationConfig,
    status: Arc<watch::Sender<ReplicationStatus>>,
    cancel: CancellationToken,
    token: Option<String>,
    backoff: Backoff,
    consecutive_failures: u32,
}

impl ReplicationSession {
    pub fn new(
        database: impl Into<String>,
        db: SharedDatabase,
        source: Arc<dyn MasterSource>,
        master_public_key: Option<PublicKey>,
        config: ReplicationConfig,
        status: Arc<watch::Sender<ReplicationStatus>>,
        cancel: CancellationToken,
    ) -> Self {
        let backoff = Backoff::new(config.backoff_base, config.backoff_max);
        Self {
            database: database.into(),
            db,
            source,
            master_public_key,
            config,
            status,
            cancel,
            token: None,
            backoff,
            consecutive_failures: 0,
        }
    }

    /// Drive the session until it is cancelled or fails.
    pub async fn run(mut self) -> SessionExit {
        tracing::info!(
            "Replication {:?}: starting from {}",
            self.database,
            self.source.describe()
        );

        let mut phase = Phase::Connecting;
        let exit = loop {
            if self.cancel.is_cancelled() {
                break SessionExit::Stopped;
            }

            let step = match phase {
                Phase::Connecting => self.connect().await.map(|_| Phase::Syncing),
                Phase::Syncing => self.sync().await.map(|_| Phase::Streaming),
                Phase::Streaming => self.stream().await.map(|_| Phase::Syncing),
            };

            match step {
                Ok(next) => phase = next,
                Err(ReplicationError::Cancelled) => break SessionExit::Stopped,
                Err(e) if e.is_fatal() => {
                    tracing::error!("Replication {:?}: {}", self.database, e);
                    break SessionExit::Failed {
                        reason: e.to_string(),
                        fatal: true,
                    };
                }
                Err(e) => {
                    self.consecutive_failures += 1;
                    if let Some(limit) = self.config.max_transient_retries {
                        if self.consecutive_failures > limit {
                            tracing::error!(
                                "Replication {:?}: giving up after {} consecutive failures: {}",
                                self.database,
                                self.consecutive_failures,
                                e
                            );
                            break SessionExit::Failed {
                                reason: e.to_string(),
                                fatal: false,
                            };
                        }
                    }

                    if e == ReplicationError::TokenExpired {
                        self.token = None;
                    }
                    phase = if self.token.is_none() {
                        Phase::Connecting
                    } else {
                        Phase::Syncing
                    };

                    let delay = self.backoff.next_delay();
                    tracing::warn!(
                        "Replication {:?}: {} (attempt {}, retrying in {:?})",
                        self.database,
                        e,
                        self.consecutive_failures,
                        delay
                    );
                    if self.sleep(delay).await.is_err() {
                        break SessionExit::Stopped;
                    }
                }
            }
        };

        match &exit {
            SessionExit::Stopped => {
                tracing::info!("Replication {:?}: stopped", self.database);
                self.publish(ReplicationStatus::Stopped);
            }
            SessionExit::Failed { reason, fatal } => {
                metrics::counter!("tessera_replication_failures_total", 1, "db" => self.database.clone());
                self.publish(ReplicationStatus::Failed {
                    reason: reason.clone(),
                    fatal: *fatal,
                });
            }
        }
        exit
    }

    async fn connect(&mut self) -> Result<(), ReplicationError> {
        self.publish(ReplicationStatus::Connecting);
        let token = self.cancellable(self.source.login()).await?;
        self.token = Some(token);
        tracing::debug!("Replication {:?}: authenticated", self.database);
        Ok(())
    }

    /// Check the local chain against the master, then catch up to the head
    /// observed at the start of the pass.
    async fn sync(&mut self) -> Result<(), ReplicationError> {
        self.publish(ReplicationStatus::Syncing);
        let token = self.token()?;

        let master_head = self.cancellable(self.source.current_state(&token)).await?;
        self.verify_master_state(&master_head)?;
        let local = self.db.lock().await.head();

        if master_head.tx_id < local.tx_id {
            return Err(ReplicationError::Divergence(format!(
                "master head {} is behind local head {}",
                master_head.tx_id, local.tx_id
            )));
        }
        if local.tx_id > 0 {
            let at_local = self.cancellable(self.source.tx_by_id(&token, local.tx_id)).await?;
            if !at_local.state.same_head(&local) {
                return Err(ReplicationError::Divergence(format!(
                    "master and replica disagree on transaction {}",
                    local.tx_id
                )));
            }
        }

        self.record_lag(master_head.tx_id, local.tx_id);
        if master_head.tx_id > local.tx_id {
            tracing::info!(
                "Replication {:?}: catching up {} -> {}",
                self.database,
                local.tx_id,
                master_head.tx_id
            );
        }

        for tx_id in local.tx_id + 1..=master_head.tx_id {
            let committed = self.cancellable(self.source.tx_by_id(&token, tx_id)).await?;
            self.apply(committed).await?;
            self.record_lag(master_head.tx_id, tx_id);
        }

        let caught_up = self.db.lock().await.head();
        if !caught_up.same_head(&master_head) {
            return Err(ReplicationError::Divergence(format!(
                "master head {} does not match the chain it served",
                master_head.tx_id
            )));
        }

        self.progressed();
        Ok(())
    }

    /// Wait for the master to move. Returning `Ok` hands control back to Syncing.
    async fn stream(&mut self) -> Result<(), ReplicationError> {
        self.publish(ReplicationStatus::Streaming);
        match self.config.fetch_strategy {
            FetchStrategy::Poll => self.poll().await,
            FetchStrategy::Stream => self.follow().await,
        }
    }

    async fn poll(&mut self) -> Result<(), ReplicationError> {
        let token = self.token()?;
        loop {
            self.sleep(self.config.poll_interval).await?;
            let master_head = self.cancellable(self.source.current_state(&token)).await?;
            let local = self.db.lock().await.head();
            if !master_head.same_head(&local) {
                return Ok(());
            }
            self.progressed();
        }
    }

    async fn follow(&mut self) -> Result<(), ReplicationError> {
        let token = self.token()?;
        let since = self.db.lock().await.height() + 1;
        let mut stream = self.cancellable(self.source.subscribe(&token, since)).await?;
        let mut delivered = false;

        loop {
            let item = tokio::select! {
                _ = self.cancel.cancelled() => return Err(ReplicationError::Cancelled),
                item = stream.next() => item,
            };
            let committed = match item {
                Some(item) => item?,
                None if delivered => return Ok(()),
                None => return Err(ReplicationError::Transient("master closed the stream".into())),
            };

            let expected = self.db.lock().await.height() + 1;
            let tx_id = committed.tx.id();
            if tx_id < expected {
                tracing::debug!("Replication {:?}: skipping duplicate tx {}", self.database, tx_id);
                continue;
            }
            if tx_id > expected {
                tracing::info!(
                    "Replication {:?}: gap in stream (expected {}, got {}), resyncing",
                    self.database,
                    expected,
                    tx_id
                );
                return Ok(());
            }

            self.apply(committed).await?;
            delivered = true;
            self.progressed();
        }
    }

    /// Verify and durably commit one master transaction.
    async fn apply(&mut self, committed: CommittedTx) -> Result<ImmutableState, ReplicationError> {
        self.verify_master_state(&committed.state)?;

        let state = {
            let mut db = self.db.lock().await;
            db.replicate_tx(committed.tx, &committed.state).map_err(|e| match e {
                EngineError::Kernel(k) => ReplicationError::Divergence(k.to_string()),
                other => ReplicationError::Local(other.to_string()),
            })?
        };

        metrics::counter!("tessera_replication_applied_total", 1, "db" => self.database.clone());
        tracing::debug!("Replication {:?}: applied tx {}", self.database, state.tx_id);
        Ok(state)
    }

    fn verify_master_state(&self, state: &ImmutableState) -> Result<(), ReplicationError> {
        let verdict = match (&self.master_public_key, &state.signature) {
            (Some(key), _) => state.verify_with_key(key),
            (None, Some(sig)) if sig.public_key.is_some() => state.check_signature(),
            // Nothing to check against.
            (None, _) => return Ok(()),
        };
        match verdict {
            Ok(true) => Ok(()),
            Ok(false) => Err(ReplicationError::Verification(format!(
                "invalid signature on state {}",
                state.tx_id
            ))),
            Err(e) => Err(ReplicationError::Verification(format!("state {}: {}", state.tx_id, e))),
        }
    }

    fn token(&self) -> Result<String, ReplicationError> {
        self.token.clone().ok_or(ReplicationError::TokenExpired)
    }

    fn progressed(&mut self) {
        self.consecutive_failures = 0;
        self.backoff.reset();
    }

    fn record_lag(&self, master: u64, local: u64) {
        metrics::gauge!(
            "tessera_replication_lag",
            master.saturating_sub(local) as f64,
            "db" => self.database.clone()
        );
    }

    fn publish(&self, status: ReplicationStatus) {
        self.status.send_replace(status);
    }

    async fn cancellable<T>(
        &self,
        fut: impl Future<Output = Result<T, ReplicationError>>,
    ) -> Result<T, ReplicationError> {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(ReplicationError::Cancelled),
            res = fut => res,
        }
    }

    async fn sleep(&self, delay: Duration) -> Result<(), ReplicationError> {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(ReplicationError::Cancelled),
            _ = tokio::time::sleep(delay) => Ok(()),
        }
    }
}
