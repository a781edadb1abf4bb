// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use tessera_kernel::signer::PublicKey;

use super::session::{ReplicationSession, SessionExit};
use super::source::{HttpMaster, MasterSource};
use super::status::ReplicationStatus;
use crate::config::{ReplicaTarget, ReplicationConfig};
use crate::errors::EngineError;
use crate::registry::SharedDatabase;

/// Everything needed to (re)create a session for one replica database.
#[derive(Clone)]
struct SessionTemplate {
    database: String,
    db: SharedDatabase,
    source: Arc<dyn MasterSource>,
    master_public_key: Option<PublicKey>,
}

struct SessionHandle {
    template: SessionTemplate,
    cancel: CancellationToken,
    status: watch::Receiver<ReplicationStatus>,
    restarts: Arc<AtomicU32>,
    task: JoinHandle<()>,
}

/// Snapshot of one session for the status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub database: String,
    pub master: String,
    pub status: ReplicationStatus,
    pub restarts: u32,
}

/// Owns every replication session of this node.
pub struct ReplicationSupervisor {
    config: ReplicationConfig,
    cancel: CancellationToken,
    sessions: Mutex<HashMap<String, SessionHandle>>,
}

impl ReplicationSupervisor {
    pub fn new(config: ReplicationConfig, cancel: CancellationToken) -> Self {
        Self {
            config,
            cancel,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Start replicating `database` from the master named by `target`.
    pub async fn start(
        &self,
        database: &str,
        db: SharedDatabase,
        target: &ReplicaTarget,
    ) -> Result<(), EngineError> {
        let source = HttpMaster::new(target, self.config.request_timeout)
            .map_err(|e| EngineError::Network(e.to_string()))?;
        self.start_with_source(database, db, Arc::new(source), target.master_public_key)
            .await;
        Ok(())
    }

    /// Start a session against any master source, replacing a running one.
    pub async fn start_with_source(
        &self,
        database: &str,
        db: SharedDatabase,
        source: Arc<dyn MasterSource>,
        master_public_key: Option<PublicKey>,
    ) {
        let template = SessionTemplate {
            database: database.to_string(),
            db,
            source,
            master_public_key,
        };

        let mut sessions = self.sessions.lock().await;
        if let Some(old) = sessions.remove(database) {
            stop_handle(old).await;
        }
        let handle = self.spawn(template, Arc::new(AtomicU32::new(0)));
        sessions.insert(database.to_string(), handle);
    }

    /// Operator restart; the only way out of a fatal failure.
    pub async fn restart(&self, database: &str) -> Result<(), EngineError> {
        let mut sessions = self.sessions.lock().await;
        let old = sessions
            .remove(database)
            .ok_or_else(|| EngineError::DatabaseNotFound(database.to_string()))?;

        let template = old.template.clone();
        let restarts = old.restarts.clone();
        stop_handle(old).await;
        restarts.fetch_add(1, Ordering::Relaxed);

        tracing::info!("Replication {:?}: restarted by operator", database);
        sessions.insert(database.to_string(), self.spawn(template, restarts));
        Ok(())
    }

    /// Cancel one session and wait for it; its last status stays visible.
    pub async fn stop(&self, database: &str) -> Result<(), EngineError> {
        let mut sessions = self.sessions.lock().await;
        let handle = sessions
            .get_mut(database)
            .ok_or_else(|| EngineError::DatabaseNotFound(database.to_string()))?;
        handle.cancel.cancel();
        if let Err(e) = (&mut handle.task).await {
            tracing::warn!("Replication {:?}: task ended abnormally: {}", database, e);
        }
        Ok(())
    }

    pub async fn status(&self) -> Vec<SessionView> {
        let sessions = self.sessions.lock().await;
        let mut views: Vec<SessionView> = sessions.values().map(view).collect();
        views.sort_by(|a, b| a.database.cmp(&b.database));
        views
    }

    pub async fn status_of(&self, database: &str) -> Option<SessionView> {
        self.sessions.lock().await.get(database).map(view)
    }

    /// Watch one session's status.
    pub async fn watch(&self, database: &str) -> Option<watch::Receiver<ReplicationStatus>> {
        self.sessions.lock().await.get(database).map(|h| h.status.clone())
    }

    /// Cancel every session and wait up to `grace` for them to finish.
    pub async fn shutdown(&self, grace: Duration) {
        self.cancel.cancel();
        let handles: Vec<SessionHandle> = self.sessions.lock().await.drain().map(|(_, h)| h).collect();
        if handles.is_empty() {
            return;
        }

        tracing::info!("Stopping {} replication session(s)", handles.len());
        let mut tasks: Vec<JoinHandle<()>> = handles.into_iter().map(|h| h.task).collect();
        let drained = tokio::time::timeout(grace, futures::future::join_all(tasks.iter_mut())).await;
        if drained.is_err() {
            tracing::warn!("Replication sessions did not stop within {:?}; aborting", grace);
            for task in &tasks {
                task.abort();
            }
        }
    }

    fn spawn(&self, template: SessionTemplate, restarts: Arc<AtomicU32>) -> SessionHandle {
        let cancel = self.cancel.child_token();
        let (status_tx, status_rx) = watch::channel(ReplicationStatus::Connecting);
        let task = tokio::spawn(supervise(
            template.clone(),
            self.config.clone(),
            Arc::new(status_tx),
            cancel.clone(),
            restarts.clone(),
        ));
        SessionHandle {
            template,
            cancel,
            status: status_rx,
            restarts,
            task,
        }
    }
}

/// Run sessions for one database until it stops or fails fatally, restarting
/// after transient exhaustion once the cooldown passes.
async fn supervise(
    template: SessionTemplate,
    config: ReplicationConfig,
    status: Arc<watch::Sender<ReplicationStatus>>,
    cancel: CancellationToken,
    restarts: Arc<AtomicU32>,
) {
    loop {
        let session = ReplicationSession::new(
            template.database.clone(),
            template.db.clone(),
            template.source.clone(),
            template.master_public_key,
            config.clone(),
            status.clone(),
            cancel.clone(),
        );

        match session.run().await {
            SessionExit::Stopped => break,
            SessionExit::Failed { fatal: true, reason } => {
                tracing::error!(
                    "Replication {:?}: parked until restarted: {}",
                    template.database,
                    reason
                );
                break;
            }
            SessionExit::Failed { fatal: false, .. } => {
                tracing::warn!(
                    "Replication {:?}: restarting in {:?}",
                    template.database,
                    config.restart_cooldown
                );
                tokio::select! {
                    _ = cancel.cancelled() => {
                        status.send_replace(ReplicationStatus::Stopped);
                        break;
                    }
                    _ = tokio::time::sleep(config.restart_cooldown) => {}
                }
                restarts.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

async fn stop_handle(mut handle: SessionHandle) {
    handle.cancel.cancel();
    if let Err(e) = (&mut handle.task).await {
        tracing::warn!("Replication {:?}: task ended abnormally: {}", handle.template.database, e);
    }
}

fn view(handle: &SessionHandle) -> SessionView {
    SessionView {
        database: handle.template.database.clone(),
        master: handle.template.source.describe(),
        status: handle.status.borrow().clone(),
        restarts: handle.restarts.load(Ordering::Relaxed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FetchStrategy;
    use crate::replication::session::tests::{commit, fast_config, open, wait_for_height, LocalMaster};
    use tessera_kernel::tx::Entry;

    async fn wait_for_status(
        supervisor: &ReplicationSupervisor,
        database: &str,
        pred: impl Fn(&ReplicationStatus) -> bool,
    ) -> SessionView {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            if let Some(view) = supervisor.status_of(database).await {
                if pred(&view.status) {
                    return view;
                }
            }
            assert!(tokio::time::Instant::now() < deadline, "status never matched");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[tokio::test]
    async fn test_supervisor_start_status_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let master_db = open(&dir, "master", false);
        let replica = open(&dir, "replica", true);
        commit(&master_db, 2).await;

        let supervisor = ReplicationSupervisor::new(fast_config(FetchStrategy::Poll), CancellationToken::new());
        supervisor
            .start_with_source("replica", replica.clone(), Arc::new(LocalMaster::new(master_db)), None)
            .await;

        wait_for_height(&replica, 2).await;
        let view = wait_for_status(&supervisor, "replica", |s| *s == ReplicationStatus::Streaming).await;
        assert_eq!(view.master, "local");
        assert_eq!(supervisor.status().await.len(), 1);

        supervisor.shutdown(Duration::from_secs(1)).await;
        assert!(supervisor.status().await.is_empty());
    }

    #[tokio::test]
    async fn test_supervisor_stop_keeps_last_status() {
        let dir = tempfile::tempdir().unwrap();
        let master_db = open(&dir, "master", false);
        let replica = open(&dir, "replica", true);

        let supervisor = ReplicationSupervisor::new(fast_config(FetchStrategy::Poll), CancellationToken::new());
        supervisor
            .start_with_source("replica", replica, Arc::new(LocalMaster::new(master_db)), None)
            .await;

        supervisor.stop("replica").await.unwrap();
        let view = supervisor.status_of("replica").await.unwrap();
        assert_eq!(view.status, ReplicationStatus::Stopped);
        assert!(supervisor.stop("missing").await.is_err());
    }

    #[tokio::test]
    async fn test_fatal_failure_waits_for_operator_restart() {
        let dir = tempfile::tempdir().unwrap();
        let master_db = open(&dir, "master", false);
        let replica = open(&dir, "replica", true);
        commit(&master_db, 1).await;

        // Replica forks at tx 1.
        let other = open(&dir, "other", false);
        other.lock().await.set(vec![Entry::new("fork", "1")]).unwrap();
        let forked = other.lock().await.tx_by_id(1).unwrap();
        replica.lock().await.replicate_tx(forked.tx, &forked.state).unwrap();

        let supervisor = ReplicationSupervisor::new(fast_config(FetchStrategy::Poll), CancellationToken::new());
        supervisor
            .start_with_source("replica", replica.clone(), Arc::new(LocalMaster::new(master_db)), None)
            .await;

        let view = wait_for_status(&supervisor, "replica", |s| s.is_failed()).await;
        assert!(matches!(view.status, ReplicationStatus::Failed { fatal: true, .. }));

        // No automatic restart.
        tokio::time::sleep(Duration::from_millis(100)).await;
        let view = supervisor.status_of("replica").await.unwrap();
        assert_eq!(view.restarts, 0);
        assert!(view.status.is_failed());

        supervisor.restart("replica").await.unwrap();
        let view = wait_for_status(&supervisor, "replica", |s| s.is_failed()).await;
        assert_eq!(view.restarts, 1);
        assert_eq!(replica.lock().await.height(), 1);

        supervisor.shutdown(Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn test_transient_exhaustion_restarts_after_cooldown() {
        let dir = tempfile::tempdir().unwrap();
        let master_db = open(&dir, "master", false);
        let replica = open(&dir, "replica", true);
        commit(&master_db, 3).await;

        let master = LocalMaster::new(master_db);
        // Enough to exhaust one session (limit 1), then succeed.
        master
            .failing_head_requests
            .store(2, std::sync::atomic::Ordering::SeqCst);
        let mut config = fast_config(FetchStrategy::Poll);
        config.max_transient_retries = Some(1);

        let supervisor = ReplicationSupervisor::new(config, CancellationToken::new());
        supervisor
            .start_with_source("replica", replica.clone(), Arc::new(master), None)
            .await;

        wait_for_height(&replica, 3).await;
        let view = supervisor.status_of("replica").await.unwrap();
        assert_eq!(view.restarts, 1);

        supervisor.shutdown(Duration::from_secs(1)).await;
    }
}
