// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use axum::{
    body::Body,
    extract::{Path, Query, Request, State},
    http::header,
    middleware::{from_fn_with_state, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Json, Router,
};
use axum_extra::TypedHeader;
use headers::{authorization::Bearer, Authorization};
use std::sync::Arc;
use tokio::sync::{broadcast::error::RecvError, mpsc};
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;

use tessera_kernel::signer::StateSigner;
use tessera_kernel::state::immutable::ImmutableState;

use crate::api::*;
use crate::auth::{AuthService, Session};
use crate::config::{DatabaseSettings, NodeConfig};
use crate::database::CommittedTx;
use crate::errors::EngineError;
use crate::registry::DatabaseRegistry;
use crate::replication::{ReplicationSupervisor, SessionView};

const STREAM_BUFFER: usize = 100;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<DatabaseRegistry>,
    pub auth: Arc<AuthService>,
    pub supervisor: Arc<ReplicationSupervisor>,
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Load the signing key and databases, and start a session for every replica.
    pub async fn bootstrap(cfg: &NodeConfig, shutdown: CancellationToken) -> Result<Self, EngineError> {
        let signer = match &cfg.signing_key_path {
            Some(path) => {
                let seed = tokio::fs::read_to_string(path)
                    .await
                    .map_err(|e| EngineError::Internal(format!("reading signing key {:?}: {}", path, e)))?;
                let signer = StateSigner::from_hex(&seed)?;
                tracing::info!("Signing states with public key {}", hex::encode(signer.public_key_bytes()));
                Some(Arc::new(signer))
            }
            None => {
                tracing::warn!("No signing key configured: states are unsigned");
                None
            }
        };

        let registry = Arc::new(DatabaseRegistry::open(&cfg.data_dir, signer)?);
        let auth = Arc::new(AuthService::new(
            cfg.admin_username.clone(),
            &cfg.admin_password,
            cfg.token_ttl,
        ));
        let supervisor = Arc::new(ReplicationSupervisor::new(
            cfg.replication.clone(),
            shutdown.child_token(),
        ));

        for (db, target) in registry.replicas().await? {
            let name = db.lock().await.name().to_string();
            supervisor.start(&name, db, &target).await?;
        }

        Ok(Self {
            registry,
            auth,
            supervisor,
            shutdown,
        })
    }
}

pub fn build_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/v1/db/use", post(use_database))
        .route("/v1/db/create", post(create_database))
        .route("/v1/db/list", get(list_databases))
        .route("/v1/set", post(set))
        .route("/v1/verified/set", post(verified_set))
        .route("/v1/get", post(get_key))
        .route("/v1/verified/get", post(verified_get))
        .route("/v1/history", post(history))
        .route("/v1/state", get(current_state))
        .route("/v1/tx/stream", get(tx_stream))
        .route("/v1/tx/:id", get(tx_by_id))
        .route("/v1/replication/status", get(replication_status))
        .route("/v1/replication/:db/restart", post(replication_restart))
        .route_layer(from_fn_with_state(state.clone(), auth_guard));

    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics_handler))
        .route("/v1/login", post(login))
        .merge(protected)
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn auth_guard(
    State(state): State<AppState>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    mut req: Request,
    next: Next,
) -> Result<Response, EngineError> {
    let TypedHeader(Authorization(bearer)) =
        bearer.ok_or_else(|| EngineError::Unauthorized("missing bearer token".into()))?;
    let session = state.auth.authorize(bearer.token()).await?;
    req.extensions_mut().insert(session);
    Ok(next.run(req).await)
}

async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<TokenResponse>, EngineError> {
    let token = state.auth.login(&req.username, &req.password).await?;
    Ok(Json(TokenResponse { token }))
}

async fn use_database(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Json(req): Json<UseDatabaseRequest>,
) -> Result<Json<TokenResponse>, EngineError> {
    state.registry.get(&req.database).await?;
    let token = state.auth.use_database(&session, &req.database).await;
    Ok(Json(TokenResponse { token }))
}

async fn create_database(
    State(state): State<AppState>,
    Json(settings): Json<DatabaseSettings>,
) -> Result<Json<CreateDatabaseResponse>, EngineError> {
    let name = settings.database_name.clone();
    let (db, target) = state.registry.create_database(settings).await?;
    let replica = target.is_some();
    if let Some(target) = target {
        state.supervisor.start(&name, db, &target).await?;
    }
    Ok(Json(CreateDatabaseResponse {
        database: name,
        replica,
    }))
}

async fn list_databases(State(state): State<AppState>) -> Json<DatabaseListResponse> {
    Json(DatabaseListResponse {
        databases: state.registry.list().await,
    })
}

async fn set(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Json(req): Json<SetRequest>,
) -> Result<Json<ImmutableState>, EngineError> {
    let db = state.registry.get(&session.database).await?;
    let new_state = db.lock().await.set(req.entries)?;
    Ok(Json(new_state))
}

async fn verified_set(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Json(req): Json<SetRequest>,
) -> Result<Json<VerifiedSetResponse>, EngineError> {
    let db = state.registry.get(&session.database).await?;
    let mut db = db.lock().await;
    let previous = db.current_state();
    let new_state = db.set(req.entries)?;
    Ok(Json(VerifiedSetResponse {
        previous,
        state: new_state,
    }))
}

async fn get_key(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Json(req): Json<KeyRequest>,
) -> Result<Json<EntryResponse>, EngineError> {
    let db = state.registry.get(&session.database).await?;
    let version = db.lock().await.get(&req.key)?;
    Ok(Json(EntryResponse::new(req.key, version)))
}

async fn verified_get(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Json(req): Json<KeyRequest>,
) -> Result<Json<VerifiedEntryResponse>, EngineError> {
    let db = state.registry.get(&session.database).await?;
    let (version, proof) = db.lock().await.verified_get(&req.key)?;
    Ok(Json(VerifiedEntryResponse {
        entry: EntryResponse::new(req.key, version),
        proof,
    }))
}

async fn history(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Json(req): Json<KeyRequest>,
) -> Result<Json<HistoryResponse>, EngineError> {
    let db = state.registry.get(&session.database).await?;
    let versions = db.lock().await.history(&req.key)?;
    Ok(Json(HistoryResponse {
        key: req.key,
        versions,
    }))
}

async fn current_state(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
) -> Result<Json<ImmutableState>, EngineError> {
    let db = state.registry.get(&session.database).await?;
    let head = db.lock().await.current_state();
    Ok(Json(head))
}

async fn tx_by_id(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Path(id): Path<u64>,
) -> Result<Json<CommittedTx>, EngineError> {
    let db = state.registry.get(&session.database).await?;
    let committed = db.lock().await.tx_by_id(id)?;
    Ok(Json(committed))
}

/// NDJSON of committed transactions from `since`: history first, then live
/// commits, without gaps or repeats. The stream ends rather than skip ahead
/// if the live feed lags.
async fn tx_stream(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Query(params): Query<StreamParams>,
) -> Result<impl IntoResponse, EngineError> {
    let db = state.registry.get(&session.database).await?;

    // Same lock: no commit can fall between the history and the subscription.
    let (history, mut live) = {
        let db = db.lock().await;
        (db.txs_since(params.since)?, db.subscribe())
    };

    let (tx, rx) = mpsc::channel::<Result<String, std::io::Error>>(STREAM_BUFFER);
    let shutdown = state.shutdown.clone();
    let database = session.database.clone();

    tokio::spawn(async move {
        let mut next = params.since.max(1);

        for committed in history {
            next = committed.tx.id() + 1;
            if send_line(&tx, &committed).await.is_err() {
                tracing::debug!("Stream {:?}: client disconnected during history", database);
                return;
            }
        }

        loop {
            let received = tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tx.closed() => break,
                received = live.recv() => received,
            };
            match received {
                Ok(committed) => {
                    let id = committed.tx.id();
                    if id < next {
                        continue;
                    }
                    if id > next {
                        tracing::warn!("Stream {:?}: missed tx {}, closing", database, next);
                        break;
                    }
                    if send_line(&tx, &committed).await.is_err() {
                        break;
                    }
                    next = id + 1;
                }
                Err(RecvError::Lagged(n)) => {
                    tracing::warn!("Stream {:?}: lagged by {} txs, closing", database, n);
                    break;
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    Ok((
        [(header::CONTENT_TYPE, "application/x-ndjson")],
        Body::from_stream(ReceiverStream::new(rx)),
    ))
}

async fn send_line(
    tx: &mpsc::Sender<Result<String, std::io::Error>>,
    committed: &CommittedTx,
) -> Result<(), ()> {
    let line = serde_json::to_string(committed).map_err(|e| {
        tracing::error!("Stream: failed to encode tx {}: {}", committed.tx.id(), e);
    })?;
    tx.send(Ok(line + "\n")).await.map_err(|_| ())
}

async fn replication_status(State(state): State<AppState>) -> Json<Vec<SessionView>> {
    Json(state.supervisor.status().await)
}

async fn replication_restart(
    State(state): State<AppState>,
    Path(db): Path<String>,
) -> Result<Json<SessionView>, EngineError> {
    state.supervisor.restart(&db).await?;
    state
        .supervisor
        .status_of(&db)
        .await
        .map(Json)
        .ok_or(EngineError::DatabaseNotFound(db))
}

async fn healthz() -> &'static str {
    "ok"
}

async fn metrics_handler() -> String {
    crate::telemetry::get_metrics()
}
