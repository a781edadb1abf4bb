// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
#![allow(dead_code)]

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::Value;
use std::net::SocketAddr;
use std::time::Duration;
use tempfile::TempDir;
use tessera_node::config::{FetchStrategy, NodeConfig, ReplicationConfig};
use tessera_node::server::{build_router, AppState};
use tokio_util::sync::CancellationToken;
use tower::util::ServiceExt;

pub const SEED: [u8; 32] = [9u8; 32];

pub fn fast_replication(strategy: FetchStrategy) -> ReplicationConfig {
    ReplicationConfig {
        backoff_base: Duration::from_millis(20),
        backoff_max: Duration::from_millis(200),
        poll_interval: Duration::from_millis(50),
        fetch_strategy: strategy,
        max_transient_retries: None,
        restart_cooldown: Duration::from_millis(100),
        shutdown_grace: Duration::from_secs(1),
        request_timeout: Duration::from_secs(2),
    }
}

/// Node config rooted in a fresh temp dir, signing with `seed` when given.
pub fn node_config(seed: Option<[u8; 32]>, strategy: FetchStrategy) -> (NodeConfig, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let signing_key_path = seed.map(|seed| {
        let path = dir.path().join("signing.key");
        std::fs::write(&path, hex::encode(seed)).unwrap();
        path
    });
    let cfg = NodeConfig {
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        data_dir: dir.path().join("data"),
        signing_key_path,
        replication: fast_replication(strategy),
        ..Default::default()
    };
    (cfg, dir)
}

pub async fn test_app(seed: Option<[u8; 32]>) -> (Router, AppState, TempDir) {
    let (cfg, dir) = node_config(seed, FetchStrategy::Poll);
    let state = AppState::bootstrap(&cfg, CancellationToken::new()).await.unwrap();
    (build_router(state.clone()), state, dir)
}

/// Spawn a real node listening on an ephemeral port.
pub async fn spawn_node(seed: Option<[u8; 32]>, strategy: FetchStrategy) -> (SocketAddr, AppState, TempDir) {
    let (cfg, dir) = node_config(seed, strategy);
    let state = AppState::bootstrap(&cfg, CancellationToken::new()).await.unwrap();
    let app = build_router(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, state, dir)
}

/// One request through the router without a socket.
pub async fn call(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {}", token));
    }
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&json).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into()))
    };
    (status, value)
}

pub async fn login(app: &Router) -> String {
    let (status, body) = call(
        app,
        "POST",
        "/v1/login",
        None,
        Some(serde_json::json!({"username": "tessera", "password": "tessera"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    body["token"].as_str().unwrap().to_string()
}

/// Logged-in reqwest session against a real node.
pub struct Remote {
    pub base: String,
    pub token: String,
    pub client: reqwest::Client,
}

impl Remote {
    pub async fn login(addr: SocketAddr) -> Self {
        let client = reqwest::Client::new();
        let base = format!("http://{}", addr);
        let resp: Value = client
            .post(format!("{}/v1/login", base))
            .json(&serde_json::json!({"username": "tessera", "password": "tessera"}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        Self {
            base,
            token: resp["token"].as_str().unwrap().to_string(),
            client,
        }
    }

    pub async fn use_database(&mut self, database: &str) {
        let resp = self.post("/v1/db/use", serde_json::json!({"database": database})).await;
        assert_eq!(resp.status(), reqwest::StatusCode::OK);
        let body: Value = resp.json().await.unwrap();
        self.token = body["token"].as_str().unwrap().to_string();
    }

    pub async fn post(&self, path: &str, body: Value) -> reqwest::Response {
        self.client
            .post(format!("{}{}", self.base, path))
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await
            .unwrap()
    }

    pub async fn get(&self, path: &str) -> reqwest::Response {
        self.client
            .get(format!("{}{}", self.base, path))
            .bearer_auth(&self.token)
            .send()
            .await
            .unwrap()
    }
}
