// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use reqwest::{Client, Response, StatusCode};
use std::time::Duration;
use tessera_kernel::state::immutable::ImmutableState;
use thiserror::Error;

use crate::api::{LoginRequest, TokenResponse, UseDatabaseRequest};
use crate::database::CommittedTx;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    #[error("network error: {0}")]
    Network(String),
    #[error("login rejected: {0}")]
    AuthRejected(String),
    #[error("token rejected by master")]
    TokenExpired,
    #[error("not found: {0}")]
    NotFound(String),
    #[error("master returned {status}: {message}")]
    Status { status: u16, message: String },
    #[error("malformed response: {0}")]
    Decode(String),
}

impl ClientError {
    /// Worth retrying as-is: connection trouble, timeouts, master-side 5xx.
    pub fn is_transient(&self) -> bool {
        match self {
            ClientError::Network(_) | ClientError::Decode(_) => true,
            ClientError::Status { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// HTTP client for a master node's `/v1` API.
#[derive(Debug, Clone)]
pub struct MasterClient {
    base_url: String,
    client: Client,
    timeout: Duration,
}

impl MasterClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, ClientError> {
        let client = Client::builder()
            .connect_timeout(timeout)
            .build()
            .map_err(|e| ClientError::Network(e.to_string()))?;
        Ok(Self {
            base_url: url.into().trim_end_matches('/').to_string(),
            client,
            timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<String, ClientError> {
        let url = format!("{}/v1/login", self.base_url);
        let resp = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .json(&LoginRequest {
                username: username.to_string(),
                password: password.to_string(),
            })
            .send()
            .await
            .map_err(network)?;

        if matches!(resp.status(), StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
            return Err(ClientError::AuthRejected(error_message(resp).await));
        }
        let body: TokenResponse = decode(check(resp).await?).await?;
        Ok(body.token)
    }

    /// Exchange `token` for one bound to `database`.
    pub async fn use_database(&self, token: &str, database: &str) -> Result<String, ClientError> {
        let url = format!("{}/v1/db/use", self.base_url);
        let resp = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .bearer_auth(token)
            .json(&UseDatabaseRequest {
                database: database.to_string(),
            })
            .send()
            .await
            .map_err(network)?;

        let body: TokenResponse = decode(check(resp).await?).await?;
        Ok(body.token)
    }

    pub async fn current_state(&self, token: &str) -> Result<ImmutableState, ClientError> {
        let url = format!("{}/v1/state", self.base_url);
        let resp = self
            .client
            .get(&url)
            .timeout(self.timeout)
            .bearer_auth(token)
            .send()
            .await
            .map_err(network)?;

        decode(check(resp).await?).await
    }

    pub async fn tx_by_id(&self, token: &str, tx_id: u64) -> Result<CommittedTx, ClientError> {
        let url = format!("{}/v1/tx/{}", self.base_url, tx_id);
        let resp = self
            .client
            .get(&url)
            .timeout(self.timeout)
            .bearer_auth(token)
            .send()
            .await
            .map_err(network)?;

        decode(check(resp).await?).await
    }

    /// Open the NDJSON transaction stream starting at `since`.
    ///
    /// No overall timeout: the response body stays open for live transactions.
    pub async fn stream_txs(&self, token: &str, since: u64) -> Result<Response, ClientError> {
        let url = format!("{}/v1/tx/stream?since={}", self.base_url, since);
        let resp = self
            .client
            .get(&url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(network)?;

        check(resp).await
    }
}

fn network(e: reqwest::Error) -> ClientError {
    ClientError::Network(e.to_string())
}

async fn check(resp: Response) -> Result<Response, ClientError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let message = error_message(resp).await;
    Err(match status {
        StatusCode::UNAUTHORIZED => ClientError::TokenExpired,
        StatusCode::NOT_FOUND => ClientError::NotFound(message),
        _ => ClientError::Status {
            status: status.as_u16(),
            message,
        },
    })
}

async fn decode<T: serde::de::DeserializeOwned>(resp: Response) -> Result<T, ClientError> {
    resp.json().await.map_err(|e| ClientError::Decode(e.to_string()))
}

/// The `{"error": ...}` message of a failed response, or its raw body.
async fn error_message(resp: Response) -> String {
    let status = resp.status();
    match resp.text().await {
        Ok(text) => serde_json::from_str::<serde_json::Value>(&text)
            .ok()
            .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
            .unwrap_or(text),
        Err(_) => status.to_string(),
    }
}
