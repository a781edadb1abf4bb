// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tessera_kernel::error::{KernelError, VerifyError};
use thiserror::Error;

use crate::config::ConfigError;
use crate::txlog::TxLogError;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("{0}")]
    Kernel(#[from] KernelError),
    #[error("verification failed: {0}")]
    Verify(#[from] VerifyError),
    #[error("tx log error: {0}")]
    TxLog(#[from] TxLogError),
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("database {0:?} not found")]
    DatabaseNotFound(String),
    #[error("database {0:?} already exists")]
    DatabaseExists(String),
    #[error("database {0:?} is a read-only replica")]
    ReadOnlyReplica(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for EngineError {
    fn into_response(self) -> Response {
        let status = match &self {
            EngineError::Kernel(k_err) => match k_err {
                KernelError::KeyNotFound | KernelError::TxNotFound(_) => StatusCode::NOT_FOUND,
                e if e.is_divergence() => StatusCode::CONFLICT,
                _ => StatusCode::BAD_REQUEST,
            },
            EngineError::Verify(_) => StatusCode::INTERNAL_SERVER_ERROR,
            EngineError::TxLog(_) => StatusCode::INTERNAL_SERVER_ERROR,
            EngineError::Config(_) => StatusCode::BAD_REQUEST,
            EngineError::DatabaseNotFound(_) => StatusCode::NOT_FOUND,
            EngineError::DatabaseExists(_) => StatusCode::CONFLICT,
            EngineError::ReadOnlyReplica(_) => StatusCode::CONFLICT,
            EngineError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            EngineError::Network(_) => StatusCode::BAD_GATEWAY,
            EngineError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        }

        let body = Json(json!({
            "error": self.to_string()
        }));

        (status, body).into_response()
    }
}
