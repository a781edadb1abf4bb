// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Token sessions for the single configured user.

use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use crate::config::MAX_TOKEN_TTL;
use crate::errors::EngineError;
use crate::registry::DEFAULT_DATABASE;

/// What a bearer token grants: a user bound to one database until expiry.
#[derive(Debug, Clone)]
pub struct Session {
    pub username: String,
    pub database: String,
    pub expires_at: Instant,
}

pub struct AuthService {
    username: String,
    password_hash: blake3::Hash,
    ttl: Duration,
    sessions: Mutex<HashMap<String, Session>>,
}

impl AuthService {
    pub fn new(username: impl Into<String>, password: &str, ttl: Duration) -> Self {
        Self {
            username: username.into(),
            password_hash: blake3::hash(password.as_bytes()),
            ttl: ttl.min(MAX_TOKEN_TTL),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Issue a token bound to the default database.
    pub async fn login(&self, username: &str, password: &str) -> Result<String, EngineError> {
        // blake3::Hash equality is constant time
        if username != self.username || blake3::hash(password.as_bytes()) != self.password_hash {
            tracing::warn!("Rejected login for user {:?}", username);
            return Err(EngineError::Unauthorized("invalid credentials".into()));
        }
        Ok(self.issue(username, DEFAULT_DATABASE).await)
    }

    pub async fn authorize(&self, token: &str) -> Result<Session, EngineError> {
        let mut sessions = self.sessions.lock().await;
        let session = sessions
            .get(token)
            .cloned()
            .ok_or_else(|| EngineError::Unauthorized("invalid token".into()))?;
        if session.expires_at <= Instant::now() {
            sessions.remove(token);
            return Err(EngineError::Unauthorized("token expired".into()));
        }
        Ok(session)
    }

    /// Issue a fresh token for `session`'s user bound to `database`.
    /// The caller checks that the database exists.
    pub async fn use_database(&self, session: &Session, database: &str) -> String {
        self.issue(&session.username, database).await
    }

    async fn issue(&self, username: &str, database: &str) -> String {
        let token = hex::encode(rand::random::<[u8; 32]>());
        let now = Instant::now();
        let session = Session {
            username: username.to_string(),
            database: database.to_string(),
            expires_at: now.checked_add(self.ttl).unwrap_or(now),
        };

        let mut sessions = self.sessions.lock().await;
        sessions.retain(|_, s| s.expires_at > now);
        sessions.insert(token.clone(), session);
        token
    }
}
