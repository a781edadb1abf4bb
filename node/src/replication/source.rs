// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use futures::future::BoxFuture;
use futures::stream::{BoxStream, StreamExt};
use tessera_kernel::state::immutable::ImmutableState;

use super::ReplicationError;
use crate::config::ReplicaTarget;
use crate::database::CommittedTx;
use crate::network::{ClientError, MasterClient};

pub type TxStream = BoxStream<'static, Result<CommittedTx, ReplicationError>>;

/// Where a session pulls transactions from.
///
/// The HTTP master is the production implementation; tests drive sessions with
/// in-memory masters.
pub trait MasterSource: Send + Sync {
    /// Human readable master location for status reports.
    fn describe(&self) -> String;

    /// Authenticate and select the master database, returning the scoped token.
    fn login(&self) -> BoxFuture<'_, Result<String, ReplicationError>>;

    fn current_state<'a>(&'a self, token: &'a str) -> BoxFuture<'a, Result<ImmutableState, ReplicationError>>;

    fn tx_by_id<'a>(&'a self, token: &'a str, tx_id: u64) -> BoxFuture<'a, Result<CommittedTx, ReplicationError>>;

    /// Committed transactions from `since` onwards, then live ones.
    fn subscribe<'a>(&'a self, token: &'a str, since: u64) -> BoxFuture<'a, Result<TxStream, ReplicationError>>;
}

impl From<ClientError> for ReplicationError {
    fn from(e: ClientError) -> Self {
        match e {
            ClientError::AuthRejected(msg) => ReplicationError::AuthRejected(msg),
            ClientError::TokenExpired => ReplicationError::TokenExpired,
            e if e.is_transient() => ReplicationError::Transient(e.to_string()),
            e => ReplicationError::Rejected(e.to_string()),
        }
    }
}

/// A master node reached over its HTTP API.
pub struct HttpMaster {
    client: MasterClient,
    database: String,
    username: String,
    password: String,
}

impl HttpMaster {
    pub fn new(target: &ReplicaTarget, timeout: std::time::Duration) -> Result<Self, ReplicationError> {
        Ok(Self {
            client: MasterClient::new(target.master_url.clone(), timeout)?,
            database: target.master_database.clone(),
            username: target.username.clone(),
            password: target.password.clone(),
        })
    }
}

impl MasterSource for HttpMaster {
    fn describe(&self) -> String {
        format!("{}/{}", self.client.base_url(), self.database)
    }

    fn login(&self) -> BoxFuture<'_, Result<String, ReplicationError>> {
        Box::pin(async move {
            let token = self.client.login(&self.username, &self.password).await?;
            let token = self.client.use_database(&token, &self.database).await?;
            Ok(token)
        })
    }

    fn current_state<'a>(&'a self, token: &'a str) -> BoxFuture<'a, Result<ImmutableState, ReplicationError>> {
        Box::pin(async move { Ok(self.client.current_state(token).await?) })
    }

    fn tx_by_id<'a>(&'a self, token: &'a str, tx_id: u64) -> BoxFuture<'a, Result<CommittedTx, ReplicationError>> {
        Box::pin(async move {
            match self.client.tx_by_id(token, tx_id).await {
                Ok(committed) => Ok(committed),
                // Only ids at or below the observed head are requested.
                Err(ClientError::NotFound(_)) => Err(ReplicationError::Divergence(format!(
                    "master has no transaction {}",
                    tx_id
                ))),
                Err(e) => Err(e.into()),
            }
        })
    }

    fn subscribe<'a>(&'a self, token: &'a str, since: u64) -> BoxFuture<'a, Result<TxStream, ReplicationError>> {
        Box::pin(async move {
            let resp = self.client.stream_txs(token, since).await?;
            Ok(ndjson_stream(resp))
        })
    }
}

/// Decode a newline-delimited JSON body into committed transactions.
///
/// A malformed line or a transport error ends the stream after being reported.
fn ndjson_stream(resp: reqwest::Response) -> TxStream {
    let bytes = Box::pin(resp.bytes_stream());
    futures::stream::unfold(
        (bytes, Vec::<u8>::new(), false),
        |(mut bytes, mut buffer, done)| async move {
            if done {
                return None;
            }
            loop {
                if let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                    let line: Vec<u8> = buffer.drain(..=pos).collect();
                    if line.iter().all(|b| b.is_ascii_whitespace()) {
                        continue;
                    }
                    let item = serde_json::from_slice::<CommittedTx>(&line).map_err(|e| {
                        ReplicationError::Transient(format!("malformed stream line: {}", e))
                    });
                    let failed = item.is_err();
                    return Some((item, (bytes, buffer, failed)));
                }
                match bytes.next().await {
                    Some(Ok(chunk)) => buffer.extend_from_slice(&chunk),
                    Some(Err(e)) => {
                        let err = ReplicationError::Transient(format!("stream error: {}", e));
                        return Some((Err(err), (bytes, buffer, true)));
                    }
                    None => return None,
                }
            }
        },
    )
    .boxed()
}
