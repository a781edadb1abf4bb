// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Master → replica replication.
//!
//! A [`ReplicationSession`] drives one replica database through
//! Connecting → Syncing → Streaming, pulling the master's transactions strictly
//! in order and committing each one durably before moving its cursor. The
//! cursor is the replica's own tx log tail, so a restarted session resumes
//! exactly where the last durable commit left off.
//!
//! The [`ReplicationSupervisor`] owns every session of the process, restarts
//! sessions whose failure is transient and keeps fatal failures parked until
//! an operator restarts them.

pub mod backoff;
pub mod session;
pub mod source;
pub mod status;
pub mod supervisor;

pub use session::{ReplicationSession, SessionExit};
pub use source::{HttpMaster, MasterSource};
pub use status::ReplicationStatus;
pub use supervisor::{ReplicationSupervisor, SessionView};

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReplicationError {
    #[error("transient failure: {0}")]
    Transient(String),
    #[error("master rejected credentials: {0}")]
    AuthRejected(String),
    #[error("auth token expired")]
    TokenExpired,
    #[error("divergence from master: {0}")]
    Divergence(String),
    #[error("master refused request: {0}")]
    Rejected(String),
    #[error("master state failed verification: {0}")]
    Verification(String),
    #[error("local commit failed: {0}")]
    Local(String),
    #[error("cancelled")]
    Cancelled,
}

impl ReplicationError {
    /// Fatal errors park the session in Failed; retrying cannot fix them.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ReplicationError::AuthRejected(_)
                | ReplicationError::Divergence(_)
                | ReplicationError::Rejected(_)
                | ReplicationError::Verification(_)
        )
    }
}
