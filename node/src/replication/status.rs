// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use serde::{Deserialize, Serialize};

/// Externally visible phase of a replication session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ReplicationStatus {
    Connecting,
    Syncing,
    Streaming,
    Stopped,
    Failed { reason: String, fatal: bool },
}

impl ReplicationStatus {
    pub fn is_failed(&self) -> bool {
        matches!(self, ReplicationStatus::Failed { .. })
    }

    /// Stopped, or Failed fatally: the supervisor will not act on its own.
    pub fn is_parked(&self) -> bool {
        matches!(
            self,
            ReplicationStatus::Stopped | ReplicationStatus::Failed { fatal: true, .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_json_shape() {
        assert_eq!(
            serde_json::to_value(ReplicationStatus::Streaming).unwrap(),
            json!({"state": "streaming"})
        );
        let failed = ReplicationStatus::Failed {
            reason: "divergence".into(),
            fatal: true,
        };
        assert_eq!(
            serde_json::to_value(&failed).unwrap(),
            json!({"state": "failed", "reason": "divergence", "fatal": true})
        );
        assert!(failed.is_parked());
        assert!(!ReplicationStatus::Failed { reason: String::new(), fatal: false }.is_parked());
    }
}
