// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tessera_kernel::signer::{parse_public_key, PublicKey};
use thiserror::Error;

/// Longest token lifetime a node will issue.
pub const MAX_TOKEN_TTL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid database name {0:?}")]
    InvalidDatabaseName(String),
    #[error("replica requires {0}")]
    MissingReplicaField(&'static str),
    #[error("malformed master address {0:?}")]
    MalformedMasterAddress(String),
    #[error("master settings given for non-replica database")]
    UnexpectedMasterSettings,
    #[error("invalid master public key: {0}")]
    InvalidMasterKey(String),
    #[error("invalid value for {key}: {value:?}")]
    InvalidEnv { key: &'static str, value: String },
}

/// How a streaming session learns about new master transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchStrategy {
    /// Periodically query the master head and fetch by index when it moves.
    Poll,
    /// Hold an NDJSON subscription open and apply pushed transactions in order.
    Stream,
}

#[derive(Debug, Clone)]
pub struct ReplicationConfig {
    pub backoff_base: Duration,
    pub backoff_max: Duration,
    pub poll_interval: Duration,
    pub fetch_strategy: FetchStrategy,
    /// Consecutive transient failures tolerated before a session reports Failed.
    /// `None` retries forever.
    pub max_transient_retries: Option<u32>,
    pub restart_cooldown: Duration,
    pub shutdown_grace: Duration,
    pub request_timeout: Duration,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            backoff_base: Duration::from_millis(100),
            backoff_max: Duration::from_secs(10),
            poll_interval: Duration::from_millis(500),
            fetch_strategy: FetchStrategy::Stream,
            max_transient_retries: Some(50),
            restart_cooldown: Duration::from_secs(30),
            shutdown_grace: Duration::from_secs(5),
            request_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub bind_addr: SocketAddr,
    pub data_dir: PathBuf,
    pub admin_username: String,
    pub admin_password: String,
    /// File holding a hex-encoded Ed25519 seed. Without it states are unsigned.
    pub signing_key_path: Option<PathBuf>,
    pub token_ttl: Duration,
    pub replication: ReplicationConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3322)),
            data_dir: PathBuf::from("data"),
            admin_username: "tessera".to_string(),
            admin_password: "tessera".to_string(),
            signing_key_path: None,
            token_ttl: Duration::from_secs(3600),
            replication: ReplicationConfig::default(),
        }
    }
}

impl NodeConfig {
    /// Defaults overridden by `TESSERA_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut cfg = Self::default();

        if let Some(v) = lookup("TESSERA_BIND_ADDR") {
            cfg.bind_addr = v.parse().map_err(|_| ConfigError::InvalidEnv {
                key: "TESSERA_BIND_ADDR",
                value: v.clone(),
            })?;
        }
        if let Some(v) = lookup("TESSERA_DATA_DIR") {
            cfg.data_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("TESSERA_ADMIN_USER") {
            cfg.admin_username = v;
        }
        if let Some(v) = lookup("TESSERA_ADMIN_PASSWORD") {
            cfg.admin_password = v;
        }
        if let Some(v) = lookup("TESSERA_SIGNING_KEY") {
            cfg.signing_key_path = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("TESSERA_TOKEN_TTL_SECS") {
            let ttl = v
                .parse()
                .ok()
                .map(Duration::from_secs)
                .filter(|ttl| !ttl.is_zero() && *ttl <= MAX_TOKEN_TTL)
                .ok_or_else(|| ConfigError::InvalidEnv {
                    key: "TESSERA_TOKEN_TTL_SECS",
                    value: v.clone(),
                })?;
            cfg.token_ttl = ttl;
        }
        if let Some(v) = lookup("TESSERA_FETCH_STRATEGY") {
            cfg.replication.fetch_strategy = match v.as_str() {
                "poll" => FetchStrategy::Poll,
                "stream" => FetchStrategy::Stream,
                _ => {
                    return Err(ConfigError::InvalidEnv {
                        key: "TESSERA_FETCH_STRATEGY",
                        value: v.clone(),
                    })
                }
            };
        }

        Ok(cfg)
    }
}

/// Per-database settings, as sent to CreateDatabase and persisted next to the tx log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseSettings {
    pub database_name: String,
    #[serde(default)]
    pub replica: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub master_database: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub master_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub master_port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub follower_username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub follower_password: Option<String>,
    /// Hex Ed25519 key; when set every master state must carry a signature by it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub master_public_key: Option<String>,
}

/// Validated coordinates of a replica's master.
#[derive(Debug, Clone)]
pub struct ReplicaTarget {
    pub master_url: String,
    pub master_database: String,
    pub username: String,
    pub password: String,
    pub master_public_key: Option<PublicKey>,
}

impl DatabaseSettings {
    pub fn primary(name: impl Into<String>) -> Self {
        Self {
            database_name: name.into(),
            replica: false,
            master_database: None,
            master_address: None,
            master_port: None,
            follower_username: None,
            follower_password: None,
            master_public_key: None,
        }
    }

    /// Reject malformed settings before anything touches disk.
    ///
    /// Returns the replication target for replicas, `None` for primaries.
    pub fn validate(&self) -> Result<Option<ReplicaTarget>, ConfigError> {
        validate_database_name(&self.database_name)?;

        if !self.replica {
            if self.master_database.is_some()
                || self.master_address.is_some()
                || self.master_port.is_some()
            {
                return Err(ConfigError::UnexpectedMasterSettings);
            }
            return Ok(None);
        }

        let master_database = self
            .master_database
            .clone()
            .ok_or(ConfigError::MissingReplicaField("master_database"))?;
        validate_database_name(&master_database)?;

        let address = self
            .master_address
            .as_deref()
            .ok_or(ConfigError::MissingReplicaField("master_address"))?;
        if address.is_empty()
            || address.contains("://")
            || address.chars().any(|c| c.is_whitespace() || c == '/' || c == '@')
        {
            return Err(ConfigError::MalformedMasterAddress(address.to_string()));
        }

        let port = match self.master_port {
            Some(0) | None => return Err(ConfigError::MissingReplicaField("master_port")),
            Some(p) => p,
        };

        let username = self
            .follower_username
            .clone()
            .filter(|u| !u.is_empty())
            .ok_or(ConfigError::MissingReplicaField("follower_username"))?;
        let password = self
            .follower_password
            .clone()
            .ok_or(ConfigError::MissingReplicaField("follower_password"))?;

        let master_public_key = match &self.master_public_key {
            Some(k) => Some(parse_public_key(k).map_err(|e| ConfigError::InvalidMasterKey(e.to_string()))?),
            None => None,
        };

        let host = if address.contains(':') && !address.starts_with('[') {
            format!("[{}]", address)
        } else {
            address.to_string()
        };

        Ok(Some(ReplicaTarget {
            master_url: format!("http://{}:{}", host, port),
            master_database,
            username,
            password,
            master_public_key,
        }))
    }
}

fn validate_database_name(name: &str) -> Result<(), ConfigError> {
    let ok = !name.is_empty()
        && name.len() <= 64
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if ok {
        Ok(())
    } else {
        Err(ConfigError::InvalidDatabaseName(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn replica() -> DatabaseSettings {
        DatabaseSettings {
            replica: true,
            master_database: Some("defaultdb".into()),
            master_address: Some("127.0.0.1".into()),
            master_port: Some(3322),
            follower_username: Some("tessera".into()),
            follower_password: Some("tessera".into()),
            ..DatabaseSettings::primary("replicateddb")
        }
    }

    #[test]
    fn test_primary_settings_validate() {
        assert!(DatabaseSettings::primary("defaultdb").validate().unwrap().is_none());
        assert!(DatabaseSettings::primary("../etc").validate().is_err());
        assert!(DatabaseSettings::primary("").validate().is_err());
    }

    #[test]
    fn test_replica_target() {
        let target = replica().validate().unwrap().unwrap();
        assert_eq!(target.master_url, "http://127.0.0.1:3322");
        assert_eq!(target.master_database, "defaultdb");
        assert!(target.master_public_key.is_none());
    }

    #[test]
    fn test_replica_rejects_missing_fields() {
        let mut s = replica();
        s.master_port = None;
        assert_eq!(s.validate().unwrap_err(), ConfigError::MissingReplicaField("master_port"));

        let mut s = replica();
        s.follower_password = None;
        assert_eq!(
            s.validate().unwrap_err(),
            ConfigError::MissingReplicaField("follower_password")
        );
    }

    #[test]
    fn test_replica_rejects_malformed_address() {
        for bad in ["", "http://host", "host/path", "a b"] {
            let mut s = replica();
            s.master_address = Some(bad.into());
            assert!(
                matches!(s.validate(), Err(ConfigError::MalformedMasterAddress(_))),
                "{:?} accepted",
                bad
            );
        }
    }

    #[test]
    fn test_replica_rejects_bad_key() {
        let mut s = replica();
        s.master_public_key = Some("nothex".into());
        assert!(matches!(s.validate(), Err(ConfigError::InvalidMasterKey(_))));
    }

    #[test]
    fn test_primary_rejects_master_fields() {
        let mut s = DatabaseSettings::primary("db");
        s.master_port = Some(1);
        assert_eq!(s.validate().unwrap_err(), ConfigError::UnexpectedMasterSettings);
    }

    #[test]
    fn test_env_overrides() {
        let cfg = NodeConfig::from_lookup(|k| match k {
            "TESSERA_BIND_ADDR" => Some("0.0.0.0:9000".into()),
            "TESSERA_FETCH_STRATEGY" => Some("poll".into()),
            "TESSERA_TOKEN_TTL_SECS" => Some("5".into()),
            _ => None,
        })
        .unwrap();
        assert_eq!(cfg.bind_addr.port(), 9000);
        assert_eq!(cfg.replication.fetch_strategy, FetchStrategy::Poll);
        assert_eq!(cfg.token_ttl, Duration::from_secs(5));

        let bad = NodeConfig::from_lookup(|k| (k == "TESSERA_BIND_ADDR").then(|| "nope".to_string()));
        assert!(bad.is_err());
    }

    #[test]
    fn test_token_ttl_bounds() {
        for bad in ["0", "-1", "18446744073709551615"] {
            let res = NodeConfig::from_lookup(|k| (k == "TESSERA_TOKEN_TTL_SECS").then(|| bad.to_string()));
            assert!(
                matches!(res, Err(ConfigError::InvalidEnv { key: "TESSERA_TOKEN_TTL_SECS", .. })),
                "{:?} accepted",
                bad
            );
        }
        let max = MAX_TOKEN_TTL.as_secs().to_string();
        let cfg = NodeConfig::from_lookup(|k| (k == "TESSERA_TOKEN_TTL_SECS").then(|| max.clone())).unwrap();
        assert_eq!(cfg.token_ttl, MAX_TOKEN_TTL);
    }
}
