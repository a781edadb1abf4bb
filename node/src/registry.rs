// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

use tessera_kernel::signer::StateSigner;

use crate::config::{DatabaseSettings, ReplicaTarget};
use crate::database::{Database, SETTINGS_FILE};
use crate::errors::EngineError;

pub const DEFAULT_DATABASE: &str = "defaultdb";

pub type SharedDatabase = Arc<Mutex<Database>>;

/// All databases of this node, one directory each under `data_dir`.
pub struct DatabaseRegistry {
    data_dir: PathBuf,
    signer: Option<Arc<StateSigner>>,
    databases: RwLock<HashMap<String, SharedDatabase>>,
}

impl DatabaseRegistry {
    /// Load every database found under `data_dir`, creating `defaultdb` if absent.
    pub fn open(data_dir: impl AsRef<Path>, signer: Option<Arc<StateSigner>>) -> Result<Self, EngineError> {
        let data_dir = data_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&data_dir).map_err(|e| EngineError::Internal(e.to_string()))?;

        let mut databases = HashMap::new();
        let entries = std::fs::read_dir(&data_dir).map_err(|e| EngineError::Internal(e.to_string()))?;
        for entry in entries {
            let path = entry.map_err(|e| EngineError::Internal(e.to_string()))?.path();
            if !path.join(SETTINGS_FILE).is_file() {
                continue;
            }
            let db = Database::load(&path, signer.clone())?;
            databases.insert(db.name().to_string(), Arc::new(Mutex::new(db)));
        }

        if !databases.contains_key(DEFAULT_DATABASE) {
            let db = Database::open(
                data_dir.join(DEFAULT_DATABASE),
                DatabaseSettings::primary(DEFAULT_DATABASE),
                signer.clone(),
            )?;
            databases.insert(DEFAULT_DATABASE.to_string(), Arc::new(Mutex::new(db)));
        }

        tracing::info!("Registry loaded {} database(s) from {:?}", databases.len(), data_dir);

        Ok(Self {
            data_dir,
            signer,
            databases: RwLock::new(databases),
        })
    }

    /// Validate and create a database. For replicas the returned target is
    /// what the supervisor needs to start replicating.
    pub async fn create_database(
        &self,
        settings: DatabaseSettings,
    ) -> Result<(SharedDatabase, Option<ReplicaTarget>), EngineError> {
        let target = settings.validate()?;

        let mut databases = self.databases.write().await;
        if databases.contains_key(&settings.database_name) {
            return Err(EngineError::DatabaseExists(settings.database_name));
        }

        let name = settings.database_name.clone();
        let db = Database::open(self.data_dir.join(&name), settings, self.signer.clone())?;
        let shared = Arc::new(Mutex::new(db));
        databases.insert(name.clone(), shared.clone());

        tracing::info!("Created database {:?} (replica: {})", name, target.is_some());
        Ok((shared, target))
    }

    pub async fn get(&self, name: &str) -> Result<SharedDatabase, EngineError> {
        self.databases
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::DatabaseNotFound(name.to_string()))
    }

    pub async fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.databases.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Every replica database with its validated master target.
    pub async fn replicas(&self) -> Result<Vec<(SharedDatabase, ReplicaTarget)>, EngineError> {
        let handles: Vec<SharedDatabase> = self.databases.read().await.values().cloned().collect();
        let mut out = Vec::new();
        for handle in handles {
            let settings = handle.lock().await.settings().clone();
            if let Some(target) = settings.validate()? {
                out.push((handle, target));
            }
        }
        Ok(out)
    }
}
