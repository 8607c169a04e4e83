//! Columnar dataset file store with a process-wide in-memory cache.
//!
//! One file per project (`project_{id}.json`, column-major serde of
//! [`Table`]). The cache maps project id → loaded table and is populated
//! lazily; a per-project load mutex ensures a cache miss triggers exactly one
//! disk read even under concurrent requests, while reads of different
//! projects never block each other.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use crate::errors::{AppError, AppResult};
use crate::table::Table;

pub struct DatasetStore {
    data_dir: PathBuf,
    cache: RwLock<HashMap<i32, Arc<Table>>>,
    load_locks: Mutex<HashMap<i32, Arc<Mutex<()>>>>,
}

impl DatasetStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> AppResult<Self> {
        let data_dir = data_dir.into();
        std::fs::create_dir_all(&data_dir)?;
        Ok(Self {
            data_dir,
            cache: RwLock::new(HashMap::new()),
            load_locks: Mutex::new(HashMap::new()),
        })
    }

    pub fn dataset_path(&self, project_id: i32) -> PathBuf {
        self.data_dir.join(format!("project_{}.json", project_id))
    }

    /// Persist a table and replace any cached copy.
    pub async fn save(&self, project_id: i32, table: Table) -> AppResult<Arc<Table>> {
        let bytes = serde_json::to_vec(&table)?;
        tokio::fs::write(self.dataset_path(project_id), bytes).await?;
        let table = Arc::new(table);
        self.cache.write().await.insert(project_id, table.clone());
        Ok(table)
    }

    /// Cache-or-disk load. A missing file is `NotFound`: the project record
    /// may still exist, but its data is gone.
    pub async fn load(&self, project_id: i32) -> AppResult<Arc<Table>> {
        if let Some(table) = self.cache.read().await.get(&project_id) {
            return Ok(table.clone());
        }

        let key_lock = {
            let mut locks = self.load_locks.lock().await;
            locks
                .entry(project_id)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        let _guard = key_lock.lock().await;

        // Another request may have finished the load while we waited.
        if let Some(table) = self.cache.read().await.get(&project_id) {
            return Ok(table.clone());
        }

        let path = self.dataset_path(project_id);
        if !path.exists() {
            return Err(AppError::not_found(format!(
                "project {} data not found",
                project_id
            )));
        }
        debug!(project_id, path = %path.display(), "loading dataset from disk");
        let bytes = tokio::fs::read(&path).await?;
        let table: Table = serde_json::from_slice(&bytes)?;
        let table = Arc::new(table);
        self.cache.write().await.insert(project_id, table.clone());
        Ok(table)
    }

    /// Drop the cache entry and delete the dataset file. Idempotent. Runs
    /// under the per-project load mutex: any in-flight cold load finishes
    /// first and its cache insert is cleared here, and loads that start later
    /// find the file gone, so a removed project can never reappear from the
    /// cache.
    pub async fn remove(&self, project_id: i32) -> AppResult<()> {
        let key_lock = {
            let mut locks = self.load_locks.lock().await;
            locks
                .entry(project_id)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        let _guard = key_lock.lock().await;

        self.cache.write().await.remove(&project_id);
        match tokio::fs::remove_file(self.dataset_path(project_id)).await {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }
        self.load_locks.lock().await.remove(&project_id);
        Ok(())
    }
}
