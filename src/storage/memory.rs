//! In-memory provider used by unit tests.

use super::provider::{FetchedArtifact, StorageProvider, StoredArtifact};
use crate::error::{Result, StorageError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashSet};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

#[derive(Default)]
pub struct MemoryProvider {
    artifacts: Mutex<BTreeMap<(String, String), (Vec<u8>, Option<DateTime<Utc>>)>>,
    failing_deletes: Mutex<HashSet<String>>,
}

impl MemoryProvider {
    pub fn insert(&self, database: &str, name: &str, data: &[u8], modified: Option<DateTime<Utc>>) {
        self.artifacts.lock().unwrap().insert(
            (database.to_string(), name.to_string()),
            (data.to_vec(), modified),
        );
    }

    pub fn fail_delete(&self, name: &str) {
        self.failing_deletes.lock().unwrap().insert(name.to_string());
    }

    pub fn contains(&self, database: &str, name: &str) -> bool {
        self.artifacts
            .lock()
            .unwrap()
            .contains_key(&(database.to_string(), name.to_string()))
    }
}

#[async_trait]
impl StorageProvider for MemoryProvider {
    async fn ensure_database(&self, _database: &str) -> Result<()> {
        Ok(())
    }

    async fn save(&self, database: &str, filename: &str, source: &Path) -> Result<()> {
        let data = std::fs::read(source).map_err(|e| StorageError::io_at("read", source, e))?;
        self.insert(database, filename, &data, Some(Utc::now()));
        Ok(())
    }

    async fn list(&self, database: &str) -> Result<Vec<StoredArtifact>> {
        Ok(self
            .artifacts
            .lock()
            .unwrap()
            .iter()
            .filter(|((db, _), _)| db == database)
            .map(|((_, name), (_, modified))| StoredArtifact {
                name: name.clone(),
                last_modified: *modified,
            })
            .collect())
    }

    async fn fetch(&self, database: &str, filename: &str) -> Result<FetchedArtifact> {
        let data = self
            .artifacts
            .lock()
            .unwrap()
            .get(&(database.to_string(), filename.to_string()))
            .map(|(data, _)| data.clone())
            .ok_or_else(|| StorageError::NotFound(filename.to_string()))?;
        let mut file = tempfile::NamedTempFile::new().map_err(|e| StorageError::io("temp", e))?;
        file.write_all(&data).map_err(|e| StorageError::io("temp", e))?;
        Ok(FetchedArtifact::temporary(file.into_temp_path()))
    }

    async fn delete(&self, database: &str, filename: &str) -> Result<()> {
        if self.failing_deletes.lock().unwrap().contains(filename) {
            return Err(StorageError::Http {
                operation: "DELETE",
                target: filename.to_string(),
                status: 403,
                body: "AccessDenied".to_string(),
            });
        }
        self.artifacts
            .lock()
            .unwrap()
            .remove(&(database.to_string(), filename.to_string()))
            .ok_or_else(|| StorageError::NotFound(filename.to_string()))?;
        Ok(())
    }

    fn name(&self) -> String {
        "memory".to_string()
    }
}
