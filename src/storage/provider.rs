use crate::error::{Result, StorageError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempPath;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredArtifact {
    pub name: String,
    /// `None` when the backend reported no usable timestamp.
    pub last_modified: Option<DateTime<Utc>>,
}

/// A locally readable copy of an artifact.
///
/// Backends that had to download the artifact hand out a temporary file,
/// removed by [`FetchedArtifact::release`] or when the handle is dropped.
#[derive(Debug)]
pub struct FetchedArtifact {
    path: PathBuf,
    temporary: Option<TempPath>,
}

impl FetchedArtifact {
    pub fn in_place(path: PathBuf) -> Self {
        Self {
            path,
            temporary: None,
        }
    }

    pub(crate) fn temporary(temp: TempPath) -> Self {
        Self {
            path: temp.to_path_buf(),
            temporary: Some(temp),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_temporary(&self) -> bool {
        self.temporary.is_some()
    }

    /// Removes the temporary copy, if any. Safe to call more than once.
    pub fn release(&mut self) -> Result<()> {
        if let Some(temp) = self.temporary.take() {
            match temp.close() {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(StorageError::io_at("remove temporary", &self.path, e)),
            }
        }
        Ok(())
    }
}

#[async_trait]
pub trait StorageProvider: Send + Sync {
    /// Prepares the backend for `database`. Idempotent.
    async fn ensure_database(&self, database: &str) -> Result<()>;

    /// Persists the file at `source` as `filename`. The source may be consumed.
    async fn save(&self, database: &str, filename: &str, source: &Path) -> Result<()>;

    /// Artifacts stored for `database`, in backend order.
    async fn list(&self, database: &str) -> Result<Vec<StoredArtifact>>;

    async fn fetch(&self, database: &str, filename: &str) -> Result<FetchedArtifact>;

    async fn delete(&self, database: &str, filename: &str) -> Result<()>;

    fn name(&self) -> String;
}

pub(crate) fn validate_database(database: &str) -> Result<&str> {
    let trimmed = database.trim_matches('/');
    if trimmed.is_empty() || trimmed.split('/').any(|s| s.is_empty() || s == "." || s == "..") {
        return Err(StorageError::InvalidName {
            kind: "database",
            name: database.to_string(),
        });
    }
    Ok(trimmed)
}

pub(crate) fn validate_filename(filename: &str) -> Result<&str> {
    if filename.is_empty()
        || filename == "."
        || filename == ".."
        || filename.contains('/')
        || filename.contains('\\')
    {
        return Err(StorageError::InvalidName {
            kind: "artifact",
            name: filename.to_string(),
        });
    }
    Ok(filename)
}
