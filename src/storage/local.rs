use super::provider::{validate_database, validate_filename, FetchedArtifact, StorageProvider, StoredArtifact};
use crate::error::{Result, StorageError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

const STAGING_PREFIX: &str = ".staging-";

/// Stores artifacts as `<base_path>/<database>/<filename>`.
#[derive(Debug, Clone)]
pub struct LocalProvider {
    base_path: PathBuf,
}

impl LocalProvider {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn database_path(&self, database: &str) -> Result<PathBuf> {
        Ok(self.base_path.join(validate_database(database)?))
    }

    fn artifact_path(&self, database: &str, filename: &str) -> Result<PathBuf> {
        Ok(self.database_path(database)?.join(validate_filename(filename)?))
    }
}

/// Copies `source` next to `destination`, syncs it, then renames it into place.
async fn copy_into_place(source: &Path, destination: &Path) -> Result<()> {
    let directory = destination
        .parent()
        .ok_or_else(|| StorageError::io_at("resolve parent of", destination, io::ErrorKind::InvalidInput.into()))?;

    let staging = tempfile::Builder::new()
        .prefix(STAGING_PREFIX)
        .suffix(".partial")
        .tempfile_in(directory)
        .map_err(|e| StorageError::io_at("create staging file in", directory, e))?;
    let (file, staging_path) = staging.into_parts();

    let mut reader = fs::File::open(source)
        .await
        .map_err(|e| StorageError::io_at("open", source, e))?;
    let mut writer = fs::File::from_std(file);
    tokio::io::copy(&mut reader, &mut writer)
        .await
        .map_err(|e| StorageError::io_at("copy into", &staging_path, e))?;
    writer
        .sync_all()
        .await
        .map_err(|e| StorageError::io_at("sync", &staging_path, e))?;
    drop(writer);

    staging_path
        .persist(destination)
        .map_err(|e| StorageError::io_at("move staged copy to", destination, e.error))?;
    Ok(())
}

/// Removes the source of a completed copy. The artifact is already in place,
/// so a failure here only leaves a stray file behind.
async fn discard_source(source: &Path) {
    if let Err(e) = fs::remove_file(source).await {
        warn!("Saved copy of {:?} but could not remove the source: {}", source, e);
    }
}

#[async_trait]
impl StorageProvider for LocalProvider {
    async fn ensure_database(&self, database: &str) -> Result<()> {
        let path = self.database_path(database)?;
        fs::create_dir_all(&path)
            .await
            .map_err(|e| StorageError::io_at("create directory", &path, e))?;
        debug!("Ensured backup directory {:?}", path);
        Ok(())
    }

    async fn save(&self, database: &str, filename: &str, source: &Path) -> Result<()> {
        let destination = self.artifact_path(database, filename)?;
        let directory = self.database_path(database)?;
        fs::create_dir_all(&directory)
            .await
            .map_err(|e| StorageError::io_at("create directory", &directory, e))?;

        if let Err(err) = fs::rename(source, &destination).await {
            debug!("Rename of {:?} failed ({}), copying instead", source, err);
            copy_into_place(source, &destination).await?;
            discard_source(source).await;
        }

        info!("Saved {} to {:?}", filename, destination);
        Ok(())
    }

    async fn list(&self, database: &str) -> Result<Vec<StoredArtifact>> {
        let directory = self.database_path(database)?;
        let mut entries = match fs::read_dir(&directory).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StorageError::io_at("read directory", &directory, e)),
        };

        let mut artifacts = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StorageError::io_at("read directory", &directory, e))?
        {
            let name = match entry.file_name().into_string() {
                Ok(name) => name,
                Err(raw) => {
                    warn!("Skipping non UTF-8 entry {:?} in {:?}", raw, directory);
                    continue;
                }
            };
            if name.starts_with('.') {
                continue;
            }
            let metadata = entry
                .metadata()
                .await
                .map_err(|e| StorageError::io_at("stat", &entry.path(), e))?;
            if !metadata.is_file() {
                continue;
            }
            artifacts.push(StoredArtifact {
                name,
                last_modified: metadata.modified().ok().map(DateTime::<Utc>::from),
            });
        }

        Ok(artifacts)
    }

    async fn fetch(&self, database: &str, filename: &str) -> Result<FetchedArtifact> {
        let path = self.artifact_path(database, filename)?;
        match fs::metadata(&path).await {
            Ok(metadata) if metadata.is_file() => Ok(FetchedArtifact::in_place(path)),
            Ok(_) => Err(StorageError::NotFound(path.display().to_string())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(path.display().to_string()))
            }
            Err(e) => Err(StorageError::io_at("stat", &path, e)),
        }
    }

    async fn delete(&self, database: &str, filename: &str) -> Result<()> {
        let path = self.artifact_path(database, filename)?;
        match fs::remove_file(&path).await {
            Ok(()) => {
                info!("Deleted {:?}", path);
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(path.display().to_string()))
            }
            Err(e) => Err(StorageError::io_at("remove", &path, e)),
        }
    }

    fn name(&self) -> String {
        format!("local:{}", self.base_path.display())
    }
}
