use super::provider::{FetchedArtifact, StorageProvider, StoredArtifact};
use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, warn};

/// Keeps every artifact both on a remote backend and in a local directory.
///
/// Reads prefer the local copy. The remote copy is written first because a
/// local save may consume the source file. Listings cover both sides so that
/// retention also reaches artifacts held only by the remote backend.
pub struct MirroredProvider {
    local: Box<dyn StorageProvider>,
    remote: Box<dyn StorageProvider>,
}

impl MirroredProvider {
    pub fn new(local: Box<dyn StorageProvider>, remote: Box<dyn StorageProvider>) -> Self {
        Self { local, remote }
    }
}

#[async_trait]
impl StorageProvider for MirroredProvider {
    async fn ensure_database(&self, database: &str) -> Result<()> {
        self.local.ensure_database(database).await?;
        self.remote.ensure_database(database).await
    }

    async fn save(&self, database: &str, filename: &str, source: &Path) -> Result<()> {
        self.remote.save(database, filename, source).await?;
        self.local.save(database, filename, source).await
    }

    /// Union of both listings by name; local timestamps win.
    async fn list(&self, database: &str) -> Result<Vec<StoredArtifact>> {
        let mut artifacts = self.local.list(database).await?;
        let known: HashSet<String> = artifacts.iter().map(|a| a.name.clone()).collect();

        let remote_only: Vec<StoredArtifact> = self
            .remote
            .list(database)
            .await?
            .into_iter()
            .filter(|a| !known.contains(&a.name))
            .collect();
        if !remote_only.is_empty() {
            debug!(
                "{} artifact(s) of {} only present on {}",
                remote_only.len(),
                database,
                self.remote.name()
            );
        }
        artifacts.extend(remote_only);
        Ok(artifacts)
    }

    async fn fetch(&self, database: &str, filename: &str) -> Result<FetchedArtifact> {
        match self.local.fetch(database, filename).await {
            Err(err) if err.is_not_found() => {
                warn!(
                    "{} missing from {}, fetching from {}",
                    filename,
                    self.local.name(),
                    self.remote.name()
                );
                self.remote.fetch(database, filename).await
            }
            other => other,
        }
    }

    /// Deletes from both sides. A copy missing on one side is fine as long as
    /// the other side removed it; otherwise the first failure is returned.
    async fn delete(&self, database: &str, filename: &str) -> Result<()> {
        let remote = self.remote.delete(database, filename).await;
        let local = self.local.delete(database, filename).await;
        match (remote, local) {
            (Ok(()), Ok(())) => Ok(()),
            (Ok(()), Err(err)) | (Err(err), Ok(())) if err.is_not_found() => Ok(()),
            (Err(err), Ok(())) | (Ok(()), Err(err)) => Err(err),
            (Err(remote_err), Err(local_err)) => {
                warn!("Local delete of {} also failed: {}", filename, local_err);
                Err(remote_err)
            }
        }
    }

    fn name(&self) -> String {
        format!("{}+{}", self.local.name(), self.remote.name())
    }
}
