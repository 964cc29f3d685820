use super::key::{normalize_prefix, ObjectKey};
use super::provider::{validate_database, validate_filename, FetchedArtifact, StorageProvider, StoredArtifact};
use crate::config::S3Config;
use crate::error::{Result, StorageError};
use crate::s3::{ObjectStoreClient, PutPayload};
use async_trait::async_trait;
use futures::TryStreamExt;
use std::path::Path;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

/// Stores artifacts as objects under `<prefix/>?<database>/<filename>`.
pub struct ObjectStorageProvider {
    client: ObjectStoreClient,
    bucket: String,
    prefix: Option<String>,
    storage_class: Option<String>,
}

impl ObjectStorageProvider {
    pub fn new(config: &S3Config) -> Result<Self> {
        let bucket = config.bucket.trim();
        if bucket.is_empty() {
            return Err(StorageError::Config("s3 bucket must not be empty".to_string()));
        }

        Ok(Self {
            client: ObjectStoreClient::new(config)?,
            bucket: bucket.to_string(),
            prefix: normalize_prefix(&config.prefix),
            storage_class: config
                .storage_class
                .as_deref()
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(str::to_string),
        })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn client(&self) -> &ObjectStoreClient {
        &self.client
    }

    fn key(&self, database: &str, filename: &str) -> Result<ObjectKey> {
        Ok(ObjectKey::new(
            self.prefix.as_deref(),
            validate_database(database)?,
            validate_filename(filename)?,
        ))
    }
}

#[async_trait]
impl StorageProvider for ObjectStorageProvider {
    async fn ensure_database(&self, database: &str) -> Result<()> {
        // Object stores have no directories to create.
        validate_database(database)?;
        Ok(())
    }

    async fn save(&self, database: &str, filename: &str, source: &Path) -> Result<()> {
        let key = self.key(database, filename)?;
        let payload = PutPayload::from_file(source).await?;

        let mut headers = Vec::new();
        if let Some(class) = &self.storage_class {
            headers.push(("x-amz-storage-class".to_string(), class.clone()));
        }

        self.client
            .put_object(&self.bucket, key.as_str(), &payload, &headers)
            .await?;
        info!(
            "Uploaded {} ({} bytes) to s3://{}/{}",
            filename,
            payload.content_length(),
            self.bucket,
            key
        );
        Ok(())
    }

    async fn list(&self, database: &str) -> Result<Vec<StoredArtifact>> {
        let prefix = ObjectKey::database_prefix(self.prefix.as_deref(), validate_database(database)?);
        let objects = self.client.list_all_objects(&self.bucket, Some(&prefix)).await?;

        Ok(objects
            .into_iter()
            .filter_map(|object| {
                let name = ObjectKey::artifact_name(&prefix, &object.key)?;
                Some(StoredArtifact {
                    name: name.to_string(),
                    last_modified: object.last_modified,
                })
            })
            .collect())
    }

    async fn fetch(&self, database: &str, filename: &str) -> Result<FetchedArtifact> {
        let key = self.key(database, filename)?;
        let object = match self.client.get_object(&self.bucket, key.as_str()).await {
            Ok(object) => object,
            Err(err) if err.is_not_found() => {
                return Err(StorageError::NotFound(format!("s3://{}/{}", self.bucket, key)))
            }
            Err(err) => return Err(err),
        };

        let temp = tempfile::Builder::new()
            .prefix("s3-backup-")
            .suffix(".dump")
            .tempfile()
            .map_err(|e| StorageError::io("create download file", e))?;
        let (file, temp_path) = temp.into_parts();
        // From here on dropping `temp_path` removes the partial download.
        let mut writer = tokio::fs::File::from_std(file);

        let mut stream = Box::pin(object.into_stream());
        let mut written = 0u64;
        while let Some(chunk) = stream.try_next().await? {
            writer
                .write_all(&chunk)
                .await
                .map_err(|e| StorageError::io_at("write", &temp_path, e))?;
            written += chunk.len() as u64;
        }
        writer
            .flush()
            .await
            .map_err(|e| StorageError::io_at("flush", &temp_path, e))?;
        writer
            .sync_all()
            .await
            .map_err(|e| StorageError::io_at("sync", &temp_path, e))?;
        drop(writer);

        debug!(
            "Downloaded s3://{}/{} ({} bytes) to {:?}",
            self.bucket, key, written, temp_path
        );
        Ok(FetchedArtifact::temporary(temp_path))
    }

    async fn delete(&self, database: &str, filename: &str) -> Result<()> {
        let key = self.key(database, filename)?;
        self.client.delete_object(&self.bucket, key.as_str()).await?;
        info!("Deleted s3://{}/{}", self.bucket, key);
        Ok(())
    }

    fn name(&self) -> String {
        format!("s3:{}", self.bucket)
    }
}
