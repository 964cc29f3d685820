mod key;
mod local;
#[cfg(test)]
pub(crate) mod memory;
mod mirror;
mod object;
mod provider;

pub use key::{normalize_prefix, ObjectKey};
pub use local::LocalProvider;
pub use mirror::MirroredProvider;
pub use object::ObjectStorageProvider;
pub use provider::{FetchedArtifact, StorageProvider, StoredArtifact};

use crate::config::{BackupTarget, S3Config, StorageConfig};
use crate::error::{Result, StorageError};
use tracing::info;

fn s3_settings(config: &StorageConfig) -> Result<&S3Config> {
    config.s3.as_ref().ok_or_else(|| {
        StorageError::Config(format!(
            "target '{}' requires an [s3] section",
            config.target
        ))
    })
}

fn local_provider(config: &StorageConfig) -> Result<LocalProvider> {
    if config.local.base_path.as_os_str().is_empty() {
        return Err(StorageError::Config(format!(
            "target '{}' requires local.base_path",
            config.target
        )));
    }
    Ok(LocalProvider::new(&config.local.base_path))
}

/// Builds the backend selected by `config.target`.
pub fn create_provider(config: &StorageConfig) -> Result<Box<dyn StorageProvider>> {
    let provider: Box<dyn StorageProvider> = match config.target {
        BackupTarget::Local => Box::new(local_provider(config)?),
        BackupTarget::S3 => Box::new(ObjectStorageProvider::new(s3_settings(config)?)?),
        BackupTarget::Both => Box::new(MirroredProvider::new(
            Box::new(local_provider(config)?),
            Box::new(ObjectStorageProvider::new(s3_settings(config)?)?),
        )),
    };
    info!("Using storage backend {}", provider.name());
    Ok(provider)
}
