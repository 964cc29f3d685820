mod types;

pub use types::*;

use crate::error::{Result, StorageError};
use std::fs;
use std::path::Path;
use tracing::info;

pub fn load_from(path: &Path) -> Result<StorageConfig> {
    info!("Loading storage configuration from {:?}", path);
    let contents = fs::read_to_string(path)
        .map_err(|e| StorageError::io_at("read config", path, e))?;
    from_toml_str(&contents)
}

pub fn from_toml_str(contents: &str) -> Result<StorageConfig> {
    let config: StorageConfig = toml::from_str(contents)?;
    Ok(config)
}
