//! Storage layer for PostgreSQL dump artifacts: a SigV4 object-store client,
//! local and object-store providers, and tiered retention.

pub mod config;
pub mod error;
pub mod logging;
pub mod retention;
pub mod s3;
pub mod storage;

pub use config::{BackupTarget, S3Config, StorageConfig};
pub use error::{Result, StorageError};
pub use retention::{cleanup, Classification, CleanupReport};
pub use storage::{create_provider, FetchedArtifact, StorageProvider, StoredArtifact};
