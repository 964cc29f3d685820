use std::io;
use std::path::Path;
use thiserror::Error;

/// Largest slice of an error response body kept in [`StorageError::Http`].
pub const MAX_ERROR_BODY: usize = 4096;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("{operation} {target}: network error: {source}")]
    Network {
        operation: &'static str,
        target: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{operation} {target}: request failed with status {status}: {body}")]
    Http {
        operation: &'static str,
        target: String,
        status: u16,
        body: String,
    },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    #[error("artifact not found: {0}")]
    NotFound(String),

    #[error("invalid {kind} name {name:?}")]
    InvalidName { kind: &'static str, name: String },

    #[error("invalid response from object store: {0}")]
    InvalidResponse(String),
}

impl StorageError {
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        StorageError::Io {
            context: context.into(),
            source,
        }
    }

    pub(crate) fn io_at(action: &str, path: &Path, source: io::Error) -> Self {
        StorageError::io(format!("{} {}", action, path.display()), source)
    }

    /// HTTP status of a protocol error.
    pub fn status(&self) -> Option<u16> {
        match self {
            StorageError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound(_)) || self.status() == Some(404)
    }

    /// Whether another attempt of the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            StorageError::Network { source, .. } => {
                source.is_timeout() || source.is_connect() || source.is_request()
            }
            StorageError::Http { status, .. } => is_retryable_status(*status),
            _ => false,
        }
    }
}

pub fn is_retryable_status(status: u16) -> bool {
    match status {
        408 | 429 => true,
        501 | 505 => false,
        s => (500..600).contains(&s),
    }
}

impl From<toml::de::Error> for StorageError {
    fn from(err: toml::de::Error) -> Self {
        StorageError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, StorageError>;
