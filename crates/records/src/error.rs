use std::path::{Path, PathBuf};

use thiserror::Error;

use invsync_core::{Classify, EntityKey, ErrorKind, KeyError};

/// Failure while reading, validating or writing local records.
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{}: invalid JSON: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("{}: {message}", path.display())]
    Invalid { path: PathBuf, message: String },

    #[error("{}: duplicate {key} (already defined in {})", path.display(), other.display())]
    Duplicate {
        path: PathBuf,
        other: PathBuf,
        key: EntityKey,
    },

    #[error("invalid pattern '{pattern}': {message}")]
    Pattern { pattern: String, message: String },
}

impl RecordError {
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn json(path: impl AsRef<Path>, source: serde_json::Error) -> Self {
        Self::Json {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn invalid(path: impl AsRef<Path>, message: impl Into<String>) -> Self {
        Self::Invalid {
            path: path.as_ref().to_path_buf(),
            message: message.into(),
        }
    }

    pub fn key(path: impl AsRef<Path>, err: KeyError) -> Self {
        Self::invalid(path, err.to_string())
    }
}

impl Classify for RecordError {
    fn kind(&self) -> ErrorKind {
        match self {
            RecordError::Io { .. } => ErrorKind::Io,
            _ => ErrorKind::InvalidRecord,
        }
    }
}
