use thiserror::Error;

use invsync_core::{Classify, ErrorKind};
use invsync_records::RecordError;
use invsync_remote::RemoteError;
use invsync_resolver::ResolveError;

use crate::state::TransitionError;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Records(#[from] RecordError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// A category still has parts or child categories remotely.
    #[error("{what} is not empty: {detail}")]
    NotEmpty { what: String, detail: String },

    /// A part or company is still referenced remotely.
    #[error("{what} is in use: {detail}")]
    InUse { what: String, detail: String },

    /// A dependency was processed but left no remote id behind.
    #[error("no remote id for {0}")]
    MissingId(String),

    #[error(transparent)]
    Transition(#[from] TransitionError),
}

impl SyncError {
    pub fn not_empty(what: impl ToString, detail: impl Into<String>) -> Self {
        Self::NotEmpty {
            what: what.to_string(),
            detail: detail.into(),
        }
    }

    pub fn in_use(what: impl ToString, detail: impl Into<String>) -> Self {
        Self::InUse {
            what: what.to_string(),
            detail: detail.into(),
        }
    }
}

impl Classify for SyncError {
    fn kind(&self) -> ErrorKind {
        match self {
            SyncError::Records(e) => e.kind(),
            SyncError::Resolve(e) => e.kind(),
            SyncError::Remote(e) => e.kind(),
            SyncError::NotEmpty { .. } => ErrorKind::NotEmpty,
            SyncError::InUse { .. } => ErrorKind::InUse,
            SyncError::MissingId(_) => ErrorKind::DependencyFailed,
            SyncError::Transition(_) => ErrorKind::Server,
        }
    }
}
