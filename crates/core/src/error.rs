//! Error taxonomy.
//!
//! Each crate owns a `thiserror` enum for its own failures; all of them map
//! onto [`ErrorKind`] so operators see one vocabulary regardless of which
//! layer failed.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Operator-facing error category.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ErrorKind {
    /// The dependency graph of the record set contains a cycle.
    CycleDetected,
    /// A record references an entity that exists neither locally nor remotely.
    UnresolvedReference,
    /// A local file failed validation.
    InvalidRecord,
    /// The server could not be reached.
    Unreachable,
    /// A request exceeded its time bound.
    Timeout,
    /// The credential was rejected.
    Unauthorized,
    /// The natural key already exists remotely.
    DuplicateKey,
    /// The server rejected the payload.
    InvalidPayload,
    /// The remote entity does not exist.
    NotFound,
    /// Any other server-side failure.
    Server,
    /// A record this one depends on failed earlier in the run.
    DependencyFailed,
    /// A category still has remote children.
    NotEmpty,
    /// A remote entity is still referenced outside the selection.
    InUse,
    /// The run was cancelled or hit its deadline.
    Cancelled,
    /// Local filesystem failure.
    Io,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::CycleDetected => "CycleDetected",
            ErrorKind::UnresolvedReference => "UnresolvedReference",
            ErrorKind::InvalidRecord => "InvalidRecord",
            ErrorKind::Unreachable => "Unreachable",
            ErrorKind::Timeout => "Timeout",
            ErrorKind::Unauthorized => "Unauthorized",
            ErrorKind::DuplicateKey => "DuplicateKey",
            ErrorKind::InvalidPayload => "InvalidPayload",
            ErrorKind::NotFound => "NotFound",
            ErrorKind::Server => "Server",
            ErrorKind::DependencyFailed => "DependencyFailed",
            ErrorKind::NotEmpty => "NotEmpty",
            ErrorKind::InUse => "InUse",
            ErrorKind::Cancelled => "Cancelled",
            ErrorKind::Io => "Io",
        }
    }

    /// Structural errors describe the input data set itself and abort a run
    /// before any mutating remote call.
    pub fn is_structural(self) -> bool {
        matches!(
            self,
            ErrorKind::CycleDetected | ErrorKind::UnresolvedReference | ErrorKind::InvalidRecord
        )
    }
}

impl core::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Implemented by every error type in the workspace.
pub trait Classify {
    fn kind(&self) -> ErrorKind;

    fn is_structural(&self) -> bool {
        self.kind().is_structural()
    }
}

/// A natural key could not be built from its parts.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KeyError {
    #[error("invalid category path '{0}'")]
    CategoryPath(String),

    #[error("name cannot be empty")]
    EmptyName,
}

impl Classify for KeyError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::InvalidRecord
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structural_kinds_are_exactly_the_input_errors() {
        let structural = [
            ErrorKind::CycleDetected,
            ErrorKind::UnresolvedReference,
            ErrorKind::InvalidRecord,
        ];
        for kind in structural {
            assert!(kind.is_structural(), "{kind} should be structural");
        }
        assert!(!ErrorKind::InvalidPayload.is_structural());
        assert!(!ErrorKind::DependencyFailed.is_structural());
    }

    #[test]
    fn display_uses_taxonomy_names() {
        assert_eq!(ErrorKind::NotEmpty.to_string(), "NotEmpty");
        assert_eq!(ErrorKind::Timeout.to_string(), "Timeout");
    }
}
