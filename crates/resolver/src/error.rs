use thiserror::Error;

use invsync_core::{Classify, ErrorKind};

/// A reference nothing local or remote satisfies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unresolved {
    /// Source path of the referring record.
    pub record: String,
    pub reference: String,
}

impl core::fmt::Display for Unresolved {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{} -> {}", self.record, self.reference)
    }
}

/// Failure of an existence check against the remote server.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct LookupError {
    pub kind: ErrorKind,
    pub message: String,
}

impl LookupError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("dependency cycle between {}", records.join(", "))]
    CycleDetected { records: Vec<String> },

    #[error("unresolved references: {}", join(unresolved))]
    Unresolved { unresolved: Vec<Unresolved> },

    #[error("{record}: {reference} is ambiguous (candidates: {})", candidates.join(", "))]
    Ambiguous {
        record: String,
        reference: String,
        candidates: Vec<String>,
    },

    #[error("looking up {reference}: {source}")]
    Lookup {
        reference: String,
        #[source]
        source: LookupError,
    },
}

fn join(items: &[Unresolved]) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl Classify for ResolveError {
    fn kind(&self) -> ErrorKind {
        match self {
            ResolveError::CycleDetected { .. } => ErrorKind::CycleDetected,
            ResolveError::Unresolved { .. } | ResolveError::Ambiguous { .. } => {
                ErrorKind::UnresolvedReference
            }
            ResolveError::Lookup { source, .. } => source.kind,
        }
    }
}
