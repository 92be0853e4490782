use std::collections::BTreeMap;

use thiserror::Error;

use invsync_core::{Classify, EntityKind, ErrorKind, RemoteId};

/// Field name → messages, as reported by the server on a rejected payload.
pub type FieldErrors = BTreeMap<String, Vec<String>>;

/// Failure of a single remote call.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RemoteError {
    #[error("server unreachable at {url}: {message}")]
    Unreachable { url: String, message: String },

    #[error("request to {url} timed out")]
    Timeout { url: String },

    #[error("credential rejected (HTTP {status})")]
    Unauthorized { status: u16 },

    #[error("{kind} already exists: {message}")]
    DuplicateKey { kind: EntityKind, message: String },

    #[error("{kind} rejected: {}", describe(fields))]
    InvalidPayload { kind: EntityKind, fields: FieldErrors },

    #[error("{kind}{} not found", id.map(|id| format!(" #{id}")).unwrap_or_default())]
    NotFound {
        kind: EntityKind,
        id: Option<RemoteId>,
    },

    #[error("server error (HTTP {status}): {message}")]
    Server { status: u16, message: String },

    #[error("unexpected response: {message}")]
    Decode { message: String },
}

fn describe(fields: &FieldErrors) -> String {
    fields
        .iter()
        .map(|(field, messages)| format!("{field}: {}", messages.join(" ")))
        .collect::<Vec<_>>()
        .join("; ")
}

impl RemoteError {
    pub fn invalid(kind: EntityKind, field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut fields = FieldErrors::new();
        fields.insert(field.into(), vec![message.into()]);
        Self::InvalidPayload { kind, fields }
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// Whether a 400 response really reports a uniqueness violation.
    pub(crate) fn is_uniqueness_message(message: &str) -> bool {
        let lower = message.to_ascii_lowercase();
        lower.contains("already exists")
            || lower.contains("must be unique")
            || lower.contains("must make a unique set")
    }
}

impl Classify for RemoteError {
    fn kind(&self) -> ErrorKind {
        match self {
            RemoteError::Unreachable { .. } => ErrorKind::Unreachable,
            RemoteError::Timeout { .. } => ErrorKind::Timeout,
            RemoteError::Unauthorized { .. } => ErrorKind::Unauthorized,
            RemoteError::DuplicateKey { .. } => ErrorKind::DuplicateKey,
            RemoteError::InvalidPayload { .. } => ErrorKind::InvalidPayload,
            RemoteError::NotFound { .. } => ErrorKind::NotFound,
            RemoteError::Server { .. } | RemoteError::Decode { .. } => ErrorKind::Server,
        }
    }
}
