//! Per-record lifecycle during a load or unload run.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use invsync_core::{Classify, ErrorKind};

/// Why a record was not attempted.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// A record it depends on (or, when unloading, one depending on it)
    /// failed or was skipped.
    DependencyFailed,
    /// Unload only: the record does not exist remotely.
    Absent,
    /// The run was cancelled or hit its deadline first.
    Cancelled,
}

impl core::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            SkipReason::DependencyFailed => "DependencyFailed",
            SkipReason::Absent => "Absent",
            SkipReason::Cancelled => "Cancelled",
        })
    }
}

/// Error attached to a failed record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    pub kind: ErrorKind,
    pub message: String,
}

impl Failure {
    pub fn from_error<E: Classify + ToString>(err: &E) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Record lifecycle.
///
/// Loader: `Pending → Resolving → {Found | Created | Updated | Failed | Skipped}`.
/// Unloader: `Pending → Checking → {Deleted | Failed | Skipped}`.
/// Both may go straight from `Pending` to `Skipped`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RecordState {
    Pending,
    Resolving,
    Checking,
    Found,
    Created,
    Updated,
    Deleted,
    Failed { failure: Failure },
    Skipped { reason: SkipReason },
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("illegal record transition {from} -> {to}")]
pub struct TransitionError {
    pub from: String,
    pub to: String,
}

impl RecordState {
    pub fn failed(failure: Failure) -> Self {
        Self::Failed { failure }
    }

    pub fn skipped(reason: SkipReason) -> Self {
        Self::Skipped { reason }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(
            self,
            RecordState::Pending | RecordState::Resolving | RecordState::Checking
        )
    }

    /// Terminal and counted as success: the remote side now matches the
    /// request (including "already absent").
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            RecordState::Found
                | RecordState::Created
                | RecordState::Updated
                | RecordState::Deleted
                | RecordState::Skipped {
                    reason: SkipReason::Absent
                }
        )
    }

    /// Whether records depending on this one must be skipped.
    pub fn blocks_dependents(&self) -> bool {
        matches!(
            self,
            RecordState::Failed { .. }
                | RecordState::Skipped {
                    reason: SkipReason::DependencyFailed | SkipReason::Cancelled
                }
        )
    }

    pub fn label(&self) -> String {
        match self {
            RecordState::Pending => "Pending".to_string(),
            RecordState::Resolving => "Resolving".to_string(),
            RecordState::Checking => "Checking".to_string(),
            RecordState::Found => "Found".to_string(),
            RecordState::Created => "Created".to_string(),
            RecordState::Updated => "Updated".to_string(),
            RecordState::Deleted => "Deleted".to_string(),
            RecordState::Failed { failure } => format!("Failed({})", failure.kind),
            RecordState::Skipped { reason } => format!("Skipped({reason})"),
        }
    }

    /// Moves to `next` if the lifecycle allows it.
    pub fn advance(&mut self, next: RecordState) -> Result<(), TransitionError> {
        use RecordState::*;
        let allowed = match (&*self, &next) {
            (Pending, Resolving | Checking | Skipped { .. }) => true,
            (Resolving, Found | Created | Updated | Failed { .. }) => true,
            (
                Resolving,
                Skipped {
                    reason: SkipReason::Cancelled,
                },
            ) => true,
            (Checking, Deleted | Failed { .. }) => true,
            (
                Checking,
                Skipped {
                    reason: SkipReason::Absent | SkipReason::Cancelled,
                },
            ) => true,
            _ => false,
        };
        if !allowed {
            return Err(TransitionError {
                from: self.label(),
                to: next.label(),
            });
        }
        *self = next;
        Ok(())
    }
}

impl core::fmt::Display for RecordState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.label())
    }
}
