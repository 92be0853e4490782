use std::collections::BTreeMap;

use serde::Serialize;

use invsync_core::{EntityKind, RemoteId};

use crate::state::{Failure, RecordState, SkipReason};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Load,
    Unload,
}

/// Child entities (addresses, parameters, supplier data, price breaks)
/// reconciled alongside a record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ChildCounts {
    pub found: usize,
    pub created: usize,
    pub updated: usize,
    /// Stale remote children deleted (price breaks with `force_price`).
    pub removed: usize,
}

impl ChildCounts {
    pub fn is_empty(&self) -> bool {
        self.found + self.created + self.updated + self.removed == 0
    }
}

/// Outcome of one record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordReport {
    /// Position in the executed order.
    pub position: usize,
    pub path: String,
    pub key: String,
    pub kind: EntityKind,
    /// False when the record was only processed as a dependency.
    pub selected: bool,
    #[serde(flatten)]
    pub state: RecordState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<RemoteId>,
    #[serde(skip_serializing_if = "ChildCounts::is_empty")]
    pub children: ChildCounts,
}

impl RecordReport {
    pub fn failure(&self) -> Option<&Failure> {
        match &self.state {
            RecordState::Failed { failure } => Some(failure),
            _ => None,
        }
    }
}

/// Outcome of a whole run, in execution order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub operation: Operation,
    pub records: Vec<RecordReport>,
}

impl RunReport {
    pub fn new(operation: Operation, mut records: Vec<RecordReport>) -> Self {
        records.sort_by_key(|r| r.position);
        Self { operation, records }
    }

    /// Records per state label (`Created`, `Failed(InvalidPayload)`, ...).
    pub fn counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for record in &self.records {
            *counts.entry(record.state.label()).or_default() += 1;
        }
        counts
    }

    pub fn count(&self, state: &RecordState) -> usize {
        self.records.iter().filter(|r| &r.state == state).count()
    }

    pub fn failures(&self) -> impl Iterator<Item = &RecordReport> {
        self.records.iter().filter(|r| r.failure().is_some())
    }

    pub fn skipped(&self, reason: SkipReason) -> impl Iterator<Item = &RecordReport> {
        self.records
            .iter()
            .filter(move |r| r.state == RecordState::skipped(reason))
    }

    pub fn is_success(&self) -> bool {
        self.records.iter().all(|r| r.state.is_success())
    }

    /// `0` when every record succeeded, `1` otherwise.
    pub fn exit_code(&self) -> i32 {
        if self.is_success() { 0 } else { 1 }
    }

    pub fn record(&self, path: &str) -> Option<&RecordReport> {
        self.records.iter().find(|r| r.path == path)
    }
}
