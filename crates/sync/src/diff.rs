//! Read-only comparison of the local data root with the remote catalogue.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use serde_json::Value;
use tracing::info;

use invsync_core::EntityKind;
use invsync_records::{Record, RecordStore};

use crate::error::SyncError;
use crate::exporter::{Collected, Exporter};

/// How one record differs between disk and server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "drift", rename_all = "snake_case")]
pub enum Drift {
    Identical,
    /// Present on both sides; `fields` lists the top-level fields that differ.
    Changed { fields: Vec<String> },
    /// Only on the server.
    RemoteOnly,
    /// Only on disk; a load would create it.
    LocalOnly,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiffEntry {
    pub key: String,
    pub kind: EntityKind,
    /// Source file, for records that exist locally.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(flatten)]
    pub drift: Drift,
}

/// Result of comparing a data root against the server, sorted by key.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DiffReport {
    pub entries: Vec<DiffEntry>,
    /// Remote objects the exporter could not represent locally.
    pub skipped: usize,
}

impl DiffReport {
    pub fn is_clean(&self) -> bool {
        self.entries.iter().all(|e| e.drift == Drift::Identical)
    }

    pub fn drifted(&self) -> impl Iterator<Item = &DiffEntry> {
        self.entries.iter().filter(|e| e.drift != Drift::Identical)
    }

    /// Number of entries per drift label.
    pub fn counts(&self) -> BTreeMap<&'static str, usize> {
        let mut counts = BTreeMap::new();
        for entry in &self.entries {
            *counts.entry(entry.drift.label()).or_default() += 1;
        }
        counts
    }
}

impl Drift {
    pub fn label(&self) -> &'static str {
        match self {
            Drift::Identical => "identical",
            Drift::Changed { .. } => "changed",
            Drift::RemoteOnly => "remote_only",
            Drift::LocalOnly => "local_only",
        }
    }
}

impl Exporter<'_> {
    /// Compares every record in `store` with what the server holds. Nothing
    /// is written on either side.
    pub fn diff(&self, store: &RecordStore) -> Result<DiffReport, SyncError> {
        Ok(diff(store, self.collect_all()?))
    }
}

fn diff(store: &RecordStore, collected: Collected) -> DiffReport {
    let mut remote_records: BTreeMap<String, Record> = collected
        .records
        .into_iter()
        .map(|record| (record.key().to_string(), normalized(record)))
        .collect();

    let mut entries = Vec::new();
    for entry in store.entries() {
        let key = entry.key().to_string();
        let drift = match remote_records.remove(&key) {
            None => Drift::LocalOnly,
            Some(remote_record) => {
                let fields = changed_fields(&normalized(entry.record.clone()), &remote_record);
                if fields.is_empty() {
                    Drift::Identical
                } else {
                    Drift::Changed { fields }
                }
            }
        };
        entries.push(DiffEntry {
            key,
            kind: entry.record.kind(),
            path: Some(entry.display_path()),
            drift,
        });
    }
    entries.extend(remote_records.into_iter().map(|(key, record)| DiffEntry {
        key,
        kind: record.kind(),
        path: None,
        drift: Drift::RemoteOnly,
    }));
    entries.sort_by(|a, b| a.key.cmp(&b.key));

    let report = DiffReport {
        entries,
        skipped: collected.skipped,
    };
    info!(
        records = report.entries.len(),
        drifted = report.drifted().count(),
        "diff finished"
    );
    report
}

/// Orders the list-valued parts of a record the way the exporter does.
fn normalized(mut record: Record) -> Record {
    if let Record::Part(part) = &mut record {
        part.suppliers
            .sort_by(|a, b| (&a.supplier, &a.sku).cmp(&(&b.supplier, &b.sku)));
        for association in &mut part.suppliers {
            association.price_breaks.sort_by_key(|p| p.quantity);
        }
    }
    record
}

fn fields_of(record: &Record) -> serde_json::Map<String, Value> {
    match serde_json::to_value(record) {
        Ok(Value::Object(mut tagged)) => match tagged.remove("record") {
            Some(Value::Object(fields)) => fields,
            _ => serde_json::Map::new(),
        },
        _ => serde_json::Map::new(),
    }
}

fn changed_fields(local: &Record, remote: &Record) -> Vec<String> {
    let local = fields_of(local);
    let remote = fields_of(remote);
    let names: BTreeSet<&String> = local.keys().chain(remote.keys()).collect();
    names
        .into_iter()
        .filter(|name| local.get(*name) != remote.get(*name))
        .cloned()
        .collect()
}
