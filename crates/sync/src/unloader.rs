//! Deletes selected records remotely, dependents first.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use serde_json::Value;
use tracing::{info, warn};

use invsync_core::{EntityKind, PartKey, RemoteId};
use invsync_records::{PartRef, Record, RecordEntry, RecordStore, layout};
use invsync_remote::{Payload, Query, RemoteApi};
use invsync_resolver::{Plan, Resolver, Step};

use crate::context::RunContext;
use crate::error::SyncError;
use crate::loader::{Outcome, log_outcome, reports, settle};
use crate::locate;
use crate::report::{ChildCounts, Operation, RunReport};
use crate::state::{Failure, RecordState, SkipReason};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnloadOptions {
    /// Delete the local file once the remote delete is confirmed.
    pub remove_json: bool,
}

impl UnloadOptions {
    pub fn with_remove_json(mut self, remove_json: bool) -> Self {
        self.remove_json = remove_json;
        self
    }
}

/// Removes records from a remote server.
pub struct Unloader<'a> {
    store: &'a RecordStore,
    remote: &'a dyn RemoteApi,
    options: UnloadOptions,
}

impl<'a> Unloader<'a> {
    pub fn new(store: &'a RecordStore, remote: &'a dyn RemoteApi) -> Self {
        Self {
            store,
            remote,
            options: UnloadOptions::default(),
        }
    }

    pub fn with_options(mut self, options: UnloadOptions) -> Self {
        self.options = options;
        self
    }

    /// Records matching `patterns` plus the BOM lines of every selected
    /// assembly, in load order. Nothing outside the selection is pulled in.
    pub fn plan(&self, patterns: &[String]) -> Result<Plan, SyncError> {
        let mut selection = self.store.select(patterns)?;
        let assemblies: HashSet<&PartKey> = selection
            .iter()
            .filter_map(|&idx| self.store.get(idx)?.record.as_part())
            .map(|part| &part.key)
            .collect();
        for (idx, entry) in self.store.entries().iter().enumerate() {
            if let Record::BomLine(line) = &entry.record {
                if assemblies.contains(&line.assembly) {
                    selection.push(idx);
                }
            }
        }
        selection.sort_unstable();
        selection.dedup();
        Ok(Resolver::new(self.store).plan_selection(&selection)?)
    }

    pub fn run(&self, patterns: &[String], ctx: &RunContext) -> Result<RunReport, SyncError> {
        let plan = self.plan(patterns)?;
        Ok(self.execute(&plan, ctx))
    }

    /// Walks `plan` backwards. A record whose in-selection dependents did
    /// not go away is skipped rather than attempted.
    pub fn execute(&self, plan: &Plan, ctx: &RunContext) -> RunReport {
        info!(records = plan.len(), remove_json = self.options.remove_json, "unload started");
        let mut outcomes: Vec<Option<Outcome>> = vec![None; plan.len()];
        for pos in (0..plan.len()).rev() {
            let step = &plan.steps()[pos];
            let outcome = if ctx.should_stop() {
                Outcome::skipped(SkipReason::Cancelled)
            } else if plan.dependents_of(pos).iter().any(|&d| {
                outcomes[d]
                    .as_ref()
                    .is_none_or(|o| o.state.blocks_dependents())
            }) {
                Outcome::skipped(SkipReason::DependencyFailed)
            } else {
                self.unload_step(step)
            };
            log_outcome(step, &outcome);
            outcomes[pos] = Some(outcome);
        }
        let report = reports(self.store, plan, Operation::Unload, outcomes);
        info!(counts = ?report.counts(), "unload finished");
        report
    }

    fn unload_step(&self, step: &Step) -> Outcome {
        let mut state = RecordState::Pending;
        settle(&mut state, RecordState::Checking);
        let result = match self.store.get(step.entry) {
            Some(entry) => self.unload_entry(entry),
            None => Err(SyncError::MissingId(step.key.to_string())),
        };
        let remote_id = match result {
            Ok(Some(id)) => {
                settle(&mut state, RecordState::Deleted);
                Some(id)
            }
            Ok(None) => {
                settle(&mut state, RecordState::skipped(SkipReason::Absent));
                None
            }
            Err(err) => {
                settle(&mut state, RecordState::failed(Failure::from_error(&err)));
                None
            }
        };
        Outcome {
            state,
            remote_id,
            children: ChildCounts::default(),
        }
    }

    /// Deletes the entry remotely. `Ok(None)` when it was already absent.
    fn unload_entry(&self, entry: &RecordEntry) -> Result<Option<RemoteId>, SyncError> {
        let kind = entry.record.kind();
        let Some(id) = self.locate(&entry.record)? else {
            return Ok(None);
        };
        self.check_dependents(&entry.record, id)?;

        if kind == EntityKind::Part {
            let mut inactive = Payload::new();
            inactive.insert("active".to_string(), Value::Bool(false));
            self.remote.update(kind, id, &inactive)?;
        }
        self.remote.delete(kind, id)?;

        if self.options.remove_json {
            self.remove_files(entry);
        }
        Ok(Some(id))
    }

    fn locate(&self, record: &Record) -> Result<Option<RemoteId>, SyncError> {
        Ok(match record {
            Record::Category(category) => locate::find_category(self.remote, &category.path)?,
            Record::Company(company) => self
                .remote
                .find(EntityKind::Company, &locate::company_query(&company.name))?,
            Record::Part(part) => self
                .remote
                .find(EntityKind::Part, &locate::part_query(part))?,
            Record::BomLine(line) => {
                let assembly = locate::find_part_ref(self.remote, &PartRef::to(&line.assembly))?;
                let sub_part = locate::find_part_ref(self.remote, &line.sub_part)?;
                match (assembly, sub_part) {
                    (Some(assembly), Some(sub_part)) => self.remote.find(
                        EntityKind::BomItem,
                        &Query::new()
                            .with("part", assembly.get())
                            .with("sub_part", sub_part.get()),
                    )?,
                    _ => None,
                }
            }
        })
    }

    fn count(&self, kind: EntityKind, field: &str, id: RemoteId) -> Result<usize, SyncError> {
        Ok(self
            .remote
            .list(kind, &Query::new().with(field, id.get()))?
            .len())
    }

    /// Remote entities still referencing `id`. In-selection dependents are
    /// already gone by the time this runs.
    fn check_dependents(&self, record: &Record, id: RemoteId) -> Result<(), SyncError> {
        let key = record.key();
        match record {
            Record::Category(_) => {
                let parts = self.count(EntityKind::Part, "category", id)?;
                let children = self.count(EntityKind::Category, "parent", id)?;
                if parts + children > 0 {
                    return Err(SyncError::not_empty(
                        key,
                        format!("{parts} part(s) and {children} child categories remain"),
                    ));
                }
            }
            Record::Part(_) => {
                let boms = self.count(EntityKind::BomItem, "sub_part", id)?;
                let variants = self.count(EntityKind::Part, "variant_of", id)?;
                if boms + variants > 0 {
                    return Err(SyncError::in_use(
                        key,
                        format!("used by {boms} BOM line(s) and {variants} variant(s)"),
                    ));
                }
            }
            Record::Company(_) => {
                let supplied = self.count(EntityKind::SupplierPart, "supplier", id)?;
                let manufactured = self.count(EntityKind::ManufacturerPart, "manufacturer", id)?;
                if supplied + manufactured > 0 {
                    return Err(SyncError::in_use(
                        key,
                        format!(
                            "referenced by {supplied} supplier part(s) and {manufactured} manufacturer part(s)"
                        ),
                    ));
                }
            }
            Record::BomLine(_) => {}
        }
        Ok(())
    }

    fn remove_files(&self, entry: &RecordEntry) {
        let root = self.store.root();
        let Some(file) = entry.owned_file(root) else {
            return;
        };
        remove_if_present(&file);
        match &entry.record {
            Record::Part(_) => remove_if_present(&layout::bom_path_for(&file)),
            Record::Category(_) => {
                let dir = root.join(&entry.source);
                // Only succeeds when nothing else is left in it.
                if fs::remove_dir(&dir).is_ok() {
                    info!(path = %dir.display(), "category directory removed");
                }
            }
            _ => {}
        }
    }
}

fn remove_if_present(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => info!(path = %path.display(), "local file removed"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "could not remove local file"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use invsync_records::{BomLine, Part};
    use invsync_remote::{InMemoryRemote, Op};
    use serde_json::json;

    fn store() -> RecordStore {
        let table = Part {
            flags: invsync_records::PartFlags {
                assembly: true,
                ..Default::default()
            },
            ..Part::new(PartKey::named("Table").unwrap())
        };
        let entries = vec![
            RecordEntry::new("parts/Leg.json", Record::Part(Part::new(PartKey::named("Leg").unwrap()))),
            RecordEntry::new("parts/Table.json", Record::Part(table)),
            RecordEntry::new(
                "parts/Table.bom.json",
                Record::BomLine(BomLine::new(
                    PartKey::named("Table").unwrap(),
                    PartRef::named("Leg"),
                    4.0,
                )),
            ),
        ];
        RecordStore::from_entries("data", entries).unwrap()
    }

    #[test]
    fn selecting_an_assembly_brings_its_bom_lines() {
        let store = store();
        let remote = InMemoryRemote::new();
        let plan = Unloader::new(&store, &remote)
            .plan(&["parts/Table.json".to_string()])
            .unwrap();
        let keys: Vec<String> = plan.steps().iter().map(|s| s.key.to_string()).collect();
        assert_eq!(keys, vec!["part:Table", "bom:Table>Leg"]);
    }

    #[test]
    fn absent_records_are_skipped_without_deleting() {
        let store = store();
        let remote = InMemoryRemote::new();
        let report = Unloader::new(&store, &remote)
            .run(&[], &RunContext::new())
            .unwrap();
        assert!(report.is_success());
        assert_eq!(report.skipped(SkipReason::Absent).count(), 3);
        assert_eq!(remote.calls(Op::Delete), 0);
    }

    #[test]
    fn parts_are_deactivated_before_delete() {
        let store = store();
        let remote = InMemoryRemote::new();
        remote.seed(EntityKind::Part, json!({"name": "Leg", "revision": "", "active": true}));

        let report = Unloader::new(&store, &remote)
            .run(&["parts/Leg.json".to_string()], &RunContext::new())
            .unwrap();
        assert_eq!(report.records[0].state, RecordState::Deleted);
        assert_eq!(remote.calls_for(Op::Update, EntityKind::Part), 1);
        assert_eq!(remote.count(EntityKind::Part), 0);
    }
}
