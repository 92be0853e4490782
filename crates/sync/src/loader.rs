//! Creates (or finds) records remotely in dependency order.

use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::{debug, info, warn};

use invsync_core::{EntityKey, EntityKind, RemoteId};
use invsync_records::{
    Address, BomLine, Category, Company, Part, PartRef, PriceBreak, Record, RecordStore,
    Reference, SupplierAssociation,
};
use invsync_remote::{Payload, Query, RemoteApi, RemoteError};
use invsync_resolver::{Plan, Resolver, Step, Target};

use crate::context::RunContext;
use crate::error::SyncError;
use crate::locate::{self, RemoteLookup};
use crate::payload;
use crate::report::{ChildCounts, Operation, RecordReport, RunReport};
use crate::state::{Failure, RecordState, SkipReason};

/// Loader behaviour switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadOptions {
    /// PATCH records (and their children) that already exist remotely.
    pub force: bool,
    /// Give parts without IPN their truncated name as IPN.
    pub force_ipn: bool,
    /// Make remote price breaks match the local ones: PATCH prices and
    /// delete quantities no longer listed.
    pub force_price: bool,
    /// Worker threads per dependency level; `1` runs sequentially.
    pub workers: usize,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            force: false,
            force_ipn: false,
            force_price: false,
            workers: 1,
        }
    }
}

impl LoadOptions {
    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn with_force_ipn(mut self, force_ipn: bool) -> Self {
        self.force_ipn = force_ipn;
        self
    }

    pub fn with_force_price(mut self, force_price: bool) -> Self {
        self.force_price = force_price;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }
}

/// Result of processing one step.
#[derive(Debug, Clone)]
pub(crate) struct Outcome {
    pub(crate) state: RecordState,
    pub(crate) remote_id: Option<RemoteId>,
    pub(crate) children: ChildCounts,
}

impl Outcome {
    pub(crate) fn skipped(reason: SkipReason) -> Self {
        Self {
            state: RecordState::skipped(reason),
            remote_id: None,
            children: ChildCounts::default(),
        }
    }
}

/// A failed step, with the id of the record itself when it was created or
/// found before a child failed.
#[derive(Debug)]
struct StepError {
    error: SyncError,
    remote_id: Option<RemoteId>,
}

impl From<SyncError> for StepError {
    fn from(error: SyncError) -> Self {
        Self {
            error,
            remote_id: None,
        }
    }
}

/// Moves `state` to `next`, turning an illegal transition into a failure.
pub(crate) fn settle(state: &mut RecordState, next: RecordState) {
    if let Err(err) = state.advance(next) {
        *state = RecordState::failed(Failure::from_error(&SyncError::from(err)));
    }
}

pub(crate) fn reports(
    store: &RecordStore,
    plan: &Plan,
    operation: Operation,
    outcomes: Vec<Option<Outcome>>,
) -> RunReport {
    let records = plan
        .steps()
        .iter()
        .zip(outcomes)
        .enumerate()
        .filter_map(|(position, (step, outcome))| {
            let entry = store.get(step.entry)?;
            let outcome = outcome.unwrap_or_else(|| Outcome::skipped(SkipReason::Cancelled));
            Some(RecordReport {
                position,
                path: step.path.clone(),
                key: step.key.to_string(),
                kind: entry.record.kind(),
                selected: step.selected,
                state: outcome.state,
                remote_id: outcome.remote_id,
                children: outcome.children,
            })
        })
        .collect();
    RunReport::new(operation, records)
}

pub(crate) fn log_outcome(step: &Step, outcome: &Outcome) {
    match &outcome.state {
        RecordState::Failed { failure } => warn!(
            path = %step.path,
            key = %step.key,
            kind = %failure.kind,
            error = %failure.message,
            "record failed"
        ),
        state => info!(
            path = %step.path,
            key = %step.key,
            state = %state,
            remote_id = ?outcome.remote_id.map(RemoteId::get),
            "record processed"
        ),
    }
}

fn reference_key(reference: &Reference) -> EntityKey {
    match reference {
        Reference::Category(path) => EntityKey::category(path.clone()),
        Reference::Company(name) => EntityKey::company(name.clone()),
        Reference::Part(part) => EntityKey::part(part.key()),
    }
}

/// Loads a record store into a remote server.
pub struct Loader<'a> {
    store: &'a RecordStore,
    remote: &'a dyn RemoteApi,
    options: LoadOptions,
}

impl<'a> Loader<'a> {
    pub fn new(store: &'a RecordStore, remote: &'a dyn RemoteApi) -> Self {
        Self {
            store,
            remote,
            options: LoadOptions::default(),
        }
    }

    pub fn with_options(mut self, options: LoadOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> LoadOptions {
        self.options
    }

    /// Orders the records matching `patterns` (all when empty) plus their
    /// local dependencies. Performs only read-only remote lookups, and none
    /// at all when the record set is cyclic.
    pub fn plan(&self, patterns: &[String]) -> Result<Plan, SyncError> {
        let selection = self.store.select(patterns)?;
        let lookup = RemoteLookup::new(self.remote);
        Ok(Resolver::new(self.store).plan(&selection, &lookup)?)
    }

    /// Plans and executes a load. Structural errors are returned before any
    /// mutating call; per-record failures end up in the report.
    pub fn run(&self, patterns: &[String], ctx: &RunContext) -> Result<RunReport, SyncError> {
        let plan = self.plan(patterns)?;
        Ok(self.execute(&plan, ctx))
    }

    pub fn execute(&self, plan: &Plan, ctx: &RunContext) -> RunReport {
        for (reference, id) in plan.external() {
            ctx.remember(reference_key(reference), *id);
        }
        info!(
            records = plan.len(),
            levels = plan.levels().len(),
            workers = self.options.workers,
            force = self.options.force,
            "load started"
        );

        let mut outcomes: Vec<Option<Outcome>> = vec![None; plan.len()];
        for range in plan.levels() {
            let done = if self.options.workers > 1 && range.len() > 1 {
                self.run_parallel(plan, range, &outcomes, ctx)
            } else {
                range
                    .map(|pos| (pos, self.process(plan, pos, &outcomes, ctx)))
                    .collect()
            };
            for (pos, outcome) in done {
                outcomes[pos] = Some(outcome);
            }
        }

        let report = reports(self.store, plan, Operation::Load, outcomes);
        info!(counts = ?report.counts(), "load finished");
        report
    }

    /// Runs one level on scoped worker threads pulling positions from a
    /// shared cursor.
    fn run_parallel(
        &self,
        plan: &Plan,
        range: std::ops::Range<usize>,
        outcomes: &[Option<Outcome>],
        ctx: &RunContext,
    ) -> Vec<(usize, Outcome)> {
        let cursor = AtomicUsize::new(range.start);
        let workers = self.options.workers.min(range.len());
        std::thread::scope(|s| {
            let handles: Vec<_> = (0..workers)
                .map(|_| {
                    s.spawn(|| {
                        let mut done = Vec::new();
                        loop {
                            let pos = cursor.fetch_add(1, Ordering::SeqCst);
                            if pos >= range.end {
                                break;
                            }
                            done.push((pos, self.process(plan, pos, outcomes, ctx)));
                        }
                        done
                    })
                })
                .collect();
            handles
                .into_iter()
                .flat_map(|h| h.join().unwrap_or_else(|e| std::panic::resume_unwind(e)))
                .collect()
        })
    }

    fn process(
        &self,
        plan: &Plan,
        pos: usize,
        outcomes: &[Option<Outcome>],
        ctx: &RunContext,
    ) -> Outcome {
        let step = &plan.steps()[pos];
        let outcome = if ctx.should_stop() {
            Outcome::skipped(SkipReason::Cancelled)
        } else if step.depends_on.iter().any(|&d| {
            outcomes[d]
                .as_ref()
                .is_none_or(|o| o.state.blocks_dependents())
        }) {
            Outcome::skipped(SkipReason::DependencyFailed)
        } else {
            self.load_step(step, ctx)
        };
        log_outcome(step, &outcome);
        outcome
    }

    fn load_step(&self, step: &Step, ctx: &RunContext) -> Outcome {
        let mut state = RecordState::Pending;
        settle(&mut state, RecordState::Resolving);
        let Some(entry) = self.store.get(step.entry) else {
            settle(
                &mut state,
                RecordState::failed(Failure::from_error(&SyncError::MissingId(step.key.to_string()))),
            );
            return Outcome {
                state,
                remote_id: None,
                children: ChildCounts::default(),
            };
        };

        let mut children = ChildCounts::default();
        let result = match &entry.record {
            Record::Category(category) => {
                self.load_category(step, category, ctx).map_err(StepError::from)
            }
            Record::Company(company) => self.load_company(company, &mut children),
            Record::Part(part) => self.load_part(step, part, ctx, &mut children),
            Record::BomLine(line) => self.load_bom_line(step, line, ctx).map_err(StepError::from),
        };
        match result {
            Ok((next, id)) => {
                ctx.remember(step.key.clone(), id);
                settle(&mut state, next);
                Outcome {
                    state,
                    remote_id: Some(id),
                    children,
                }
            }
            Err(StepError { error, remote_id }) => {
                if let Some(id) = remote_id {
                    ctx.remember(step.key.clone(), id);
                }
                settle(&mut state, RecordState::failed(Failure::from_error(&error)));
                Outcome {
                    state,
                    remote_id,
                    children,
                }
            }
        }
    }

    /// Remote id of whatever `reference` points at in this step.
    fn target(
        &self,
        step: &Step,
        reference: &Reference,
        ctx: &RunContext,
    ) -> Result<RemoteId, SyncError> {
        match step.target(reference) {
            Some(Target::Local(key)) => ctx
                .id(key)
                .ok_or_else(|| SyncError::MissingId(key.to_string())),
            Some(Target::External(id)) => Ok(*id),
            Some(Target::Unchecked) | None => locate::find_reference(self.remote, reference)?
                .ok_or_else(|| SyncError::MissingId(reference.to_string())),
        }
    }

    /// Found / Updated / Created for one top-level record.
    fn upsert(
        &self,
        kind: EntityKind,
        query: &Query,
        payload: &Payload,
    ) -> Result<(RecordState, RemoteId), SyncError> {
        self.upsert_with(kind, query, payload, self.options.force)
    }

    fn upsert_with(
        &self,
        kind: EntityKind,
        query: &Query,
        payload: &Payload,
        force: bool,
    ) -> Result<(RecordState, RemoteId), SyncError> {
        match self.remote.find(kind, query)? {
            Some(id) if force => {
                self.remote.update(kind, id, payload)?;
                Ok((RecordState::Updated, id))
            }
            Some(id) => Ok((RecordState::Found, id)),
            None => {
                let id = self.remote.create(kind, payload)?;
                Ok((RecordState::Created, id))
            }
        }
    }

    /// Create-or-skip for a child entity (PATCH instead of skip with force).
    fn reconcile(
        &self,
        kind: EntityKind,
        query: &Query,
        payload: &Payload,
        counts: &mut ChildCounts,
    ) -> Result<RemoteId, SyncError> {
        self.reconcile_with(kind, query, payload, counts, self.options.force)
    }

    fn reconcile_with(
        &self,
        kind: EntityKind,
        query: &Query,
        payload: &Payload,
        counts: &mut ChildCounts,
        force: bool,
    ) -> Result<RemoteId, SyncError> {
        let (state, id) = self.upsert_with(kind, query, payload, force)?;
        match state {
            RecordState::Created => counts.created += 1,
            RecordState::Updated => counts.updated += 1,
            _ => counts.found += 1,
        }
        debug!(%kind, %id, query = %query, state = %state, "child reconciled");
        Ok(id)
    }

    fn load_category(
        &self,
        step: &Step,
        category: &Category,
        ctx: &RunContext,
    ) -> Result<(RecordState, RemoteId), SyncError> {
        let parent = category
            .parent
            .as_ref()
            .map(|p| self.target(step, &Reference::Category(p.clone()), ctx))
            .transpose()?;
        self.upsert(
            EntityKind::Category,
            &locate::category_query(category.name(), parent),
            &payload::category(category, parent),
        )
    }

    fn load_company(
        &self,
        company: &Company,
        children: &mut ChildCounts,
    ) -> Result<(RecordState, RemoteId), StepError> {
        let (state, id) = self.upsert(
            EntityKind::Company,
            &locate::company_query(&company.name),
            &payload::company(company),
        )?;
        for address in &company.addresses {
            self.load_address(id, address, children)
                .map_err(|error| StepError {
                    error,
                    remote_id: Some(id),
                })?;
        }
        Ok((state, id))
    }

    fn load_address(
        &self,
        company: RemoteId,
        address: &Address,
        children: &mut ChildCounts,
    ) -> Result<RemoteId, SyncError> {
        let query = Query::new()
            .with("company", company.get())
            .with("title", address.title.as_str());
        self.reconcile(
            EntityKind::Address,
            &query,
            &payload::address(company, address),
            children,
        )
    }

    fn load_part(
        &self,
        step: &Step,
        part: &Part,
        ctx: &RunContext,
        children: &mut ChildCounts,
    ) -> Result<(RecordState, RemoteId), StepError> {
        let mut part = part.clone();
        if self.options.force_ipn {
            if let Some(ipn) = part.ensure_ipn().map(str::to_string) {
                debug!(part = %part.key, %ipn, "IPN filled from name");
            }
        }

        let category = part
            .category
            .as_ref()
            .map(|c| self.target(step, &Reference::Category(c.clone()), ctx))
            .transpose()?;
        let variant_of = part
            .variant_of
            .as_ref()
            .map(|base| self.target(step, &Reference::Part(base.clone()), ctx))
            .transpose()?;

        let (state, id) = self.upsert(
            EntityKind::Part,
            &locate::part_query(&part),
            &payload::part(&part, category, variant_of),
        )?;

        let with_id = |error: SyncError| StepError {
            error,
            remote_id: Some(id),
        };
        for (name, data) in &part.parameters {
            self.load_parameter(id, name, data, ctx, children)
                .map_err(with_id)?;
        }
        for association in &part.suppliers {
            self.load_supplier(step, id, association, ctx, children)
                .map_err(with_id)?;
        }
        Ok((state, id))
    }

    fn load_parameter(
        &self,
        part: RemoteId,
        name: &str,
        data: &str,
        ctx: &RunContext,
        children: &mut ChildCounts,
    ) -> Result<RemoteId, SyncError> {
        let template = ctx.template(name, || self.find_or_create_template(name, children))?;
        let query = Query::new()
            .with("part", part.get())
            .with("template", template.get());
        self.reconcile(
            EntityKind::Parameter,
            &query,
            &payload::parameter(part, template, data),
            children,
        )
    }

    /// Templates are shared between parts; another client may create the
    /// same one between our lookup and create.
    fn find_or_create_template(
        &self,
        name: &str,
        children: &mut ChildCounts,
    ) -> Result<RemoteId, SyncError> {
        let query = Query::new().with("name", name);
        if let Some(id) = self.remote.find(EntityKind::ParameterTemplate, &query)? {
            return Ok(id);
        }
        match self
            .remote
            .create(EntityKind::ParameterTemplate, &payload::parameter_template(name))
        {
            Ok(id) => {
                children.created += 1;
                Ok(id)
            }
            Err(err @ RemoteError::DuplicateKey { .. }) => {
                debug!(template = name, "template created concurrently");
                self.remote
                    .find(EntityKind::ParameterTemplate, &query)?
                    .ok_or_else(|| err.into())
            }
            Err(err) => Err(err.into()),
        }
    }

    fn load_supplier(
        &self,
        step: &Step,
        part: RemoteId,
        association: &SupplierAssociation,
        ctx: &RunContext,
        children: &mut ChildCounts,
    ) -> Result<RemoteId, SyncError> {
        let supplier = self.target(
            step,
            &Reference::Company(association.supplier.clone()),
            ctx,
        )?;

        let manufacturer_part = match (&association.manufacturer, &association.mpn) {
            (Some(manufacturer), Some(mpn)) => {
                let manufacturer =
                    self.target(step, &Reference::Company(manufacturer.clone()), ctx)?;
                let query = Query::new()
                    .with("part", part.get())
                    .with("manufacturer", manufacturer.get())
                    .with("MPN", mpn.as_str());
                Some(self.reconcile(
                    EntityKind::ManufacturerPart,
                    &query,
                    &payload::manufacturer_part(part, manufacturer, mpn),
                    children,
                )?)
            }
            _ => None,
        };

        let query = Query::new()
            .with("part", part.get())
            .with("supplier", supplier.get())
            .with("SKU", association.sku.as_str());
        let supplier_part = self.reconcile(
            EntityKind::SupplierPart,
            &query,
            &payload::supplier_part(association, part, supplier, manufacturer_part),
            children,
        )?;

        if self.options.force_price {
            children.removed += self.prune_price_breaks(supplier_part, &association.price_breaks)?;
        }
        for price in &association.price_breaks {
            let query = Query::new()
                .with("part", supplier_part.get())
                .with("quantity", price.quantity);
            self.reconcile_with(
                EntityKind::PriceBreak,
                &query,
                &payload::price_break(supplier_part, price),
                children,
                self.options.force || self.options.force_price,
            )?;
        }
        Ok(supplier_part)
    }

    /// Deletes remote price breaks of `supplier_part` at quantities the local
    /// record no longer lists.
    fn prune_price_breaks(
        &self,
        supplier_part: RemoteId,
        local: &[PriceBreak],
    ) -> Result<usize, SyncError> {
        let query = Query::new().with("part", supplier_part.get());
        let mut removed = 0;
        for remote in self.remote.list(EntityKind::PriceBreak, &query)? {
            let listed = remote
                .f64("quantity")
                .is_some_and(|q| local.iter().any(|p| p.quantity as f64 == q));
            if !listed {
                self.remote.delete(EntityKind::PriceBreak, remote.id)?;
                debug!(%supplier_part, price_break = %remote.id, "stale price break removed");
                removed += 1;
            }
        }
        Ok(removed)
    }

    fn load_bom_line(
        &self,
        step: &Step,
        line: &BomLine,
        ctx: &RunContext,
    ) -> Result<(RecordState, RemoteId), SyncError> {
        let assembly = self.target(step, &Reference::Part(PartRef::to(&line.assembly)), ctx)?;
        let sub_part = self.target(step, &Reference::Part(line.sub_part.clone()), ctx)?;
        let query = Query::new()
            .with("part", assembly.get())
            .with("sub_part", sub_part.get());
        self.upsert(
            EntityKind::BomItem,
            &query,
            &payload::bom_line(line, assembly, sub_part),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use invsync_core::PartKey;
    use invsync_records::RecordEntry;
    use invsync_remote::{InMemoryRemote, Op};

    fn store(records: Vec<(&str, Record)>) -> RecordStore {
        let entries = records
            .into_iter()
            .map(|(path, record)| RecordEntry::new(path, record))
            .collect();
        RecordStore::from_entries("data", entries).unwrap()
    }

    fn part(name: &str) -> Part {
        Part::new(PartKey::named(name).unwrap())
    }

    #[test]
    fn force_ipn_fills_the_ipn_before_lookup() {
        let store = store(vec![("parts/Screw.json", Record::Part(part("Screw")))]);
        let remote = InMemoryRemote::new();
        let loader = Loader::new(&store, &remote)
            .with_options(LoadOptions::default().with_force_ipn(true));

        let report = loader.run(&[], &RunContext::new()).unwrap();
        assert_eq!(report.records[0].state, RecordState::Created);
        let id = report.records[0].remote_id.unwrap();
        assert_eq!(remote.get(EntityKind::Part, id).unwrap()["IPN"], "Screw");
    }

    #[test]
    fn parameters_share_one_template() {
        let mut a = part("A");
        a.parameters.insert("Length".into(), "10mm".into());
        let mut b = part("B");
        b.parameters.insert("Length".into(), "20mm".into());
        let store = store(vec![
            ("parts/A.json", Record::Part(a)),
            ("parts/B.json", Record::Part(b)),
        ]);
        let remote = InMemoryRemote::new();

        let report = Loader::new(&store, &remote).run(&[], &RunContext::new()).unwrap();
        assert!(report.is_success());
        assert_eq!(remote.count(EntityKind::ParameterTemplate), 1);
        assert_eq!(remote.count(EntityKind::Parameter), 2);
        assert_eq!(report.records[0].children.created, 2);
        assert_eq!(report.records[1].children.created, 1);
    }

    #[test]
    fn a_cancelled_run_makes_no_calls() {
        let store = store(vec![("parts/A.json", Record::Part(part("A")))]);
        let remote = InMemoryRemote::new();
        let loader = Loader::new(&store, &remote);
        let plan = loader.plan(&[]).unwrap();
        remote.reset_calls();

        let ctx = RunContext::new();
        ctx.cancel();
        let report = loader.execute(&plan, &ctx);
        assert_eq!(
            report.records[0].state,
            RecordState::skipped(SkipReason::Cancelled)
        );
        assert_eq!(remote.total_calls(), 0);
        assert_eq!(remote.calls(Op::Create), 0);
    }
}
