use std::collections::{BTreeMap, BTreeSet, HashMap};

use tracing::{debug, info};

use invsync_records::{Record, RecordStore, Reference};

use crate::error::{ResolveError, Unresolved};
use crate::graph::{Index, LocalMatch};
use crate::lookup::ExternalLookup;
use crate::order;
use crate::plan::{Link, Plan, Step, Target};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Scope {
    /// Selection plus every local record it transitively depends on.
    WithDependencies,
    /// The selection alone; edges leaving it are not followed.
    SelectionOnly,
}

enum Edge {
    Local(usize),
    Outside,
}

/// Orders records so that dependencies always come first.
pub struct Resolver<'a> {
    store: &'a RecordStore,
    index: Index<'a>,
}

impl<'a> Resolver<'a> {
    pub fn new(store: &'a RecordStore) -> Self {
        Self {
            store,
            index: Index::build(store.entries()),
        }
    }

    /// Plans a load of `selection` and its local dependencies. References
    /// with no local record are checked through `lookup`, but only once the
    /// local graph is known to be acyclic.
    pub fn plan(
        &self,
        selection: &[usize],
        lookup: &dyn ExternalLookup,
    ) -> Result<Plan, ResolveError> {
        self.build(selection, Scope::WithDependencies, Some(lookup))
    }

    /// Like [`Resolver::plan`] without any remote call; references with no
    /// local record are accepted as [`Target::Unchecked`].
    pub fn plan_local(&self, selection: &[usize]) -> Result<Plan, ResolveError> {
        self.build(selection, Scope::WithDependencies, None)
    }

    /// Orders exactly `selection`, ignoring references that leave it.
    pub fn plan_selection(&self, selection: &[usize]) -> Result<Plan, ResolveError> {
        self.build(selection, Scope::SelectionOnly, None)
    }

    fn build(
        &self,
        selection: &[usize],
        scope: Scope,
        lookup: Option<&dyn ExternalLookup>,
    ) -> Result<Plan, ResolveError> {
        let entries = self.store.entries();
        let selected: BTreeSet<usize> = selection
            .iter()
            .copied()
            .filter(|&idx| idx < entries.len())
            .collect();

        let mut members = BTreeSet::new();
        let mut pending: Vec<usize> = selected.iter().copied().collect();
        while let Some(idx) = pending.pop() {
            if !members.insert(idx) || scope == Scope::SelectionOnly {
                continue;
            }
            for reference in entries[idx].record.references() {
                if let LocalMatch::Found(dep) = self.index.find(&reference) {
                    pending.push(dep);
                }
            }
        }

        let mut edges: BTreeMap<usize, Vec<(Reference, Edge)>> = BTreeMap::new();
        for &idx in &members {
            let mut node_edges = Vec::new();
            for reference in entries[idx].record.references() {
                let edge = match self.index.find(&reference) {
                    LocalMatch::Found(dep) if members.contains(&dep) => Edge::Local(dep),
                    LocalMatch::Ambiguous(candidates) if scope == Scope::WithDependencies => {
                        return Err(ResolveError::Ambiguous {
                            record: entries[idx].display_path(),
                            reference: reference.to_string(),
                            candidates: candidates
                                .iter()
                                .map(|&c| entries[c].display_path())
                                .collect(),
                        });
                    }
                    _ => Edge::Outside,
                };
                node_edges.push((reference, edge));
            }
            edges.insert(idx, node_edges);
        }

        let deps: BTreeMap<usize, Vec<usize>> = edges
            .iter()
            .map(|(&idx, node_edges)| {
                let local = node_edges
                    .iter()
                    .filter_map(|(_, edge)| match edge {
                        Edge::Local(dep) if *dep != idx => Some(*dep),
                        _ => None,
                    })
                    .collect();
                (idx, local)
            })
            .collect();

        let levels = order::levels(&deps).map_err(|cycle| ResolveError::CycleDetected {
            records: cycle
                .iter()
                .map(|&idx| format!("{} ({})", entries[idx].display_path(), entries[idx].key()))
                .collect(),
        })?;

        self.check_containment(&edges)?;

        let external = match lookup {
            Some(lookup) => self.look_up_external(&edges, lookup)?,
            None => BTreeMap::new(),
        };

        let mut order: Vec<usize> = members.iter().copied().collect();
        order.sort_by_cached_key(|&idx| (levels[&idx], entries[idx].display_path(), entries[idx].key()));
        let position: HashMap<usize, usize> =
            order.iter().enumerate().map(|(pos, &idx)| (idx, pos)).collect();

        let steps = order
            .iter()
            .map(|&idx| {
                let entry = &entries[idx];
                let mut depends_on: Vec<usize> = deps[&idx].iter().map(|d| position[d]).collect();
                depends_on.sort_unstable();
                depends_on.dedup();
                let links = edges[&idx]
                    .iter()
                    .map(|(reference, edge)| Link {
                        reference: reference.clone(),
                        target: match edge {
                            Edge::Local(dep) => Target::Local(entries[*dep].key()),
                            Edge::Outside => external
                                .get(reference)
                                .map_or(Target::Unchecked, |id| Target::External(*id)),
                        },
                    })
                    .collect();
                Step {
                    entry: idx,
                    key: entry.key(),
                    path: entry.display_path(),
                    level: levels[&idx],
                    depends_on,
                    links,
                    selected: selected.contains(&idx),
                }
            })
            .collect();

        let plan = Plan { steps, external };
        info!(
            steps = plan.len(),
            selected = selected.len(),
            levels = plan.levels().len(),
            external = plan.external.len(),
            "plan built"
        );
        Ok(plan)
    }

    /// BOM lines must not make a part contain itself, directly or through
    /// other assemblies. Only lines whose parts are both local are checked.
    fn check_containment(
        &self,
        edges: &BTreeMap<usize, Vec<(Reference, Edge)>>,
    ) -> Result<(), ResolveError> {
        let entries = self.store.entries();
        let mut lines: Vec<(usize, usize, usize)> = Vec::new();
        for (&idx, node_edges) in edges {
            if !matches!(entries[idx].record, Record::BomLine(_)) {
                continue;
            }
            if let [(_, Edge::Local(assembly)), (_, Edge::Local(sub_part))] = node_edges.as_slice() {
                lines.push((idx, *assembly, *sub_part));
            }
        }

        let mut contains: HashMap<usize, Vec<usize>> = HashMap::new();
        for &(_, assembly, sub_part) in &lines {
            contains.entry(assembly).or_default().push(sub_part);
        }
        let reaches = |from: usize, target: usize| {
            let mut seen = BTreeSet::new();
            let mut stack = vec![from];
            while let Some(part) = stack.pop() {
                if part == target {
                    return true;
                }
                if seen.insert(part) {
                    stack.extend(contains.get(&part).into_iter().flatten().copied());
                }
            }
            false
        };

        let circular: Vec<String> = lines
            .iter()
            .filter(|&&(_, assembly, sub_part)| reaches(sub_part, assembly))
            .map(|&(idx, _, _)| format!("{} ({})", entries[idx].display_path(), entries[idx].key()))
            .collect();
        if circular.is_empty() {
            Ok(())
        } else {
            Err(ResolveError::CycleDetected { records: circular })
        }
    }

    fn look_up_external(
        &self,
        edges: &BTreeMap<usize, Vec<(Reference, Edge)>>,
        lookup: &dyn ExternalLookup,
    ) -> Result<BTreeMap<Reference, invsync_core::RemoteId>, ResolveError> {
        let entries = self.store.entries();
        let mut wanted: BTreeMap<&Reference, Vec<usize>> = BTreeMap::new();
        for (&idx, node_edges) in edges {
            for (reference, edge) in node_edges {
                if let Edge::Outside = edge {
                    wanted.entry(reference).or_default().push(idx);
                }
            }
        }

        let mut found = BTreeMap::new();
        let mut unresolved = Vec::new();
        for (reference, referrers) in wanted {
            let id = lookup.find(reference).map_err(|source| ResolveError::Lookup {
                reference: reference.to_string(),
                source,
            })?;
            match id {
                Some(id) => {
                    debug!(%reference, %id, "reference exists remotely");
                    found.insert(reference.clone(), id);
                }
                None => unresolved.extend(referrers.iter().map(|&idx| Unresolved {
                    record: entries[idx].display_path(),
                    reference: reference.to_string(),
                })),
            }
        }

        if unresolved.is_empty() {
            Ok(found)
        } else {
            unresolved.sort_by(|a, b| (&a.record, &a.reference).cmp(&(&b.record, &b.reference)));
            Err(ResolveError::Unresolved { unresolved })
        }
    }
}
