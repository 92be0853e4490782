use std::collections::BTreeMap;
use std::ops::Range;

use invsync_core::{EntityKey, RemoteId};
use invsync_records::Reference;

/// What a record's reference points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Another record in the plan; its id is known once that step ran.
    Local(EntityKey),
    /// An entity that already exists remotely.
    External(RemoteId),
    /// Not checked (local-only plans).
    Unchecked,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub reference: Reference,
    pub target: Target,
}

/// One record in execution order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    /// Index into the record store.
    pub entry: usize,
    pub key: EntityKey,
    pub path: String,
    pub level: usize,
    /// Plan positions of the steps this one depends on; always earlier.
    pub depends_on: Vec<usize>,
    pub links: Vec<Link>,
    /// False when the record was pulled in only as a dependency.
    pub selected: bool,
}

impl Step {
    pub fn target(&self, reference: &Reference) -> Option<&Target> {
        self.links
            .iter()
            .find(|link| &link.reference == reference)
            .map(|link| &link.target)
    }
}

/// Dependency-ordered record sequence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Plan {
    pub(crate) steps: Vec<Step>,
    pub(crate) external: BTreeMap<Reference, RemoteId>,
}

impl Plan {
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// References satisfied by entities that already exist remotely.
    pub fn external(&self) -> &BTreeMap<Reference, RemoteId> {
        &self.external
    }

    /// Contiguous position ranges of equal level, lowest level first.
    ///
    /// Steps within one range never depend on each other.
    pub fn levels(&self) -> Vec<Range<usize>> {
        let mut ranges = Vec::new();
        let mut start = 0;
        for pos in 1..=self.steps.len() {
            if pos == self.steps.len() || self.steps[pos].level != self.steps[start].level {
                ranges.push(start..pos);
                start = pos;
            }
        }
        ranges
    }

    /// Plan positions of steps depending on `pos`, directly or transitively.
    pub fn dependents_of(&self, pos: usize) -> Vec<usize> {
        let mut hit = vec![false; self.steps.len()];
        if let Some(flag) = hit.get_mut(pos) {
            *flag = true;
        }
        let mut out = Vec::new();
        for (later, step) in self.steps.iter().enumerate().skip(pos + 1) {
            if step.depends_on.iter().any(|&d| hit[d]) {
                hit[later] = true;
                out.push(later);
            }
        }
        out
    }
}
