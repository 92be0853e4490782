//! Matching references against the local record set.

use std::collections::HashMap;

use invsync_core::{CategoryPath, PartKey};
use invsync_records::{PartRef, Record, RecordEntry, Reference};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum LocalMatch {
    Found(usize),
    Ambiguous(Vec<usize>),
    Missing,
}

/// Natural-key indexes over store entries.
#[derive(Debug, Default)]
pub(crate) struct Index<'a> {
    categories: HashMap<&'a CategoryPath, usize>,
    companies: HashMap<&'a str, usize>,
    parts: HashMap<&'a PartKey, usize>,
    ipns: HashMap<&'a str, usize>,
    names: HashMap<&'a str, Vec<usize>>,
}

impl<'a> Index<'a> {
    pub(crate) fn build(entries: &'a [RecordEntry]) -> Self {
        let mut index = Self::default();
        for (idx, entry) in entries.iter().enumerate() {
            match &entry.record {
                Record::Category(c) => {
                    index.categories.insert(&c.path, idx);
                }
                Record::Company(c) => {
                    index.companies.insert(c.name.as_str(), idx);
                }
                Record::Part(p) => {
                    index.parts.insert(&p.key, idx);
                    if let Some(ipn) = &p.ipn {
                        index.ipns.insert(ipn.as_str(), idx);
                    }
                    index.names.entry(p.key.name.as_str()).or_default().push(idx);
                }
                Record::BomLine(_) => {}
            }
        }
        index
    }

    pub(crate) fn find(&self, reference: &Reference) -> LocalMatch {
        let found = match reference {
            Reference::Category(path) => self.categories.get(path).copied(),
            Reference::Company(name) => self.companies.get(name.as_str()).copied(),
            Reference::Part(part) => return self.find_part(part),
        };
        found.map_or(LocalMatch::Missing, LocalMatch::Found)
    }

    /// IPN first, then exact name and revision, then the only part with
    /// that name when the reference carries no revision.
    fn find_part(&self, part: &PartRef) -> LocalMatch {
        if let Some(idx) = part.ipn.as_deref().and_then(|ipn| self.ipns.get(ipn)) {
            return LocalMatch::Found(*idx);
        }
        if let Some(idx) = self.parts.get(&part.key()) {
            return LocalMatch::Found(*idx);
        }
        if part.revision.is_some() {
            return LocalMatch::Missing;
        }
        match self.names.get(part.name.as_str()).map(Vec::as_slice) {
            Some([only]) => LocalMatch::Found(*only),
            Some(many) if many.len() > 1 => LocalMatch::Ambiguous(many.to_vec()),
            _ => LocalMatch::Missing,
        }
    }
}
