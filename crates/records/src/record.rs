use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use invsync_core::{CategoryPath, Entity, EntityKey, EntityKind};

use crate::bom::BomLine;
use crate::category::Category;
use crate::company::Company;
use crate::layout;
use crate::part::{Part, PartRef};

/// A validated local record, tagged by entity type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "record", rename_all = "snake_case")]
pub enum Record {
    Category(Category),
    Company(Company),
    Part(Part),
    BomLine(BomLine),
}

/// Something a record needs to exist remotely before it can be created.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Reference {
    Category(CategoryPath),
    Company(String),
    Part(PartRef),
}

impl core::fmt::Display for Reference {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Reference::Category(path) => write!(f, "category '{path}'"),
            Reference::Company(name) => write!(f, "company '{name}'"),
            Reference::Part(part) => write!(f, "part '{part}'"),
        }
    }
}

impl Record {
    pub fn key(&self) -> EntityKey {
        match self {
            Record::Category(c) => c.key(),
            Record::Company(c) => c.key(),
            Record::Part(p) => p.key(),
            Record::BomLine(b) => b.key(),
        }
    }

    pub fn kind(&self) -> EntityKind {
        match self {
            Record::Category(_) => Category::KIND,
            Record::Company(_) => Company::KIND,
            Record::Part(_) => Part::KIND,
            Record::BomLine(_) => BomLine::KIND,
        }
    }

    /// Outgoing dependency references, in a stable order.
    pub fn references(&self) -> Vec<Reference> {
        match self {
            Record::Category(c) => c.parent.iter().cloned().map(Reference::Category).collect(),
            Record::Company(_) => Vec::new(),
            Record::Part(p) => {
                let mut refs = Vec::new();
                if let Some(category) = &p.category {
                    refs.push(Reference::Category(category.clone()));
                }
                if let Some(base) = &p.variant_of {
                    refs.push(Reference::Part(base.clone()));
                }
                refs.extend(
                    p.companies()
                        .into_iter()
                        .map(|name| Reference::Company(name.to_string())),
                );
                refs
            }
            Record::BomLine(b) => vec![
                Reference::Part(PartRef::to(&b.assembly)),
                Reference::Part(b.sub_part.clone()),
            ],
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        match self {
            Record::Category(_) => Ok(()),
            Record::Company(c) => c.validate(),
            Record::Part(p) => p.validate(),
            Record::BomLine(b) => b.validate(),
        }
    }

    pub fn as_part(&self) -> Option<&Part> {
        match self {
            Record::Part(p) => Some(p),
            _ => None,
        }
    }
}

/// A record together with the file it was read from.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordEntry {
    /// Path relative to the data root. For categories, the category
    /// directory; for BOM lines, the `.bom.json` file.
    pub source: PathBuf,
    pub record: Record,
}

impl RecordEntry {
    pub fn new(source: impl Into<PathBuf>, record: Record) -> Self {
        Self {
            source: source.into(),
            record,
        }
    }

    pub fn key(&self) -> EntityKey {
        self.record.key()
    }

    /// Forward-slash source path used for ordering, matching and reports.
    pub fn display_path(&self) -> String {
        layout::display_path(&self.source)
    }

    /// Paths a selection pattern may match for this record.
    pub fn selectors(&self) -> Vec<String> {
        let path = self.display_path();
        let mut selectors = vec![path.clone()];
        match &self.record {
            Record::Category(_) => {
                selectors.push(format!("{path}/{}", layout::CATEGORY_FILE));
            }
            Record::Part(_) | Record::Company(_) => {
                if let Some(stem) = path.strip_suffix(layout::JSON_SUFFIX) {
                    selectors.push(stem.to_string());
                }
            }
            Record::BomLine(_) => {}
        }
        selectors
    }

    /// File removed from disk once the record is deleted remotely, if any.
    pub fn owned_file(&self, root: &Path) -> Option<PathBuf> {
        match &self.record {
            Record::Category(_) => Some(root.join(&self.source).join(layout::CATEGORY_FILE)),
            Record::Company(_) | Record::Part(_) => Some(root.join(&self.source)),
            Record::BomLine(_) => None,
        }
    }
}
