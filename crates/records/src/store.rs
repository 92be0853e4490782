//! Read-only view over a data root, plus the writer used by export.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use glob::{MatchOptions, Pattern};
use serde::Serialize;
use tracing::{debug, info};
use walkdir::WalkDir;

use invsync_core::{EntityKey, PartKey};

use crate::bom::{BomEntry, BomLine};
use crate::category::{Category, CategoryFile};
use crate::company::{Company, CompanyFile};
use crate::error::RecordError;
use crate::layout;
use crate::part::{Part, PartFile, PartFileOut};
use crate::record::{Record, RecordEntry};

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// All records under one data root, validated and free of duplicate keys.
#[derive(Debug, Clone)]
pub struct RecordStore {
    root: PathBuf,
    entries: Vec<RecordEntry>,
    by_key: HashMap<EntityKey, usize>,
}

impl RecordStore {
    /// Reads every company, category, part and BOM file below `root`.
    pub fn open(root: impl AsRef<Path>) -> Result<Self, RecordError> {
        let root = root.as_ref().to_path_buf();
        let meta = fs::metadata(&root).map_err(|e| RecordError::io(&root, e))?;
        if !meta.is_dir() {
            return Err(RecordError::invalid(&root, "data root is not a directory"));
        }

        let mut entries = Vec::new();
        read_companies(&root, &mut entries)?;
        read_parts(&root, &mut entries)?;

        let store = Self::from_entries(root, entries)?;
        info!(
            root = %store.root.display(),
            records = store.entries.len(),
            "record store opened"
        );
        Ok(store)
    }

    /// Builds a store from already-parsed entries, enforcing the same
    /// validation and uniqueness rules as [`RecordStore::open`].
    pub fn from_entries(
        root: impl Into<PathBuf>,
        entries: Vec<RecordEntry>,
    ) -> Result<Self, RecordError> {
        let mut by_key = HashMap::with_capacity(entries.len());
        let mut ipns: HashMap<&str, &Path> = HashMap::new();

        for (idx, entry) in entries.iter().enumerate() {
            entry
                .record
                .validate()
                .map_err(|msg| RecordError::invalid(&entry.source, msg))?;

            let key = entry.key();
            if let Some(&other) = by_key.get(&key) {
                let other: &RecordEntry = &entries[other];
                return Err(RecordError::Duplicate {
                    path: entry.source.clone(),
                    other: other.source.clone(),
                    key,
                });
            }
            by_key.insert(key, idx);

            if let Some(ipn) = entry.record.as_part().and_then(|p| p.ipn.as_deref()) {
                if let Some(other) = ipns.insert(ipn, &entry.source) {
                    return Err(RecordError::invalid(
                        &entry.source,
                        format!("IPN '{ipn}' is already used by {}", other.display()),
                    ));
                }
            }
        }

        Ok(Self {
            root: root.into(),
            entries,
            by_key,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn entries(&self) -> &[RecordEntry] {
        &self.entries
    }

    pub fn get(&self, idx: usize) -> Option<&RecordEntry> {
        self.entries.get(idx)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn position(&self, key: &EntityKey) -> Option<usize> {
        self.by_key.get(key).copied()
    }

    pub fn into_entries(self) -> Vec<RecordEntry> {
        self.entries
    }

    /// Indices of the records matching any of `patterns` (all records when
    /// `patterns` is empty).
    ///
    /// Patterns are globs relative to the data root (`parts/Furniture/**`);
    /// a pattern may also omit the leading `parts/` or `companies/`.
    pub fn select(&self, patterns: &[String]) -> Result<Vec<usize>, RecordError> {
        if patterns.is_empty() {
            return Ok((0..self.entries.len()).collect());
        }
        let compiled = patterns
            .iter()
            .map(|p| {
                Pattern::new(p).map_err(|e| RecordError::Pattern {
                    pattern: p.clone(),
                    message: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let selected: Vec<usize> = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| {
                entry.selectors().iter().any(|selector| {
                    let unrooted = selector.split_once('/').map(|(_, rest)| rest);
                    compiled.iter().any(|pattern| {
                        pattern.matches_with(selector, MATCH_OPTIONS)
                            || unrooted.is_some_and(|s| pattern.matches_with(s, MATCH_OPTIONS))
                    })
                })
            })
            .map(|(idx, _)| idx)
            .collect();
        debug!(patterns = ?patterns, selected = selected.len(), "selection resolved");
        Ok(selected)
    }

    /// Writes `records` below `root` in the standard layout and returns the
    /// files written.
    pub fn save(root: impl AsRef<Path>, records: &[Record]) -> Result<Vec<PathBuf>, RecordError> {
        let root = root.as_ref();
        let mut written = Vec::new();

        let part_dirs: HashMap<&PartKey, PathBuf> = records
            .iter()
            .filter_map(Record::as_part)
            .map(|p| (&p.key, part_dir(root, p)))
            .collect();
        let mut boms: BTreeMap<&PartKey, Vec<BomEntry>> = BTreeMap::new();

        for record in records {
            match record {
                Record::Category(category) => {
                    let dir = root.join(layout::category_dir(&category.path));
                    create_dir(&dir)?;
                    let file = CategoryFile::of(category);
                    if file != CategoryFile::default() {
                        let path = dir.join(layout::CATEGORY_FILE);
                        write_json(&path, &file)?;
                        written.push(path);
                    }
                }
                Record::Company(company) => {
                    let dir = root.join(layout::COMPANIES_DIR);
                    create_dir(&dir)?;
                    let path = dir.join(layout::company_file_name(&company.name));
                    write_json(&path, company)?;
                    written.push(path);
                }
                Record::Part(part) => {
                    let dir = part_dir(root, part);
                    create_dir(&dir)?;
                    let path = dir.join(layout::part_file_name(&part.key));
                    write_json(&path, &PartFileOut::from(part))?;
                    written.push(path);
                }
                Record::BomLine(line) => {
                    boms.entry(&line.assembly).or_default().push(BomEntry::of(line));
                }
            }
        }

        for (assembly, lines) in boms {
            let dir = part_dirs.get(assembly).ok_or_else(|| {
                RecordError::invalid(
                    root,
                    format!("BOM lines for '{assembly}' without an assembly part record"),
                )
            })?;
            let path = dir.join(layout::bom_file_name(assembly));
            write_json(&path, &lines)?;
            written.push(path);
        }

        info!(root = %root.display(), files = written.len(), "records written");
        Ok(written)
    }
}

fn part_dir(root: &Path, part: &Part) -> PathBuf {
    match &part.category {
        Some(category) => root.join(layout::category_dir(category)),
        None => root.join(layout::PARTS_DIR),
    }
}

fn create_dir(dir: &Path) -> Result<(), RecordError> {
    fs::create_dir_all(dir).map_err(|e| RecordError::io(dir, e))
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), RecordError> {
    let mut text = serde_json::to_string_pretty(value).map_err(|e| RecordError::json(path, e))?;
    text.push('\n');
    fs::write(path, text).map_err(|e| RecordError::io(path, e))
}

fn read_json(path: &Path) -> Result<serde_json::Value, RecordError> {
    let text = fs::read_to_string(path).map_err(|e| RecordError::io(path, e))?;
    serde_json::from_str(&text).map_err(|e| RecordError::json(path, e))
}

/// Server exports sometimes wrap a single object in a list.
fn single_object(path: &Path, value: serde_json::Value) -> Result<serde_json::Value, RecordError> {
    match value {
        serde_json::Value::Array(mut items) => {
            if items.is_empty() {
                return Err(RecordError::invalid(path, "empty list"));
            }
            Ok(items.swap_remove(0))
        }
        other => Ok(other),
    }
}

fn relative(root: &Path, path: &Path) -> PathBuf {
    path.strip_prefix(root).unwrap_or(path).to_path_buf()
}

fn sorted_json_files(dir: &Path) -> Result<Vec<PathBuf>, RecordError> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| RecordError::io(dir, e))? {
        let entry = entry.map_err(|e| RecordError::io(dir, e))?;
        let path = entry.path();
        if path.is_file() && path.to_string_lossy().ends_with(layout::JSON_SUFFIX) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn read_companies(root: &Path, entries: &mut Vec<RecordEntry>) -> Result<(), RecordError> {
    let dir = root.join(layout::COMPANIES_DIR);
    if !dir.is_dir() {
        debug!(dir = %dir.display(), "no companies directory");
        return Ok(());
    }
    for path in sorted_json_files(&dir)? {
        let value = single_object(&path, read_json(&path)?)?;
        let file: CompanyFile =
            serde_json::from_value(value).map_err(|e| RecordError::json(&path, e))?;
        let company: Company = file.into_company();
        debug!(path = %path.display(), company = %company.name, "read company");
        entries.push(RecordEntry::new(relative(root, &path), Record::Company(company)));
    }
    Ok(())
}

fn read_parts(root: &Path, entries: &mut Vec<RecordEntry>) -> Result<(), RecordError> {
    let parts_root = root.join(layout::PARTS_DIR);
    if !parts_root.is_dir() {
        debug!(dir = %parts_root.display(), "no parts directory");
        return Ok(());
    }

    let mut bom_files = Vec::new();
    let mut part_by_file: HashMap<PathBuf, PartKey> = HashMap::new();
    let mut assemblies: HashMap<PartKey, bool> = HashMap::new();

    for item in WalkDir::new(&parts_root).min_depth(1).sort_by_file_name() {
        let item = item.map_err(|e| {
            let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| parts_root.clone());
            let source = e
                .into_io_error()
                .unwrap_or_else(|| std::io::Error::other("filesystem loop"));
            RecordError::io(path, source)
        })?;
        let path = item.path();
        let rel = relative(root, path);

        if item.file_type().is_dir() {
            let Some(category_path) = layout::category_for_dir(&relative(&parts_root, path))
            else {
                continue;
            };
            let mut category = Category::new(category_path);
            let meta = path.join(layout::CATEGORY_FILE);
            if meta.is_file() {
                CategoryFile::from_value(read_json(&meta)?)
                    .map_err(|e| RecordError::json(&meta, e))?
                    .apply(&mut category);
            }
            entries.push(RecordEntry::new(rel, Record::Category(category)));
            continue;
        }

        let file_name = item.file_name().to_string_lossy().into_owned();
        if file_name == layout::CATEGORY_FILE {
            continue;
        }
        if file_name.ends_with(layout::BOM_SUFFIX) {
            bom_files.push(path.to_path_buf());
            continue;
        }
        let Some((stem_name, stem_rev)) = layout::split_part_file_name(&file_name) else {
            debug!(path = %path.display(), "ignoring non-record file");
            continue;
        };

        let value = single_object(path, read_json(path)?)?;
        let file: PartFile =
            serde_json::from_value(value).map_err(|e| RecordError::json(path, e))?;
        let name = file.name.filter(|n| !n.trim().is_empty()).unwrap_or(stem_name);
        let revision = file.revision.filter(|r| !r.trim().is_empty()).or(stem_rev);
        let key = PartKey::new(name, revision).map_err(|e| RecordError::key(path, e))?;

        let category = path
            .parent()
            .and_then(|dir| layout::category_for_dir(&relative(&parts_root, dir)));

        let part = Part {
            key: key.clone(),
            ipn: file.ipn.filter(|i| !i.trim().is_empty()),
            description: file.description.unwrap_or_default(),
            keywords: file.keywords.unwrap_or_default(),
            units: file.units.unwrap_or_default(),
            category,
            flags: file.flags,
            variant_of: file.variant_of,
            parameters: file.parameters,
            suppliers: file.suppliers,
        };
        debug!(path = %path.display(), part = %part.key, "read part");
        assemblies.insert(key.clone(), part.flags.assembly);
        part_by_file.insert(path.to_path_buf(), key);
        entries.push(RecordEntry::new(rel, Record::Part(part)));
    }

    for bom_path in bom_files {
        let assembly = layout::part_path_for_bom(&bom_path)
            .and_then(|part_path| part_by_file.get(&part_path))
            .ok_or_else(|| RecordError::invalid(&bom_path, "BOM file without matching part file"))?;
        if !assemblies.get(assembly).copied().unwrap_or(false) {
            return Err(RecordError::invalid(
                &bom_path,
                format!("part '{assembly}' has BOM lines but is not an assembly"),
            ));
        }
        let bom: Vec<BomEntry> = serde_json::from_value(read_json(&bom_path)?)
            .map_err(|e| RecordError::json(&bom_path, e))?;
        let rel = relative(root, &bom_path);
        debug!(path = %bom_path.display(), lines = bom.len(), "read BOM");
        for entry in bom {
            let line: BomLine = entry.into_line(assembly.clone());
            entries.push(RecordEntry::new(rel.clone(), Record::BomLine(line)));
        }
    }

    Ok(())
}
