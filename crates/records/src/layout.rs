//! On-disk layout of a data root.
//!
//! ```text
//! <root>/companies/<name>.json
//! <root>/parts/<Category>/<Sub>/category.json
//! <root>/parts/<Category>/<Sub>/<name>[.<revision>].json
//! <root>/parts/<Category>/<Sub>/<name>[.<revision>].bom.json
//! ```

use std::path::{Component, Path, PathBuf};

use invsync_core::{CategoryPath, PartKey};

pub const COMPANIES_DIR: &str = "companies";
pub const PARTS_DIR: &str = "parts";
pub const CATEGORY_FILE: &str = "category.json";
pub const JSON_SUFFIX: &str = ".json";
pub const BOM_SUFFIX: &str = ".bom.json";

const INVALID_CHARS: [char; 9] = ['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

fn replace_invalid(s: &str) -> String {
    s.chars()
        .map(|c| if INVALID_CHARS.contains(&c) { '_' } else { c })
        .collect()
}

/// File-name form of a part name. Dots become commas so that the first dot
/// of a part file name always separates the revision.
pub fn sanitize_part_name(name: &str) -> String {
    replace_invalid(&name.trim().replace(' ', "_").replace('.', ","))
}

pub fn sanitize_revision(revision: &str) -> String {
    replace_invalid(revision.trim())
}

pub fn sanitize_company_name(name: &str) -> String {
    replace_invalid(&name.trim().replace(' ', "_").replace('.', ""))
}

/// Directory form of a category name.
pub fn sanitize_category_name(name: &str) -> String {
    replace_invalid(&name.trim().replace('.', ""))
}

fn part_stem(key: &PartKey) -> String {
    match &key.revision {
        Some(rev) => format!("{}.{}", sanitize_part_name(&key.name), sanitize_revision(rev)),
        None => sanitize_part_name(&key.name),
    }
}

pub fn part_file_name(key: &PartKey) -> String {
    format!("{}{JSON_SUFFIX}", part_stem(key))
}

pub fn bom_file_name(key: &PartKey) -> String {
    format!("{}{BOM_SUFFIX}", part_stem(key))
}

pub fn company_file_name(name: &str) -> String {
    format!("{}{JSON_SUFFIX}", sanitize_company_name(name))
}

/// Splits `Name[.rev].json` into its name and optional revision.
pub fn split_part_file_name(file_name: &str) -> Option<(String, Option<String>)> {
    if file_name.ends_with(BOM_SUFFIX) || file_name == CATEGORY_FILE {
        return None;
    }
    let stem = file_name.strip_suffix(JSON_SUFFIX)?;
    if stem.is_empty() {
        return None;
    }
    match stem.split_once('.') {
        Some((name, rev)) if !name.is_empty() && !rev.is_empty() => {
            Some((name.to_string(), Some(rev.to_string())))
        }
        _ => Some((stem.to_string(), None)),
    }
}

/// `.../Widget.A.json` → `.../Widget.A.bom.json`.
pub fn bom_path_for(part_path: &Path) -> PathBuf {
    let file_name = part_path
        .file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stem = file_name.strip_suffix(JSON_SUFFIX).unwrap_or(&file_name);
    part_path.with_file_name(format!("{stem}{BOM_SUFFIX}"))
}

/// `.../Widget.A.bom.json` → `.../Widget.A.json`.
pub fn part_path_for_bom(bom_path: &Path) -> Option<PathBuf> {
    let file_name = bom_path.file_name()?.to_string_lossy().into_owned();
    let stem = file_name.strip_suffix(BOM_SUFFIX)?;
    Some(bom_path.with_file_name(format!("{stem}{JSON_SUFFIX}")))
}

/// Directory (relative to the data root) holding a category.
pub fn category_dir(path: &CategoryPath) -> PathBuf {
    let mut dir = PathBuf::from(PARTS_DIR);
    for segment in path.segments() {
        dir.push(segment);
    }
    dir
}

/// Category implied by a directory relative to `<root>/parts`.
pub fn category_for_dir(relative: &Path) -> Option<CategoryPath> {
    let segments: Vec<String> = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    if segments.is_empty() {
        return None;
    }
    CategoryPath::new(segments).ok()
}

/// Forward-slash rendering of a relative path, used for pattern matching
/// and reports regardless of platform.
pub fn display_path(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}
