//! Strongly-typed identifiers.
//!
//! [`RemoteId`] is the server-generated primary key; the other types are
//! natural keys records are known by locally.

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::error::KeyError;

/// Primary key assigned by the remote server.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemoteId(pub u64);

impl RemoteId {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl core::fmt::Display for RemoteId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl From<u64> for RemoteId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// Slash-separated category path, e.g. `Electronics/Passives`.
///
/// Never empty, and no segment is empty or contains `/`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CategoryPath(Vec<String>);

impl CategoryPath {
    pub fn new(segments: Vec<String>) -> Result<Self, KeyError> {
        if segments.is_empty()
            || segments
                .iter()
                .any(|s| s.trim().is_empty() || s.contains('/'))
        {
            return Err(KeyError::CategoryPath(segments.join("/")));
        }
        Ok(Self(segments))
    }

    pub fn root(name: impl Into<String>) -> Result<Self, KeyError> {
        Self::new(vec![name.into()])
    }

    pub fn child(&self, name: impl Into<String>) -> Result<Self, KeyError> {
        let mut segments = self.0.clone();
        segments.push(name.into());
        Self::new(segments)
    }

    /// Last segment: the category's own name.
    pub fn name(&self) -> &str {
        // Non-empty by construction.
        self.0.last().map(String::as_str).unwrap_or_default()
    }

    pub fn parent(&self) -> Option<CategoryPath> {
        if self.0.len() < 2 {
            return None;
        }
        Some(Self(self.0[..self.0.len() - 1].to_vec()))
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }

    /// Whether `self` is `other` or lies below it.
    pub fn starts_with(&self, other: &CategoryPath) -> bool {
        self.0.starts_with(&other.0)
    }
}

impl core::fmt::Display for CategoryPath {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0.join("/"))
    }
}

impl FromStr for CategoryPath {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim_matches('/');
        Self::new(trimmed.split('/').map(str::to_string).collect())
    }
}

impl TryFrom<String> for CategoryPath {
    type Error = KeyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<CategoryPath> for String {
    fn from(value: CategoryPath) -> Self {
        value.to_string()
    }
}

/// Natural key of a part: name plus optional revision.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PartKey {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,
}

impl PartKey {
    pub fn new(name: impl Into<String>, revision: Option<String>) -> Result<Self, KeyError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(KeyError::EmptyName);
        }
        let revision = revision.filter(|r| !r.trim().is_empty());
        Ok(Self { name, revision })
    }

    pub fn named(name: impl Into<String>) -> Result<Self, KeyError> {
        Self::new(name, None)
    }
}

impl core::fmt::Display for PartKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match &self.revision {
            Some(rev) => write!(f, "{}@{}", self.name, rev),
            None => f.write_str(&self.name),
        }
    }
}

/// Natural key of any local record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntityKey {
    Category { path: CategoryPath },
    Company { name: String },
    Part { part: PartKey },
    BomLine { assembly: PartKey, sub_part: PartKey },
}

impl EntityKey {
    pub fn category(path: CategoryPath) -> Self {
        Self::Category { path }
    }

    pub fn company(name: impl Into<String>) -> Self {
        Self::Company { name: name.into() }
    }

    pub fn part(part: PartKey) -> Self {
        Self::Part { part }
    }

    pub fn bom_line(assembly: PartKey, sub_part: PartKey) -> Self {
        Self::BomLine { assembly, sub_part }
    }
}

impl core::fmt::Display for EntityKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            EntityKey::Category { path } => write!(f, "category:{path}"),
            EntityKey::Company { name } => write!(f, "company:{name}"),
            EntityKey::Part { part } => write!(f, "part:{part}"),
            EntityKey::BomLine { assembly, sub_part } => write!(f, "bom:{assembly}>{sub_part}"),
        }
    }
}
