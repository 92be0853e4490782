use serde::{Deserialize, Serialize};

use invsync_core::{CategoryPath, Entity, EntityKey, EntityKind};

/// Part category, identified by its path in the category forest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub path: CategoryPath,
    /// Parent category; the directory layout derives it from `path`.
    pub parent: Option<CategoryPath>,
    pub description: String,
    pub default_keywords: Option<String>,
}

impl Category {
    pub fn new(path: CategoryPath) -> Self {
        let parent = path.parent();
        Self {
            path,
            parent,
            description: String::new(),
            default_keywords: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn name(&self) -> &str {
        self.path.name()
    }
}

impl Entity for Category {
    const KIND: EntityKind = EntityKind::Category;

    fn key(&self) -> EntityKey {
        EntityKey::category(self.path.clone())
    }
}

/// Contents of an on-disk `category.json`.
///
/// Older exports stored a list of subcategories instead of an object; such
/// files carry no metadata and read as the default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryFile {
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_keywords: Option<String>,
}

impl CategoryFile {
    pub fn from_value(value: serde_json::Value) -> Result<Self, serde_json::Error> {
        match value {
            serde_json::Value::Array(_) | serde_json::Value::Null => Ok(Self::default()),
            other => serde_json::from_value(other),
        }
    }

    pub fn apply(self, category: &mut Category) {
        category.description = self.description;
        category.default_keywords = self.default_keywords.filter(|k| !k.trim().is_empty());
    }

    pub fn of(category: &Category) -> Self {
        Self {
            description: category.description.clone(),
            default_keywords: category.default_keywords.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parent_is_derived_from_path() {
        let category = Category::new("Warehouse1/ShelfA".parse().unwrap());
        assert_eq!(category.name(), "ShelfA");
        assert_eq!(category.parent, Some("Warehouse1".parse().unwrap()));
        assert_eq!(Category::new("Warehouse1".parse().unwrap()).parent, None);
    }

    #[test]
    fn legacy_subcategory_lists_read_as_empty_metadata() {
        let file = CategoryFile::from_value(json!([{"name": "Resistors"}])).unwrap();
        assert_eq!(file, CategoryFile::default());
    }

    #[test]
    fn category_file_ignores_server_fields() {
        let file = CategoryFile::from_value(json!({
            "pk": 12,
            "pathstring": "Electronics/Passives",
            "description": "Passive parts",
        }))
        .unwrap();
        let mut category = Category::new("Electronics/Passives".parse().unwrap());
        file.apply(&mut category);
        assert_eq!(category.description, "Passive parts");
    }
}
