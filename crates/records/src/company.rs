use serde::{Deserialize, Serialize};

use invsync_core::{Entity, EntityKey, EntityKind};

/// Postal address of a company.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub title: String,
    #[serde(default)]
    pub line1: String,
    #[serde(default)]
    pub line2: String,
    #[serde(default)]
    pub postal_code: String,
    #[serde(default)]
    pub postal_city: String,
    #[serde(default)]
    pub province: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub primary: bool,
}

/// A manufacturer, supplier and/or customer. Names are unique.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Company {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub website: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(default)]
    pub is_manufacturer: bool,
    #[serde(default)]
    pub is_supplier: bool,
    #[serde(default)]
    pub is_customer: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub addresses: Vec<Address>,
}

impl Company {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn supplier(mut self) -> Self {
        self.is_supplier = true;
        self
    }

    pub fn manufacturer(mut self) -> Self {
        self.is_manufacturer = true;
        self
    }

    pub fn primary_address(&self) -> Option<&Address> {
        self.addresses.iter().find(|a| a.primary)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("company name cannot be empty".to_string());
        }
        let primaries = self.addresses.iter().filter(|a| a.primary).count();
        if primaries > 1 {
            return Err(format!(
                "company '{}' has {primaries} primary addresses (at most one allowed)",
                self.name
            ));
        }
        let mut titles = std::collections::BTreeSet::new();
        for address in &self.addresses {
            if address.title.trim().is_empty() {
                return Err(format!("company '{}' has an address without title", self.name));
            }
            if !titles.insert(address.title.as_str()) {
                return Err(format!(
                    "company '{}' has duplicate address title '{}'",
                    self.name, address.title
                ));
            }
        }
        Ok(())
    }
}

impl Entity for Company {
    const KIND: EntityKind = EntityKind::Company;

    fn key(&self) -> EntityKey {
        EntityKey::company(self.name.clone())
    }
}

/// On-disk company file. Accepts server exports, which carry a single
/// free-text `address` instead of an address list.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct CompanyFile {
    #[serde(flatten)]
    company: Company,
    #[serde(default)]
    address: Option<String>,
}

impl CompanyFile {
    pub(crate) fn into_company(self) -> Company {
        let mut company = self.company;
        if company.addresses.is_empty() {
            if let Some(line) = self.address.filter(|a| !a.trim().is_empty()) {
                company.addresses.push(Address {
                    title: "Primary".to_string(),
                    line1: line,
                    primary: true,
                    ..Address::default()
                });
            }
        }
        company
    }
}
