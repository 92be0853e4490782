use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use invsync_core::{CategoryPath, Entity, EntityKey, EntityKind, PartKey};

/// Longest IPN the server accepts; also the truncation length when an IPN is
/// generated from the part name.
pub const MAX_IPN_LEN: usize = 50;

/// Reference to another part by name, revision and/or IPN.
///
/// Written either as a bare name (`"Leg"`) or as an object
/// (`{"name": "Leg", "revision": "B", "IPN": "LEG-01"}`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "PartRefRepr", into = "PartRefRepr")]
pub struct PartRef {
    pub name: String,
    pub revision: Option<String>,
    pub ipn: Option<String>,
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum PartRefRepr {
    Name(String),
    Full {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        revision: Option<String>,
        #[serde(rename = "IPN", default, skip_serializing_if = "Option::is_none")]
        ipn: Option<String>,
    },
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl From<PartRefRepr> for PartRef {
    fn from(repr: PartRefRepr) -> Self {
        match repr {
            PartRefRepr::Name(name) => Self {
                name,
                revision: None,
                ipn: None,
            },
            PartRefRepr::Full {
                name,
                revision,
                ipn,
            } => Self {
                name,
                revision: non_blank(revision),
                ipn: non_blank(ipn),
            },
        }
    }
}

impl From<PartRef> for PartRefRepr {
    fn from(r: PartRef) -> Self {
        if r.revision.is_none() && r.ipn.is_none() {
            PartRefRepr::Name(r.name)
        } else {
            PartRefRepr::Full {
                name: r.name,
                revision: r.revision,
                ipn: r.ipn,
            }
        }
    }
}

impl PartRef {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            revision: None,
            ipn: None,
        }
    }

    pub fn to(key: &PartKey) -> Self {
        Self {
            name: key.name.clone(),
            revision: key.revision.clone(),
            ipn: None,
        }
    }

    pub fn with_ipn(mut self, ipn: impl Into<String>) -> Self {
        self.ipn = non_blank(Some(ipn.into()));
        self
    }

    /// Best-effort key; the resolver may match the reference to a part
    /// with a different key through its IPN.
    pub fn key(&self) -> PartKey {
        PartKey {
            name: self.name.clone(),
            revision: self.revision.clone(),
        }
    }
}

impl core::fmt::Display for PartRef {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.key(), f)?;
        if let Some(ipn) = &self.ipn {
            write!(f, " (IPN {ipn})")?;
        }
        Ok(())
    }
}

/// Boolean part attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartFlags {
    #[serde(default)]
    pub assembly: bool,
    #[serde(default)]
    pub component: bool,
    #[serde(default)]
    pub trackable: bool,
    #[serde(default)]
    pub purchaseable: bool,
    #[serde(default)]
    pub salable: bool,
    #[serde(rename = "virtual", default)]
    pub is_virtual: bool,
    #[serde(default)]
    pub is_template: bool,
    #[serde(default = "default_true")]
    pub active: bool,
}

fn default_true() -> bool {
    true
}

impl Default for PartFlags {
    fn default() -> Self {
        Self {
            assembly: false,
            component: false,
            trackable: false,
            purchaseable: false,
            salable: false,
            is_virtual: false,
            is_template: false,
            active: true,
        }
    }
}

/// Quantity → unit price tier of a supplier part.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBreak {
    pub quantity: u64,
    pub price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
}

/// Where a part can be bought, and who makes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupplierAssociation {
    /// Supplier company name.
    pub supplier: String,
    #[serde(rename = "SKU")]
    pub sku: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub link: String,
    #[serde(default)]
    pub packaging: String,
    /// Manufacturer company name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,
    #[serde(rename = "MPN", default, skip_serializing_if = "Option::is_none")]
    pub mpn: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub price_breaks: Vec<PriceBreak>,
}

impl SupplierAssociation {
    pub fn new(supplier: impl Into<String>, sku: impl Into<String>) -> Self {
        Self {
            supplier: supplier.into(),
            sku: sku.into(),
            description: String::new(),
            link: String::new(),
            packaging: String::new(),
            manufacturer: None,
            mpn: None,
            price_breaks: Vec::new(),
        }
    }

    pub fn made_by(mut self, manufacturer: impl Into<String>, mpn: impl Into<String>) -> Self {
        self.manufacturer = Some(manufacturer.into());
        self.mpn = Some(mpn.into());
        self
    }

    pub fn with_price(mut self, quantity: u64, price: f64, currency: Option<&str>) -> Self {
        self.price_breaks.push(PriceBreak {
            quantity,
            price,
            currency: currency.map(str::to_string),
        });
        self
    }

    fn validate(&self) -> Result<(), String> {
        if self.supplier.trim().is_empty() {
            return Err("supplier association without supplier name".to_string());
        }
        if self.sku.trim().is_empty() {
            return Err(format!("supplier '{}' association without SKU", self.supplier));
        }
        if self.mpn.is_some() && self.manufacturer.is_none() {
            return Err(format!(
                "supplier '{}' SKU '{}' has an MPN but no manufacturer",
                self.supplier, self.sku
            ));
        }
        let mut quantities = std::collections::BTreeSet::new();
        for pb in &self.price_breaks {
            if pb.quantity == 0 {
                return Err(format!("SKU '{}' has a price break at quantity 0", self.sku));
            }
            if !pb.price.is_finite() || pb.price < 0.0 {
                return Err(format!("SKU '{}' has an invalid price {}", self.sku, pb.price));
            }
            if !quantities.insert(pb.quantity) {
                return Err(format!(
                    "SKU '{}' has duplicate price breaks at quantity {}",
                    self.sku, pb.quantity
                ));
            }
        }
        Ok(())
    }
}

/// A part, template, variant or assembly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Part {
    pub key: PartKey,
    pub ipn: Option<String>,
    pub description: String,
    pub keywords: String,
    pub units: String,
    pub category: Option<CategoryPath>,
    pub flags: PartFlags,
    pub variant_of: Option<PartRef>,
    pub parameters: BTreeMap<String, String>,
    pub suppliers: Vec<SupplierAssociation>,
}

impl Part {
    pub fn new(key: PartKey) -> Self {
        Self {
            key,
            ipn: None,
            description: String::new(),
            keywords: String::new(),
            units: String::new(),
            category: None,
            flags: PartFlags::default(),
            variant_of: None,
            parameters: BTreeMap::new(),
            suppliers: Vec::new(),
        }
    }

    pub fn in_category(mut self, category: CategoryPath) -> Self {
        self.category = Some(category);
        self
    }

    pub fn with_ipn(mut self, ipn: impl Into<String>) -> Self {
        self.ipn = non_blank(Some(ipn.into()));
        self
    }

    pub fn name(&self) -> &str {
        &self.key.name
    }

    pub fn revision(&self) -> Option<&str> {
        self.key.revision.as_deref()
    }

    /// Fills a missing IPN from the (truncated) part name.
    ///
    /// Returns the generated IPN, if any.
    pub fn ensure_ipn(&mut self) -> Option<&str> {
        if self.ipn.is_some() {
            return None;
        }
        let generated: String = self.key.name.chars().take(MAX_IPN_LEN).collect();
        self.ipn = Some(generated);
        self.ipn.as_deref()
    }

    /// Company names this part's supplier associations refer to, sorted and
    /// without duplicates.
    pub fn companies(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .suppliers
            .iter()
            .flat_map(|s| std::iter::once(s.supplier.as_str()).chain(s.manufacturer.as_deref()))
            .collect();
        names.sort_unstable();
        names.dedup();
        names
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.key.name.trim().is_empty() {
            return Err("part name cannot be empty".to_string());
        }
        if let Some(ipn) = &self.ipn {
            if ipn.chars().count() > 100 {
                return Err(format!("IPN '{ipn}' is longer than 100 characters"));
            }
        }
        if let Some(base) = &self.variant_of {
            if base.key() == self.key {
                return Err(format!("part '{}' cannot be a variant of itself", self.key));
            }
        }
        if self.parameters.keys().any(|k| k.trim().is_empty()) {
            return Err(format!("part '{}' has a parameter without name", self.key));
        }
        let mut seen = std::collections::BTreeSet::new();
        for association in &self.suppliers {
            association.validate()?;
            if !seen.insert((association.supplier.as_str(), association.sku.as_str())) {
                return Err(format!(
                    "part '{}' lists supplier '{}' SKU '{}' twice",
                    self.key, association.supplier, association.sku
                ));
            }
        }
        Ok(())
    }
}

impl Entity for Part {
    const KIND: EntityKind = EntityKind::Part;

    fn key(&self) -> EntityKey {
        EntityKey::part(self.key.clone())
    }
}

/// On-disk part file. Name and revision fall back to the file name; the
/// category always comes from the directory.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct PartFile {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub revision: Option<String>,
    #[serde(rename = "IPN", default)]
    pub ipn: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub keywords: Option<String>,
    #[serde(default)]
    pub units: Option<String>,
    #[serde(flatten)]
    pub flags: PartFlags,
    #[serde(default)]
    pub variant_of: Option<PartRef>,
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
    #[serde(default)]
    pub suppliers: Vec<SupplierAssociation>,
}

/// Serialized form written by the exporter; mirrors [`PartFile`].
#[derive(Debug, Clone, Serialize)]
pub(crate) struct PartFileOut<'a> {
    pub name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revision: Option<&'a str>,
    #[serde(rename = "IPN", skip_serializing_if = "Option::is_none")]
    pub ipn: Option<&'a str>,
    pub description: &'a str,
    pub keywords: &'a str,
    pub units: &'a str,
    #[serde(flatten)]
    pub flags: PartFlags,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variant_of: Option<&'a PartRef>,
    #[serde(skip_serializing_if = "no_parameters")]
    pub parameters: &'a BTreeMap<String, String>,
    #[serde(skip_serializing_if = "no_suppliers")]
    pub suppliers: &'a [SupplierAssociation],
}

fn no_parameters(parameters: &&BTreeMap<String, String>) -> bool {
    parameters.is_empty()
}

fn no_suppliers(suppliers: &&[SupplierAssociation]) -> bool {
    suppliers.is_empty()
}

impl<'a> From<&'a Part> for PartFileOut<'a> {
    fn from(part: &'a Part) -> Self {
        Self {
            name: &part.key.name,
            revision: part.key.revision.as_deref(),
            ipn: part.ipn.as_deref(),
            description: &part.description,
            keywords: &part.keywords,
            units: &part.units,
            flags: part.flags,
            variant_of: part.variant_of.as_ref(),
            parameters: &part.parameters,
            suppliers: &part.suppliers,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn part(name: &str) -> Part {
        Part::new(PartKey::named(name).unwrap())
    }

    #[test]
    fn part_refs_accept_names_and_objects() {
        let by_name: PartRef = serde_json::from_value(json!("Leg")).unwrap();
        assert_eq!(by_name, PartRef::named("Leg"));

        let full: PartRef =
            serde_json::from_value(json!({"name": "Leg", "revision": "B", "IPN": ""})).unwrap();
        assert_eq!(full.revision.as_deref(), Some("B"));
        assert_eq!(full.ipn, None);

        assert_eq!(serde_json::to_value(PartRef::named("Leg")).unwrap(), json!("Leg"));
        assert_eq!(
            serde_json::to_value(PartRef::named("Leg").with_ipn("L-1")).unwrap(),
            json!({"name": "Leg", "IPN": "L-1"})
        );
    }

    #[test]
    fn flags_default_to_active_only() {
        let flags: PartFlags = serde_json::from_value(json!({"virtual": true})).unwrap();
        assert!(flags.is_virtual);
        assert!(flags.active);
        assert!(!flags.assembly);
    }

    #[test]
    fn ensure_ipn_truncates_name_and_keeps_existing() {
        let long_name = "X".repeat(80);
        let mut p = part(&long_name);
        assert_eq!(p.ensure_ipn().map(str::len), Some(MAX_IPN_LEN));
        assert_eq!(p.ensure_ipn(), None);

        let mut q = part("Leg").with_ipn("LEG-01");
        assert_eq!(q.ensure_ipn(), None);
        assert_eq!(q.ipn.as_deref(), Some("LEG-01"));
    }

    #[test]
    fn companies_are_collected_from_suppliers_and_manufacturers() {
        let mut p = part("R_10k");
        p.suppliers = vec![
            SupplierAssociation::new("Digikey", "311-10K").made_by("Yageo", "RC0402"),
            SupplierAssociation::new("Mouser", "603-RC0402").made_by("Yageo", "RC0402"),
        ];
        assert_eq!(p.companies(), vec!["Digikey", "Mouser", "Yageo"]);
        assert!(p.validate().is_ok());
    }

    #[test]
    fn validation_rejects_self_variant_and_bad_price_breaks() {
        let mut p = part("Table");
        p.variant_of = Some(PartRef::named("Table"));
        assert!(p.validate().unwrap_err().contains("variant of itself"));

        let mut q = part("Screw");
        q.suppliers = vec![
            SupplierAssociation::new("Acme", "S-1")
                .with_price(10, 0.5, Some("USD"))
                .with_price(10, 0.4, Some("USD")),
        ];
        assert!(q.validate().unwrap_err().contains("duplicate price breaks"));

        let mut r = part("Nut");
        let mut association = SupplierAssociation::new("Acme", "N-1");
        association.mpn = Some("N1".to_string());
        r.suppliers = vec![association];
        assert!(r.validate().unwrap_err().contains("no manufacturer"));
    }
}
