//! Pulls the remote catalogue back into the on-disk layout.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use invsync_core::{CategoryPath, EntityKind, PartKey, RemoteId};
use invsync_records::{
    Address, BomLine, Category, Company, Part, PartFlags, PartRef, PriceBreak, Record,
    RecordStore, SupplierAssociation,
};
use invsync_remote::{Query, RemoteApi, RemoteObject};

use crate::error::SyncError;

/// What an export wrote.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportReport {
    pub root: PathBuf,
    pub files: Vec<PathBuf>,
    /// Exported records per kind.
    pub counts: BTreeMap<EntityKind, usize>,
    /// Remote objects left out because they could not be represented
    /// locally.
    pub skipped: usize,
}

impl ExportReport {
    pub fn records(&self) -> usize {
        self.counts.values().sum()
    }
}

/// Builds local records from everything the remote holds.
pub struct Exporter<'a> {
    remote: &'a dyn RemoteApi,
}

#[derive(Default)]
pub(crate) struct Collected {
    pub(crate) records: Vec<Record>,
    pub(crate) skipped: usize,
}

impl<'a> Exporter<'a> {
    pub fn new(remote: &'a dyn RemoteApi) -> Self {
        Self { remote }
    }

    fn all(&self, kind: EntityKind) -> Result<Vec<RemoteObject>, SyncError> {
        Ok(self.remote.list(kind, &Query::new())?)
    }

    /// Writes every remote record below `root` and returns what was written.
    pub fn export(&self, root: impl AsRef<Path>) -> Result<ExportReport, SyncError> {
        let root = root.as_ref();
        let collected = self.collect_all()?;
        let files = RecordStore::save(root, &collected.records)?;
        let mut counts = BTreeMap::new();
        for record in &collected.records {
            *counts.entry(record.kind()).or_default() += 1;
        }
        info!(
            root = %root.display(),
            records = collected.records.len(),
            skipped = collected.skipped,
            "export finished"
        );
        Ok(ExportReport {
            root: root.to_path_buf(),
            files,
            counts,
            skipped: collected.skipped,
        })
    }

    /// Remote catalogue as local records, in load order by kind.
    pub fn collect(&self) -> Result<Vec<Record>, SyncError> {
        Ok(self.collect_all()?.records)
    }

    pub(crate) fn collect_all(&self) -> Result<Collected, SyncError> {
        let mut out = Collected::default();

        let categories = self.categories(&mut out)?;
        let companies = self.companies(&mut out)?;
        let parts = self.parts(&categories, &companies, &mut out)?;
        self.bom_lines(&parts, &mut out)?;
        Ok(out)
    }

    fn categories(
        &self,
        out: &mut Collected,
    ) -> Result<HashMap<RemoteId, CategoryPath>, SyncError> {
        let objects = self.all(EntityKind::Category)?;
        let by_id: HashMap<RemoteId, &RemoteObject> = objects.iter().map(|o| (o.id, o)).collect();

        let mut paths = HashMap::new();
        for object in &objects {
            match category_path(object, &by_id) {
                Some(path) => {
                    let mut category = Category::new(path.clone());
                    category.description = object.text("description").unwrap_or_default();
                    category.default_keywords = object.text("default_keywords");
                    out.records.push(Record::Category(category));
                    paths.insert(object.id, path);
                }
                None => {
                    warn!(id = %object.id, "category skipped: unusable name or parent chain");
                    out.skipped += 1;
                }
            }
        }
        Ok(paths)
    }

    fn companies(&self, out: &mut Collected) -> Result<HashMap<RemoteId, String>, SyncError> {
        let mut addresses: HashMap<RemoteId, Vec<Address>> = HashMap::new();
        for object in self.all(EntityKind::Address)? {
            let Some(company) = object.id_of("company") else {
                continue;
            };
            addresses.entry(company).or_default().push(Address {
                title: object.text("title").unwrap_or_default(),
                line1: object.text("line1").unwrap_or_default(),
                line2: object.text("line2").unwrap_or_default(),
                postal_code: object.text("postal_code").unwrap_or_default(),
                postal_city: object.text("postal_city").unwrap_or_default(),
                province: object.text("province").unwrap_or_default(),
                country: object.text("country").unwrap_or_default(),
                primary: object.bool("primary").unwrap_or(false),
            });
        }

        let mut names = HashMap::new();
        for object in self.all(EntityKind::Company)? {
            let Some(name) = object.text("name") else {
                warn!(id = %object.id, "company skipped: no name");
                out.skipped += 1;
                continue;
            };
            let mut company = Company::new(name.clone());
            company.description = object.text("description").unwrap_or_default();
            company.website = object.text("website").unwrap_or_default();
            company.phone = object.text("phone").unwrap_or_default();
            company.email = object.text("email").unwrap_or_default();
            company.currency = object.text("currency");
            company.is_manufacturer = object.bool("is_manufacturer").unwrap_or(false);
            company.is_supplier = object.bool("is_supplier").unwrap_or(false);
            company.is_customer = object.bool("is_customer").unwrap_or(false);
            company.addresses = addresses.remove(&object.id).unwrap_or_default();
            out.records.push(Record::Company(company));
            names.insert(object.id, name);
        }
        Ok(names)
    }

    fn parts(
        &self,
        categories: &HashMap<RemoteId, CategoryPath>,
        companies: &HashMap<RemoteId, String>,
        out: &mut Collected,
    ) -> Result<HashMap<RemoteId, PartKey>, SyncError> {
        let objects = self.all(EntityKind::Part)?;
        let mut keys = HashMap::new();
        for object in &objects {
            let key = object
                .text("name")
                .and_then(|name| PartKey::new(name, object.text("revision")).ok());
            match key {
                Some(key) => {
                    keys.insert(object.id, key);
                }
                None => {
                    warn!(id = %object.id, "part skipped: no name");
                    out.skipped += 1;
                }
            }
        }

        let templates: HashMap<RemoteId, String> = self
            .all(EntityKind::ParameterTemplate)?
            .into_iter()
            .filter_map(|o| Some((o.id, o.text("name")?)))
            .collect();
        let mut parameters: HashMap<RemoteId, BTreeMap<String, String>> = HashMap::new();
        for object in self.all(EntityKind::Parameter)? {
            let (Some(part), Some(name)) = (
                object.id_of("part"),
                object.id_of("template").and_then(|t| templates.get(&t)),
            ) else {
                continue;
            };
            parameters
                .entry(part)
                .or_default()
                .insert(name.clone(), object.text("data").unwrap_or_default());
        }

        let suppliers = self.supplier_associations(companies)?;
        let mut suppliers_by_part: HashMap<RemoteId, Vec<SupplierAssociation>> = HashMap::new();
        for (part, association) in suppliers {
            suppliers_by_part.entry(part).or_default().push(association);
        }

        for object in &objects {
            let Some(key) = keys.get(&object.id) else {
                continue;
            };
            let defaults = PartFlags::default();
            let flag = |field: &str, default: bool| object.bool(field).unwrap_or(default);
            let mut part = Part::new(key.clone());
            part.ipn = object.text("IPN");
            part.description = object.text("description").unwrap_or_default();
            part.keywords = object.text("keywords").unwrap_or_default();
            part.units = object.text("units").unwrap_or_default();
            part.category = object
                .id_of("category")
                .and_then(|id| categories.get(&id))
                .cloned();
            part.variant_of = object
                .id_of("variant_of")
                .and_then(|id| keys.get(&id))
                .map(PartRef::to);
            part.flags = PartFlags {
                assembly: flag("assembly", defaults.assembly),
                component: flag("component", defaults.component),
                trackable: flag("trackable", defaults.trackable),
                purchaseable: flag("purchaseable", defaults.purchaseable),
                salable: flag("salable", defaults.salable),
                is_virtual: flag("virtual", defaults.is_virtual),
                is_template: flag("is_template", defaults.is_template),
                active: flag("active", defaults.active),
            };
            part.parameters = parameters.remove(&object.id).unwrap_or_default();
            part.suppliers = suppliers_by_part.remove(&object.id).unwrap_or_default();
            part.suppliers.sort_by(|a, b| (&a.supplier, &a.sku).cmp(&(&b.supplier, &b.sku)));
            out.records.push(Record::Part(part));
        }
        Ok(keys)
    }

    /// Supplier parts joined with their manufacturer part and price breaks,
    /// keyed by the part they belong to.
    fn supplier_associations(
        &self,
        companies: &HashMap<RemoteId, String>,
    ) -> Result<Vec<(RemoteId, SupplierAssociation)>, SyncError> {
        let manufacturer_parts: HashMap<RemoteId, (String, String)> = self
            .all(EntityKind::ManufacturerPart)?
            .into_iter()
            .filter_map(|o| {
                let manufacturer = companies.get(&o.id_of("manufacturer")?)?.clone();
                Some((o.id, (manufacturer, o.text("MPN")?)))
            })
            .collect();

        let mut price_breaks: HashMap<RemoteId, Vec<PriceBreak>> = HashMap::new();
        for object in self.all(EntityKind::PriceBreak)? {
            let (Some(supplier_part), Some(quantity), Some(price)) = (
                object.id_of("part"),
                object.f64("quantity"),
                object.f64("price"),
            ) else {
                continue;
            };
            price_breaks.entry(supplier_part).or_default().push(PriceBreak {
                quantity: quantity as u64,
                price,
                currency: object.text("price_currency"),
            });
        }

        let mut associations = Vec::new();
        for object in self.all(EntityKind::SupplierPart)? {
            let (Some(part), Some(supplier), Some(sku)) = (
                object.id_of("part"),
                object.id_of("supplier").and_then(|id| companies.get(&id)),
                object.text("SKU"),
            ) else {
                continue;
            };
            let mut association = SupplierAssociation::new(supplier.clone(), sku);
            association.description = object.text("description").unwrap_or_default();
            association.link = object.text("link").unwrap_or_default();
            association.packaging = object.text("packaging").unwrap_or_default();
            if let Some((manufacturer, mpn)) = object
                .id_of("manufacturer_part")
                .and_then(|id| manufacturer_parts.get(&id))
            {
                association = association.made_by(manufacturer.clone(), mpn.clone());
            }
            let mut prices = price_breaks.remove(&object.id).unwrap_or_default();
            prices.sort_by_key(|p| p.quantity);
            association.price_breaks = prices;
            associations.push((part, association));
        }
        Ok(associations)
    }

    fn bom_lines(
        &self,
        parts: &HashMap<RemoteId, PartKey>,
        out: &mut Collected,
    ) -> Result<(), SyncError> {
        for object in self.all(EntityKind::BomItem)? {
            let assembly = object.id_of("part").and_then(|id| parts.get(&id));
            let sub_part = object.id_of("sub_part").and_then(|id| parts.get(&id));
            let (Some(assembly), Some(sub_part)) = (assembly, sub_part) else {
                warn!(id = %object.id, "BOM line skipped: unknown part");
                out.skipped += 1;
                continue;
            };
            let mut line = BomLine::new(
                assembly.clone(),
                PartRef::to(sub_part),
                object.f64("quantity").unwrap_or(1.0),
            );
            line.note = object.text("note").unwrap_or_default();
            line.reference = object.text("reference").unwrap_or_default();
            line.validated = object.bool("validated").unwrap_or(false);
            line.active = object.bool("active").unwrap_or(true);
            line.optional = object.bool("optional").unwrap_or(false);
            out.records.push(Record::BomLine(line));
        }
        Ok(())
    }
}

/// Full path of a remote category, following `parent` links. `None` for a
/// broken or cyclic chain.
fn category_path(
    object: &RemoteObject,
    by_id: &HashMap<RemoteId, &RemoteObject>,
) -> Option<CategoryPath> {
    let mut segments = Vec::new();
    let mut current = Some(object);
    while let Some(category) = current {
        if segments.len() > by_id.len() {
            return None;
        }
        segments.push(category.text("name")?.replace('/', "_"));
        current = match category.id_of("parent") {
            Some(parent) => Some(*by_id.get(&parent)?),
            None => None,
        };
    }
    segments.reverse();
    CategoryPath::new(segments).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use invsync_remote::InMemoryRemote;
    use serde_json::json;

    #[test]
    fn category_paths_follow_parents() {
        let remote = InMemoryRemote::new();
        let w1 = remote.seed(EntityKind::Category, json!({"name": "Warehouse1", "parent": null}));
        remote.seed(EntityKind::Category, json!({"name": "Shelf A/B", "parent": w1.get()}));

        let records = Exporter::new(&remote).collect().unwrap();
        let paths: Vec<String> = records
            .iter()
            .filter_map(|r| match r {
                Record::Category(c) => Some(c.path.to_string()),
                _ => None,
            })
            .collect();
        assert_eq!(paths, vec!["Warehouse1", "Warehouse1/Shelf A_B"]);
    }

    #[test]
    fn cyclic_parent_chains_are_skipped() {
        let remote = InMemoryRemote::new();
        remote.seed(EntityKind::Category, json!({"name": "A", "parent": 2}));
        remote.seed(EntityKind::Category, json!({"name": "B", "parent": 1}));

        let collected = Exporter::new(&remote).collect_all().unwrap();
        assert!(collected.records.is_empty());
        assert_eq!(collected.skipped, 2);
    }
}
