use std::fs;
use std::path::Path;

use serde_json::json;

use invsync_core::EntityKind;
use invsync_records::{Record, RecordStore};
use invsync_remote::InMemoryRemote;
use invsync_sync::{Drift, Exporter, Loader, RunContext};

fn write(root: &Path, rel: &str, body: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, body).unwrap();
}

fn catalogue(root: &Path) {
    write(
        root,
        "companies/Woodco.json",
        r#"{"name": "Woodco", "is_supplier": true, "currency": "EUR",
            "addresses": [{"title": "HQ", "line1": "1 Forest Rd", "country": "SE", "primary": true}]}"#,
    );
    write(root, "companies/Metalworks.json", r#"{"name": "Metalworks", "is_manufacturer": true}"#);
    write(root, "parts/Furniture/category.json", r#"{"description": "Things to sit at"}"#);
    write(
        root,
        "parts/Furniture/Leg.json",
        r#"{"IPN": "LEG-01", "component": true, "units": "pcs",
            "parameters": {"Length": "70cm", "Finish": "Oiled"},
            "suppliers": [{"supplier": "Woodco", "SKU": "W-LEG", "manufacturer": "Metalworks", "MPN": "MW-9",
                           "price_breaks": [{"quantity": 1, "price": 2.5, "currency": "EUR"}, {"quantity": 10, "price": 2.0}]}]}"#,
    );
    write(root, "parts/Furniture/Leg.B.json", r#"{"name": "Leg", "variant_of": "Leg"}"#);
    write(root, "parts/Furniture/Tables/Table.A.json", r#"{"name": "Table", "assembly": true}"#);
    write(
        root,
        "parts/Furniture/Tables/Table.A.bom.json",
        r#"[{"sub_part": "Leg", "quantity": 4, "note": "corners"}]"#,
    );
}

fn sorted(store: &RecordStore) -> Vec<Record> {
    let mut records: Vec<Record> = store.entries().iter().map(|e| e.record.clone()).collect();
    records.sort_by_key(Record::key);
    records
}

#[test]
fn exported_data_root_reloads_into_the_same_records() {
    let source = tempfile::tempdir().unwrap();
    catalogue(source.path());
    let store = RecordStore::open(source.path()).unwrap();
    let remote = InMemoryRemote::new();
    let loaded = Loader::new(&store, &remote).run(&[], &RunContext::new()).unwrap();
    assert!(loaded.is_success(), "{:?}", loaded.counts());

    let target = tempfile::tempdir().unwrap();
    let report = Exporter::new(&remote).export(target.path()).unwrap();
    assert_eq!(report.records(), store.len());
    assert_eq!(report.skipped, 0);
    assert_eq!(report.counts[&EntityKind::Part], 3);

    let exported = RecordStore::open(target.path()).unwrap();
    assert_eq!(sorted(&exported), sorted(&store));
}

#[test]
fn objects_created_outside_the_tool_are_exported() {
    let remote = InMemoryRemote::new();
    let passives = remote.seed(EntityKind::Category, json!({"name": "Passives", "parent": null}));
    let resistor = remote.seed(
        EntityKind::Part,
        json!({"name": "R 10k", "revision": "", "IPN": "", "category": passives.get(), "active": true}),
    );
    remote.seed(EntityKind::Part, json!({"name": "", "revision": ""}));
    remote.seed(EntityKind::BomItem, json!({"part": 999, "sub_part": resistor.get(), "quantity": 1}));

    let target = tempfile::tempdir().unwrap();
    let report = Exporter::new(&remote).export(target.path()).unwrap();
    assert_eq!(report.skipped, 2);
    assert!(target.path().join("parts/Passives/R_10k.json").exists());

    let store = RecordStore::open(target.path()).unwrap();
    let part = store
        .entries()
        .iter()
        .find_map(|e| e.record.as_part())
        .unwrap();
    assert_eq!(part.key.name, "R 10k");
    assert_eq!(part.ipn, None);
    assert_eq!(part.category, Some("Passives".parse().unwrap()));
}

#[test]
fn diff_of_a_freshly_loaded_root_is_clean() {
    let root = tempfile::tempdir().unwrap();
    catalogue(root.path());
    let store = RecordStore::open(root.path()).unwrap();
    let remote = InMemoryRemote::new();
    Loader::new(&store, &remote).run(&[], &RunContext::new()).unwrap();
    remote.reset_calls();

    let report = Exporter::new(&remote).diff(&store).unwrap();
    assert!(report.is_clean(), "{:?}", report.drifted().collect::<Vec<_>>());
    assert_eq!(report.entries.len(), store.len());
    assert_eq!(remote.mutating_calls(), 0);
}

#[test]
fn diff_reports_changed_and_one_sided_records_without_writing() {
    let root = tempfile::tempdir().unwrap();
    catalogue(root.path());
    let store = RecordStore::open(root.path()).unwrap();
    let remote = InMemoryRemote::new();
    Loader::new(&store, &remote).run(&[], &RunContext::new()).unwrap();
    remote.seed(EntityKind::Company, json!({"name": "Acme", "is_supplier": true}));

    write(
        root.path(),
        "parts/Furniture/Tables/Table.A.json",
        r#"{"name": "Table", "assembly": true, "description": "Dining table"}"#,
    );
    write(root.path(), "companies/Newco.json", r#"{"name": "Newco"}"#);
    let before = fs::read_to_string(root.path().join("parts/Furniture/Tables/Table.A.json")).unwrap();
    let store = RecordStore::open(root.path()).unwrap();
    remote.reset_calls();

    let report = Exporter::new(&remote).diff(&store).unwrap();
    assert!(!report.is_clean());
    let drift = |key: &str| {
        report
            .entries
            .iter()
            .find(|e| e.key == key)
            .map(|e| e.drift.clone())
            .unwrap()
    };
    assert_eq!(
        drift("part:Table@A"),
        Drift::Changed {
            fields: vec!["description".to_string()]
        }
    );
    assert_eq!(drift("company:Newco"), Drift::LocalOnly);
    assert_eq!(drift("company:Acme"), Drift::RemoteOnly);
    assert_eq!(drift("part:Leg"), Drift::Identical);
    assert_eq!(report.counts()["changed"], 1);
    assert_eq!(report.drifted().count(), 3);

    assert_eq!(remote.mutating_calls(), 0);
    assert!(!root.path().join("companies/Acme.json").exists());
    assert_eq!(
        fs::read_to_string(root.path().join("parts/Furniture/Tables/Table.A.json")).unwrap(),
        before
    );
}
