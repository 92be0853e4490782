use std::fs;
use std::path::Path;

use invsync_core::{EntityKey, PartKey};
use invsync_records::{Record, RecordError, RecordStore};

fn write(root: &Path, rel: &str, body: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, body).unwrap();
}

fn furniture(root: &Path) {
    write(root, "companies/Woodco.json", r#"{"name": "Woodco", "is_supplier": true}"#);
    write(
        root,
        "parts/Furniture/category.json",
        r#"{"description": "Things to sit at"}"#,
    );
    write(
        root,
        "parts/Furniture/Leg.json",
        r#"{"IPN": "LEG-01", "component": true,
            "suppliers": [{"supplier": "Woodco", "SKU": "W-LEG", "price_breaks": [{"quantity": 1, "price": 2.5}]}]}"#,
    );
    write(
        root,
        "parts/Furniture/Tables/Table.A.json",
        r#"{"name": "Table", "assembly": true}"#,
    );
    write(
        root,
        "parts/Furniture/Tables/Table.A.bom.json",
        r#"[{"sub_part": "Leg", "quantity": 4}]"#,
    );
    write(root, "parts/Furniture/README.txt", "not a record");
}

#[test]
fn opens_a_data_root_into_tagged_records() {
    let dir = tempfile::tempdir().unwrap();
    furniture(dir.path());

    let store = RecordStore::open(dir.path()).unwrap();
    let keys: Vec<String> = store.entries().iter().map(|e| e.key().to_string()).collect();
    assert_eq!(
        keys,
        vec![
            "company:Woodco",
            "category:Furniture",
            "part:Leg",
            "category:Furniture/Tables",
            "part:Table@A",
            "bom:Table@A>Leg",
        ]
    );

    let furniture = store
        .position(&EntityKey::category("Furniture".parse().unwrap()))
        .unwrap();
    match &store.entries()[furniture].record {
        Record::Category(c) => assert_eq!(c.description, "Things to sit at"),
        other => panic!("unexpected {other:?}"),
    }

    let table = store
        .position(&EntityKey::part(PartKey::new("Table", Some("A".into())).unwrap()))
        .unwrap();
    let part = store.entries()[table].record.as_part().unwrap();
    assert_eq!(part.category, Some("Furniture/Tables".parse().unwrap()));
    assert!(part.flags.assembly);
}

#[test]
fn bom_beside_non_assembly_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "parts/Leg.json", r#"{}"#);
    write(dir.path(), "parts/Leg.bom.json", r#"[{"sub_part": "Screw"}]"#);

    let err = RecordStore::open(dir.path()).unwrap_err();
    assert!(matches!(err, RecordError::Invalid { .. }), "{err}");
    assert!(err.to_string().contains("not an assembly"), "{err}");
}

#[test]
fn orphan_bom_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "parts/Ghost.bom.json", r#"[{"sub_part": "Screw"}]"#);

    let err = RecordStore::open(dir.path()).unwrap_err();
    assert!(err.to_string().contains("without matching part file"), "{err}");
}

#[test]
fn malformed_json_names_the_file() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "companies/Broken.json", "{ not json");

    let err = RecordStore::open(dir.path()).unwrap_err();
    assert!(matches!(err, RecordError::Json { .. }));
    assert!(err.to_string().contains("Broken.json"), "{err}");
}

#[test]
fn missing_root_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = RecordStore::open(dir.path().join("nope")).unwrap_err();
    assert!(matches!(err, RecordError::Io { .. }));
}

#[test]
fn saved_records_reopen_to_the_same_set() {
    let source = tempfile::tempdir().unwrap();
    furniture(source.path());
    let store = RecordStore::open(source.path()).unwrap();
    let records: Vec<Record> = store.entries().iter().map(|e| e.record.clone()).collect();

    let target = tempfile::tempdir().unwrap();
    let written = RecordStore::save(target.path(), &records).unwrap();
    assert!(target.path().join("parts/Furniture/Tables/Table.A.bom.json").is_file());
    assert!(written.iter().any(|p| p.ends_with("companies/Woodco.json")));

    let reopened = RecordStore::open(target.path()).unwrap();
    let mut before: Vec<Record> = records;
    let mut after: Vec<Record> = reopened.entries().iter().map(|e| e.record.clone()).collect();
    before.sort_by_key(|r| r.key());
    after.sort_by_key(|r| r.key());
    assert_eq!(before, after);
}
