use std::fs;
use std::path::Path;

use invsync_core::{EntityKind, ErrorKind};
use invsync_records::RecordStore;
use invsync_remote::{InMemoryRemote, Op};
use invsync_sync::{
    Loader, RecordState, RunContext, SkipReason, UnloadOptions, Unloader,
};

fn write(root: &Path, rel: &str, body: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, body).unwrap();
}

fn furniture(root: &Path) {
    write(root, "companies/Woodco.json", r#"{"name": "Woodco", "is_supplier": true}"#);
    write(
        root,
        "parts/Furniture/Leg.json",
        r#"{"IPN": "LEG-01", "component": true,
            "suppliers": [{"supplier": "Woodco", "SKU": "W-LEG"}]}"#,
    );
    write(root, "parts/Furniture/Tables/Table.A.json", r#"{"name": "Table", "assembly": true}"#);
    write(
        root,
        "parts/Furniture/Tables/Table.A.bom.json",
        r#"[{"sub_part": "Leg", "quantity": 4}]"#,
    );
}

/// Loads the data root into a fresh in-memory server.
fn loaded(root: &Path) -> (RecordStore, InMemoryRemote) {
    let store = RecordStore::open(root).unwrap();
    let remote = InMemoryRemote::new();
    let report = Loader::new(&store, &remote).run(&[], &RunContext::new()).unwrap();
    assert!(report.is_success());
    remote.reset_calls();
    (store, remote)
}

fn patterns(patterns: &[&str]) -> Vec<String> {
    patterns.iter().map(|p| p.to_string()).collect()
}

#[test]
fn shelf_is_deleted_before_its_warehouse() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "parts/Warehouse1/ShelfA/category.json", r#"{"description": "Shelf"}"#);
    let (store, remote) = loaded(dir.path());

    let report = Unloader::new(&store, &remote)
        .run(&patterns(&["parts/Warehouse1", "parts/Warehouse1/**"]), &RunContext::new())
        .unwrap();

    assert_eq!(report.count(&RecordState::Deleted), 2);
    assert_eq!(remote.count(EntityKind::Category), 0);
    assert_eq!(report.exit_code(), 0);
}

#[test]
fn category_with_remaining_parts_is_not_empty() {
    let dir = tempfile::tempdir().unwrap();
    furniture(dir.path());
    let (store, remote) = loaded(dir.path());

    let report = Unloader::new(&store, &remote)
        .run(&patterns(&["parts/Furniture/Tables"]), &RunContext::new())
        .unwrap();

    let tables = report.record("parts/Furniture/Tables").unwrap();
    assert_eq!(tables.failure().unwrap().kind, ErrorKind::NotEmpty);
    assert_eq!(remote.calls(Op::Delete), 0);
    assert_eq!(report.exit_code(), 1);
}

#[test]
fn part_used_by_a_bom_line_is_in_use() {
    let dir = tempfile::tempdir().unwrap();
    furniture(dir.path());
    let (store, remote) = loaded(dir.path());

    let report = Unloader::new(&store, &remote)
        .run(&patterns(&["parts/Furniture/Leg.json", "companies/*"]), &RunContext::new())
        .unwrap();

    let leg = report.record("parts/Furniture/Leg.json").unwrap();
    assert_eq!(leg.failure().unwrap().kind, ErrorKind::InUse);
    assert!(leg.failure().unwrap().message.contains("1 BOM line"));
    // Woodco is referenced by Leg's supplier part, which is in the
    // selection and failed.
    assert_eq!(
        report.record("companies/Woodco.json").unwrap().state,
        RecordState::skipped(SkipReason::DependencyFailed)
    );
    assert_eq!(remote.count(EntityKind::Part), 2);
    assert_eq!(remote.calls(Op::Delete), 0);
}

#[test]
fn company_referenced_by_an_unselected_part_is_in_use() {
    let dir = tempfile::tempdir().unwrap();
    furniture(dir.path());
    let (store, remote) = loaded(dir.path());

    let report = Unloader::new(&store, &remote)
        .run(&patterns(&["companies/Woodco"]), &RunContext::new())
        .unwrap();
    let woodco = report.record("companies/Woodco.json").unwrap();
    assert_eq!(woodco.failure().unwrap().kind, ErrorKind::InUse);
    assert_eq!(remote.count(EntityKind::Company), 1);
}

#[test]
fn whole_data_root_unloads_in_reverse_order() {
    let dir = tempfile::tempdir().unwrap();
    furniture(dir.path());
    let (store, remote) = loaded(dir.path());

    let report = Unloader::new(&store, &remote)
        .run(&[], &RunContext::new())
        .unwrap();

    assert!(report.is_success(), "{:?}", report.counts());
    assert_eq!(report.count(&RecordState::Deleted), store.len());
    for kind in [
        EntityKind::Category,
        EntityKind::Company,
        EntityKind::Part,
        EntityKind::BomItem,
        EntityKind::SupplierPart,
    ] {
        assert_eq!(remote.count(kind), 0, "{kind}");
    }
    // Both parts were marked inactive first.
    assert_eq!(remote.calls_for(Op::Update, EntityKind::Part), 2);
}

#[test]
fn records_missing_remotely_are_absent() {
    let dir = tempfile::tempdir().unwrap();
    furniture(dir.path());
    let store = RecordStore::open(dir.path()).unwrap();
    let remote = InMemoryRemote::new();

    let report = Unloader::new(&store, &remote)
        .run(&patterns(&["parts/**"]), &RunContext::new())
        .unwrap();
    assert_eq!(report.skipped(SkipReason::Absent).count(), report.records.len());
    assert_eq!(report.exit_code(), 0);
    assert_eq!(remote.mutating_calls(), 0);
}

#[test]
fn remove_json_deletes_files_after_the_remote_delete() {
    let dir = tempfile::tempdir().unwrap();
    furniture(dir.path());
    let (store, remote) = loaded(dir.path());

    let report = Unloader::new(&store, &remote)
        .with_options(UnloadOptions::default().with_remove_json(true))
        .run(
            &patterns(&["parts/Furniture/Tables", "parts/Furniture/Tables/**"]),
            &RunContext::new(),
        )
        .unwrap();

    assert!(report.is_success(), "{:?}", report.counts());
    let root = dir.path();
    assert!(!root.join("parts/Furniture/Tables/Table.A.json").exists());
    assert!(!root.join("parts/Furniture/Tables/Table.A.bom.json").exists());
    assert!(!root.join("parts/Furniture/Tables").exists());
    assert!(root.join("parts/Furniture/Leg.json").exists());
}

#[test]
fn failed_delete_keeps_local_files() {
    let dir = tempfile::tempdir().unwrap();
    furniture(dir.path());
    let (store, remote) = loaded(dir.path());

    let report = Unloader::new(&store, &remote)
        .with_options(UnloadOptions::default().with_remove_json(true))
        .run(&patterns(&["parts/Furniture/Leg.json"]), &RunContext::new())
        .unwrap();

    assert_eq!(report.exit_code(), 1);
    assert!(dir.path().join("parts/Furniture/Leg.json").exists());
}

#[test]
fn cancelled_unload_touches_nothing() {
    let dir = tempfile::tempdir().unwrap();
    furniture(dir.path());
    let (store, remote) = loaded(dir.path());

    let ctx = RunContext::new();
    ctx.cancel();
    let report = Unloader::new(&store, &remote).run(&[], &ctx).unwrap();
    assert_eq!(report.skipped(SkipReason::Cancelled).count(), store.len());
    assert_eq!(remote.total_calls(), 0);
}
