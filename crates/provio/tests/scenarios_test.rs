//! End-to-end bookkeeping scenarios through the public API.

use provio::registry::Registry;
use provio::stats::StatsTable;
use provio::{ByteIdentity, ContainerId, ObjectKind, ObjectToken, ProvioConfig, StatsGrowth};
use std::collections::BTreeMap;
use std::time::Duration;
use test_support::FakeLibrary;

const C1: ContainerId = ContainerId::new(1);

fn registry() -> Registry<ByteIdentity> {
    Registry::open(ByteIdentity, &ProvioConfig::default())
}

#[test]
fn single_dataset_lifecycle() {
    let mut reg = registry();
    reg.open_container(C1, Some("c1")).unwrap();
    let node = reg
        .track_object(C1, ObjectKind::Dataset, ObjectToken::from_address(0x11), Some("x"), &())
        .unwrap();
    assert_eq!(reg.untrack_object(node), 0);
    assert_eq!(reg.container(C1).unwrap().count(ObjectKind::Dataset), 0);
}

#[test]
fn shared_dataset_survives_first_release() {
    let mut reg = registry();
    reg.open_container(C1, Some("c1")).unwrap();
    let t2 = ObjectToken::from_address(0x22);
    let a = reg.track_object(C1, ObjectKind::Dataset, t2, Some("y"), &()).unwrap();
    let b = reg.track_object(C1, ObjectKind::Dataset, t2, Some("y"), &()).unwrap();
    assert_eq!(a, b);
    assert_eq!(reg.node(a).unwrap().refcount(), 2);
    assert_eq!(reg.untrack_object(a), 1);
    assert!(reg.node(a).is_some());
    assert_eq!(reg.untrack_object(b), 0);
    assert!(reg.node(a).is_none());
}

#[test]
fn container_close_waits_for_children() {
    let mut reg = registry();
    reg.open_container(C1, Some("c1")).unwrap();
    let child = reg
        .track_object(C1, ObjectKind::Dataset, ObjectToken::from_address(0x33), None, &())
        .unwrap();
    assert!(reg.close_container(C1) > 0);
    assert!(reg.container(C1).is_some());
    reg.untrack_object(child);
    assert!(reg.container(C1).is_none());
}

#[test]
fn read_and_write_totals() {
    let mut table = StatsTable::with_capacity(62, StatsGrowth::Fixed).unwrap();
    table.accumulate("read", Duration::from_micros(100)).unwrap();
    table.accumulate("read", Duration::from_micros(100)).unwrap();
    table.accumulate("write", Duration::from_micros(50)).unwrap();
    let totals: BTreeMap<&str, u128> = table
        .iter()
        .map(|(name, value)| (name, value.as_micros()))
        .collect();
    assert_eq!(totals, BTreeMap::from([("read", 200), ("write", 50)]));
}

#[test]
fn registries_are_independent() {
    let mut first = registry();
    let mut second = registry();
    assert_ne!(first.id(), second.id());
    first.open_container(C1, None).unwrap();
    assert!(second.container(C1).is_none());
    second.open_container(C1, None).unwrap();
    assert_eq!(first.close_container(C1), 0);
    assert_eq!(second.container(C1).unwrap().refcount(), 1);
}

#[test]
fn connect_rejects_invalid_config() {
    let err = provio::connect(
        FakeLibrary::new(1),
        ProvioConfig::new().with_placeholder_container_name(""),
    )
    .err()
    .unwrap();
    assert!(matches!(err, provio::ProvioError::Configuration(_)));
}

#[test]
fn connected_interceptor_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stat.txt");
    let mut prov = provio::connect(
        FakeLibrary::new(7),
        ProvioConfig::new().with_stat_file_path(&path),
    )
    .unwrap();
    let file = prov.file_create("e2e.h5").unwrap();
    let group = prov.object_create(&file, ObjectKind::Group, "run").unwrap();
    let dset = prov.object_create(&group, ObjectKind::Dataset, "values").unwrap();
    prov.dataset_write(&dset, None).unwrap();
    prov.registry().verify_open_things(1, 1).unwrap();

    prov.object_close(dset).unwrap();
    prov.object_close(group).unwrap();
    prov.file_close(file).unwrap();
    prov.registry().verify_open_things(0, 0).unwrap();

    let summary = prov.terminate().unwrap();
    assert!(summary.teardown.is_clean());
    let report = std::fs::read_to_string(&path).unwrap();
    for op in ["file_create", "group_create", "dataset_create", "dataset_write", "file_close"] {
        assert!(report.lines().any(|line| line.starts_with(op)), "missing {op}");
    }
}
