use provio_core::{ContainerId, ObjectKind, ProvioConfig};
use provio_interceptor::{InterceptError, ProvenanceInterceptor, ProxyTarget};
use provio_registry::{KindCounters, RegistryError};
use provio_stats::{ManualClock, OverheadList};
use std::sync::Arc;
use std::time::Duration;
use test_support::FakeLibrary;

const LATENCY: Duration = Duration::from_micros(100);

fn interceptor_with(config: ProvioConfig) -> ProvenanceInterceptor<FakeLibrary> {
    let clock = ManualClock::new();
    let library = FakeLibrary::new(1)
        .with_latency(clock.clone(), LATENCY)
        .with_dataset_shape("temps", 4, &[10, 10]);
    ProvenanceInterceptor::with_clock(library, config, Arc::new(clock)).unwrap()
}

fn interceptor() -> ProvenanceInterceptor<FakeLibrary> {
    interceptor_with(ProvioConfig::default())
}

#[test]
fn file_outlives_close_while_a_dataset_is_open() {
    let mut prov = interceptor();
    let file = prov.file_create("run.h5").unwrap();
    let id = file.container_id();
    let dset = prov.object_create(&file, ObjectKind::Dataset, "temps").unwrap();

    assert_eq!(prov.file_close(file).unwrap(), 1);
    assert_eq!(prov.registry().container(id).unwrap().count(ObjectKind::Dataset), 1);

    assert_eq!(prov.object_close(dset).unwrap(), 0);
    assert!(prov.registry().is_empty());
    assert_eq!(prov.library().open_handles(), 0);
}

#[test]
fn reopening_an_object_shares_its_node() {
    let mut prov = interceptor();
    let file = prov.file_create("run.h5").unwrap();
    let created = prov.object_create(&file, ObjectKind::Group, "g").unwrap();
    let opened = prov.object_open(&file, ObjectKind::Group, "g").unwrap();
    assert_eq!(created.node(), opened.node());

    let node = opened.node().unwrap();
    let tracked = prov.registry().node(node).unwrap();
    assert_eq!(tracked.refcount(), 2);
    assert_eq!(tracked.counters(), &KindCounters::Group(provio_registry::OpCounters { ops: 2 }));
    let stats = prov.registry().container(file.container_id()).unwrap().stats();
    assert_eq!(stats.created(ObjectKind::Group), 1);
    assert_eq!(stats.accessed(ObjectKind::Group), 1);

    assert_eq!(prov.object_close(created).unwrap(), 1);
    assert_eq!(prov.object_close(opened).unwrap(), 0);
    assert_eq!(prov.file_close(file).unwrap(), 0);
    assert!(prov.registry().is_empty());
}

#[test]
fn objects_under_groups_count_against_the_file() {
    let mut prov = interceptor();
    let file = prov.file_create("run.h5").unwrap();
    let group = prov.object_create(&file, ObjectKind::Group, "g").unwrap();
    let attr = prov.object_create(&group, ObjectKind::Attribute, "units").unwrap();
    assert_eq!(attr.container_id(), file.container_id());
    let container = prov.registry().container(file.container_id()).unwrap();
    assert_eq!(container.counts(), [0, 1, 0, 1]);
    assert_eq!(container.refcount(), 3);
}

#[test]
fn dataset_transfers_are_sized_from_the_shape() {
    let mut prov = interceptor();
    let file = prov.file_create("run.h5").unwrap();
    let dset = prov.object_create(&file, ObjectKind::Dataset, "temps").unwrap();
    assert_eq!(prov.dataset_read(&dset, None).unwrap(), 400);
    assert_eq!(prov.dataset_write(&dset, Some(4)).unwrap(), 16);

    let node = prov.registry().node(dset.node().unwrap()).unwrap();
    let KindCounters::Dataset(counters) = node.counters() else {
        panic!("dataset node without dataset counters");
    };
    assert_eq!(counters.bytes_read, 400);
    assert_eq!(counters.bytes_written, 16);
    assert_eq!(counters.read_time, LATENCY);
}

#[test]
fn datatype_commit_and_reopen_are_counted() {
    let mut prov = interceptor();
    let file = prov.file_create("run.h5").unwrap();
    let committed = prov.object_create(&file, ObjectKind::Datatype, "t").unwrap();
    prov.object_open(&file, ObjectKind::Datatype, "t").unwrap();
    let node = prov.registry().node(committed.node().unwrap()).unwrap();
    let KindCounters::Datatype(counters) = node.counters() else {
        panic!("datatype node without datatype counters");
    };
    assert_eq!((counters.commits, counters.gets), (1, 1));
}

#[test]
fn linked_object_is_tracked_in_its_own_file() {
    let mut prov = interceptor();
    let other = prov.file_create("other.h5").unwrap();
    let other_id = other.container_id();
    let file = prov.file_create("run.h5").unwrap();
    prov.library()
        .add_external_link(file.container_id(), ObjectKind::Dataset, "remote", other_id);

    let remote = prov.object_open(&file, ObjectKind::Dataset, "remote").unwrap();
    assert_eq!(remote.container_id(), other_id);
    assert_eq!(prov.registry().container_count(), 2);
    assert_eq!(prov.registry().container(other_id).unwrap().refcount(), 2);
    assert_eq!(prov.registry().container(file.container_id()).unwrap().refcount(), 1);
}

#[test]
fn link_into_an_unopened_file_creates_and_promotes_a_placeholder() {
    let mut prov = interceptor();
    let target = prov.file_create("target.h5").unwrap();
    let target_id = target.container_id();
    prov.file_close(target).unwrap();

    let file = prov.file_create("run.h5").unwrap();
    prov.library()
        .add_external_link(file.container_id(), ObjectKind::Group, "remote", target_id);
    let remote = prov.object_open(&file, ObjectKind::Group, "remote").unwrap();
    let placeholder = prov.registry().container(target_id).unwrap();
    assert!(placeholder.is_placeholder());
    assert_eq!(placeholder.name(), Some("dummy"));

    let reopened = prov.file_open("target.h5").unwrap();
    let promoted = prov.registry().container(target_id).unwrap();
    assert!(!promoted.is_placeholder());
    assert_eq!(promoted.name(), Some("target.h5"));
    assert_eq!(promoted.refcount(), 2);

    prov.object_close(remote).unwrap();
    assert_eq!(prov.file_close(reopened).unwrap(), 0);
    assert!(prov.registry().container(target_id).is_none());
}

#[test]
fn wrap_context_pins_the_file_until_freed() {
    let mut prov = interceptor();
    let file = prov.file_create("run.h5").unwrap();
    let id = file.container_id();
    let ctx = prov.get_wrap_ctx(&file).unwrap();
    assert_eq!(ctx.container(), id);
    assert_eq!(prov.file_close(file).unwrap(), 1);

    let raw = prov.library().raw_object(id, 0x9000);
    let wrapped = prov.wrap_object(raw, ObjectKind::Dataset, &ctx).unwrap();
    assert!(!wrapped.is_fake());
    assert_eq!(wrapped.container_id(), id);
    assert_eq!(prov.registry().container(id).unwrap().refcount(), 2);

    let handle = prov.unwrap_object(wrapped).unwrap();
    assert_eq!(handle.address, 0x9000);
    assert_eq!(prov.registry().container(id).unwrap().refcount(), 1);

    assert_eq!(prov.free_wrap_ctx(ctx), 0);
    assert!(prov.registry().is_empty());
}

#[test]
fn wrapping_an_object_from_another_file_adopts_it() {
    let mut prov = interceptor();
    let file = prov.file_create("run.h5").unwrap();
    let ctx = prov.get_wrap_ctx(&file).unwrap();
    let elsewhere = ContainerId::new(42);

    let raw = prov.library().raw_object(elsewhere, 0x9100);
    let wrapped = prov.wrap_object(raw, ObjectKind::Attribute, &ctx).unwrap();
    assert_eq!(wrapped.container_id(), elsewhere);
    assert!(prov.registry().container(elsewhere).unwrap().is_placeholder());

    prov.unwrap_object(wrapped).unwrap();
    assert!(prov.registry().container(elsewhere).is_none());
    assert_eq!(prov.free_wrap_ctx(ctx), 1);
}

#[test]
fn async_completion_is_wrapped_under_the_parent_file() {
    let mut prov = interceptor();
    let file = prov.file_create("run.h5").unwrap();
    let raw = prov.library().raw_object(file.container_id(), 0x9200);
    let completed = prov
        .complete_request(&file, raw, ObjectKind::Dataset, Some("async"))
        .unwrap();
    assert_eq!(completed.connector(), file.connector());
    let node = prov.registry().node(completed.node().unwrap()).unwrap();
    assert_eq!(node.name(), Some("async"));
    assert!(prov.stats().contains_key("request_wait"));
}

#[test]
fn library_failure_leaves_bookkeeping_untouched() {
    let mut prov = interceptor();
    let file = prov.file_create("run.h5").unwrap();
    prov.library().fail_next("open_object");
    let err = prov.object_open(&file, ObjectKind::Dataset, "temps").unwrap_err();
    assert!(matches!(err, InterceptError::Library { op: "dataset_open", .. }));
    assert_eq!(prov.registry().open_node_count(ObjectKind::Dataset), 0);
    assert!(!prov.stats().contains_key("dataset_open"));
}

#[test]
fn rejected_file_close_hands_the_proxy_back() {
    let mut prov = interceptor();
    let file = prov.file_create("run.h5").unwrap();
    let id = file.container_id();
    prov.library().fail_next("close_container");
    let rejected = prov.file_close(file).unwrap_err();
    assert!(matches!(rejected.error, InterceptError::Library { op: "file_close", .. }));
    assert_eq!(prov.registry().container(id).unwrap().refcount(), 1);
    assert!(!prov.stats().contains_key("file_close"));

    assert_eq!(prov.file_close(rejected.proxy).unwrap(), 0);
    assert_eq!(prov.library().open_handles(), 0);
    assert!(prov.terminate().unwrap().teardown.leaked.is_empty());
}

#[test]
fn rejected_object_close_hands_the_proxy_back() {
    let mut prov = interceptor();
    let file = prov.file_create("run.h5").unwrap();
    let dset = prov.object_create(&file, ObjectKind::Dataset, "temps").unwrap();
    prov.library().fail_next("close_object");
    let (dset, error) = prov.object_close(dset).unwrap_err().into_parts();
    assert!(matches!(error, InterceptError::Library { op: "dataset_close", .. }));
    assert_eq!(prov.registry().open_node_count(ObjectKind::Dataset), 1);

    assert_eq!(prov.object_close(dset).unwrap(), 0);
    assert_eq!(prov.file_close(file).unwrap(), 0);
    assert_eq!(prov.library().open_handles(), 0);
    assert!(prov.terminate().unwrap().teardown.leaked.is_empty());
}

#[test]
fn failed_lookup_releases_the_new_handle() {
    let mut prov = interceptor();
    let file = prov.file_create("run.h5").unwrap();
    let before = prov.library().open_handles();
    prov.library().fail_next("object_info");
    let err = prov.object_create(&file, ObjectKind::Group, "g").unwrap_err();
    assert!(matches!(err, InterceptError::Library { op: "group_create", .. }));
    assert_eq!(prov.library().open_handles(), before);
    assert_eq!(prov.registry().container(file.container_id()).unwrap().refcount(), 1);
}

#[test]
fn failed_shape_lookup_rolls_back_the_node() {
    let mut prov = interceptor();
    let file = prov.file_create("run.h5").unwrap();
    prov.library().fail_next("dataset_shape");
    let err = prov.object_create(&file, ObjectKind::Dataset, "temps").unwrap_err();
    assert!(matches!(err, InterceptError::Library { op: "dataset_create", .. }));
    assert_eq!(prov.registry().open_node_count(ObjectKind::Dataset), 0);
    assert_eq!(prov.library().open_handles(), 1);

    let dset = prov.object_open(&file, ObjectKind::Dataset, "temps").unwrap();
    prov.library().fail_next("dataset_shape");
    prov.object_open(&file, ObjectKind::Dataset, "temps").unwrap_err();
    let node = prov.registry().node(dset.node().unwrap()).unwrap();
    assert_eq!(node.refcount(), 1);
    assert_eq!(prov.library().open_handles(), 2);
}

#[test]
fn failed_container_lookup_closes_the_new_handle() {
    let mut prov = interceptor();
    prov.library().fail_next("container_id");
    let err = prov.file_create("run.h5").unwrap_err();
    assert!(matches!(err, InterceptError::Library { op: "file_create", .. }));
    assert!(prov.registry().is_empty());
    assert_eq!(prov.library().open_handles(), 0);
}

#[test]
fn failed_wrap_closes_the_raw_handle() {
    let mut prov = interceptor();
    let file = prov.file_create("run.h5").unwrap();
    let ctx = prov.get_wrap_ctx(&file).unwrap();
    let before = prov.library().open_handles();
    let raw = prov.library().raw_object(file.container_id(), 0x9300);
    prov.library().fail_next("object_info");
    let err = prov.wrap_object(raw, ObjectKind::Group, &ctx).unwrap_err();
    assert!(matches!(err, InterceptError::Library { op: "wrap_object", .. }));
    assert_eq!(prov.library().open_handles(), before);
    assert_eq!(prov.registry().open_node_count(ObjectKind::Group), 0);
    assert_eq!(prov.free_wrap_ctx(ctx), 1);
}

#[test]
fn comparison_failure_aborts_tracking() {
    let mut prov = interceptor();
    let file = prov.file_create("run.h5").unwrap();
    prov.object_create(&file, ObjectKind::Dataset, "a").unwrap();
    prov.library().fail_comparisons(true);
    let err = prov.object_create(&file, ObjectKind::Dataset, "b").unwrap_err();
    assert!(matches!(err, InterceptError::Registry(RegistryError::Identity(_))));
    assert_eq!(prov.registry().open_node_count(ObjectKind::Dataset), 1);
}

#[test]
fn proxies_are_checked_for_the_operation() {
    let mut prov = interceptor();
    let file = prov.file_create("run.h5").unwrap();
    let group = prov.object_create(&file, ObjectKind::Group, "g").unwrap();
    assert!(matches!(
        prov.dataset_read(&group, None),
        Err(InterceptError::WrongProxy { op: "dataset_read", .. })
    ));
    assert!(matches!(file.target(), ProxyTarget::Container(_)));
    let rejected = prov.object_close(file).unwrap_err();
    assert!(matches!(rejected.error, InterceptError::WrongProxy { op: "object_close", .. }));
    assert_eq!(prov.file_close(rejected.proxy).unwrap(), 1);
}

#[test]
fn operations_are_timed_into_stats_and_overhead() {
    let mut prov = interceptor();
    let file = prov.file_create("run.h5").unwrap();
    let dset = prov.object_create(&file, ObjectKind::Dataset, "temps").unwrap();
    prov.dataset_read(&dset, None).unwrap();

    let stats = prov.stats();
    assert_eq!(stats.get("file_create"), Some(LATENCY * 2));
    assert_eq!(stats.get("dataset_create"), Some(LATENCY * 3));
    assert_eq!(stats.get("dataset_read"), Some(LATENCY));
    let overhead = prov.overhead();
    assert_eq!(overhead.library(), LATENCY * 6);
    assert_eq!(overhead.interception(), Duration::ZERO);
    assert_eq!(overhead.list(OverheadList::Containers), Duration::ZERO);
}

#[test]
fn full_stats_table_does_not_fail_operations() {
    let mut prov = interceptor_with(ProvioConfig::new().with_stats_capacity(1));
    let file = prov.file_create("run.h5").unwrap();
    prov.object_create(&file, ObjectKind::Group, "g").unwrap();
    assert_eq!(prov.stats().len(), 1);
    assert!(prov.stats().contains_key("file_create"));
    assert_eq!(prov.registry().open_node_count(ObjectKind::Group), 1);
}

#[test]
fn terminate_writes_the_stats_report() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("prov_stat.txt");
    let mut prov = interceptor_with(ProvioConfig::new().with_stat_file_path(&path));
    let file = prov.file_create("run.h5").unwrap();
    let dset = prov.object_create(&file, ObjectKind::Dataset, "temps").unwrap();
    prov.dataset_write(&dset, Some(4)).unwrap();
    prov.dataset_read(&dset, None).unwrap();
    prov.object_close(dset).unwrap();
    prov.file_close(file).unwrap();

    let summary = prov.terminate().unwrap();
    assert!(summary.teardown.is_clean());
    insta::assert_snapshot!(std::fs::read_to_string(&path).unwrap(), @r"
    dataset_close 100 us
    file_close 100 us
    dataset_create 300 us
    dataset_write 100 us
    dataset_read 100 us
    file_create 200 us
    interception_overhead 0 us
    library_time 900 us
    container_list 0 us
    dataset_list 0 us
    group_list 0 us
    datatype_list 0 us
    attribute_list 0 us
    ");
}

#[test]
fn terminate_reports_files_left_open() {
    let mut prov = interceptor_with(ProvioConfig::new().with_record_overhead(false));
    let file = prov.file_create("leak.h5").unwrap();
    let id = file.container_id();
    let summary = prov.terminate().unwrap();
    assert_eq!(summary.teardown.leaked.len(), 1);
    assert_eq!(summary.teardown.leaked[0].id, id);
    assert_eq!(summary.overhead.library(), Duration::ZERO);
    let json = summary.to_json();
    assert_eq!(json["stats"]["file_create"], 200);
    assert_eq!(json["leaked"][0]["name"], "leak.h5");
}
