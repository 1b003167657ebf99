//! Behavioural tests for `DistanceCacheMaintainer`.

use std::cell::RefCell;
use std::sync::Arc;
use std::time::Duration;

use binroute_core::test_support::{HaversineMappingService, MemoryRecordStore};
use binroute_core::{
    Depot, DistanceCacheEntry, DumbBin, NodeKey, NodeKind, RecordStore, SmartBin, WriteOp,
};
use binroute_data::routing::{AdapterLimits, MappingAdapter};
use binroute_data::{DistanceCacheMaintainer, NodeChanges};
use geo::Coord;
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use tokio::runtime::Runtime;

/// Shared state for cache scenarios.
struct CacheWorld {
    runtime: Runtime,
    store: Arc<MemoryRecordStore>,
    service: RefCell<Arc<HaversineMappingService>>,
    changes: RefCell<NodeChanges>,
    before: RefCell<Vec<DistanceCacheEntry>>,
}

impl CacheWorld {
    fn new() -> Self {
        Self {
            runtime: tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .expect("build runtime"),
            store: Arc::new(MemoryRecordStore::default()),
            service: RefCell::new(Arc::new(HaversineMappingService::default())),
            changes: RefCell::new(NodeChanges::new(NodeKind::SmartBin)),
            before: RefCell::new(Vec::new()),
        }
    }

    fn maintainer(
        &self,
    ) -> DistanceCacheMaintainer<Arc<MemoryRecordStore>, Arc<HaversineMappingService>> {
        let limits = AdapterLimits::default().with_retries(3, Duration::from_millis(1));
        let adapter = MappingAdapter::new(Arc::clone(&self.service.borrow()), limits)
            .expect("valid limits");
        DistanceCacheMaintainer::new(Arc::clone(&self.store), adapter)
    }

    fn snapshot(&self) -> Vec<DistanceCacheEntry> {
        self.store.distance_snapshot().expect("snapshot")
    }
}

#[fixture]
fn world() -> CacheWorld {
    CacheWorld::new()
}

fn smart(id: &str, x: f64) -> SmartBin {
    SmartBin {
        id: id.into(),
        location: Coord { x, y: 48.85 },
        current_fullness: 5.0,
        threshold: 10.0,
    }
}

fn smart_key(id: &str) -> NodeKey {
    NodeKey::new(NodeKind::SmartBin, id)
}

#[given(r#"a store with a depot, smart bins "{a}" and "{c}" and a dumb bin "{d}""#)]
fn given_store(world: &CacheWorld, a: String, c: String, d: String) {
    let store = &world.store;
    world.runtime.block_on(async {
        store
            .bulk_write(vec![WriteOp::Insert(Depot {
                id: "depot".into(),
                location: Coord { x: 2.35, y: 48.86 },
            })])
            .await
            .expect("seed depot");
        store
            .bulk_write(vec![WriteOp::Insert(smart(&a, 2.36)), WriteOp::Insert(smart(&c, 2.37))])
            .await
            .expect("seed smart bins");
        store
            .bulk_write(vec![WriteOp::Insert(DumbBin {
                id: d,
                location: Coord { x: 2.38, y: 48.84 },
                capacity: 12.0,
                nearest_smart_bin: None,
            })])
            .await
            .expect("seed dumb bin");
    });
}

#[given("a mapping service that throttles the first {count} requests")]
fn given_throttled(world: &CacheWorld, count: usize) {
    world
        .service
        .replace(Arc::new(HaversineMappingService::default().with_rate_limited_calls(count)));
}

fn rebuild_cache(world: &CacheWorld) {
    world
        .runtime
        .block_on(world.maintainer().rebuild())
        .expect("rebuild cache");
    world.before.replace(world.snapshot());
}

#[given("the distance cache has been rebuilt")]
fn given_rebuilt(world: &CacheWorld) {
    rebuild_cache(world);
}

#[when("the distance cache is rebuilt")]
fn when_rebuilt(world: &CacheWorld) {
    rebuild_cache(world);
}

#[when(r#"smart bin "{deleted}" is deleted and smart bin "{created}" is created"#)]
fn replace_bin(world: &CacheWorld, deleted: String, created: String) {
    world
        .runtime
        .block_on(world.store.bulk_write(vec![
            WriteOp::Delete(deleted.clone()),
            WriteOp::Insert(smart(&created, 2.39)),
        ]))
        .expect("mutate bins");
    let mut changes = world.changes.borrow_mut();
    changes.deleted.push(deleted);
    changes.created.push(created);
}

#[when("the cache changes are applied")]
fn apply(world: &CacheWorld) {
    let changes = world.changes.borrow().clone();
    world
        .runtime
        .block_on(world.maintainer().apply_changes(&changes))
        .expect("apply changes");
}

#[then(r#"no cached leg touches "{id}""#)]
fn then_untouched(world: &CacheWorld, id: String) {
    let key = smart_key(&id);
    assert!(world.snapshot().iter().all(|entry| !entry.touches(&key)));
}

#[then(r#"smart bin "{id}" has a leg to and from every node"#)]
fn then_connected(world: &CacheWorld, id: String) {
    let key = smart_key(&id);
    let snapshot = world.snapshot();
    let nodes: std::collections::BTreeSet<_> = snapshot
        .iter()
        .flat_map(|entry| [entry.origin.clone(), entry.destination.clone()])
        .collect();
    for node in &nodes {
        assert!(
            snapshot.iter().any(|e| &e.origin == node && e.destination == key),
            "missing leg {node} -> {key}"
        );
        assert!(
            snapshot.iter().any(|e| e.origin == key && &e.destination == node),
            "missing leg {key} -> {node}"
        );
    }
}

#[then(r#"the legs between "{c}" and "{d}" are unchanged"#)]
fn then_unchanged(world: &CacheWorld, c: String, d: String) {
    let c = smart_key(&c);
    let d = NodeKey::new(NodeKind::DumbBin, d);
    let between = |entries: &[DistanceCacheEntry]| -> Vec<DistanceCacheEntry> {
        entries
            .iter()
            .filter(|e| e.touches(&c) && e.touches(&d) && e.origin != e.destination)
            .cloned()
            .collect()
    };
    let before = between(&world.before.borrow());
    assert_eq!(before.len(), 2);
    assert_eq!(between(&world.snapshot()), before);
}

#[then("every cached leg is known")]
fn then_all_known(world: &CacheWorld) {
    let snapshot = world.snapshot();
    assert_eq!(snapshot.len(), 16);
    assert!(snapshot.iter().all(|e| e.leg.distance_m.is_some()));
}

#[scenario(path = "tests/features/distance_cache.feature", index = 0)]
fn replacing_a_bin(world: CacheWorld) {
    let _ = world;
}

#[scenario(path = "tests/features/distance_cache.feature", index = 1)]
fn throttled_rebuild(world: CacheWorld) {
    let _ = world;
}
