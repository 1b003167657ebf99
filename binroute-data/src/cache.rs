//! Keeps the all-pairs distance cache consistent with the stored bins.
//!
//! A full [`DistanceCacheMaintainer::rebuild`] recomputes every leg between
//! the depot and all bins. After a batch of bin mutations,
//! [`DistanceCacheMaintainer::apply_changes`] recomputes only the legs with
//! a changed endpoint, so the mapping calls it makes grow with the number of
//! changed bins and not with the square of the fleet's bin count.

use std::collections::HashSet;

use binroute_core::{
    Depot, DistanceCacheEntry, DumbBin, MappingService, Node, NodeKey, NodeKind, RecordStore,
    SmartBin, StoreError,
};
use log::{debug, info, warn};
use serde::Serialize;
use thiserror::Error;

use crate::routing::MappingAdapter;

/// Errors raised while maintaining the distance cache.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Reading nodes or writing the cache failed; the cache is unchanged.
    #[error("distance cache store operation failed: {0}")]
    Store(#[from] StoreError),
    /// Incremental updates only apply to bins.
    #[error("incremental cache updates are not supported for {0}; rebuild instead")]
    UnsupportedKind(NodeKind),
}

/// A batch of mutations to bins of one kind, by record id.
///
/// Created and updated bins must already be in the store when the batch is
/// applied; deleted bins must already be gone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeChanges {
    /// Kind of every bin in the batch.
    pub kind: NodeKind,
    /// Ids of removed bins.
    pub deleted: Vec<String>,
    /// Ids of new bins.
    pub created: Vec<String>,
    /// Ids of bins whose location changed.
    pub updated: Vec<String>,
}

impl NodeChanges {
    /// An empty batch for `kind`.
    #[must_use]
    pub fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            deleted: Vec::new(),
            created: Vec::new(),
            updated: Vec::new(),
        }
    }

    /// Whether the batch touches no bin.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.deleted.is_empty() && self.created.is_empty() && self.updated.is_empty()
    }

    fn stale_keys(&self) -> Vec<NodeKey> {
        self.deleted
            .iter()
            .chain(&self.updated)
            .map(|id| NodeKey::new(self.kind, id))
            .collect()
    }

    fn touched(&self) -> HashSet<&str> {
        self.deleted
            .iter()
            .chain(&self.created)
            .chain(&self.updated)
            .map(String::as_str)
            .collect()
    }

    fn changed(&self) -> HashSet<&str> {
        self.created
            .iter()
            .chain(&self.updated)
            .map(String::as_str)
            .collect()
    }
}

/// Counts describing one cache maintenance run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct CacheReport {
    /// Node keys whose legs were invalidated. Zero for a full rebuild.
    pub removed_keys: usize,
    /// Cached legs deleted. Zero for a full rebuild, which clears the cache
    /// wholesale.
    pub removed_entries: usize,
    /// Legs computed and written.
    pub inserted_entries: usize,
}

/// Recomputes cached legs through a [`MappingAdapter`].
#[derive(Debug)]
pub struct DistanceCacheMaintainer<S, M> {
    store: S,
    adapter: MappingAdapter<M>,
}

impl<S: RecordStore, M: MappingService> DistanceCacheMaintainer<S, M> {
    /// Maintain the cache in `store` using `adapter` for fresh legs.
    #[must_use]
    pub fn new(store: S, adapter: MappingAdapter<M>) -> Self {
        Self { store, adapter }
    }

    /// The adapter used for fresh legs.
    #[must_use]
    pub fn adapter(&self) -> &MappingAdapter<M> {
        &self.adapter
    }

    /// Replace the whole cache with legs between every pair of nodes,
    /// including each node with itself.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Store`] if loading nodes or writing the cache
    /// fails. The cache is left as it was.
    pub async fn rebuild(&self) -> Result<CacheReport, CacheError> {
        let mut nodes = self.load(NodeKind::Depot).await?;
        nodes.extend(self.load(NodeKind::SmartBin).await?);
        nodes.extend(self.load(NodeKind::DumbBin).await?);
        info!("rebuilding distance cache for {} nodes", nodes.len());

        let entries = self.adapter.distance_entries(&nodes, &nodes).await;
        let report = CacheReport {
            inserted_entries: entries.len(),
            ..CacheReport::default()
        };
        self.store.replace_distance_cache(entries).await?;
        info!("distance cache rebuilt with {} entries", report.inserted_entries);
        Ok(report)
    }

    /// Recompute the legs touching the bins in `changes`.
    ///
    /// Entries touching deleted or updated bins are removed. Legs between
    /// each created or updated bin and every current node are computed and
    /// inserted. Legs between two unchanged nodes are left alone.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::UnsupportedKind`] for depot changes and
    /// [`CacheError::Store`] if the store fails, in which case the cache is
    /// unchanged.
    pub async fn apply_changes(&self, changes: &NodeChanges) -> Result<CacheReport, CacheError> {
        let Some(other_kind) = changes.kind.other_bin_kind() else {
            return Err(CacheError::UnsupportedKind(changes.kind));
        };
        if changes.is_empty() {
            return Ok(CacheReport::default());
        }

        let touched = changes.touched();
        let wanted = changes.changed();
        let (changed, unchanged): (Vec<Node>, Vec<Node>) = self
            .load(changes.kind)
            .await?
            .into_iter()
            .filter(|node| {
                let id = node.key.id.as_str();
                !touched.contains(id) || wanted.contains(id)
            })
            .partition(|node| wanted.contains(node.key.id.as_str()));
        if changed.len() < wanted.len() {
            warn!(
                "{} of {} changed {} records were not found in the store",
                wanted.len() - changed.len(),
                wanted.len(),
                changes.kind
            );
        }
        let other = self.load(other_kind).await?;
        let depots = self.load(NodeKind::Depot).await?;

        let mut fresh = Vec::new();
        self.extend_legs(&mut fresh, &changed, &changed).await;
        for rest in [&unchanged, &other, &depots] {
            self.extend_legs(&mut fresh, &changed, rest).await;
            self.extend_legs(&mut fresh, rest, &changed).await;
        }

        let stale = changes.stale_keys();
        let inserted_entries = fresh.len();
        let removed_entries = self.store.update_distance_cache(&stale, fresh).await?;
        let report = CacheReport {
            removed_keys: stale.len(),
            removed_entries,
            inserted_entries,
        };
        info!(
            "distance cache updated for {} {}: {} entries removed, {} inserted",
            touched.len(),
            changes.kind,
            report.removed_entries,
            report.inserted_entries
        );
        Ok(report)
    }

    async fn extend_legs(
        &self,
        fresh: &mut Vec<DistanceCacheEntry>,
        origins: &[Node],
        destinations: &[Node],
    ) {
        if origins.is_empty() || destinations.is_empty() {
            return;
        }
        debug!(
            "computing {}x{} legs",
            origins.len(),
            destinations.len()
        );
        fresh.extend(self.adapter.distance_entries(origins, destinations).await);
    }

    async fn load(&self, kind: NodeKind) -> Result<Vec<Node>, StoreError> {
        Ok(match kind {
            NodeKind::Depot => self
                .store
                .find_all::<Depot>()
                .await?
                .iter()
                .map(Depot::to_node)
                .collect(),
            NodeKind::SmartBin => self
                .store
                .find_all::<SmartBin>()
                .await?
                .iter()
                .map(SmartBin::to_node)
                .collect(),
            NodeKind::DumbBin => self
                .store
                .find_all::<DumbBin>()
                .await?
                .iter()
                .map(DumbBin::to_node)
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use binroute_core::test_support::{HaversineMappingService, MemoryRecordStore};
    use binroute_core::{Leg, WriteOp};
    use geo::Coord;
    use rstest::{fixture, rstest};

    use crate::routing::AdapterLimits;

    type Maintainer =
        DistanceCacheMaintainer<Arc<MemoryRecordStore>, Arc<HaversineMappingService>>;

    struct Harness {
        store: Arc<MemoryRecordStore>,
        service: Arc<HaversineMappingService>,
        maintainer: Maintainer,
    }

    fn smart(id: &str, x: f64) -> SmartBin {
        SmartBin {
            id: id.into(),
            location: Coord { x, y: 52.5 },
            current_fullness: 10.0,
            threshold: 20.0,
        }
    }

    fn dumb(id: &str, x: f64) -> DumbBin {
        DumbBin {
            id: id.into(),
            location: Coord { x, y: 52.51 },
            capacity: 20.0,
            nearest_smart_bin: None,
        }
    }

    #[fixture]
    fn harness() -> Harness {
        let store = Arc::new(MemoryRecordStore::default());
        let service = Arc::new(HaversineMappingService::default());
        let limits = AdapterLimits::default()
            .with_block_size(500, 500)
            .with_max_pairs(250_000)
            .with_retries(0, Duration::ZERO);
        let adapter = MappingAdapter::new(Arc::clone(&service), limits).expect("valid limits");
        Harness {
            maintainer: DistanceCacheMaintainer::new(Arc::clone(&store), adapter),
            store,
            service,
        }
    }

    async fn seed(store: &MemoryRecordStore, smart_bins: usize, dumb_bins: usize) {
        store
            .bulk_write(vec![WriteOp::Insert(Depot {
                id: "depot".into(),
                location: Coord { x: 13.4, y: 52.49 },
            })])
            .await
            .expect("seed depot");
        store
            .bulk_write(
                (0..smart_bins)
                    .map(|i| {
                        let offset = 0.001 * f64::from(u16::try_from(i).expect("small"));
                        WriteOp::Insert(smart(&format!("s{i:03}"), 13.4 + offset))
                    })
                    .collect(),
            )
            .await
            .expect("seed smart bins");
        store
            .bulk_write(
                (0..dumb_bins)
                    .map(|i| {
                        let offset = 0.001 * f64::from(u16::try_from(i).expect("small"));
                        WriteOp::Insert(dumb(&format!("d{i:03}"), 13.4 + offset))
                    })
                    .collect(),
            )
            .await
            .expect("seed dumb bins");
    }

    #[rstest]
    #[tokio::test]
    async fn rebuild_covers_every_ordered_pair(harness: Harness) {
        seed(&harness.store, 2, 1).await;

        let report = harness.maintainer.rebuild().await.expect("rebuild");

        assert_eq!(report.inserted_entries, 16);
        let cached = harness.store.distance_snapshot().expect("snapshot");
        assert_eq!(cached.len(), 16);
        assert!(
            cached
                .iter()
                .filter(|e| e.origin == e.destination)
                .all(|e| e.leg == Leg::known(0, 0))
        );
    }

    #[rstest]
    #[tokio::test]
    async fn depot_changes_are_rejected(harness: Harness) {
        let err = harness
            .maintainer
            .apply_changes(&NodeChanges::new(NodeKind::Depot))
            .await
            .expect_err("depot changes need a rebuild");
        assert!(matches!(err, CacheError::UnsupportedKind(NodeKind::Depot)));
    }

    #[rstest]
    #[tokio::test]
    async fn delete_and_create_replace_only_touched_legs(harness: Harness) {
        seed(&harness.store, 2, 1).await;
        harness.maintainer.rebuild().await.expect("rebuild");
        let before = harness.store.distance_snapshot().expect("snapshot");

        harness
            .store
            .bulk_write(vec![
                WriteOp::Delete("s000".into()),
                WriteOp::Insert(smart("s100", 13.45)),
            ])
            .await
            .expect("mutate bins");
        let changes = NodeChanges {
            deleted: vec!["s000".into()],
            created: vec!["s100".into()],
            ..NodeChanges::new(NodeKind::SmartBin)
        };
        let report = harness
            .maintainer
            .apply_changes(&changes)
            .await
            .expect("apply changes");

        // s000 had 7 legs: 3 outgoing, 3 incoming and itself.
        assert_eq!(report.removed_entries, 7);
        // s100 gains itself plus both directions to s001, d000 and the depot.
        assert_eq!(report.inserted_entries, 7);

        let after = harness.store.distance_snapshot().expect("snapshot");
        let removed = NodeKey::new(NodeKind::SmartBin, "s000");
        let created = NodeKey::new(NodeKind::SmartBin, "s100");
        assert!(after.iter().all(|e| !e.touches(&removed)));
        assert_eq!(after.iter().filter(|e| e.touches(&created)).count(), 7);
        let untouched: Vec<_> = before.iter().filter(|e| !e.touches(&removed)).collect();
        assert!(untouched.iter().all(|e| after.contains(e)));
        assert_eq!(after.len(), 16);
    }

    #[rstest]
    #[case(5)]
    #[case(40)]
    #[tokio::test]
    async fn incremental_calls_do_not_grow_with_bin_count(
        harness: Harness,
        #[case] bins: usize,
    ) {
        seed(&harness.store, bins, bins).await;
        harness
            .store
            .bulk_write(vec![
                WriteOp::Insert(smart("new-a", 13.5)),
                WriteOp::Insert(smart("new-b", 13.51)),
            ])
            .await
            .expect("insert new bins");
        let changes = NodeChanges {
            created: vec!["new-a".into(), "new-b".into()],
            ..NodeChanges::new(NodeKind::SmartBin)
        };

        harness
            .maintainer
            .apply_changes(&changes)
            .await
            .expect("apply changes");

        // changed x changed plus both directions for three other groups.
        assert_eq!(harness.service.matrix_requests().len(), 7);
    }

    #[rstest]
    #[tokio::test]
    async fn updated_bins_are_recomputed(harness: Harness) {
        seed(&harness.store, 1, 1).await;
        harness.maintainer.rebuild().await.expect("rebuild");

        harness
            .store
            .bulk_write(vec![WriteOp::Update(dumb("d000", 13.6))])
            .await
            .expect("move bin");
        let changes = NodeChanges {
            updated: vec!["d000".into()],
            ..NodeChanges::new(NodeKind::DumbBin)
        };
        let report = harness
            .maintainer
            .apply_changes(&changes)
            .await
            .expect("apply changes");

        assert_eq!(report.removed_keys, 1);
        assert_eq!(report.removed_entries, 5);
        assert_eq!(report.inserted_entries, 5);
        assert_eq!(harness.store.distance_snapshot().expect("snapshot").len(), 9);
    }

    #[rstest]
    #[tokio::test]
    async fn store_failure_leaves_cache_untouched(harness: Harness) {
        seed(&harness.store, 1, 1).await;
        harness.maintainer.rebuild().await.expect("rebuild");
        let before = harness.store.distance_snapshot().expect("snapshot");

        harness.store.fail_writes(true);
        let changes = NodeChanges {
            deleted: vec!["s000".into()],
            ..NodeChanges::new(NodeKind::SmartBin)
        };
        let err = harness
            .maintainer
            .apply_changes(&changes)
            .await
            .expect_err("writes are disabled");

        assert!(matches!(err, CacheError::Store(StoreError::Unavailable { .. })));
        assert_eq!(harness.store.distance_snapshot().expect("snapshot"), before);
    }
}
