//! Data access traits for collection records, the distance cache and
//! schedules.
//!
//! The [`RecordStore`] trait models a document database with one typed
//! collection per record type. Bulk writes are all-or-nothing: either every
//! operation in the batch applies or none does.
//!
//! The distance cache and the schedule collection get dedicated operations
//! because the orchestration only ever replaces them wholesale or by endpoint.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::{DistanceCacheEntry, NodeKey, Schedule};

#[cfg(feature = "store-sqlite")]
mod sqlite;

#[cfg(feature = "store-sqlite")]
pub use sqlite::SqliteRecordStore;

/// Typed collections known to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Collection {
    /// [`crate::Depot`] records.
    Depots,
    /// [`crate::SmartBin`] records.
    SmartBins,
    /// [`crate::DumbBin`] records.
    DumbBins,
    /// [`crate::FleetVehicle`] records.
    FleetVehicles,
}

impl Collection {
    /// Stable storage name of the collection.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Depots => "depots",
            Self::SmartBins => "smart_bins",
            Self::DumbBins => "dumb_bins",
            Self::FleetVehicles => "fleet_vehicles",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A record stored in one of the typed collections.
pub trait Document: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Collection holding this record type.
    const COLLECTION: Collection;

    /// Record identifier, unique within the collection.
    fn id(&self) -> &str;
}

/// One operation in a [`RecordStore::bulk_write`] batch.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp<D> {
    /// Add a record; fails if the id already exists.
    Insert(D),
    /// Replace a record; fails if the id does not exist.
    Update(D),
    /// Remove a record by id; missing ids are ignored.
    Delete(String),
}

/// Counts of applied operations from a successful bulk write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BulkWriteSummary {
    /// Records inserted.
    pub inserted: usize,
    /// Records replaced.
    pub updated: usize,
    /// Records removed.
    pub deleted: usize,
}

/// Errors raised by [`RecordStore`] implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An insert targeted an id that already exists.
    #[error("{collection} already contains a record with id {id:?}")]
    DuplicateId {
        /// Collection written to.
        collection: Collection,
        /// Conflicting identifier.
        id: String,
    },
    /// An update targeted an id that does not exist.
    #[error("{collection} has no record with id {id:?}")]
    MissingRecord {
        /// Collection written to.
        collection: Collection,
        /// Missing identifier.
        id: String,
    },
    /// Serialising a record failed.
    #[error("failed to encode record for {collection}: {source}")]
    Encode {
        /// Collection written to.
        collection: Collection,
        /// JSON encoding failure.
        #[source]
        source: serde_json::Error,
    },
    /// A stored record could not be decoded.
    #[error("failed to decode record {id:?} from {collection}: {source}")]
    Decode {
        /// Collection read from.
        collection: Collection,
        /// Identifier of the broken record.
        id: String,
        /// JSON decoding failure.
        #[source]
        source: serde_json::Error,
    },
    /// A schedule could not be encoded or decoded.
    #[error("failed to encode or decode schedule {id:?}: {source}")]
    ScheduleCodec {
        /// Schedule identifier.
        id: String,
        /// JSON failure.
        #[source]
        source: serde_json::Error,
    },
    /// A stored value did not fit the expected range.
    #[error("stored value {value} in {field} is out of range")]
    OutOfRange {
        /// Column or field name.
        field: &'static str,
        /// Offending value.
        value: i64,
    },
    /// The underlying database reported an error.
    #[cfg(feature = "store-sqlite")]
    #[error(transparent)]
    Database(#[from] rusqlite::Error),
    /// The store could not run the operation at all.
    #[error("record store unavailable: {message}")]
    Unavailable {
        /// Error detail.
        message: String,
    },
}

/// Persistence operations the routing core depends on.
///
/// All methods are asynchronous so that implementations can keep blocking
/// I/O off the executor. Reads return records sorted by id.
///
/// # Examples
///
/// ```rust
/// use binroute_core::test_support::MemoryRecordStore;
/// use binroute_core::{FleetVehicle, RecordStore, WriteOp};
///
/// # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
/// let store = MemoryRecordStore::default();
/// let truck = FleetVehicle { id: "t1".into(), capacity: 100.0 };
/// store.bulk_write(vec![WriteOp::Insert(truck.clone())]).await?;
///
/// let vehicles: Vec<FleetVehicle> = store.find_all().await?;
/// assert_eq!(vehicles, vec![truck]);
/// # Ok::<(), binroute_core::StoreError>(())
/// # }).unwrap();
/// ```
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Every record in `D`'s collection, sorted by id.
    async fn find_all<D: Document>(&self) -> Result<Vec<D>, StoreError>;

    /// Apply a mixed batch of inserts, updates and deletes atomically.
    async fn bulk_write<D: Document>(
        &self,
        operations: Vec<WriteOp<D>>,
    ) -> Result<BulkWriteSummary, StoreError>;

    /// Remove every record in `D`'s collection, returning how many went.
    async fn delete_all<D: Document>(&self) -> Result<usize, StoreError>;

    /// Cached legs whose origin and destination both appear in `among`.
    async fn distance_entries(
        &self,
        among: &[NodeKey],
    ) -> Result<Vec<DistanceCacheEntry>, StoreError>;

    /// Delete the entire distance cache, then insert `entries`.
    async fn replace_distance_cache(
        &self,
        entries: Vec<DistanceCacheEntry>,
    ) -> Result<(), StoreError>;

    /// Delete every entry touching a `stale` key, then insert `fresh`.
    ///
    /// Returns the number of entries deleted.
    async fn update_distance_cache(
        &self,
        stale: &[NodeKey],
        fresh: Vec<DistanceCacheEntry>,
    ) -> Result<usize, StoreError>;

    /// Every persisted schedule, sorted by id.
    async fn schedules(&self) -> Result<Vec<Schedule>, StoreError>;

    /// Delete every schedule, then insert `schedules`.
    async fn replace_schedules(&self, schedules: Vec<Schedule>) -> Result<(), StoreError>;
}

#[async_trait]
impl<T: RecordStore> RecordStore for Arc<T> {
    async fn find_all<D: Document>(&self) -> Result<Vec<D>, StoreError> {
        (**self).find_all().await
    }

    async fn bulk_write<D: Document>(
        &self,
        operations: Vec<WriteOp<D>>,
    ) -> Result<BulkWriteSummary, StoreError> {
        (**self).bulk_write(operations).await
    }

    async fn delete_all<D: Document>(&self) -> Result<usize, StoreError> {
        (**self).delete_all::<D>().await
    }

    async fn distance_entries(
        &self,
        among: &[NodeKey],
    ) -> Result<Vec<DistanceCacheEntry>, StoreError> {
        (**self).distance_entries(among).await
    }

    async fn replace_distance_cache(
        &self,
        entries: Vec<DistanceCacheEntry>,
    ) -> Result<(), StoreError> {
        (**self).replace_distance_cache(entries).await
    }

    async fn update_distance_cache(
        &self,
        stale: &[NodeKey],
        fresh: Vec<DistanceCacheEntry>,
    ) -> Result<usize, StoreError> {
        (**self).update_distance_cache(stale, fresh).await
    }

    async fn schedules(&self) -> Result<Vec<Schedule>, StoreError> {
        (**self).schedules().await
    }

    async fn replace_schedules(&self, schedules: Vec<Schedule>) -> Result<(), StoreError> {
        (**self).replace_schedules(schedules).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MemoryRecordStore;
    use crate::{FleetVehicle, Leg, NodeKind, SmartBin};
    use geo::Coord;
    use rstest::{fixture, rstest};

    fn vehicle(id: &str, capacity: f64) -> FleetVehicle {
        FleetVehicle {
            id: id.into(),
            capacity,
        }
    }

    fn entry(from: &str, to: &str) -> DistanceCacheEntry {
        DistanceCacheEntry {
            origin: NodeKey::new(NodeKind::SmartBin, from),
            destination: NodeKey::new(NodeKind::SmartBin, to),
            leg: Leg::known(10, 1),
        }
    }

    #[fixture]
    fn store() -> MemoryRecordStore {
        MemoryRecordStore::default()
    }

    #[rstest]
    #[tokio::test]
    async fn find_all_returns_sorted_records(store: MemoryRecordStore) {
        store
            .bulk_write(vec![
                WriteOp::Insert(vehicle("b", 1.0)),
                WriteOp::Insert(vehicle("a", 2.0)),
            ])
            .await
            .expect("insert vehicles");
        let found: Vec<FleetVehicle> = store.find_all().await.expect("read vehicles");
        let ids: Vec<_> = found.iter().map(|v| v.id.as_str()).collect();
        assert_eq!(ids, ["a", "b"]);
    }

    #[rstest]
    #[tokio::test]
    async fn bulk_write_is_all_or_nothing(store: MemoryRecordStore) {
        store
            .bulk_write(vec![WriteOp::Insert(vehicle("a", 1.0))])
            .await
            .expect("seed");
        let err = store
            .bulk_write(vec![
                WriteOp::Insert(vehicle("b", 1.0)),
                WriteOp::Update(vehicle("missing", 1.0)),
            ])
            .await
            .expect_err("update of missing record should fail");
        assert!(matches!(err, StoreError::MissingRecord { .. }));
        let found: Vec<FleetVehicle> = store.find_all().await.expect("read vehicles");
        assert_eq!(found, vec![vehicle("a", 1.0)]);
    }

    #[rstest]
    #[tokio::test]
    async fn bulk_write_reports_counts(store: MemoryRecordStore) {
        store
            .bulk_write(vec![
                WriteOp::Insert(vehicle("a", 1.0)),
                WriteOp::Insert(vehicle("b", 1.0)),
            ])
            .await
            .expect("seed");
        let summary = store
            .bulk_write(vec![
                WriteOp::Update(vehicle("a", 5.0)),
                WriteOp::Delete("b".into()),
                WriteOp::Insert(vehicle("c", 1.0)),
            ])
            .await
            .expect("mixed batch");
        assert_eq!(
            summary,
            BulkWriteSummary {
                inserted: 1,
                updated: 1,
                deleted: 1
            }
        );
    }

    #[rstest]
    #[tokio::test]
    async fn duplicate_insert_is_rejected(store: MemoryRecordStore) {
        let bin = SmartBin {
            id: "s1".into(),
            location: Coord { x: 0.0, y: 0.0 },
            current_fullness: 1.0,
            threshold: 2.0,
        };
        store
            .bulk_write(vec![WriteOp::Insert(bin.clone())])
            .await
            .expect("seed");
        let err = store
            .bulk_write(vec![WriteOp::Insert(bin)])
            .await
            .expect_err("duplicate id");
        assert!(matches!(
            err,
            StoreError::DuplicateId {
                collection: Collection::SmartBins,
                ..
            }
        ));
    }

    #[rstest]
    #[tokio::test]
    async fn update_distance_cache_removes_touching_entries(store: MemoryRecordStore) {
        store
            .replace_distance_cache(vec![entry("a", "b"), entry("b", "a"), entry("b", "c")])
            .await
            .expect("seed cache");
        let removed = store
            .update_distance_cache(
                &[NodeKey::new(NodeKind::SmartBin, "a")],
                vec![entry("c", "b")],
            )
            .await
            .expect("update cache");
        assert_eq!(removed, 2);
        let keys = ["a", "b", "c"].map(|id| NodeKey::new(NodeKind::SmartBin, id));
        let remaining = store.distance_entries(&keys).await.expect("read cache");
        assert_eq!(remaining, vec![entry("b", "c"), entry("c", "b")]);
    }

    #[rstest]
    #[tokio::test]
    async fn distance_entries_are_limited_to_induced_subgraph(store: MemoryRecordStore) {
        store
            .replace_distance_cache(vec![entry("a", "b"), entry("a", "c")])
            .await
            .expect("seed cache");
        let keys = ["a", "b"].map(|id| NodeKey::new(NodeKind::SmartBin, id));
        let found = store.distance_entries(&keys).await.expect("read cache");
        assert_eq!(found, vec![entry("a", "b")]);
    }
}
