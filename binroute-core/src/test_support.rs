//! In-memory `RecordStore` and deterministic `MappingService` used by unit
//! and behaviour tests across the workspace.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use geo::Coord;

use crate::{
    BulkWriteSummary, Collection, Directions, DirectionsLeg, DistanceCacheEntry, Document, Leg,
    MappingError, MappingService, MatrixBlock, NodeKey, RecordStore, Schedule, StoreError,
    WriteOp, validate_location,
};

#[derive(Debug, Default)]
struct MemoryState {
    documents: HashMap<Collection, BTreeMap<String, serde_json::Value>>,
    distances: BTreeMap<(NodeKey, NodeKey), Leg>,
    schedules: BTreeMap<String, Schedule>,
}

/// `RecordStore` keeping every collection in memory.
///
/// Records are held as JSON values so that round-tripping matches the
/// SQLite store. Writes can be made to fail to exercise abort paths.
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    state: Mutex<MemoryState>,
    fail_writes: AtomicBool,
}

impl MemoryRecordStore {
    /// Make every subsequent write fail with [`StoreError::Unavailable`].
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Every cached distance entry, ordered by origin then destination.
    ///
    /// # Errors
    ///
    /// Fails only if the internal lock was poisoned.
    pub fn distance_snapshot(&self) -> Result<Vec<DistanceCacheEntry>, StoreError> {
        let state = self.lock()?;
        Ok(state
            .distances
            .iter()
            .map(|((origin, destination), leg)| DistanceCacheEntry {
                origin: origin.clone(),
                destination: destination.clone(),
                leg: *leg,
            })
            .collect())
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, StoreError> {
        self.state.lock().map_err(|_| StoreError::Unavailable {
            message: "memory store lock poisoned".to_owned(),
        })
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable {
                message: "writes disabled for test".to_owned(),
            });
        }
        Ok(())
    }
}

fn encode<D: Document>(document: &D) -> Result<serde_json::Value, StoreError> {
    serde_json::to_value(document).map_err(|source| StoreError::Encode {
        collection: D::COLLECTION,
        source,
    })
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn find_all<D: Document>(&self) -> Result<Vec<D>, StoreError> {
        let state = self.lock()?;
        let Some(collection) = state.documents.get(&D::COLLECTION) else {
            return Ok(Vec::new());
        };
        collection
            .iter()
            .map(|(id, value)| {
                serde_json::from_value(value.clone()).map_err(|source| StoreError::Decode {
                    collection: D::COLLECTION,
                    id: id.clone(),
                    source,
                })
            })
            .collect()
    }

    async fn bulk_write<D: Document>(
        &self,
        operations: Vec<WriteOp<D>>,
    ) -> Result<BulkWriteSummary, StoreError> {
        self.check_writable()?;
        let mut state = self.lock()?;
        let mut staged = state
            .documents
            .get(&D::COLLECTION)
            .cloned()
            .unwrap_or_default();
        let mut summary = BulkWriteSummary::default();

        for operation in operations {
            match operation {
                WriteOp::Insert(document) => {
                    let id = document.id().to_owned();
                    if staged.contains_key(&id) {
                        return Err(StoreError::DuplicateId {
                            collection: D::COLLECTION,
                            id,
                        });
                    }
                    staged.insert(id, encode(&document)?);
                    summary.inserted += 1;
                }
                WriteOp::Update(document) => {
                    let id = document.id().to_owned();
                    let Some(slot) = staged.get_mut(&id) else {
                        return Err(StoreError::MissingRecord {
                            collection: D::COLLECTION,
                            id,
                        });
                    };
                    *slot = encode(&document)?;
                    summary.updated += 1;
                }
                WriteOp::Delete(id) => {
                    if staged.remove(&id).is_some() {
                        summary.deleted += 1;
                    }
                }
            }
        }

        state.documents.insert(D::COLLECTION, staged);
        Ok(summary)
    }

    async fn delete_all<D: Document>(&self) -> Result<usize, StoreError> {
        self.check_writable()?;
        let mut state = self.lock()?;
        Ok(state
            .documents
            .remove(&D::COLLECTION)
            .map_or(0, |collection| collection.len()))
    }

    async fn distance_entries(
        &self,
        among: &[NodeKey],
    ) -> Result<Vec<DistanceCacheEntry>, StoreError> {
        let wanted: HashSet<&NodeKey> = among.iter().collect();
        let state = self.lock()?;
        Ok(state
            .distances
            .iter()
            .filter(|((origin, destination), _)| {
                wanted.contains(origin) && wanted.contains(destination)
            })
            .map(|((origin, destination), leg)| DistanceCacheEntry {
                origin: origin.clone(),
                destination: destination.clone(),
                leg: *leg,
            })
            .collect())
    }

    async fn replace_distance_cache(
        &self,
        entries: Vec<DistanceCacheEntry>,
    ) -> Result<(), StoreError> {
        self.check_writable()?;
        let mut state = self.lock()?;
        state.distances = entries
            .into_iter()
            .map(|entry| ((entry.origin, entry.destination), entry.leg))
            .collect();
        Ok(())
    }

    async fn update_distance_cache(
        &self,
        stale: &[NodeKey],
        fresh: Vec<DistanceCacheEntry>,
    ) -> Result<usize, StoreError> {
        self.check_writable()?;
        let stale: HashSet<&NodeKey> = stale.iter().collect();
        let mut state = self.lock()?;
        let before = state.distances.len();
        state.distances.retain(|(origin, destination), _| {
            !stale.contains(origin) && !stale.contains(destination)
        });
        let removed = before - state.distances.len();
        for entry in fresh {
            state
                .distances
                .insert((entry.origin, entry.destination), entry.leg);
        }
        Ok(removed)
    }

    async fn schedules(&self) -> Result<Vec<Schedule>, StoreError> {
        let state = self.lock()?;
        Ok(state.schedules.values().cloned().collect())
    }

    async fn replace_schedules(&self, schedules: Vec<Schedule>) -> Result<(), StoreError> {
        self.check_writable()?;
        let mut state = self.lock()?;
        state.schedules = schedules
            .into_iter()
            .map(|schedule| (schedule.id.clone(), schedule))
            .collect();
        Ok(())
    }
}

/// Earth radius in metres.
const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Great-circle distance between two WGS84 positions, in metres.
#[must_use]
pub fn haversine_m(from: Coord<f64>, to: Coord<f64>) -> f64 {
    let lat1 = from.y.to_radians();
    let lat2 = to.y.to_radians();
    let delta_lat = (to.y - from.y).to_radians();
    let delta_lng = (to.x - from.x).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1.cos() * lat2.cos() * (delta_lng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * a.sqrt().asin()
}

/// Deterministic `MappingService` using straight-line distances.
///
/// Durations assume a constant speed. Invalid positions yield unknown legs.
/// Every call is recorded so tests can assert how the adapter batched its
/// requests, and the first few calls can be made to report rate limiting.
#[derive(Debug)]
pub struct HaversineMappingService {
    speed_mps: f64,
    rate_limited_calls: AtomicUsize,
    error: Option<MappingError>,
    matrix_requests: Mutex<Vec<(usize, usize)>>,
    directions_requests: Mutex<Vec<usize>>,
}

impl Default for HaversineMappingService {
    fn default() -> Self {
        Self {
            speed_mps: 10.0,
            rate_limited_calls: AtomicUsize::new(0),
            error: None,
            matrix_requests: Mutex::new(Vec::new()),
            directions_requests: Mutex::new(Vec::new()),
        }
    }
}

impl HaversineMappingService {
    /// Report [`MappingError::RateLimited`] for the first `calls` requests.
    #[must_use]
    pub fn with_rate_limited_calls(self, calls: usize) -> Self {
        self.rate_limited_calls.store(calls, Ordering::SeqCst);
        self
    }

    /// Fail every request with `error` after any rate-limited calls.
    #[must_use]
    pub fn with_error(mut self, error: MappingError) -> Self {
        self.error = Some(error);
        self
    }

    /// Shapes (`origins`, `destinations`) of every matrix request so far,
    /// including rate-limited ones.
    #[must_use]
    pub fn matrix_requests(&self) -> Vec<(usize, usize)> {
        self.matrix_requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }

    /// Waypoint counts of every directions request so far.
    #[must_use]
    pub fn directions_requests(&self) -> Vec<usize> {
        self.directions_requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }

    fn throttle(&self) -> Result<(), MappingError> {
        let throttled = self
            .rate_limited_calls
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if throttled {
            return Err(MappingError::RateLimited);
        }
        self.error.clone().map_or(Ok(()), Err)
    }

    fn leg(&self, from: Coord<f64>, to: Coord<f64>) -> Leg {
        if validate_location(from).is_err() || validate_location(to).is_err() {
            return Leg::UNKNOWN;
        }
        let metres = haversine_m(from, to).round();
        let seconds = (metres / self.speed_mps).round();
        Leg::known(to_u64(metres), to_u64(seconds))
    }
}

#[expect(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    reason = "values are rounded, finite and non-negative"
)]
fn to_u64(value: f64) -> u64 {
    value.max(0.0) as u64
}

#[async_trait]
impl MappingService for HaversineMappingService {
    async fn distance_matrix(
        &self,
        origins: &[Coord<f64>],
        destinations: &[Coord<f64>],
    ) -> Result<MatrixBlock, MappingError> {
        if let Ok(mut requests) = self.matrix_requests.lock() {
            requests.push((origins.len(), destinations.len()));
        }
        if origins.is_empty() || destinations.is_empty() {
            return Err(MappingError::EmptyInput);
        }
        self.throttle()?;
        let rows = origins
            .iter()
            .map(|&from| destinations.iter().map(|&to| self.leg(from, to)).collect())
            .collect();
        Ok(MatrixBlock { rows })
    }

    async fn directions(&self, waypoints: &[Coord<f64>]) -> Result<Directions, MappingError> {
        if let Ok(mut requests) = self.directions_requests.lock() {
            requests.push(waypoints.len());
        }
        if waypoints.len() < 2 {
            return Err(MappingError::EmptyInput);
        }
        self.throttle()?;
        let legs = waypoints
            .windows(2)
            .map(|pair| {
                let (from, to) = (pair[0], pair[1]);
                let leg = self.leg(from, to);
                DirectionsLeg {
                    distance_m: leg.distance_m.unwrap_or_default(),
                    duration_s: leg.duration_s.unwrap_or_default(),
                    polyline: format!("{:.5},{:.5};{:.5},{:.5}", from.y, from.x, to.y, to.x),
                }
            })
            .collect();
        Ok(Directions { legs })
    }
}
