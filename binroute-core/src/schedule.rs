//! Persisted collection schedules.

use chrono::{DateTime, Utc};
use geo::Coord;
use serde::{Deserialize, Serialize};

/// One vehicle's ordered stops, as positions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleRoute {
    /// Fleet vehicle driving the route.
    pub vehicle_id: String,
    /// Stops in visiting order, starting and ending at the depot.
    pub stops: Vec<Coord<f64>>,
}

/// A timestamped set of vehicle routes derived from one solver result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    /// Record identifier.
    pub id: String,
    /// When the schedule was built.
    pub created_at: DateTime<Utc>,
    /// Position of the originating route set among the distinct results.
    pub strategy_rank: usize,
    /// Non-trivial routes, one per used vehicle.
    pub routes: Vec<VehicleRoute>,
}

impl Schedule {
    /// Build a schedule with an id derived from its timestamp and rank.
    ///
    /// # Examples
    ///
    /// ```
    /// use binroute_core::Schedule;
    /// use chrono::{TimeZone, Utc};
    ///
    /// let at = Utc.with_ymd_and_hms(2024, 5, 1, 6, 0, 0).unwrap();
    /// let schedule = Schedule::new(at, 2, Vec::new());
    /// assert_eq!(schedule.id, "20240501T060000Z-2");
    /// ```
    #[must_use]
    pub fn new(created_at: DateTime<Utc>, strategy_rank: usize, routes: Vec<VehicleRoute>) -> Self {
        let id = format!("{}-{strategy_rank}", created_at.format("%Y%m%dT%H%M%SZ"));
        Self {
            id,
            created_at,
            strategy_rank,
            routes,
        }
    }
}
