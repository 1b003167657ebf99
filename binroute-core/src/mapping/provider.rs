//! Mapping-service trait and the payloads it exchanges.

use std::sync::Arc;

use async_trait::async_trait;
use geo::Coord;
use serde::{Deserialize, Serialize};

use crate::Leg;

use super::error::MappingError;

/// Distances and durations for one origin block against one destination
/// block.
///
/// `rows[i][j]` is the leg from `origins[i]` to `destinations[j]`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MatrixBlock {
    /// Row-major legs.
    pub rows: Vec<Vec<Leg>>,
}

impl MatrixBlock {
    /// Whether the block has exactly `rows` rows of `columns` legs.
    #[must_use]
    pub fn has_shape(&self, rows: usize, columns: usize) -> bool {
        self.rows.len() == rows && self.rows.iter().all(|row| row.len() == columns)
    }
}

/// One leg of a directions response, between consecutive waypoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectionsLeg {
    /// Road distance in metres.
    pub distance_m: u64,
    /// Travel time in seconds.
    pub duration_s: u64,
    /// Encoded polyline of the leg geometry.
    pub polyline: String,
}

/// Directions along an ordered waypoint chain.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Directions {
    /// Legs in waypoint order; `n` waypoints give `n - 1` legs.
    pub legs: Vec<DirectionsLeg>,
}

impl Directions {
    /// Sum of leg distances in metres.
    #[must_use]
    pub fn total_distance_m(&self) -> u64 {
        self.legs.iter().map(|leg| leg.distance_m).sum()
    }

    /// Sum of leg durations in seconds.
    #[must_use]
    pub fn total_duration_s(&self) -> u64 {
        self.legs.iter().map(|leg| leg.duration_s).sum()
    }
}

/// Query distances and directions from a mapping provider.
///
/// Positions use WGS84 with `x` = longitude and `y` = latitude.
/// Implementations make exactly one upstream request per call and leave
/// batching and retries to the caller.
///
/// # Examples
///
/// ```rust
/// use async_trait::async_trait;
/// use binroute_core::{Directions, Leg, MappingError, MappingService, MatrixBlock};
/// use geo::Coord;
///
/// struct FlatRate;
///
/// #[async_trait]
/// impl MappingService for FlatRate {
///     async fn distance_matrix(
///         &self,
///         origins: &[Coord<f64>],
///         destinations: &[Coord<f64>],
///     ) -> Result<MatrixBlock, MappingError> {
///         if origins.is_empty() || destinations.is_empty() {
///             return Err(MappingError::EmptyInput);
///         }
///         let row = vec![Leg::known(1_000, 60); destinations.len()];
///         Ok(MatrixBlock { rows: vec![row; origins.len()] })
///     }
///
///     async fn directions(&self, _waypoints: &[Coord<f64>]) -> Result<Directions, MappingError> {
///         Ok(Directions::default())
///     }
/// }
/// ```
#[async_trait]
pub trait MappingService: Send + Sync {
    /// Return the legs from every origin to every destination.
    ///
    /// Implementations must return `Err(MappingError::EmptyInput)` when
    /// either slice is empty, and [`MappingError::RateLimited`] when the
    /// provider throttles the request.
    async fn distance_matrix(
        &self,
        origins: &[Coord<f64>],
        destinations: &[Coord<f64>],
    ) -> Result<MatrixBlock, MappingError>;

    /// Return directions visiting `waypoints` in order.
    async fn directions(&self, waypoints: &[Coord<f64>]) -> Result<Directions, MappingError>;
}

#[async_trait]
impl<T: MappingService + ?Sized> MappingService for Arc<T> {
    async fn distance_matrix(
        &self,
        origins: &[Coord<f64>],
        destinations: &[Coord<f64>],
    ) -> Result<MatrixBlock, MappingError> {
        (**self).distance_matrix(origins, destinations).await
    }

    async fn directions(&self, waypoints: &[Coord<f64>]) -> Result<Directions, MappingError> {
        (**self).directions(waypoints).await
    }
}
