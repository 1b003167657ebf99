//! Batching and retry layer over a [`MappingService`].
//!
//! Providers cap how many origins, destinations and origin/destination
//! pairs one matrix request may carry, and how many waypoints one
//! directions request may carry. [`MappingAdapter`] splits arbitrary
//! requests to fit those caps, retries throttled calls with linear backoff
//! and degrades anything that still fails to unknown legs rather than
//! failing the whole request.

use std::future::Future;
use std::time::Duration;

use binroute_core::{
    DistanceCacheEntry, Directions, Leg, MappingError, MappingService, MatrixBlock, Node,
};
use geo::Coord;
use log::{debug, warn};
use thiserror::Error;

/// Request-size and retry limits applied by [`MappingAdapter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterLimits {
    /// Most origins in one matrix request.
    pub max_origins: usize,
    /// Most destinations in one matrix request.
    pub max_destinations: usize,
    /// Most origin/destination pairs in one matrix request.
    pub max_pairs: usize,
    /// Most waypoints in one directions request.
    pub max_waypoints: usize,
    /// Retries after a rate-limited call before giving up on it.
    pub max_retries: u32,
    /// Retry `k` waits `k` times this long.
    pub backoff_unit: Duration,
}

impl Default for AdapterLimits {
    fn default() -> Self {
        Self {
            max_origins: 25,
            max_destinations: 25,
            max_pairs: 100,
            max_waypoints: 25,
            max_retries: 3,
            backoff_unit: Duration::from_secs(1),
        }
    }
}

/// Limits that would stop the adapter from making progress.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdapterLimitsError {
    /// A batching limit was zero.
    #[error("{field} must be at least 1")]
    Zero {
        /// Name of the offending limit.
        field: &'static str,
    },
    /// Directions windows must hold a start and an end.
    #[error("max_waypoints must be at least 2, got {0}")]
    TooFewWaypoints(usize),
}

impl AdapterLimits {
    /// Set the per-request origin and destination caps.
    #[must_use]
    pub fn with_block_size(mut self, max_origins: usize, max_destinations: usize) -> Self {
        self.max_origins = max_origins;
        self.max_destinations = max_destinations;
        self
    }

    /// Set the per-request pair cap.
    #[must_use]
    pub fn with_max_pairs(mut self, max_pairs: usize) -> Self {
        self.max_pairs = max_pairs;
        self
    }

    /// Set the per-request waypoint cap.
    #[must_use]
    pub fn with_max_waypoints(mut self, max_waypoints: usize) -> Self {
        self.max_waypoints = max_waypoints;
        self
    }

    /// Set the retry budget and backoff unit.
    #[must_use]
    pub fn with_retries(mut self, max_retries: u32, backoff_unit: Duration) -> Self {
        self.max_retries = max_retries;
        self.backoff_unit = backoff_unit;
        self
    }

    /// Check every limit allows progress.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterLimitsError`] naming the first unusable limit.
    pub fn validate(&self) -> Result<(), AdapterLimitsError> {
        for (field, value) in [
            ("max_origins", self.max_origins),
            ("max_destinations", self.max_destinations),
            ("max_pairs", self.max_pairs),
        ] {
            if value == 0 {
                return Err(AdapterLimitsError::Zero { field });
            }
        }
        if self.max_waypoints < 2 {
            return Err(AdapterLimitsError::TooFewWaypoints(self.max_waypoints));
        }
        Ok(())
    }

    /// Destinations per request for an origin block of `origins` positions.
    fn destination_block(&self, origins: usize) -> usize {
        self.max_destinations
            .min((self.max_pairs / origins.max(1)).max(1))
    }
}

/// Splits, retries and degrades requests to a [`MappingService`].
#[derive(Debug)]
pub struct MappingAdapter<M> {
    service: M,
    limits: AdapterLimits,
}

impl<M: MappingService> MappingAdapter<M> {
    /// Wrap `service` with the given limits.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterLimitsError`] when the limits would stall batching.
    pub fn new(service: M, limits: AdapterLimits) -> Result<Self, AdapterLimitsError> {
        limits.validate()?;
        Ok(Self { service, limits })
    }

    /// The limits in force.
    #[must_use]
    pub fn limits(&self) -> &AdapterLimits {
        &self.limits
    }

    /// The wrapped service.
    #[must_use]
    pub fn service(&self) -> &M {
        &self.service
    }

    /// Legs from every origin to every destination, origin-major.
    ///
    /// Nodes with invalid locations are never sent upstream. Their legs,
    /// and those of any block that still fails after retries, are unknown.
    pub async fn distance_entries(
        &self,
        origins: &[Node],
        destinations: &[Node],
    ) -> Vec<DistanceCacheEntry> {
        let mut grid = vec![vec![Leg::UNKNOWN; destinations.len()]; origins.len()];
        let sendable_origins = sendable(origins);
        let sendable_destinations = sendable(destinations);

        for origin_block in sendable_origins.chunks(self.limits.max_origins) {
            let block_size = self.limits.destination_block(origin_block.len());
            for destination_block in sendable_destinations.chunks(block_size) {
                let Some(block) = self
                    .fetch_block(origins, destinations, origin_block, destination_block)
                    .await
                else {
                    continue;
                };
                for (&row, legs) in origin_block.iter().zip(block.rows) {
                    for (&column, leg) in destination_block.iter().zip(legs) {
                        grid[row][column] = leg;
                    }
                }
            }
        }

        origins
            .iter()
            .zip(grid)
            .flat_map(|(origin, legs)| {
                destinations
                    .iter()
                    .zip(legs)
                    .map(|(destination, leg)| DistanceCacheEntry {
                        origin: origin.key.clone(),
                        destination: destination.key.clone(),
                        leg,
                    })
            })
            .collect()
    }

    async fn fetch_block(
        &self,
        origins: &[Node],
        destinations: &[Node],
        origin_block: &[usize],
        destination_block: &[usize],
    ) -> Option<MatrixBlock> {
        let from: Vec<Coord<f64>> = origin_block.iter().map(|&i| origins[i].location).collect();
        let to: Vec<Coord<f64>> = destination_block
            .iter()
            .map(|&j| destinations[j].location)
            .collect();
        debug!("requesting {}x{} distance block", from.len(), to.len());

        match self
            .with_retries(|| self.service.distance_matrix(&from, &to))
            .await
        {
            Ok(block) if block.has_shape(from.len(), to.len()) => Some(block),
            Ok(_) => {
                warn!(
                    "mapping service returned a malformed {}x{} block; leaving legs unknown",
                    from.len(),
                    to.len()
                );
                None
            }
            Err(err) => {
                warn!(
                    "distance block of {}x{} failed: {err}; leaving legs unknown",
                    from.len(),
                    to.len()
                );
                None
            }
        }
    }

    /// Directions along `waypoints`, one result per window.
    ///
    /// Chains longer than `max_waypoints` are split into windows sharing
    /// their boundary waypoint. A window that fails after retries is `None`.
    /// Fewer than two waypoints yield no windows.
    pub async fn directions(&self, waypoints: &[Coord<f64>]) -> Vec<Option<Directions>> {
        let windows = windows(waypoints, self.limits.max_waypoints);
        let mut results = Vec::with_capacity(windows.len());
        for window in windows {
            match self.with_retries(|| self.service.directions(window)).await {
                Ok(directions) => results.push(Some(directions)),
                Err(err) => {
                    warn!("directions for {} waypoints failed: {err}", window.len());
                    results.push(None);
                }
            }
        }
        results
    }

    async fn with_retries<T, F, Fut>(&self, mut call: F) -> Result<T, MappingError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, MappingError>>,
    {
        let mut attempt = 0_u32;
        loop {
            match call().await {
                Err(MappingError::RateLimited) if attempt < self.limits.max_retries => {
                    attempt += 1;
                    let wait = self.limits.backoff_unit * attempt;
                    debug!("rate limited; retry {attempt} in {wait:?}");
                    tokio::time::sleep(wait).await;
                }
                outcome => return outcome,
            }
        }
    }
}

/// Indices of nodes whose locations may be sent upstream.
fn sendable(nodes: &[Node]) -> Vec<usize> {
    nodes
        .iter()
        .enumerate()
        .filter(|(_, node)| node.has_valid_location())
        .map(|(index, _)| index)
        .collect()
}

/// Overlapping windows of at most `size` waypoints covering `waypoints`.
fn windows(waypoints: &[Coord<f64>], size: usize) -> Vec<&[Coord<f64>]> {
    let mut windows = Vec::new();
    if waypoints.len() < 2 || size < 2 {
        return windows;
    }
    let mut start = 0;
    loop {
        let end = (start + size).min(waypoints.len());
        windows.push(&waypoints[start..end]);
        if end == waypoints.len() {
            return windows;
        }
        start = end - 1;
    }
}
