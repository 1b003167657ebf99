//! Turning stored bins and cached legs into persisted schedules.

use std::fmt;
use std::str::FromStr;

use binroute_core::{
    Depot, DumbBin, FleetVehicle, RecordStore, Route, RouteSet, RoutingStrategy, Schedule,
    SmartBin, StoreError, VehicleRoute,
};
use binroute_solver::{RouteSolver, RoutingProblem, SolverProcessError, solve_with_strategies};
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{DEFAULT_COLLECT_RATIO, GraphIndex, Selection, round_volume};

/// Which cached measure the solver minimises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MatrixMetric {
    /// Road distance in metres.
    #[default]
    Distance,
    /// Travel time in seconds.
    Duration,
}

impl fmt::Display for MatrixMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Distance => "distance",
            Self::Duration => "duration",
        })
    }
}

/// Error returned when a metric name is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown matrix metric {name:?}; expected distance or duration")]
pub struct ParseMatrixMetricError {
    /// The rejected input.
    pub name: String,
}

impl FromStr for MatrixMetric {
    type Err = ParseMatrixMetricError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "distance" => Ok(Self::Distance),
            "duration" => Ok(Self::Duration),
            _ => Err(ParseMatrixMetricError { name: s.to_owned() }),
        }
    }
}

/// Tunables for [`ScheduleBuilder`].
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleBuilderConfig {
    /// Minimum fullness ratio for a smart bin to be collected.
    pub collect_ratio: f64,
    /// Strategies to try, in order.
    pub strategies: Vec<RoutingStrategy>,
    /// Measure used for the cost matrix.
    pub metric: MatrixMetric,
}

impl Default for ScheduleBuilderConfig {
    fn default() -> Self {
        Self {
            collect_ratio: DEFAULT_COLLECT_RATIO,
            strategies: RoutingStrategy::ALL.to_vec(),
            metric: MatrixMetric::default(),
        }
    }
}

impl ScheduleBuilderConfig {
    /// Replace the collect ratio.
    #[must_use]
    pub const fn with_collect_ratio(mut self, collect_ratio: f64) -> Self {
        self.collect_ratio = collect_ratio;
        self
    }

    /// Replace the strategy list.
    #[must_use]
    pub fn with_strategies(mut self, strategies: Vec<RoutingStrategy>) -> Self {
        self.strategies = strategies;
        self
    }

    /// Replace the matrix metric.
    #[must_use]
    pub const fn with_metric(mut self, metric: MatrixMetric) -> Self {
        self.metric = metric;
        self
    }
}

/// Errors that abort a build. Existing schedules are left untouched.
#[derive(Debug, Error)]
pub enum BuildError {
    /// Reading inputs or writing schedules failed.
    #[error("schedule store operation failed: {0}")]
    Store(#[from] StoreError),
    /// The optimiser could not be run.
    #[error("route solver failed: {0}")]
    Solver(#[from] SolverProcessError),
    /// There is nowhere to start routes from.
    #[error("no depot is configured")]
    NoDepot,
    /// A route visits an index outside the graph.
    #[error("route {route} of result {rank} visits unknown node index {index}")]
    UnknownIndex {
        /// Position of the route set among the distinct results.
        rank: usize,
        /// Vehicle slot of the route.
        route: usize,
        /// Offending index.
        index: usize,
    },
    /// The solver returned more routes than there are vehicles.
    #[error("route {route} of result {rank} has no vehicle")]
    UnknownVehicle {
        /// Position of the route set among the distinct results.
        rank: usize,
        /// Vehicle slot of the route.
        route: usize,
    },
}

/// Summary of one build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct BuildReport {
    /// Smart bins that reached the collect ratio.
    pub eligible_smart_bins: usize,
    /// Dumb bins included.
    pub dumb_bins: usize,
    /// Vehicles offered to the solver.
    pub vehicles: usize,
    /// Distinct results across all strategies; failed runs count once.
    pub distinct_route_sets: usize,
    /// Schedules now in the store.
    pub schedules_written: usize,
}

/// Runs one schedule build end to end.
///
/// Each build reads the bins, vehicles and cached legs from the store,
/// solves under every configured strategy and replaces the stored
/// schedules with one per distinct result. Legs are only ever read from
/// the cache; keep it current with the distance cache maintainer first.
#[derive(Debug)]
pub struct ScheduleBuilder<S, R> {
    store: S,
    solver: R,
    config: ScheduleBuilderConfig,
}

impl<S: RecordStore, R: RouteSolver> ScheduleBuilder<S, R> {
    /// Assemble a builder.
    #[must_use]
    pub const fn new(store: S, solver: R, config: ScheduleBuilderConfig) -> Self {
        Self {
            store,
            solver,
            config,
        }
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &ScheduleBuilderConfig {
        &self.config
    }

    /// The solver, for inspection.
    #[must_use]
    pub const fn solver(&self) -> &R {
        &self.solver
    }

    /// Build and persist schedules stamped with the current time.
    ///
    /// # Errors
    ///
    /// See [`ScheduleBuilder::build_at`].
    pub async fn build(&mut self) -> Result<BuildReport, BuildError> {
        self.build_at(Utc::now()).await
    }

    /// Build and persist schedules stamped with `now`.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::NoDepot`] without a depot, [`BuildError::Store`]
    /// or [`BuildError::Solver`] when a collaborator fails and
    /// [`BuildError::UnknownIndex`] or [`BuildError::UnknownVehicle`] when a
    /// route cannot be mapped back to the graph.
    pub async fn build_at(&mut self, now: DateTime<Utc>) -> Result<BuildReport, BuildError> {
        let depots: Vec<Depot> = self.store.find_all().await?;
        let smart_bins: Vec<SmartBin> = self.store.find_all().await?;
        let dumb_bins: Vec<DumbBin> = self.store.find_all().await?;
        let mut vehicles: Vec<FleetVehicle> = self.store.find_all().await?;
        vehicles.sort_by(|a, b| a.id.cmp(&b.id));

        let selection = Selection::from_records(
            &depots,
            &smart_bins,
            &dumb_bins,
            self.config.collect_ratio,
        )
        .ok_or(BuildError::NoDepot)?;
        let graph = GraphIndex::new(&selection);
        let entries = self.store.distance_entries(&graph.keys()).await?;
        debug!(
            "loaded {} cached legs for {} nodes",
            entries.len(),
            graph.len()
        );

        let route_sets = if vehicles.is_empty() {
            warn!("no fleet vehicles are configured; clearing schedules");
            Vec::new()
        } else {
            let problem = RoutingProblem {
                matrix: graph.cost_matrix(&entries, self.config.metric),
                weights: graph.weights(),
                capacities: vehicles
                    .iter()
                    .map(|vehicle| round_volume(vehicle.capacity))
                    .collect(),
            };
            solve_with_strategies(&mut self.solver, &problem, &self.config.strategies).await?
        };

        let schedules = route_sets
            .iter()
            .enumerate()
            .map(|(rank, routes)| schedule(&graph, &vehicles, rank, routes, now))
            .collect::<Result<Vec<_>, _>>()?;
        let report = BuildReport {
            eligible_smart_bins: selection.smart_bins.len(),
            dumb_bins: selection.dumb_bins.len(),
            vehicles: vehicles.len(),
            distinct_route_sets: route_sets.len(),
            schedules_written: schedules.len(),
        };
        self.store.replace_schedules(schedules).await?;
        info!(
            "built {} schedules from {} smart and {} dumb bins",
            report.schedules_written, report.eligible_smart_bins, report.dumb_bins
        );
        Ok(report)
    }
}

fn schedule(
    graph: &GraphIndex,
    vehicles: &[FleetVehicle],
    rank: usize,
    routes: &RouteSet,
    now: DateTime<Utc>,
) -> Result<Schedule, BuildError> {
    let mut vehicle_routes = Vec::new();
    for (slot, route) in routes.routes().iter().enumerate() {
        if route.is_trivial() {
            continue;
        }
        let vehicle = vehicles
            .get(slot)
            .ok_or(BuildError::UnknownVehicle { rank, route: slot })?;
        vehicle_routes.push(VehicleRoute {
            vehicle_id: vehicle.id.clone(),
            stops: stops(graph, route, rank, slot)?,
        });
    }
    Ok(Schedule::new(now, rank, vehicle_routes))
}

fn stops(
    graph: &GraphIndex,
    route: &Route,
    rank: usize,
    slot: usize,
) -> Result<Vec<geo::Coord<f64>>, BuildError> {
    route
        .indices()
        .iter()
        .map(|&index| {
            graph
                .node(index)
                .map(|node| node.location)
                .ok_or(BuildError::UnknownIndex {
                    rank,
                    route: slot,
                    index,
                })
        })
        .collect()
}
