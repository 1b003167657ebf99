//! Builds collection schedules from the stored bins and the distance cache.
//!
//! A build selects the bins that are due ([`Selection`]), lays them out as
//! a dense graph with the depot at index 0 ([`GraphIndex`]), hands the
//! induced cost matrix to a [`RouteSolver`](binroute_solver::RouteSolver)
//! under several strategies and persists one [`Schedule`](binroute_core::Schedule)
//! per distinct result. [`compose_directions`] turns a persisted route back
//! into turn-by-turn directions.

#![forbid(unsafe_code)]

mod builder;
mod directions;
mod eligibility;
mod graph;

pub use builder::{
    BuildError, BuildReport, MatrixMetric, ParseMatrixMetricError, ScheduleBuilder,
    ScheduleBuilderConfig,
};
pub use directions::{RouteDirections, compose_directions, route_directions};
pub use eligibility::{DEFAULT_COLLECT_RATIO, Selection};
pub use graph::{GraphIndex, round_volume};
