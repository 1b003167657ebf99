//! Facade crate for the Binroute collection-routing engine.
//!
//! This crate re-exports the core domain types and exposes the mapping
//! adapter, distance cache, solver driver and schedule builder behind feature
//! flags.

#![forbid(unsafe_code)]

pub use binroute_core::{
    BulkWriteSummary, Collection, Depot, Directions, DirectionsLeg, DistanceCacheEntry, Document,
    DumbBin, FleetVehicle, Leg, LocationError, MappingError, MappingService, MatrixBlock, Node,
    NodeKey, NodeKind, RecordStore, Route, RouteSet, RoutingStrategy, Schedule, SmartBin,
    StoreError, VehicleRoute, WriteOp,
};

#[cfg(feature = "store-sqlite")]
pub use binroute_core::SqliteRecordStore;

#[cfg(feature = "http")]
pub use binroute_data::{
    AdapterLimits, CacheError, CacheReport, DistanceCacheMaintainer, HttpMappingService,
    MappingAdapter, NodeChanges,
};

#[cfg(feature = "planner")]
pub use binroute_planner::{BuildError, BuildReport, ScheduleBuilder, ScheduleBuilderConfig};

#[cfg(feature = "planner")]
pub use binroute_solver::{
    RouteSolver, RoutingProblem, SolverProcess, SolverProcessConfig, SolverProcessError,
    solve_with_strategies,
};
