//! Core domain types for the Binroute collection-routing engine.
//!
//! The crate models collection points (the depot, smart bins and dumb
//! bins), the cached distance legs between them, the routes produced by an
//! external solver and the schedules persisted from those routes. It also
//! defines the two seams the orchestration talks through:
//!
//! - [`RecordStore`]: typed document collections plus the distance cache and
//!   schedule collection.
//! - [`MappingService`]: distance matrices and turn-by-turn directions from an
//!   external mapping provider.
//!
//! Record locations are checked with [`validate_location`] on import and
//! before any request to the mapping provider. [`Node::new`] never fails: it
//! clamps negative or non-finite weights to zero.
//!
//! ```rust
//! use binroute_core::{Node, NodeKey, NodeKind, validate_location};
//! use geo::Coord;
//!
//! let outside = Coord { x: 13.4, y: 95.0 };
//! assert!(validate_location(outside).is_err());
//!
//! let node = Node::new(NodeKey::new(NodeKind::DumbBin, "d1"), outside, -4.0);
//! assert_eq!(node.weight, 0.0);
//! assert!(!node.has_valid_location());
//! ```

#![forbid(unsafe_code)]

mod distance;
pub mod mapping;
mod node;
mod records;
mod route;
mod schedule;
pub mod store;

#[doc(hidden)]
pub mod test_support;

pub use distance::{DistanceCacheEntry, Leg, UNKNOWN, wire_value};
pub use mapping::{Directions, DirectionsLeg, MappingError, MappingService, MatrixBlock};
pub use node::{LocationError, Node, NodeKey, NodeKind, ParseNodeKindError, validate_location};
pub use records::{Depot, DumbBin, FleetVehicle, SmartBin};
pub use route::{ParseStrategyError, Route, RouteSet, RoutingStrategy};
pub use schedule::{Schedule, VehicleRoute};
pub use store::{BulkWriteSummary, Collection, Document, RecordStore, StoreError, WriteOp};

#[cfg(feature = "store-sqlite")]
pub use store::SqliteRecordStore;
