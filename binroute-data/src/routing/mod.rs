//! Access to the external distance and directions provider.
//!
//! [`HttpMappingService`] implements [`binroute_core::MappingService`] over
//! a keyed Distance Matrix and Directions style HTTP API. [`MappingAdapter`]
//! wraps any `MappingService`, splitting requests to fit provider limits and
//! retrying throttled calls.
//!
//! # Example
//!
//! ```
//! use binroute_core::test_support::HaversineMappingService;
//! use binroute_core::{Node, NodeKey, NodeKind};
//! use binroute_data::routing::{AdapterLimits, MappingAdapter};
//! use geo::Coord;
//!
//! # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
//! let adapter = MappingAdapter::new(HaversineMappingService::default(), AdapterLimits::default())
//!     .expect("default limits are valid");
//! let depot = Node::new(NodeKey::new(NodeKind::Depot, "d"), Coord { x: 4.9, y: 52.37 }, 0.0);
//! let entries = adapter.distance_entries(&[depot.clone()], &[depot]).await;
//! assert_eq!(entries[0].leg.distance_m, Some(0));
//! # });
//! ```

mod adapter;
mod api;
mod polyline;
mod provider;

pub use adapter::{AdapterLimits, AdapterLimitsError, MappingAdapter};
pub use provider::{
    DEFAULT_BASE_URL, DEFAULT_USER_AGENT, HttpMappingService, HttpMappingServiceConfig,
    ProviderBuildError,
};
