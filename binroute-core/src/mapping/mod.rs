//! Fetch distances and directions from an external mapping service.
//!
//! The [`MappingService`] trait abstracts a provider offering two calls: a
//! distance/duration matrix between origin and destination positions, and
//! turn-by-turn directions along an ordered waypoint chain. Providers impose
//! per-call limits and may rate-limit callers; batching and retries live in
//! the adapter layered on top of this trait, not in implementations.

mod error;
mod provider;

pub use error::MappingError;
pub use provider::{Directions, DirectionsLeg, MappingService, MatrixBlock};
