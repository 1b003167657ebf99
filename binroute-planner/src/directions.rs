//! Turn-by-turn directions for persisted routes.

use binroute_core::{Directions, DirectionsLeg, MappingService, VehicleRoute};
use binroute_data::routing::MappingAdapter;
use log::warn;
use serde::Serialize;

/// Directions for a whole route, stitched from per-window responses.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct RouteDirections {
    /// Legs of every window that succeeded, in route order.
    pub legs: Vec<DirectionsLeg>,
    /// Sum of leg distances in metres.
    pub total_distance_m: u64,
    /// Sum of leg durations in seconds.
    pub total_duration_s: u64,
    /// False when at least one window failed, leaving a gap in `legs`.
    pub complete: bool,
}

/// Merge window results into one leg list.
///
/// # Examples
///
/// ```
/// use binroute_core::{Directions, DirectionsLeg};
/// use binroute_planner::compose_directions;
///
/// let leg = |d| DirectionsLeg { distance_m: d, duration_s: d / 10, polyline: String::new() };
/// let composed = compose_directions(vec![
///     Some(Directions { legs: vec![leg(100), leg(50)] }),
///     None,
/// ]);
/// assert_eq!(composed.total_distance_m, 150);
/// assert!(!composed.complete);
/// ```
#[must_use]
pub fn compose_directions(windows: Vec<Option<Directions>>) -> RouteDirections {
    let mut composed = RouteDirections {
        complete: true,
        ..RouteDirections::default()
    };
    for window in windows {
        let Some(directions) = window else {
            composed.complete = false;
            continue;
        };
        composed.total_distance_m += directions.total_distance_m();
        composed.total_duration_s += directions.total_duration_s();
        composed.legs.extend(directions.legs);
    }
    composed
}

/// Fetch directions along a persisted vehicle route.
pub async fn route_directions<M: MappingService>(
    adapter: &MappingAdapter<M>,
    route: &VehicleRoute,
) -> RouteDirections {
    let composed = compose_directions(adapter.directions(&route.stops).await);
    if !composed.complete {
        warn!(
            "directions for vehicle {} are incomplete",
            route.vehicle_id
        );
    }
    composed
}
