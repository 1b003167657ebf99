//! Cached travel legs between collection points.

use serde::{Deserialize, Serialize};

use crate::node::NodeKey;

/// Wire value for a leg whose distance or duration is unknown.
///
/// It stands for both "unreachable" and "not computed yet"; the solver
/// treats either as a maximal-cost leg.
pub const UNKNOWN: i64 = -1;

/// Distance and duration of one directed leg.
///
/// `None` marks a value the mapping service could not supply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Leg {
    /// Road distance in metres.
    pub distance_m: Option<u64>,
    /// Travel time in seconds.
    pub duration_s: Option<u64>,
}

impl Leg {
    /// A leg with both values unknown.
    pub const UNKNOWN: Self = Self {
        distance_m: None,
        duration_s: None,
    };

    /// A fully known leg.
    #[must_use]
    pub const fn known(distance_m: u64, duration_s: u64) -> Self {
        Self {
            distance_m: Some(distance_m),
            duration_s: Some(duration_s),
        }
    }
}

/// Signed wire value for an optional leg measurement, [`UNKNOWN`] when absent.
///
/// Values beyond `i64::MAX` cannot be written and are also sent as
/// [`UNKNOWN`].
///
/// # Examples
///
/// ```
/// use binroute_core::{Leg, UNKNOWN, wire_value};
///
/// assert_eq!(wire_value(Leg::known(120, 30).distance_m), 120);
/// assert_eq!(wire_value(Leg::UNKNOWN.duration_s), UNKNOWN);
/// ```
#[must_use]
pub fn wire_value(value: Option<u64>) -> i64 {
    value
        .and_then(|v| i64::try_from(v).ok())
        .unwrap_or(UNKNOWN)
}

/// A directed edge in the all-pairs distance cache.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DistanceCacheEntry {
    /// Where the leg starts.
    pub origin: NodeKey,
    /// Where the leg ends.
    pub destination: NodeKey,
    /// Measured distance and duration.
    pub leg: Leg,
}

impl DistanceCacheEntry {
    /// Whether either endpoint is `key`.
    #[must_use]
    pub fn touches(&self, key: &NodeKey) -> bool {
        &self.origin == key || &self.destination == key
    }
}
