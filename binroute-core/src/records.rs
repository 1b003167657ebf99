//! Records held in the store's typed collections.
//!
//! Each record converts into a routable [`Node`]; the schedule builder
//! overrides the weight of dumb bins once it knows which smart bins are due.

use geo::Coord;
use serde::{Deserialize, Serialize};

use crate::node::{Node, NodeKey, NodeKind};
use crate::store::{Collection, Document};

/// The depot vehicles leave from and return to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Depot {
    /// Record identifier.
    pub id: String,
    /// Position; `x` is longitude and `y` latitude.
    pub location: Coord<f64>,
}

impl Depot {
    /// Convert into a zero-weight routing node.
    #[must_use]
    pub fn to_node(&self) -> Node {
        Node::new(NodeKey::new(NodeKind::Depot, &self.id), self.location, 0.0)
    }
}

/// A bin reporting its own fill level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SmartBin {
    /// Record identifier.
    pub id: String,
    /// Position; `x` is longitude and `y` latitude.
    pub location: Coord<f64>,
    /// Volume currently in the bin, as last reported by its sensor.
    pub current_fullness: f64,
    /// Volume at which the bin counts as full.
    pub threshold: f64,
}

impl SmartBin {
    /// `current_fullness / threshold`, or zero when the threshold is not
    /// positive.
    ///
    /// # Examples
    ///
    /// ```
    /// use binroute_core::SmartBin;
    /// use geo::Coord;
    ///
    /// let bin = SmartBin {
    ///     id: "s1".into(),
    ///     location: Coord { x: 0.0, y: 0.0 },
    ///     current_fullness: 30.0,
    ///     threshold: 40.0,
    /// };
    /// assert!((bin.fullness_ratio() - 0.75).abs() < f64::EPSILON);
    /// ```
    #[must_use]
    pub fn fullness_ratio(&self) -> f64 {
        if self.threshold > 0.0 && self.current_fullness.is_finite() {
            self.current_fullness.max(0.0) / self.threshold
        } else {
            0.0
        }
    }

    /// Convert into a routing node weighted by the current fullness.
    #[must_use]
    pub fn to_node(&self) -> Node {
        Node::new(
            NodeKey::new(NodeKind::SmartBin, &self.id),
            self.location,
            self.current_fullness,
        )
    }
}

/// A bin without a sensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DumbBin {
    /// Record identifier.
    pub id: String,
    /// Position; `x` is longitude and `y` latitude.
    pub location: Coord<f64>,
    /// Total bin volume.
    pub capacity: f64,
    /// Smart bin whose fill level stands in for this bin's, if assigned.
    #[serde(default)]
    pub nearest_smart_bin: Option<String>,
}

impl DumbBin {
    /// Convert into a routing node weighted by the given volume.
    #[must_use]
    pub fn to_node_with_volume(&self, volume: f64) -> Node {
        Node::new(
            NodeKey::new(NodeKind::DumbBin, &self.id),
            self.location,
            volume,
        )
    }

    /// Convert into a routing node weighted by the full capacity.
    #[must_use]
    pub fn to_node(&self) -> Node {
        self.to_node_with_volume(self.capacity)
    }
}

/// A collection vehicle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FleetVehicle {
    /// Record identifier.
    pub id: String,
    /// Volume the vehicle can carry on one trip.
    pub capacity: f64,
}

impl Document for Depot {
    const COLLECTION: Collection = Collection::Depots;

    fn id(&self) -> &str {
        &self.id
    }
}

impl Document for SmartBin {
    const COLLECTION: Collection = Collection::SmartBins;

    fn id(&self) -> &str {
        &self.id
    }
}

impl Document for DumbBin {
    const COLLECTION: Collection = Collection::DumbBins;

    fn id(&self) -> &str {
        &self.id
    }
}

impl Document for FleetVehicle {
    const COLLECTION: Collection = Collection::FleetVehicles;

    fn id(&self) -> &str {
        &self.id
    }
}
