//! Collection points and the keys that identify them.

use std::fmt;
use std::str::FromStr;

use geo::Coord;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The three kinds of routable collection point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// The single depot every vehicle starts and ends at.
    Depot,
    /// A bin with a fill-level sensor.
    SmartBin,
    /// A bin without a sensor; its volume is estimated.
    DumbBin,
}

impl NodeKind {
    /// Stable lowercase name used in storage and on the command line.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Depot => "depot",
            Self::SmartBin => "smart_bin",
            Self::DumbBin => "dumb_bin",
        }
    }

    /// The other bin kind, or `None` for the depot.
    #[must_use]
    pub const fn other_bin_kind(self) -> Option<Self> {
        match self {
            Self::SmartBin => Some(Self::DumbBin),
            Self::DumbBin => Some(Self::SmartBin),
            Self::Depot => None,
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown [`NodeKind`] name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown node kind {name:?}")]
pub struct ParseNodeKindError {
    /// The rejected input.
    pub name: String,
}

impl FromStr for NodeKind {
    type Err = ParseNodeKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "depot" => Ok(Self::Depot),
            "smart_bin" | "smart-bin" | "smart" => Ok(Self::SmartBin),
            "dumb_bin" | "dumb-bin" | "dumb" => Ok(Self::DumbBin),
            other => Err(ParseNodeKindError {
                name: other.to_owned(),
            }),
        }
    }
}

/// Identity of a collection point: its kind plus an opaque record id.
///
/// # Examples
///
/// ```
/// use binroute_core::{NodeKey, NodeKind};
///
/// let key = NodeKey::new(NodeKind::SmartBin, "bin-7");
/// assert_eq!(key.to_string(), "smart_bin:bin-7");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeKey {
    /// Kind of collection point.
    pub kind: NodeKind,
    /// Record identifier within the kind's collection.
    pub id: String,
}

impl NodeKey {
    /// Build a key from a kind and id.
    pub fn new(kind: NodeKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// Reasons a location is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum LocationError {
    /// A coordinate was NaN or infinite.
    #[error("coordinate ({x}, {y}) is not finite")]
    NotFinite {
        /// Longitude supplied.
        x: f64,
        /// Latitude supplied.
        y: f64,
    },
    /// Longitude outside `[-180, 180]`.
    #[error("longitude {0} is outside [-180, 180]")]
    LongitudeOutOfRange(f64),
    /// Latitude outside `[-90, 90]`.
    #[error("latitude {0} is outside [-90, 90]")]
    LatitudeOutOfRange(f64),
}

/// Check that `location` is a finite WGS84 coordinate (`x` = longitude,
/// `y` = latitude).
///
/// # Examples
///
/// ```
/// use binroute_core::validate_location;
/// use geo::Coord;
///
/// assert!(validate_location(Coord { x: 13.4, y: 52.5 }).is_ok());
/// assert!(validate_location(Coord { x: 200.0, y: 52.5 }).is_err());
/// ```
pub fn validate_location(location: Coord<f64>) -> Result<(), LocationError> {
    if !location.x.is_finite() || !location.y.is_finite() {
        return Err(LocationError::NotFinite {
            x: location.x,
            y: location.y,
        });
    }
    if !(-180.0..=180.0).contains(&location.x) {
        return Err(LocationError::LongitudeOutOfRange(location.x));
    }
    if !(-90.0..=90.0).contains(&location.y) {
        return Err(LocationError::LatitudeOutOfRange(location.y));
    }
    Ok(())
}

/// A routable collection point with its volume weight.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    /// Identity of the point.
    pub key: NodeKey,
    /// Position; `x` is longitude and `y` latitude.
    pub location: Coord<f64>,
    /// Volume waiting to be collected. Never negative.
    pub weight: f64,
}

impl Node {
    /// Construct a node, clamping negative or non-finite weights to zero.
    pub fn new(key: NodeKey, location: Coord<f64>, weight: f64) -> Self {
        let weight = if weight.is_finite() && weight > 0.0 {
            weight
        } else {
            0.0
        };
        Self {
            key,
            location,
            weight,
        }
    }

    /// Whether the node's location passes [`validate_location`].
    #[must_use]
    pub fn has_valid_location(&self) -> bool {
        validate_location(self.location).is_ok()
    }
}
