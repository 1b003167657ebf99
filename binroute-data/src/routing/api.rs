//! Response types for the Distance Matrix and Directions JSON APIs.
//!
//! Both endpoints report a top-level `status`; the matrix endpoint also
//! reports one status per element. Only the fields the adapter consumes are
//! modelled.

use serde::Deserialize;

/// Top-level status of a successful request.
pub const STATUS_OK: &str = "OK";

/// Top-level status reported when the caller is throttled.
pub const STATUS_OVER_QUERY_LIMIT: &str = "OVER_QUERY_LIMIT";

/// A numeric measurement with its human-readable rendering.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Measure {
    /// Metres for distances, seconds for durations.
    pub value: u64,
}

/// Distance Matrix API response.
#[derive(Debug, Deserialize)]
pub struct MatrixResponse {
    /// Request status, `"OK"` on success.
    pub status: String,
    /// Detail accompanying a failed status.
    #[serde(default)]
    pub error_message: Option<String>,
    /// One row per origin.
    #[serde(default)]
    pub rows: Vec<MatrixRow>,
}

/// One origin's results.
#[derive(Debug, Deserialize)]
pub struct MatrixRow {
    /// One element per destination.
    pub elements: Vec<MatrixElement>,
}

/// Result for one origin and destination pair.
#[derive(Debug, Deserialize)]
pub struct MatrixElement {
    /// `"OK"`, `"NOT_FOUND"` or `"ZERO_RESULTS"`.
    pub status: String,
    /// Road distance.
    #[serde(default)]
    pub distance: Option<Measure>,
    /// Travel time.
    #[serde(default)]
    pub duration: Option<Measure>,
}

/// Directions API response.
#[derive(Debug, Deserialize)]
pub struct DirectionsResponse {
    /// Request status, `"OK"` on success.
    pub status: String,
    /// Detail accompanying a failed status.
    #[serde(default)]
    pub error_message: Option<String>,
    /// Candidate routes; the first is used.
    #[serde(default)]
    pub routes: Vec<DirectionsRoute>,
}

/// One candidate route.
#[derive(Debug, Deserialize)]
pub struct DirectionsRoute {
    /// One leg per consecutive waypoint pair.
    pub legs: Vec<RouteLeg>,
}

/// A leg between consecutive waypoints.
#[derive(Debug, Deserialize)]
pub struct RouteLeg {
    /// Road distance of the leg.
    pub distance: Measure,
    /// Travel time of the leg.
    pub duration: Measure,
    /// Manoeuvres making up the leg.
    #[serde(default)]
    pub steps: Vec<RouteStep>,
}

/// A single manoeuvre within a leg.
#[derive(Debug, Deserialize)]
pub struct RouteStep {
    /// Geometry of the step.
    pub polyline: EncodedPolyline,
}

/// Polyline in the encoded-polyline algorithm format.
#[derive(Debug, Deserialize)]
pub struct EncodedPolyline {
    /// Encoded points.
    pub points: String,
}
