//! HTTP `MappingService` for Distance Matrix and Directions style APIs.
//!
//! Requests go to `{base_url}/distancematrix/json` and
//! `{base_url}/directions/json` with positions formatted as `lat,lng` and
//! the API key passed as the `key` query parameter. The key is never echoed
//! into error messages.
//!
//! # Example
//!
//! ```no_run
//! use binroute_core::MappingService;
//! use binroute_data::routing::{HttpMappingService, HttpMappingServiceConfig};
//! use geo::Coord;
//! use std::time::Duration;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = HttpMappingServiceConfig::new("secret")
//!     .with_timeout(Duration::from_secs(10));
//! let service = HttpMappingService::with_config(config)?;
//!
//! let depot = [Coord { x: -0.12, y: 51.5 }];
//! let bins = [Coord { x: -0.13, y: 51.51 }];
//! let block = service.distance_matrix(&depot, &bins).await?;
//! println!("{:?}", block.rows[0][0]);
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use binroute_core::{Directions, DirectionsLeg, Leg, MappingError, MappingService, MatrixBlock};
use geo::Coord;
use log::debug;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use thiserror::Error;

use super::api::{
    DirectionsResponse, MatrixElement, MatrixResponse, STATUS_OK, STATUS_OVER_QUERY_LIMIT,
};
use super::polyline;

/// Error type for [`HttpMappingService`] construction failures.
#[derive(Debug, Error)]
pub enum ProviderBuildError {
    /// Failed to build the HTTP client.
    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),
}

/// Default user agent for mapping requests.
pub const DEFAULT_USER_AGENT: &str = "binroute-mapping/0.1";

/// Default API root.
pub const DEFAULT_BASE_URL: &str = "https://maps.googleapis.com/maps/api";

/// Default request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Configuration for [`HttpMappingService`].
#[derive(Debug, Clone)]
pub struct HttpMappingServiceConfig {
    /// API root, without the endpoint path.
    pub base_url: String,
    /// Credential sent as the `key` query parameter.
    pub api_key: String,
    /// Request timeout duration.
    pub timeout: Duration,
    /// User agent string for requests.
    pub user_agent: String,
}

impl Default for HttpMappingServiceConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_owned(),
            api_key: String::new(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            user_agent: DEFAULT_USER_AGENT.to_owned(),
        }
    }
}

impl HttpMappingServiceConfig {
    /// Create a configuration for the default API root.
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            ..Default::default()
        }
    }

    /// Point the service at another API root.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set the request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the user agent string.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }
}

/// Mapping service backed by a keyed HTTP API.
///
/// Each trait call issues exactly one request. Throttling, whether signalled
/// by HTTP 429 or by an `OVER_QUERY_LIMIT` status, surfaces as
/// [`MappingError::RateLimited`] so the adapter can back off.
#[derive(Debug)]
pub struct HttpMappingService {
    client: Client,
    config: HttpMappingServiceConfig,
}

impl HttpMappingService {
    /// Create a service for the default API root.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client fails to build.
    pub fn new(api_key: impl Into<String>) -> Result<Self, ProviderBuildError> {
        Self::with_config(HttpMappingServiceConfig::new(api_key))
    }

    /// Create a service with explicit configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client fails to build.
    pub fn with_config(config: HttpMappingServiceConfig) -> Result<Self, ProviderBuildError> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .connect_timeout(config.timeout)
            .timeout(config.timeout)
            .build()
            .map_err(ProviderBuildError::HttpClient)?;
        Ok(Self { client, config })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{path}/json", self.config.base_url.trim_end_matches('/'))
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T, MappingError> {
        debug!("GET {url} with {} parameters", query.len());
        let response = self
            .client
            .get(url)
            .query(query)
            .query(&[("key", self.config.api_key.as_str())])
            .send()
            .await
            .map_err(|err| self.convert_reqwest_error(err, url))?;

        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            return Err(MappingError::RateLimited);
        }

        let response = response
            .error_for_status()
            .map_err(|err| self.convert_reqwest_error(err, url))?;

        response
            .json()
            .await
            .map_err(|err| MappingError::ParseError {
                message: err.without_url().to_string(),
            })
    }

    /// Convert a reqwest error to a `MappingError`.
    ///
    /// reqwest embeds the request URL, key included, in its messages, so it is
    /// stripped before the error is rendered.
    fn convert_reqwest_error(&self, error: reqwest::Error, url: &str) -> MappingError {
        if error.is_timeout() {
            return MappingError::Timeout {
                url: url.to_owned(),
                timeout_secs: self.config.timeout.as_secs(),
            };
        }

        let status = error.status();
        let message = error.without_url().to_string();
        if let Some(status) = status {
            return MappingError::HttpError {
                url: url.to_owned(),
                status: status.as_u16(),
                message,
            };
        }

        MappingError::NetworkError {
            url: url.to_owned(),
            message,
        }
    }
}

fn format_position(position: Coord<f64>) -> String {
    format!("{},{}", position.y, position.x)
}

fn format_positions(positions: &[Coord<f64>]) -> String {
    positions
        .iter()
        .copied()
        .map(format_position)
        .collect::<Vec<_>>()
        .join("|")
}

fn check_status(status: &str, error_message: Option<String>) -> Result<(), MappingError> {
    match status {
        STATUS_OK => Ok(()),
        STATUS_OVER_QUERY_LIMIT => Err(MappingError::RateLimited),
        other => Err(MappingError::ServiceError {
            status: other.to_owned(),
            message: error_message.unwrap_or_default(),
        }),
    }
}

fn convert_element(element: &MatrixElement) -> Leg {
    if element.status != STATUS_OK {
        return Leg::UNKNOWN;
    }
    Leg {
        distance_m: element.distance.map(|measure| measure.value),
        duration_s: element.duration.map(|measure| measure.value),
    }
}

/// Convert a matrix response, checking it matches the requested shape.
fn convert_matrix(
    response: MatrixResponse,
    origins: usize,
    destinations: usize,
) -> Result<MatrixBlock, MappingError> {
    check_status(&response.status, response.error_message)?;
    let block = MatrixBlock {
        rows: response
            .rows
            .iter()
            .map(|row| row.elements.iter().map(convert_element).collect())
            .collect(),
    };
    if !block.has_shape(origins, destinations) {
        return Err(MappingError::ShapeMismatch {
            rows: origins,
            columns: destinations,
        });
    }
    Ok(block)
}

/// Convert a directions response for `waypoints` positions.
fn convert_directions(
    response: DirectionsResponse,
    waypoints: usize,
) -> Result<Directions, MappingError> {
    check_status(&response.status, response.error_message)?;
    let route = response
        .routes
        .into_iter()
        .next()
        .ok_or_else(|| MappingError::ParseError {
            message: "directions response contained no routes".to_owned(),
        })?;
    if route.legs.len() + 1 != waypoints {
        return Err(MappingError::ParseError {
            message: format!(
                "expected {} legs for {waypoints} waypoints, got {}",
                waypoints.saturating_sub(1),
                route.legs.len()
            ),
        });
    }
    let legs = route
        .legs
        .into_iter()
        .map(|leg| {
            let points = leg.steps.iter().map(|step| step.polyline.points.as_str());
            let polyline = polyline::stitch(points).map_err(|err| MappingError::ParseError {
                message: err.to_string(),
            })?;
            Ok(DirectionsLeg {
                distance_m: leg.distance.value,
                duration_s: leg.duration.value,
                polyline,
            })
        })
        .collect::<Result<Vec<_>, MappingError>>()?;
    Ok(Directions { legs })
}

#[async_trait]
impl MappingService for HttpMappingService {
    async fn distance_matrix(
        &self,
        origins: &[Coord<f64>],
        destinations: &[Coord<f64>],
    ) -> Result<MatrixBlock, MappingError> {
        if origins.is_empty() || destinations.is_empty() {
            return Err(MappingError::EmptyInput);
        }
        let url = self.endpoint("distancematrix");
        let query = [
            ("origins", format_positions(origins)),
            ("destinations", format_positions(destinations)),
        ];
        let response: MatrixResponse = self.get_json(&url, &query).await?;
        convert_matrix(response, origins.len(), destinations.len())
    }

    async fn directions(&self, waypoints: &[Coord<f64>]) -> Result<Directions, MappingError> {
        let [first, middle @ .., last] = waypoints else {
            return Err(MappingError::EmptyInput);
        };
        let url = self.endpoint("directions");
        let mut query = vec![
            ("origin", format_position(*first)),
            ("destination", format_position(*last)),
        ];
        if !middle.is_empty() {
            query.push(("waypoints", format_positions(middle)));
        }
        let response: DirectionsResponse = self.get_json(&url, &query).await?;
        convert_directions(response, waypoints.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};

    #[fixture]
    fn service() -> HttpMappingService {
        HttpMappingService::with_config(
            HttpMappingServiceConfig::new("test-key").with_base_url("http://maps.example.com/api/"),
        )
        .expect("service should build")
    }

    fn matrix(json: &str) -> MatrixResponse {
        serde_json::from_str(json).expect("valid matrix json")
    }

    #[rstest]
    fn endpoint_strips_trailing_slash(service: HttpMappingService) {
        assert_eq!(
            service.endpoint("distancematrix"),
            "http://maps.example.com/api/distancematrix/json"
        );
    }

    #[rstest]
    fn positions_are_formatted_lat_first() {
        let positions = [Coord { x: -0.1, y: 51.5 }, Coord { x: 2.35, y: 48.85 }];
        assert_eq!(format_positions(&positions), "51.5,-0.1|48.85,2.35");
    }

    #[rstest]
    fn convert_matrix_maps_failed_elements_to_unknown() {
        let response = matrix(
            r#"{"status": "OK", "rows": [{"elements": [
                {"status": "OK", "distance": {"value": 0}, "duration": {"value": 0}},
                {"status": "NOT_FOUND"}
            ]}]}"#,
        );

        let block = convert_matrix(response, 1, 2).expect("should convert");

        assert_eq!(block.rows, vec![vec![Leg::known(0, 0), Leg::UNKNOWN]]);
    }

    #[rstest]
    fn convert_matrix_maps_over_query_limit_to_rate_limited() {
        let response = matrix(r#"{"status": "OVER_QUERY_LIMIT"}"#);

        let err = convert_matrix(response, 1, 1).expect_err("should fail");

        assert_eq!(err, MappingError::RateLimited);
    }

    #[rstest]
    fn convert_matrix_reports_service_errors() {
        let response = matrix(r#"{"status": "REQUEST_DENIED", "error_message": "bad key"}"#);

        let err = convert_matrix(response, 1, 1).expect_err("should fail");

        assert_eq!(
            err,
            MappingError::ServiceError {
                status: "REQUEST_DENIED".to_owned(),
                message: "bad key".to_owned(),
            }
        );
    }

    #[rstest]
    fn convert_matrix_rejects_wrong_shape() {
        let response = matrix(r#"{"status": "OK", "rows": [{"elements": [{"status": "OK"}]}]}"#);

        let err = convert_matrix(response, 2, 1).expect_err("should fail");

        assert_eq!(err, MappingError::ShapeMismatch { rows: 2, columns: 1 });
    }

    #[rstest]
    fn convert_directions_stitches_step_polylines() {
        let response: DirectionsResponse = serde_json::from_str(
            r#"{"status": "OK", "routes": [{"legs": [{
                "distance": {"value": 500},
                "duration": {"value": 60},
                "steps": [
                    {"polyline": {"points": "_p~iF~ps|U_ulLnnqC"}},
                    {"polyline": {"points": "_mqNvxq`@"}}
                ]
            }]}]}"#,
        )
        .expect("valid directions json");

        let directions = convert_directions(response, 2).expect("should convert");

        assert_eq!(directions.total_distance_m(), 500);
        assert_eq!(directions.legs[0].duration_s, 60);
    }

    #[rstest]
    fn convert_directions_rejects_leg_count_mismatch() {
        let response: DirectionsResponse = serde_json::from_str(
            r#"{"status": "OK", "routes": [{"legs": []}]}"#,
        )
        .expect("valid directions json");

        let err = convert_directions(response, 3).expect_err("should fail");

        assert!(matches!(err, MappingError::ParseError { .. }));
    }

    #[rstest]
    #[tokio::test]
    async fn empty_input_returns_error(service: HttpMappingService) {
        let err = service
            .distance_matrix(&[], &[Coord { x: 0.0, y: 0.0 }])
            .await
            .expect_err("should fail");
        assert_eq!(err, MappingError::EmptyInput);

        let err = service
            .directions(&[Coord { x: 0.0, y: 0.0 }])
            .await
            .expect_err("should fail");
        assert_eq!(err, MappingError::EmptyInput);
    }

    #[rstest]
    fn config_builder_pattern() {
        let config = HttpMappingServiceConfig::new("k")
            .with_base_url("http://example.com")
            .with_timeout(Duration::from_secs(5))
            .with_user_agent("test-agent/1.0");

        assert_eq!(config.api_key, "k");
        assert_eq!(config.base_url, "http://example.com");
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.user_agent, "test-agent/1.0");
    }
}
