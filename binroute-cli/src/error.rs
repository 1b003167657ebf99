//! Error types emitted by the Binroute CLI.
//!
//! Keep this error type reasonably small, as many CLI helpers return
//! `Result<_, CliError>` and the workspace enables `clippy::result_large_err`.

use std::sync::Arc;

use binroute_core::{LocationError, ParseStrategyError, StoreError};
use binroute_data::routing::{AdapterLimitsError, ProviderBuildError};
use binroute_data::CacheError;
use binroute_planner::{BuildError, ParseMatrixMetricError};
use camino::Utf8PathBuf;
use thiserror::Error;

/// Errors emitted by the Binroute CLI.
#[derive(Debug, Error)]
pub enum CliError {
    /// Provided arguments failed Clap validation.
    #[error(transparent)]
    ArgumentParsing(#[from] clap::Error),
    /// Configuration layering failed (files, env, CLI).
    #[error("failed to load configuration: {0}")]
    Configuration(#[from] Arc<ortho_config::OrthoError>),
    /// A required option is missing after configuration merging.
    #[error("missing {field} (set --{field} or {env})")]
    MissingArgument {
        field: &'static str,
        env: &'static str,
    },
    /// The collect ratio is not a finite, non-negative number.
    #[error("collect ratio {0} must be a finite number no smaller than 0")]
    InvalidCollectRatio(f64),
    /// A configured strategy name is unknown.
    #[error(transparent)]
    InvalidStrategy(#[from] ParseStrategyError),
    /// The configured matrix metric is unknown.
    #[error(transparent)]
    InvalidMetric(#[from] ParseMatrixMetricError),
    /// Installing the log subscriber failed.
    #[error("failed to initialise logging: {0}")]
    Logging(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),
    /// Starting the async runtime failed.
    #[error("failed to start async runtime: {0}")]
    Runtime(#[source] std::io::Error),
    /// Opening the record store failed.
    #[error("failed to open record store at {path:?}: {source}")]
    OpenStore {
        path: Utf8PathBuf,
        #[source]
        source: StoreError,
    },
    /// A store operation failed.
    #[error("record store operation failed: {0}")]
    Store(#[from] StoreError),
    /// Reading an input file failed.
    #[error("failed to read {path:?}: {source}")]
    ReadInput {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// An input file is not valid JSON for its command.
    #[error("failed to parse {path:?}: {source}")]
    ParseInput {
        path: Utf8PathBuf,
        #[source]
        source: serde_json::Error,
    },
    /// A record in an input file has an unusable location.
    #[error("record {id:?} has an invalid location: {source}")]
    InvalidLocation {
        id: String,
        #[source]
        source: LocationError,
    },
    /// Constructing the mapping service failed.
    #[error("failed to build mapping service for {base_url:?}: {source}")]
    BuildMappingService {
        base_url: String,
        #[source]
        source: ProviderBuildError,
    },
    /// The adapter limits are unusable.
    #[error(transparent)]
    AdapterLimits(#[from] AdapterLimitsError),
    /// Distance cache maintenance failed.
    #[error(transparent)]
    Cache(#[from] CacheError),
    /// Building schedules failed.
    #[error(transparent)]
    Build(#[from] BuildError),
    /// Serializing command output failed.
    #[error("failed to serialize output: {0}")]
    SerializeOutput(#[source] serde_json::Error),
    /// Writing command output failed.
    #[error("failed to write output: {0}")]
    WriteOutput(#[source] std::io::Error),
}
