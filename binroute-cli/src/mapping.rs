//! Commands backed by the external mapping service: `rebuild-cache` and
//! `directions`.

use std::io::Write;
use std::time::Duration;

use binroute_core::{MappingService, RecordStore};
use binroute_data::routing::{
    AdapterLimits, DEFAULT_BASE_URL, HttpMappingService, HttpMappingServiceConfig, MappingAdapter,
};
use binroute_data::{CacheReport, DistanceCacheMaintainer};
use binroute_planner::{RouteDirections, route_directions};
use camino::Utf8PathBuf;
use clap::Parser;
use log::info;
use ortho_config::{OrthoConfig, SubcmdConfigMerge};
use serde::{Deserialize, Serialize};

use crate::records::ApplyArgs;
use crate::{
    ARG_API_BASE_URL, ARG_API_KEY, ARG_BACKOFF_MS, ARG_DATABASE, ARG_MAX_DESTINATIONS,
    ARG_MAX_ORIGINS, ARG_MAX_PAIRS, ARG_MAX_RETRIES, ARG_MAX_WAYPOINTS, CliError,
    ENV_DIRECTIONS_API_KEY, ENV_REBUILD_CACHE_API_KEY, database_or_default, open_store,
    write_json,
};

/// CLI arguments for the `rebuild-cache` subcommand.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
#[command(
    long_about = "Recompute the legs between the depot and every bin, \
                 including each node with itself, and replace the cached \
                 legs wholesale.",
    about = "Recompute every cached leg from the mapping service"
)]
#[ortho_config(prefix = "BINROUTE")]
pub(crate) struct RebuildCacheArgs {
    /// SQLite database holding the collections.
    #[arg(long = ARG_DATABASE, value_name = "path")]
    #[serde(default)]
    pub(crate) database: Option<Utf8PathBuf>,
    /// Key sent with every mapping request.
    #[arg(long = ARG_API_KEY, value_name = "key")]
    #[serde(default)]
    pub(crate) api_key: Option<String>,
    /// Base URL of the mapping API.
    #[arg(long = ARG_API_BASE_URL, value_name = "url")]
    #[serde(default)]
    pub(crate) api_base_url: Option<String>,
    /// Most origins in one matrix request.
    #[arg(long = ARG_MAX_ORIGINS, value_name = "count")]
    #[serde(default)]
    pub(crate) max_origins: Option<usize>,
    /// Most destinations in one matrix request.
    #[arg(long = ARG_MAX_DESTINATIONS, value_name = "count")]
    #[serde(default)]
    pub(crate) max_destinations: Option<usize>,
    /// Most origin/destination pairs in one matrix request.
    #[arg(long = ARG_MAX_PAIRS, value_name = "count")]
    #[serde(default)]
    pub(crate) max_pairs: Option<usize>,
    /// Most waypoints in one directions request.
    #[arg(long = ARG_MAX_WAYPOINTS, value_name = "count")]
    #[serde(default)]
    pub(crate) max_waypoints: Option<usize>,
    /// Retries after a rate-limited request.
    #[arg(long = ARG_MAX_RETRIES, value_name = "count")]
    #[serde(default)]
    pub(crate) max_retries: Option<u32>,
    /// Backoff unit between retries, in milliseconds.
    #[arg(long = ARG_BACKOFF_MS, value_name = "ms")]
    #[serde(default)]
    pub(crate) backoff_ms: Option<u64>,
}

impl RebuildCacheArgs {
    pub(crate) fn into_config(self) -> Result<MappingConfig, CliError> {
        let merged = self.load_and_merge().map_err(CliError::Configuration)?;
        let limits = merged.limit_overrides();
        MappingConfig::resolve(
            merged.database,
            merged.api_key,
            merged.api_base_url,
            limits,
            ENV_REBUILD_CACHE_API_KEY,
        )
    }
}

/// CLI arguments for the `directions` subcommand.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
#[command(
    long_about = "Fetch turn-by-turn directions along every route of every \
                 stored schedule and print them as JSON.",
    about = "Print directions for every stored schedule route"
)]
#[ortho_config(prefix = "BINROUTE")]
pub(crate) struct DirectionsArgs {
    /// SQLite database holding the collections.
    #[arg(long = ARG_DATABASE, value_name = "path")]
    #[serde(default)]
    pub(crate) database: Option<Utf8PathBuf>,
    /// Key sent with every mapping request.
    #[arg(long = ARG_API_KEY, value_name = "key")]
    #[serde(default)]
    pub(crate) api_key: Option<String>,
    /// Base URL of the mapping API.
    #[arg(long = ARG_API_BASE_URL, value_name = "url")]
    #[serde(default)]
    pub(crate) api_base_url: Option<String>,
    /// Most origins in one matrix request.
    #[arg(long = ARG_MAX_ORIGINS, value_name = "count")]
    #[serde(default)]
    pub(crate) max_origins: Option<usize>,
    /// Most destinations in one matrix request.
    #[arg(long = ARG_MAX_DESTINATIONS, value_name = "count")]
    #[serde(default)]
    pub(crate) max_destinations: Option<usize>,
    /// Most origin/destination pairs in one matrix request.
    #[arg(long = ARG_MAX_PAIRS, value_name = "count")]
    #[serde(default)]
    pub(crate) max_pairs: Option<usize>,
    /// Most waypoints in one directions request.
    #[arg(long = ARG_MAX_WAYPOINTS, value_name = "count")]
    #[serde(default)]
    pub(crate) max_waypoints: Option<usize>,
    /// Retries after a rate-limited request.
    #[arg(long = ARG_MAX_RETRIES, value_name = "count")]
    #[serde(default)]
    pub(crate) max_retries: Option<u32>,
    /// Backoff unit between retries, in milliseconds.
    #[arg(long = ARG_BACKOFF_MS, value_name = "ms")]
    #[serde(default)]
    pub(crate) backoff_ms: Option<u64>,
}

impl DirectionsArgs {
    pub(crate) fn into_config(self) -> Result<MappingConfig, CliError> {
        let merged = self.load_and_merge().map_err(CliError::Configuration)?;
        let limits = merged.limit_overrides();
        MappingConfig::resolve(
            merged.database,
            merged.api_key,
            merged.api_base_url,
            limits,
            ENV_DIRECTIONS_API_KEY,
        )
    }
}

/// Adapter limits taken from the command line or configuration. Unset
/// values keep the [`AdapterLimits`] defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct LimitOverrides {
    pub(crate) max_origins: Option<usize>,
    pub(crate) max_destinations: Option<usize>,
    pub(crate) max_pairs: Option<usize>,
    pub(crate) max_waypoints: Option<usize>,
    pub(crate) max_retries: Option<u32>,
    pub(crate) backoff_ms: Option<u64>,
}

impl LimitOverrides {
    pub(crate) fn into_limits(self) -> AdapterLimits {
        let defaults = AdapterLimits::default();
        AdapterLimits {
            max_origins: self.max_origins.unwrap_or(defaults.max_origins),
            max_destinations: self.max_destinations.unwrap_or(defaults.max_destinations),
            max_pairs: self.max_pairs.unwrap_or(defaults.max_pairs),
            max_waypoints: self.max_waypoints.unwrap_or(defaults.max_waypoints),
            max_retries: self.max_retries.unwrap_or(defaults.max_retries),
            backoff_unit: self
                .backoff_ms
                .map_or(defaults.backoff_unit, Duration::from_millis),
        }
    }
}

macro_rules! impl_limit_overrides {
    ($($args:ty),+ $(,)?) => {
        $(
            impl $args {
                pub(crate) const fn limit_overrides(&self) -> LimitOverrides {
                    LimitOverrides {
                        max_origins: self.max_origins,
                        max_destinations: self.max_destinations,
                        max_pairs: self.max_pairs,
                        max_waypoints: self.max_waypoints,
                        max_retries: self.max_retries,
                        backoff_ms: self.backoff_ms,
                    }
                }
            }
        )+
    };
}

impl_limit_overrides!(RebuildCacheArgs, DirectionsArgs, ApplyArgs);

/// Resolved settings for commands that call the mapping service.
#[derive(Clone, PartialEq, Eq)]
pub(crate) struct MappingConfig {
    pub(crate) database: Utf8PathBuf,
    pub(crate) api_key: String,
    pub(crate) api_base_url: String,
    pub(crate) limits: AdapterLimits,
}

impl std::fmt::Debug for MappingConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MappingConfig")
            .field("database", &self.database)
            .field("api_key", &"<redacted>")
            .field("api_base_url", &self.api_base_url)
            .field("limits", &self.limits)
            .finish()
    }
}

impl MappingConfig {
    pub(crate) fn resolve(
        database: Option<Utf8PathBuf>,
        api_key: Option<String>,
        api_base_url: Option<String>,
        limits: LimitOverrides,
        api_key_env: &'static str,
    ) -> Result<Self, CliError> {
        let api_key = api_key
            .filter(|key| !key.trim().is_empty())
            .ok_or(CliError::MissingArgument {
                field: ARG_API_KEY,
                env: api_key_env,
            })?;
        let limits = limits.into_limits();
        limits.validate()?;
        Ok(Self {
            database: database_or_default(database),
            api_key,
            api_base_url: api_base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_owned()),
            limits,
        })
    }

    pub(crate) fn adapter(&self) -> Result<MappingAdapter<HttpMappingService>, CliError> {
        let service = HttpMappingService::with_config(
            HttpMappingServiceConfig::new(self.api_key.clone())
                .with_base_url(self.api_base_url.clone()),
        )
        .map_err(|source| CliError::BuildMappingService {
            base_url: self.api_base_url.clone(),
            source,
        })?;
        Ok(MappingAdapter::new(service, self.limits.clone())?)
    }
}

/// Directions for one route of one stored schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct ScheduleRouteDirections {
    pub(crate) schedule_id: String,
    pub(crate) vehicle_id: String,
    pub(crate) directions: RouteDirections,
}

pub(crate) async fn run_rebuild_cache(
    args: RebuildCacheArgs,
    writer: &mut dyn Write,
) -> Result<(), CliError> {
    let config = args.into_config()?;
    let store = open_store(&config.database)?;
    let report = rebuild_cache(store, config.adapter()?).await?;
    write_json(writer, &report)
}

pub(crate) async fn rebuild_cache<S: RecordStore, M: MappingService>(
    store: S,
    adapter: MappingAdapter<M>,
) -> Result<CacheReport, CliError> {
    Ok(DistanceCacheMaintainer::new(store, adapter).rebuild().await?)
}

pub(crate) async fn run_directions(
    args: DirectionsArgs,
    writer: &mut dyn Write,
) -> Result<(), CliError> {
    let config = args.into_config()?;
    let store = open_store(&config.database)?;
    let directions = schedule_directions(&store, &config.adapter()?).await?;
    write_json(writer, &directions)
}

pub(crate) async fn schedule_directions<S: RecordStore, M: MappingService>(
    store: &S,
    adapter: &MappingAdapter<M>,
) -> Result<Vec<ScheduleRouteDirections>, CliError> {
    let schedules = store.schedules().await?;
    let mut output = Vec::new();
    for schedule in &schedules {
        for route in &schedule.routes {
            output.push(ScheduleRouteDirections {
                schedule_id: schedule.id.clone(),
                vehicle_id: route.vehicle_id.clone(),
                directions: route_directions(adapter, route).await,
            });
        }
    }
    info!(
        "fetched directions for {} routes across {} schedules",
        output.len(),
        schedules.len()
    );
    Ok(output)
}
