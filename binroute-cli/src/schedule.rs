//! Schedule command implementation for the Binroute CLI.

use std::io::Write;

use binroute_core::{RecordStore, RoutingStrategy};
use binroute_planner::{
    BuildReport, DEFAULT_COLLECT_RATIO, MatrixMetric, ScheduleBuilder, ScheduleBuilderConfig,
};
use binroute_solver::{RouteSolver, SolverProcess, SolverProcessConfig};
use camino::Utf8PathBuf;
use clap::Parser;
use ortho_config::{OrthoConfig, SubcmdConfigMerge};
use serde::{Deserialize, Serialize};

use crate::{
    ARG_COLLECT_RATIO, ARG_DATABASE, ARG_MATRIX_METRIC, ARG_SOLVER_PATH, ARG_STRATEGIES, CliError,
    ENV_SCHEDULE_SOLVER_PATH, database_or_default, open_store, write_json,
};

/// CLI arguments for the `schedule` subcommand.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
#[command(
    long_about = "Select the bins that are due, run the route optimiser \
                 under each configured strategy against the cached legs and \
                 replace the stored schedules with one per distinct result.",
    about = "Build and persist collection schedules"
)]
#[ortho_config(prefix = "BINROUTE")]
pub(crate) struct ScheduleArgs {
    /// SQLite database holding the collections.
    #[arg(long = ARG_DATABASE, value_name = "path")]
    #[serde(default)]
    pub(crate) database: Option<Utf8PathBuf>,
    /// Route optimiser executable.
    #[arg(long = ARG_SOLVER_PATH, value_name = "path")]
    #[serde(default)]
    pub(crate) solver_path: Option<Utf8PathBuf>,
    /// Minimum smart-bin fullness ratio to collect (default 0.8).
    #[arg(long = ARG_COLLECT_RATIO, value_name = "ratio")]
    #[serde(default)]
    pub(crate) collect_ratio: Option<f64>,
    /// Comma-separated strategy names to try, in order (default: all).
    #[arg(long = ARG_STRATEGIES, value_name = "names")]
    #[serde(default)]
    pub(crate) strategies: Option<String>,
    /// Cost the optimiser minimises: distance or duration.
    #[arg(long = ARG_MATRIX_METRIC, value_name = "metric")]
    #[serde(default)]
    pub(crate) matrix_metric: Option<String>,
}

impl ScheduleArgs {
    pub(crate) fn into_config(self) -> Result<ScheduleConfig, CliError> {
        let merged = self.load_and_merge().map_err(CliError::Configuration)?;
        ScheduleConfig::try_from(merged)
    }
}

/// Resolved `schedule` command configuration.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ScheduleConfig {
    pub(crate) database: Utf8PathBuf,
    pub(crate) solver_path: Utf8PathBuf,
    pub(crate) builder: ScheduleBuilderConfig,
}

impl TryFrom<ScheduleArgs> for ScheduleConfig {
    type Error = CliError;

    fn try_from(args: ScheduleArgs) -> Result<Self, Self::Error> {
        let solver_path = args.solver_path.ok_or(CliError::MissingArgument {
            field: ARG_SOLVER_PATH,
            env: ENV_SCHEDULE_SOLVER_PATH,
        })?;
        let collect_ratio = args.collect_ratio.unwrap_or(DEFAULT_COLLECT_RATIO);
        if !collect_ratio.is_finite() || collect_ratio < 0.0 {
            return Err(CliError::InvalidCollectRatio(collect_ratio));
        }
        let strategies = match args.strategies.as_deref() {
            Some(names) => parse_strategies(names)?,
            None => RoutingStrategy::ALL.to_vec(),
        };
        let metric = match args.matrix_metric.as_deref() {
            Some(name) => name.parse()?,
            None => MatrixMetric::default(),
        };
        Ok(Self {
            database: database_or_default(args.database),
            solver_path,
            builder: ScheduleBuilderConfig::default()
                .with_collect_ratio(collect_ratio)
                .with_strategies(strategies)
                .with_metric(metric),
        })
    }
}

/// Parse a comma-separated strategy list, skipping blank entries.
pub(crate) fn parse_strategies(names: &str) -> Result<Vec<RoutingStrategy>, CliError> {
    names
        .split(',')
        .filter(|name| !name.trim().is_empty())
        .map(|name| name.parse().map_err(CliError::from))
        .collect()
}

pub(crate) async fn run_schedule(
    args: ScheduleArgs,
    writer: &mut dyn Write,
) -> Result<(), CliError> {
    let config = args.into_config()?;
    let store = open_store(&config.database)?;
    let solver = SolverProcess::new(SolverProcessConfig::new(config.solver_path.clone()));
    let report = build_schedules(store, solver, config.builder).await?;
    write_json(writer, &report)
}

pub(crate) async fn build_schedules<S: RecordStore, R: RouteSolver>(
    store: S,
    solver: R,
    config: ScheduleBuilderConfig,
) -> Result<BuildReport, CliError> {
    let mut builder = ScheduleBuilder::new(store, solver, config);
    Ok(builder.build().await?)
}

#[cfg(test)]
pub(crate) fn config_from_layers_for_test(
    layers: Vec<ortho_config::MergeLayer<'static>>,
) -> Result<ScheduleConfig, CliError> {
    let merged = ScheduleArgs::merge_from_layers(layers).map_err(CliError::from)?;
    ScheduleConfig::try_from(merged)
}
