//! Command-line interface for the Binroute collection-routing engine.
#![forbid(unsafe_code)]

use std::io::Write;

use binroute_core::SqliteRecordStore;
use camino::{Utf8Path, Utf8PathBuf};
use clap::{ArgAction, Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::filter::LevelFilter;

mod error;
mod mapping;
mod records;
mod schedule;

pub use error::CliError;

use mapping::{DirectionsArgs, RebuildCacheArgs};
use records::{ApplyArgs, ImportArgs};
use schedule::ScheduleArgs;

const ARG_DATABASE: &str = "database";
const ARG_API_KEY: &str = "api-key";
const ARG_API_BASE_URL: &str = "api-base-url";
const ARG_SOLVER_PATH: &str = "solver-path";
const ARG_COLLECT_RATIO: &str = "collect-ratio";
const ARG_STRATEGIES: &str = "strategies";
const ARG_MATRIX_METRIC: &str = "matrix-metric";
const ARG_MAX_ORIGINS: &str = "max-origins";
const ARG_MAX_DESTINATIONS: &str = "max-destinations";
const ARG_MAX_PAIRS: &str = "max-pairs";
const ARG_MAX_WAYPOINTS: &str = "max-waypoints";
const ARG_MAX_RETRIES: &str = "max-retries";
const ARG_BACKOFF_MS: &str = "backoff-ms";
const ARG_RECORDS: &str = "records";
const ARG_CHANGES: &str = "changes";
const ENV_IMPORT_RECORDS: &str = "BINROUTE_CMDS_IMPORT_RECORDS";
const ENV_APPLY_CHANGES: &str = "BINROUTE_CMDS_APPLY_CHANGES";
const ENV_APPLY_API_KEY: &str = "BINROUTE_CMDS_APPLY_API_KEY";
const ENV_REBUILD_CACHE_API_KEY: &str = "BINROUTE_CMDS_REBUILD_CACHE_API_KEY";
const ENV_DIRECTIONS_API_KEY: &str = "BINROUTE_CMDS_DIRECTIONS_API_KEY";
const ENV_SCHEDULE_SOLVER_PATH: &str = "BINROUTE_CMDS_SCHEDULE_SOLVER_PATH";

const DEFAULT_DATABASE: &str = "binroute.db";

/// Run the Binroute CLI with the current process arguments and environment.
///
/// # Errors
///
/// Returns [`CliError`] when arguments or configuration are invalid, or when
/// the selected command fails.
pub fn run() -> Result<(), CliError> {
    let cli = Cli::try_parse().map_err(CliError::ArgumentParsing)?;
    init_logging(cli.verbose)?;
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(CliError::Runtime)?;
    let mut stdout = std::io::stdout().lock();
    runtime.block_on(dispatch(cli.command, &mut stdout))
}

async fn dispatch(command: Command, writer: &mut dyn Write) -> Result<(), CliError> {
    match command {
        Command::Import(args) => records::run_import(args, writer).await,
        Command::RebuildCache(args) => mapping::run_rebuild_cache(args, writer).await,
        Command::Apply(args) => records::run_apply(args, writer).await,
        Command::Schedule(args) => schedule::run_schedule(args, writer).await,
        Command::Directions(args) => mapping::run_directions(args, writer).await,
    }
}

fn init_logging(verbose: u8) -> Result<(), CliError> {
    let level = match verbose {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(CliError::Logging)
}

#[derive(Debug, Parser)]
#[command(
    name = "binroute",
    about = "Maintain the distance cache and build waste-collection schedules",
    version
)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Bulk-insert depots, bins and vehicles from a JSON file.
    Import(ImportArgs),
    /// Recompute every cached leg from the mapping service.
    RebuildCache(RebuildCacheArgs),
    /// Write bin mutations and refresh the legs they touch.
    Apply(ApplyArgs),
    /// Build and persist collection schedules.
    Schedule(ScheduleArgs),
    /// Print turn-by-turn directions for every stored schedule route.
    Directions(DirectionsArgs),
}

fn database_or_default(database: Option<Utf8PathBuf>) -> Utf8PathBuf {
    database.unwrap_or_else(|| Utf8PathBuf::from(DEFAULT_DATABASE))
}

fn open_store(path: &Utf8Path) -> Result<SqliteRecordStore, CliError> {
    SqliteRecordStore::open(path).map_err(|source| CliError::OpenStore {
        path: path.to_path_buf(),
        source,
    })
}

fn write_json<T: Serialize>(writer: &mut dyn Write, value: &T) -> Result<(), CliError> {
    let payload = serde_json::to_string_pretty(value).map_err(CliError::SerializeOutput)?;
    writer
        .write_all(payload.as_bytes())
        .map_err(CliError::WriteOutput)?;
    writer.write_all(b"\n").map_err(CliError::WriteOutput)?;
    Ok(())
}

#[cfg(test)]
mod tests;
