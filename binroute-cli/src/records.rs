//! Record-writing commands: `import` and `apply`.

use std::fs::File;
use std::io::{BufReader, Write};

use binroute_core::{
    BulkWriteSummary, Depot, Document, DumbBin, FleetVehicle, MappingService, NodeKind,
    RecordStore, SmartBin, WriteOp, validate_location,
};
use binroute_data::routing::MappingAdapter;
use binroute_data::{CacheReport, DistanceCacheMaintainer, NodeChanges};
use camino::{Utf8Path, Utf8PathBuf};
use clap::Parser;
use geo::Coord;
use log::info;
use ortho_config::{OrthoConfig, SubcmdConfigMerge};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::mapping::MappingConfig;
use crate::{
    ARG_API_BASE_URL, ARG_API_KEY, ARG_BACKOFF_MS, ARG_CHANGES, ARG_DATABASE,
    ARG_MAX_DESTINATIONS, ARG_MAX_ORIGINS, ARG_MAX_PAIRS, ARG_MAX_RETRIES, ARG_MAX_WAYPOINTS,
    ARG_RECORDS, CliError, ENV_APPLY_API_KEY, ENV_APPLY_CHANGES, ENV_IMPORT_RECORDS,
    database_or_default, open_store, write_json,
};

/// CLI arguments for the `import` subcommand.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
#[command(
    long_about = "Insert depots, smart bins, dumb bins and vehicles from a \
                 JSON file with one array per collection. Ids must be new.",
    about = "Bulk-insert records from a JSON file"
)]
#[ortho_config(prefix = "BINROUTE")]
pub(crate) struct ImportArgs {
    /// JSON file with `depots`, `smart_bins`, `dumb_bins` and `vehicles`.
    #[arg(value_name = "path")]
    #[serde(default)]
    pub(crate) records: Option<Utf8PathBuf>,
    /// SQLite database holding the collections.
    #[arg(long = ARG_DATABASE, value_name = "path")]
    #[serde(default)]
    pub(crate) database: Option<Utf8PathBuf>,
}

impl ImportArgs {
    pub(crate) fn into_config(self) -> Result<ImportConfig, CliError> {
        let merged = self.load_and_merge().map_err(CliError::Configuration)?;
        ImportConfig::try_from(merged)
    }
}

/// Resolved `import` command configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ImportConfig {
    pub(crate) records: Utf8PathBuf,
    pub(crate) database: Utf8PathBuf,
}

impl TryFrom<ImportArgs> for ImportConfig {
    type Error = CliError;

    fn try_from(args: ImportArgs) -> Result<Self, Self::Error> {
        let records = args.records.ok_or(CliError::MissingArgument {
            field: ARG_RECORDS,
            env: ENV_IMPORT_RECORDS,
        })?;
        Ok(Self {
            records,
            database: database_or_default(args.database),
        })
    }
}

/// CLI arguments for the `apply` subcommand.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
#[command(
    long_about = "Write created, updated and deleted bins from a JSON file, \
                 then recompute only the cached legs those bins touch.",
    about = "Apply bin mutations and refresh the distance cache"
)]
#[ortho_config(prefix = "BINROUTE")]
pub(crate) struct ApplyArgs {
    /// JSON file with `smart_bins` and `dumb_bins` change sets.
    #[arg(value_name = "path")]
    #[serde(default)]
    pub(crate) changes: Option<Utf8PathBuf>,
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

impl ApplyArgs {
    pub(crate) fn into_config(self) -> Result<ApplyConfig, CliError> {
        let merged = self.load_and_merge().map_err(CliError::Configuration)?;
        ApplyConfig::try_from(merged)
    }
}

/// Resolved `apply` command configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ApplyConfig {
    pub(crate) changes: Utf8PathBuf,
    pub(crate) mapping: MappingConfig,
}

impl TryFrom<ApplyArgs> for ApplyConfig {
    type Error = CliError;

    fn try_from(args: ApplyArgs) -> Result<Self, Self::Error> {
        let limits = args.limit_overrides();
        let changes = args.changes.ok_or(CliError::MissingArgument {
            field: ARG_CHANGES,
            env: ENV_APPLY_CHANGES,
        })?;
        let mapping = MappingConfig::resolve(
            args.database,
            args.api_key,
            args.api_base_url,
            limits,
            ENV_APPLY_API_KEY,
        )?;
        Ok(Self { changes, mapping })
    }
}

/// Contents of an `import` file.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct RecordsFile {
    pub(crate) depots: Vec<Depot>,
    pub(crate) smart_bins: Vec<SmartBin>,
    pub(crate) dumb_bins: Vec<DumbBin>,
    pub(crate) vehicles: Vec<FleetVehicle>,
}

impl RecordsFile {
    fn validate(&self) -> Result<(), CliError> {
        let depots = self.depots.iter().map(|d| (d.id.as_str(), d.location));
        let smart = self.smart_bins.iter().map(|b| (b.id.as_str(), b.location));
        let dumb = self.dumb_bins.iter().map(|b| (b.id.as_str(), b.location));
        depots
            .chain(smart)
            .chain(dumb)
            .try_for_each(|(id, location)| check_location(id, location))
    }
}

/// Records written by `import`, per collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub(crate) struct ImportSummary {
    pub(crate) depots: usize,
    pub(crate) smart_bins: usize,
    pub(crate) dumb_bins: usize,
    pub(crate) vehicles: usize,
}

/// Mutations to one bin collection.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields, bound = "D: Document")]
pub(crate) struct BinChanges<D> {
    pub(crate) created: Vec<D>,
    pub(crate) updated: Vec<D>,
    pub(crate) deleted: Vec<String>,
}

impl<D> Default for BinChanges<D> {
    fn default() -> Self {
        Self {
            created: Vec::new(),
            updated: Vec::new(),
            deleted: Vec::new(),
        }
    }
}

impl<D: Document> BinChanges<D> {
    fn operations(&self) -> Vec<WriteOp<D>> {
        let created = self.created.iter().cloned().map(WriteOp::Insert);
        let updated = self.updated.iter().cloned().map(WriteOp::Update);
        let deleted = self.deleted.iter().cloned().map(WriteOp::Delete);
        created.chain(updated).chain(deleted).collect()
    }

    fn node_changes(&self, kind: NodeKind) -> NodeChanges {
        let ids = |records: &[D]| -> Vec<String> {
            records.iter().map(|r| r.id().to_owned()).collect()
        };
        NodeChanges {
            kind,
            deleted: self.deleted.clone(),
            created: ids(&self.created),
            updated: ids(&self.updated),
        }
    }
}

/// Contents of an `apply` file.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct ChangesFile {
    pub(crate) smart_bins: BinChanges<SmartBin>,
    pub(crate) dumb_bins: BinChanges<DumbBin>,
}

impl ChangesFile {
    fn validate(&self) -> Result<(), CliError> {
        let smart = self
            .smart_bins
            .created
            .iter()
            .chain(&self.smart_bins.updated)
            .map(|b| (b.id.as_str(), b.location));
        let dumb = self
            .dumb_bins
            .created
            .iter()
            .chain(&self.dumb_bins.updated)
            .map(|b| (b.id.as_str(), b.location));
        smart
            .chain(dumb)
            .try_for_each(|(id, location)| check_location(id, location))
    }
}

/// Writes and cache updates performed for one bin kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub(crate) struct KindSummary {
    pub(crate) inserted: usize,
    pub(crate) updated: usize,
    pub(crate) deleted: usize,
    pub(crate) cache: CacheReport,
}

/// Output of `apply`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub(crate) struct ApplySummary {
    pub(crate) smart_bins: KindSummary,
    pub(crate) dumb_bins: KindSummary,
}

fn check_location(id: &str, location: Coord<f64>) -> Result<(), CliError> {
    validate_location(location).map_err(|source| CliError::InvalidLocation {
        id: id.to_owned(),
        source,
    })
}

/// Read and decode a JSON input file.
pub(crate) fn load_json<T: DeserializeOwned>(path: &Utf8Path) -> Result<T, CliError> {
    let file = File::open(path.as_std_path()).map_err(|source| CliError::ReadInput {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_reader(BufReader::new(file)).map_err(|source| CliError::ParseInput {
        path: path.to_path_buf(),
        source,
    })
}

pub(crate) async fn run_import(args: ImportArgs, writer: &mut dyn Write) -> Result<(), CliError> {
    let config = args.into_config()?;
    let file: RecordsFile = load_json(&config.records)?;
    let store = open_store(&config.database)?;
    let summary = import_records(&store, file).await?;
    write_json(writer, &summary)
}

/// Insert every record in `file`, one collection at a time.
///
/// Locations are validated before anything is written. Each collection is
/// written atomically; a failure leaves earlier collections in place.
pub(crate) async fn import_records<S: RecordStore>(
    store: &S,
    file: RecordsFile,
) -> Result<ImportSummary, CliError> {
    file.validate()?;
    let summary = ImportSummary {
        depots: insert_all(store, file.depots).await?,
        smart_bins: insert_all(store, file.smart_bins).await?,
        dumb_bins: insert_all(store, file.dumb_bins).await?,
        vehicles: insert_all(store, file.vehicles).await?,
    };
    info!(
        "imported {} depots, {} smart bins, {} dumb bins and {} vehicles",
        summary.depots, summary.smart_bins, summary.dumb_bins, summary.vehicles
    );
    Ok(summary)
}

async fn insert_all<S: RecordStore, D: Document>(
    store: &S,
    records: Vec<D>,
) -> Result<usize, CliError> {
    if records.is_empty() {
        return Ok(0);
    }
    let operations = records.into_iter().map(WriteOp::Insert).collect();
    Ok(store.bulk_write(operations).await?.inserted)
}

pub(crate) async fn run_apply(args: ApplyArgs, writer: &mut dyn Write) -> Result<(), CliError> {
    let config = args.into_config()?;
    let file: ChangesFile = load_json(&config.changes)?;
    let store = open_store(&config.mapping.database)?;
    let adapter = config.mapping.adapter()?;
    let summary = apply_changes(&store, store.clone(), adapter, &file).await?;
    write_json(writer, &summary)
}

/// Write the bin mutations in `file`, then refresh the legs they touch.
///
/// Smart bins are handled before dumb bins. Each kind's records are written
/// atomically and its cache update only runs once the write succeeded.
pub(crate) async fn apply_changes<S: RecordStore, M: MappingService>(
    store: &S,
    cache_store: S,
    adapter: MappingAdapter<M>,
    file: &ChangesFile,
) -> Result<ApplySummary, CliError> {
    file.validate()?;
    let maintainer = DistanceCacheMaintainer::new(cache_store, adapter);
    let smart_bins = apply_kind(store, &maintainer, &file.smart_bins, NodeKind::SmartBin).await?;
    let dumb_bins = apply_kind(store, &maintainer, &file.dumb_bins, NodeKind::DumbBin).await?;
    Ok(ApplySummary {
        smart_bins,
        dumb_bins,
    })
}

async fn apply_kind<S: RecordStore, M: MappingService, D: Document>(
    store: &S,
    maintainer: &DistanceCacheMaintainer<S, M>,
    changes: &BinChanges<D>,
    kind: NodeKind,
) -> Result<KindSummary, CliError> {
    let operations = changes.operations();
    if operations.is_empty() {
        return Ok(KindSummary::default());
    }
    let BulkWriteSummary {
        inserted,
        updated,
        deleted,
    } = store.bulk_write(operations).await?;
    let cache = maintainer.apply_changes(&changes.node_changes(kind)).await?;
    Ok(KindSummary {
        inserted,
        updated,
        deleted,
        cache,
    })
}
