//! Test helpers for CLI input files, test doubles and layered overrides.

use super::*;
use binroute_core::test_support::HaversineMappingService;
use binroute_data::routing::{AdapterLimits, MappingAdapter};
use std::fs;
use tempfile::TempDir;
use tokio::runtime::Runtime;

/// A depot, two smart bins (one due), a dumb bin linked to the due smart bin
/// and one vehicle.
pub(super) const RECORDS_JSON: &str = r#"{
    "depots": [{ "id": "hq", "location": { "x": 2.35, "y": 48.85 } }],
    "smart_bins": [
        { "id": "s1", "location": { "x": 2.36, "y": 48.85 }, "current_fullness": 9.0, "threshold": 10.0 },
        { "id": "s2", "location": { "x": 2.37, "y": 48.86 }, "current_fullness": 2.0, "threshold": 10.0 }
    ],
    "dumb_bins": [
        { "id": "d1", "location": { "x": 2.34, "y": 48.84 }, "capacity": 20.0, "nearest_smart_bin": "s1" }
    ],
    "vehicles": [{ "id": "truck", "capacity": 60.0 }]
}"#;

/// Temporary directory with UTF-8 paths.
pub(super) struct Workspace {
    _dir: TempDir,
    root: Utf8PathBuf,
}

impl Workspace {
    pub(super) fn new() -> Self {
        let dir = TempDir::new().expect("tempdir");
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf-8 workspace");
        Self { _dir: dir, root }
    }

    pub(super) fn path(&self, name: &str) -> Utf8PathBuf {
        self.root.join(name)
    }

    pub(super) fn write(&self, name: &str, contents: &str) -> Utf8PathBuf {
        let path = self.path(name);
        fs::write(path.as_std_path(), contents).expect("write input file");
        path
    }
}

impl std::fmt::Debug for Workspace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workspace").field("root", &self.root).finish()
    }
}

pub(super) fn runtime() -> Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("build runtime")
}

pub(super) fn haversine_adapter() -> MappingAdapter<HaversineMappingService> {
    MappingAdapter::new(HaversineMappingService::default(), AdapterLimits::default())
        .expect("default limits are valid")
}

pub(super) fn parse_records(json: &str) -> records::RecordsFile {
    serde_json::from_str(json).expect("valid records file")
}

/// Schedule settings supplied by a config file or the environment.
#[derive(Debug, Clone, Default)]
pub(super) struct LayerOverrides {
    pub(super) solver_path: Option<Utf8PathBuf>,
    pub(super) collect_ratio: Option<f64>,
    pub(super) strategies: Option<String>,
}

/// Resolve `cli_args` with environment values taking precedence over file
/// values, and CLI values over both.
pub(super) fn merge_layers(
    mut cli_args: schedule::ScheduleArgs,
    file_layer: Option<LayerOverrides>,
    env_layer: Option<LayerOverrides>,
) -> Result<schedule::ScheduleConfig, CliError> {
    merge_field(
        &mut cli_args.solver_path,
        extract_field(env_layer.as_ref(), |layer| &layer.solver_path),
        extract_field(file_layer.as_ref(), |layer| &layer.solver_path),
    );
    merge_field(
        &mut cli_args.collect_ratio,
        extract_field(env_layer.as_ref(), |layer| &layer.collect_ratio),
        extract_field(file_layer.as_ref(), |layer| &layer.collect_ratio),
    );
    merge_field(
        &mut cli_args.strategies,
        extract_field(env_layer.as_ref(), |layer| &layer.strategies),
        extract_field(file_layer.as_ref(), |layer| &layer.strategies),
    );
    schedule::ScheduleConfig::try_from(cli_args)
}

fn merge_field<T>(target: &mut Option<T>, env_value: Option<T>, file_value: Option<T>) {
    if target.is_none()
        && let Some(value) = env_value.or(file_value)
    {
        *target = Some(value);
    }
}

fn extract_field<T: Clone>(
    layer: Option<&LayerOverrides>,
    accessor: fn(&LayerOverrides) -> &Option<T>,
) -> Option<T> {
    layer.and_then(|entry| accessor(entry).clone())
}
