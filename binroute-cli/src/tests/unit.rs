//! Focused unit tests covering CLI argument parsing and configuration
//! resolution.

use super::helpers::{LayerOverrides, merge_layers};
use super::*;
use binroute_core::RoutingStrategy;
use binroute_data::routing::{AdapterLimits, AdapterLimitsError, DEFAULT_BASE_URL};
use binroute_planner::MatrixMetric;
use mapping::{LimitOverrides, MappingConfig};
use records::{ApplyConfig, ImportConfig};
use rstest::rstest;
use schedule::{ScheduleConfig, parse_strategies};
use std::time::Duration;

fn parse(argv: &[&str]) -> Command {
    let mut invocation = vec!["binroute"];
    invocation.extend_from_slice(argv);
    Cli::try_parse_from(invocation)
        .expect("arguments should parse")
        .command
}

#[rstest]
fn import_without_records_errors() {
    let err = ImportConfig::try_from(ImportArgs::default()).expect_err("missing records");
    match err {
        CliError::MissingArgument { field, env } => {
            assert_eq!(field, ARG_RECORDS);
            assert_eq!(env, ENV_IMPORT_RECORDS);
        }
        other => panic!("expected MissingArgument, found {other:?}"),
    }
}

#[rstest]
fn import_defaults_database_path() {
    let Command::Import(args) = parse(&["import", "records.json"]) else {
        panic!("expected import command");
    };
    let config = ImportConfig::try_from(args).expect("config should build");
    assert_eq!(config.records, Utf8PathBuf::from("records.json"));
    assert_eq!(config.database, Utf8PathBuf::from(DEFAULT_DATABASE));
}

#[rstest]
#[case(None, Some("key"), ARG_CHANGES, ENV_APPLY_CHANGES)]
#[case(Some("changes.json"), None, ARG_API_KEY, ENV_APPLY_API_KEY)]
#[case(Some("changes.json"), Some("  "), ARG_API_KEY, ENV_APPLY_API_KEY)]
fn apply_without_required_fields_errors(
    #[case] changes: Option<&str>,
    #[case] api_key: Option<&str>,
    #[case] expected_field: &'static str,
    #[case] expected_env: &'static str,
) {
    let args = ApplyArgs {
        changes: changes.map(Utf8PathBuf::from),
        api_key: api_key.map(str::to_owned),
        ..ApplyArgs::default()
    };
    let err = ApplyConfig::try_from(args).expect_err("missing field should error");
    match err {
        CliError::MissingArgument { field, env } => {
            assert_eq!(field, expected_field);
            assert_eq!(env, expected_env);
        }
        other => panic!("expected MissingArgument, found {other:?}"),
    }
}

#[rstest]
fn mapping_config_defaults_base_url_and_database() {
    let config = MappingConfig::resolve(
        None,
        Some("secret".into()),
        None,
        LimitOverrides::default(),
        ENV_DIRECTIONS_API_KEY,
    )
    .expect("config should build");
    assert_eq!(config.api_base_url, DEFAULT_BASE_URL);
    assert_eq!(config.database, Utf8PathBuf::from(DEFAULT_DATABASE));
    assert_eq!(config.api_key, "secret");
}

#[rstest]
fn mapping_config_debug_hides_api_key() {
    let config = MappingConfig::resolve(
        Some(Utf8PathBuf::from("bins.db")),
        Some("very-secret".into()),
        Some("http://localhost:9000".into()),
        LimitOverrides::default(),
        ENV_REBUILD_CACHE_API_KEY,
    )
    .expect("config should build");
    let rendered = format!("{config:?}");
    assert!(!rendered.contains("very-secret"), "{rendered}");
    assert!(rendered.contains("localhost:9000"), "{rendered}");
}

#[rstest]
fn mapping_config_builds_adapter() {
    let config = MappingConfig::resolve(
        None,
        Some("key".into()),
        None,
        LimitOverrides::default(),
        ENV_DIRECTIONS_API_KEY,
    )
    .expect("config should build");
    config.adapter().expect("adapter should build");
}

#[rstest]
fn mapping_limits_come_from_flags() {
    let Command::Directions(args) = parse(&[
        "directions",
        "--api-key",
        "k",
        "--max-waypoints",
        "10",
        "--max-retries",
        "5",
        "--backoff-ms",
        "250",
    ]) else {
        panic!("expected directions command");
    };
    let config = MappingConfig::resolve(
        args.database.clone(),
        args.api_key.clone(),
        args.api_base_url.clone(),
        args.limit_overrides(),
        ENV_DIRECTIONS_API_KEY,
    )
    .expect("config should build");
    let defaults = AdapterLimits::default();
    assert_eq!(config.limits.max_waypoints, 10);
    assert_eq!(config.limits.max_retries, 5);
    assert_eq!(config.limits.backoff_unit, Duration::from_millis(250));
    assert_eq!(config.limits.max_origins, defaults.max_origins);
    assert_eq!(config.limits.max_pairs, defaults.max_pairs);
}

#[rstest]
fn mapping_limits_reject_stalling_values() {
    let limits = LimitOverrides {
        max_pairs: Some(0),
        ..LimitOverrides::default()
    };
    let err = MappingConfig::resolve(None, Some("k".into()), None, limits, ENV_APPLY_API_KEY)
        .expect_err("zero pair cap");
    match err {
        CliError::AdapterLimits(AdapterLimitsError::Zero { field }) => {
            assert_eq!(field, "max_pairs");
        }
        other => panic!("expected AdapterLimits, found {other:?}"),
    }
}

#[rstest]
fn rebuild_cache_reads_flags() {
    let Command::RebuildCache(args) = parse(&[
        "rebuild-cache",
        "--database",
        "bins.db",
        "--api-key",
        "k",
        "--api-base-url",
        "http://maps.test",
    ]) else {
        panic!("expected rebuild-cache command");
    };
    assert_eq!(args.database, Some(Utf8PathBuf::from("bins.db")));
    assert_eq!(args.api_key.as_deref(), Some("k"));
    assert_eq!(args.api_base_url.as_deref(), Some("http://maps.test"));
}

#[rstest]
fn schedule_without_solver_errors() {
    let err = ScheduleConfig::try_from(schedule::ScheduleArgs::default())
        .expect_err("missing solver should error");
    match err {
        CliError::MissingArgument { field, env } => {
            assert_eq!(field, ARG_SOLVER_PATH);
            assert_eq!(env, ENV_SCHEDULE_SOLVER_PATH);
        }
        other => panic!("expected MissingArgument, found {other:?}"),
    }
}

#[rstest]
fn schedule_defaults_builder_settings() {
    let Command::Schedule(args) = parse(&["schedule", "--solver-path", "/opt/vrp"]) else {
        panic!("expected schedule command");
    };
    let config = ScheduleConfig::try_from(args).expect("config should build");
    assert_eq!(config.solver_path, Utf8PathBuf::from("/opt/vrp"));
    assert!((config.builder.collect_ratio - 0.8).abs() < f64::EPSILON);
    assert_eq!(config.builder.strategies, RoutingStrategy::ALL.to_vec());
    assert_eq!(config.builder.metric, MatrixMetric::Distance);
}

#[rstest]
fn schedule_reads_tuning_flags() {
    let Command::Schedule(args) = parse(&[
        "schedule",
        "--solver-path",
        "vrp",
        "--collect-ratio",
        "0.5",
        "--strategies",
        "savings, sweep",
        "--matrix-metric",
        "duration",
    ]) else {
        panic!("expected schedule command");
    };
    let config = ScheduleConfig::try_from(args).expect("config should build");
    assert!((config.builder.collect_ratio - 0.5).abs() < f64::EPSILON);
    assert_eq!(
        config.builder.strategies,
        vec![RoutingStrategy::Savings, RoutingStrategy::Sweep]
    );
    assert_eq!(config.builder.metric, MatrixMetric::Duration);
}

#[rstest]
#[case(-0.1)]
#[case(f64::NAN)]
#[case(f64::INFINITY)]
fn schedule_rejects_bad_collect_ratio(#[case] ratio: f64) {
    let args = schedule::ScheduleArgs {
        solver_path: Some(Utf8PathBuf::from("vrp")),
        collect_ratio: Some(ratio),
        ..schedule::ScheduleArgs::default()
    };
    let err = ScheduleConfig::try_from(args).expect_err("ratio should be rejected");
    assert!(matches!(err, CliError::InvalidCollectRatio(_)), "{err:?}");
}

#[rstest]
fn schedule_rejects_unknown_metric() {
    let args = schedule::ScheduleArgs {
        solver_path: Some(Utf8PathBuf::from("vrp")),
        matrix_metric: Some("fuel".into()),
        ..schedule::ScheduleArgs::default()
    };
    let err = ScheduleConfig::try_from(args).expect_err("metric should be rejected");
    match err {
        CliError::InvalidMetric(inner) => assert_eq!(inner.name, "fuel"),
        other => panic!("expected InvalidMetric, found {other:?}"),
    }
}

#[rstest]
fn strategy_list_rejects_unknown_names() {
    let err = parse_strategies("savings,teleport").expect_err("unknown strategy");
    match err {
        CliError::InvalidStrategy(inner) => assert_eq!(inner.name, "teleport"),
        other => panic!("expected InvalidStrategy, found {other:?}"),
    }
}

#[rstest]
fn strategy_list_skips_blank_entries() {
    let strategies = parse_strategies("automatic,, sweep ,").expect("strategies parse");
    assert_eq!(
        strategies,
        vec![RoutingStrategy::Automatic, RoutingStrategy::Sweep]
    );
}

#[rstest]
fn cli_layer_wins_over_env_and_file() {
    let args = schedule::ScheduleArgs {
        solver_path: Some(Utf8PathBuf::from("cli-solver")),
        ..schedule::ScheduleArgs::default()
    };
    let file = LayerOverrides {
        solver_path: Some(Utf8PathBuf::from("file-solver")),
        collect_ratio: Some(0.3),
        strategies: Some("sweep".into()),
    };
    let env = LayerOverrides {
        collect_ratio: Some(0.6),
        ..LayerOverrides::default()
    };
    let config = merge_layers(args, Some(file), Some(env)).expect("config should build");
    assert_eq!(config.solver_path, Utf8PathBuf::from("cli-solver"));
    assert!((config.builder.collect_ratio - 0.6).abs() < f64::EPSILON);
    assert_eq!(config.builder.strategies, vec![RoutingStrategy::Sweep]);
}

#[rstest]
fn verbose_flag_is_global() {
    let cli = Cli::try_parse_from(["binroute", "schedule", "-vv", "--solver-path", "vrp"])
        .expect("arguments should parse");
    assert_eq!(cli.verbose, 2);
}

#[rstest]
fn unknown_subcommand_is_a_parse_error() {
    let err = Cli::try_parse_from(["binroute", "optimise"]).expect_err("unknown command");
    let err = CliError::from(err);
    assert!(matches!(err, CliError::ArgumentParsing(_)), "{err:?}");
}

#[rstest]
fn invalid_config_layer_maps_to_configuration_error() {
    use ortho_config::MergeComposer;
    use serde_json::json;

    let mut composer = MergeComposer::new();
    composer.push_cli(json!({ "collect_ratio": "nearly full" }));

    let err = schedule::config_from_layers_for_test(composer.layers())
        .expect_err("invalid config layer should map to CliError::Configuration");
    match err {
        CliError::Configuration(_) => {}
        other => panic!("expected CliError::Configuration, found {other:?}"),
    }
}

#[rstest]
fn ortho_layers_honour_precedence() {
    use ortho_config::MergeComposer;
    use serde_json::json;

    let mut composer = MergeComposer::new();
    composer.push_file(
        json!({
            "solver_path": "/from/file",
            "collect_ratio": 0.4,
            "matrix_metric": "duration",
        }),
        None,
    );
    composer.push_environment(json!({
        "solver_path": "/from/env",
        "collect_ratio": 0.7,
    }));
    composer.push_cli(json!({ "solver_path": "/from/cli" }));

    let config = schedule::config_from_layers_for_test(composer.layers())
        .expect("merged config should build");
    assert_eq!(config.solver_path, Utf8PathBuf::from("/from/cli"));
    assert!((config.builder.collect_ratio - 0.7).abs() < f64::EPSILON);
    assert_eq!(config.builder.metric, MatrixMetric::Duration);
    assert_eq!(config.database, Utf8PathBuf::from(DEFAULT_DATABASE));
}
