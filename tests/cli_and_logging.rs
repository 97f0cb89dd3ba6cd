// tests/cli_and_logging.rs

use std::error::Error;
use std::path::PathBuf;

use clap::Parser;
use flowsched::cli::{CliArgs, LogLevel};
use flowsched::logging::resolve_level;

type TestResult = Result<(), Box<dyn Error>>;

#[test]
fn defaults_point_at_the_local_config() -> TestResult {
    let args = CliArgs::try_parse_from(["flowsched"])?;
    assert_eq!(args.config, "Flowsched.toml");
    assert!(!args.dry_run);
    assert!(args.log_level.is_none());
    assert!(args.profile_in.is_none());
    Ok(())
}

#[test]
fn profile_paths_and_level_are_parsed() -> TestResult {
    let args = CliArgs::try_parse_from([
        "flowsched",
        "--config",
        "flows/run.toml",
        "--log-level",
        "debug",
        "--dry-run",
        "--profile-in",
        "in.json",
        "--profile-out",
        "out.json",
    ])?;
    assert_eq!(args.config, "flows/run.toml");
    assert!(matches!(args.log_level, Some(LogLevel::Debug)));
    assert!(args.dry_run);
    assert_eq!(args.profile_in, Some(PathBuf::from("in.json")));
    assert_eq!(args.profile_out, Some(PathBuf::from("out.json")));
    Ok(())
}

#[test]
fn unknown_level_is_rejected() {
    assert!(CliArgs::try_parse_from(["flowsched", "--log-level", "loud"]).is_err());
}

#[test]
fn cli_level_beats_environment() {
    let level = resolve_level(Some(LogLevel::Warn), Some("trace"));
    assert_eq!(level, tracing::Level::WARN);
}

#[test]
fn environment_level_is_used_when_flag_missing() {
    assert_eq!(resolve_level(None, Some(" Debug ")), tracing::Level::DEBUG);
    assert_eq!(resolve_level(None, Some("warning")), tracing::Level::WARN);
}

#[test]
fn garbage_or_missing_level_falls_back_to_info() {
    assert_eq!(resolve_level(None, Some("chatty")), tracing::Level::INFO);
    assert_eq!(resolve_level(None, None), tracing::Level::INFO);
}
