// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// Command-line arguments for `flowsched`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "flowsched",
    version,
    about = "Schedule dependent tasks across a pool of heterogeneous workers.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `Flowsched.toml` in the current working directory.
    #[arg(long, value_name = "PATH", default_value = "Flowsched.toml")]
    pub config: String,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `FLOWSCHED_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate, print workers, cores and tasks, but don't run
    /// anything.
    #[arg(long)]
    pub dry_run: bool,

    /// Profile snapshot to load at startup (overrides `[scheduler].profile_input`).
    #[arg(long, value_name = "PATH")]
    pub profile_in: Option<PathBuf>,

    /// Where to write the profile snapshot on shutdown (overrides
    /// `[scheduler].profile_output`).
    #[arg(long, value_name = "PATH")]
    pub profile_out: Option<PathBuf>,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
