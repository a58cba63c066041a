// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Command-line arguments for `teuthology`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "teuthology",
    version,
    about = "Run integration tests against a cluster of remote hosts.",
    long_about = None
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Run the configured tasks against the configured hosts.
    Run(RunArgs),
    /// Kill test daemons and wipe test data on the configured hosts.
    Nuke(NukeArgs),
}

/// Options shared by `run` and `nuke`.
#[derive(Debug, Clone, Args)]
pub struct CommonArgs {
    /// Config files (YAML). Later files override top-level keys of earlier ones.
    #[arg(value_name = "CONFFILE", required = true, num_args = 1..)]
    pub config: Vec<PathBuf>,

    /// Be more verbose (same as `--log-level debug`).
    #[arg(short, long)]
    pub verbose: bool,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `-v`, then `TEUTHOLOGY_LOG`, then `info` is used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// SSH identity file used for every host.
    #[arg(long, value_name = "PATH")]
    pub identity_file: Option<PathBuf>,

    /// SSH connect timeout in seconds.
    #[arg(long, value_name = "SECS", default_value_t = 10)]
    pub connect_timeout: u64,
}

#[derive(Debug, Clone, Args)]
pub struct RunArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Path to archive results in. Must not exist yet.
    #[arg(long, value_name = "DIR")]
    pub archive: Option<PathBuf>,

    /// Job description.
    #[arg(long)]
    pub description: Option<String>,

    /// Job owner. Defaults to `$USER@hostname`.
    #[arg(long)]
    pub owner: Option<String>,

    /// Validate the config, print the stage list, but don't contact any host.
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Debug, Clone, Args)]
pub struct NukeArgs {
    #[command(flatten)]
    pub common: CommonArgs,
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
