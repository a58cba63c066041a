// src/lib.rs

pub mod archive;
pub mod cli;
pub mod cluster;
pub mod config;
pub mod context;
pub mod engine;
pub mod errors;
pub mod logging;
pub mod nuke;
pub mod remote;
pub mod run;
pub mod tasks;

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::archive::Archive;
use crate::cli::{CliArgs, Command, CommonArgs, NukeArgs, RunArgs};
use crate::config::{load_and_validate, load_nuke_config, RunConfig, TaskEntry};
use crate::engine::Pipeline;
use crate::errors::{Result, TeuthologyError};
use crate::remote::{Connector, SshConnector, SshOptions};
use crate::run::{assemble_tasks, RunDriver, RunOptions};
use crate::tasks::TaskRegistry;

/// High-level entry point used by `main.rs`.
///
/// Config files are loaded and validated before the archive directory is
/// created, so a config that fails validation leaves nothing behind. Later
/// failures, unknown tasks included, are recorded in the archive's
/// `summary.yaml`.
pub async fn run(args: CliArgs) -> Result<()> {
    match args.command {
        Command::Run(run_args) => run_tests(run_args).await,
        Command::Nuke(nuke_args) => run_nuke(nuke_args).await,
    }
}

async fn run_tests(args: RunArgs) -> Result<()> {
    let config = load_and_validate(&args.common.config)?;

    if args.dry_run {
        logging::init_logging(args.common.log_level, args.common.verbose, None)?;
        let stages = assemble_tasks(&config);
        Pipeline::resolve(&TaskRegistry::with_builtins(), &stages)?;
        print_dry_run(&config, &stages);
        return Ok(());
    }

    let archive = args.archive.clone().map(Archive::create).transpose()?;
    logging::init_logging(
        args.common.log_level,
        args.common.verbose,
        archive.as_ref().map(Archive::log_path).as_deref(),
    )?;
    info!(
        targets = ?config.targets(),
        archive = ?archive.as_ref().map(|a| a.dir().display().to_string()),
        "starting run"
    );

    let driver = RunDriver::new(connector(&args.common), TaskRegistry::with_builtins());
    let options = RunOptions {
        owner: args.owner,
        description: args.description,
    };
    let summary = driver.run(config, options, archive).await?;

    if summary.is_failed() {
        let reason = summary
            .get("failure_reason")
            .and_then(|v| v.as_str())
            .unwrap_or("a stage reported failure")
            .to_string();
        return Err(TeuthologyError::RunFailed(reason));
    }

    info!("run succeeded");
    Ok(())
}

async fn run_nuke(args: NukeArgs) -> Result<()> {
    let config = load_nuke_config(&args.common.config)?;
    logging::init_logging(args.common.log_level, args.common.verbose, None)?;

    let report = nuke::nuke(connector(&args.common), &config).await?;
    if report.is_success() {
        return Ok(());
    }

    let hosts: Vec<&str> = report.failed.iter().map(|(h, _)| h.as_str()).collect();
    // An unreachable host is an infrastructure problem; a failed cleanup is not.
    if let Some((host, err)) = report
        .failed
        .iter()
        .find(|(_, err)| matches!(err, TeuthologyError::Connection { .. }))
    {
        return Err(TeuthologyError::Connection {
            host: host.clone(),
            reason: format!("{err} (nuke incomplete on {})", hosts.join(", ")),
        });
    }
    Err(TeuthologyError::RunFailed(format!(
        "nuke failed on {}",
        hosts.join(", ")
    )))
}

fn connector(args: &CommonArgs) -> Arc<dyn Connector> {
    Arc::new(SshConnector::new(SshOptions {
        connect_timeout: Duration::from_secs(args.connect_timeout),
        identity_file: args.identity_file.clone(),
    }))
}

/// Simple dry-run output: targets, roles and the full stage list.
fn print_dry_run(config: &RunConfig, stages: &[TaskEntry]) {
    println!("teuthology dry-run");
    println!();

    println!("targets ({}):", config.targets().len());
    for (target, roles) in config.targets().iter().zip(config.roles()) {
        println!("  - {target}");
        println!("      roles: {roles:?}");
    }
    println!();

    println!("stages ({}):", stages.len());
    for (index, entry) in stages.iter().enumerate() {
        if entry.params.is_null() {
            println!("  {index:>2}. {}", entry.name);
        } else {
            let params = serde_yaml::to_string(&entry.params).unwrap_or_default();
            println!("  {index:>2}. {}: {}", entry.name, params.trim_end());
        }
    }

    debug!("dry-run complete (no host contacted)");
}
