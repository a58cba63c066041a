// tests/cli_run.rs

mod common;
use crate::common::builders::RunConfigBuilder;
use crate::common::{init_tracing, TestResult};

use std::fs;
use std::path::Path;

use clap::Parser;
use serde_yaml::{Mapping, Value};
use teuthology::archive::{CONFIG_FILE, SUMMARY_FILE};
use teuthology::cli::CliArgs;
use teuthology::errors::TeuthologyError;

fn write_config(dir: &Path, builder: RunConfigBuilder) -> String {
    let path = dir.join("job.yaml");
    fs::write(&path, builder.build_yaml()).unwrap();
    path.display().to_string()
}

fn args(argv: &[&str]) -> CliArgs {
    let mut full = vec!["teuthology"];
    full.extend_from_slice(argv);
    CliArgs::try_parse_from(full).unwrap()
}

#[tokio::test]
async fn unknown_task_is_summarised_in_the_archive() -> TestResult {
    init_tracing();
    let tmp = tempfile::tempdir()?;
    let config = write_config(
        tmp.path(),
        RunConfigBuilder::new()
            .target("h1", &["mon.a"])
            .task("no.such.task"),
    );
    let archive = tmp.path().join("run");
    let archive_arg = archive.display().to_string();

    let err = teuthology::run(args(&["run", "--archive", &archive_arg, &config]))
        .await
        .unwrap_err();

    assert!(matches!(err, TeuthologyError::UnknownTask(ref n) if n == "no.such.task"));
    assert_eq!(err.exit_code(), 2);
    assert!(archive.join(CONFIG_FILE).exists());
    let summary: Mapping = serde_yaml::from_str(&fs::read_to_string(archive.join(SUMMARY_FILE))?)?;
    assert_eq!(summary.get("success"), Some(&Value::Bool(false)));
    Ok(())
}

#[tokio::test]
async fn invalid_config_leaves_no_archive() -> TestResult {
    init_tracing();
    let tmp = tempfile::tempdir()?;
    let config = write_config(
        tmp.path(),
        RunConfigBuilder::new().target("h1", &["a"]).task("kernel"),
    );
    let archive = tmp.path().join("run");
    let archive_arg = archive.display().to_string();

    let err = teuthology::run(args(&["run", "--archive", &archive_arg, &config]))
        .await
        .unwrap_err();

    assert!(matches!(err, TeuthologyError::Configuration(_)), "{err:?}");
    assert!(!archive.exists());
    Ok(())
}

#[tokio::test]
async fn dry_run_rejects_unknown_tasks() -> TestResult {
    init_tracing();
    let tmp = tempfile::tempdir()?;
    let config = write_config(
        tmp.path(),
        RunConfigBuilder::new()
            .target("h1", &["mon.a"])
            .task("no.such.task"),
    );

    let err = teuthology::run(args(&["run", "--dry-run", &config]))
        .await
        .unwrap_err();

    assert!(matches!(err, TeuthologyError::UnknownTask(_)), "{err:?}");
    Ok(())
}

#[tokio::test]
async fn dry_run_accepts_known_tasks_without_contacting_hosts() -> TestResult {
    init_tracing();
    let tmp = tempfile::tempdir()?;
    let config = write_config(
        tmp.path(),
        RunConfigBuilder::new()
            .target("unreachable.invalid", &["mon.a"])
            .kernel(Value::Null)
            .task("nop"),
    );

    teuthology::run(args(&["run", "--dry-run", &config])).await?;
    Ok(())
}
