// src/run.rs

//! Run driver: one configured run against one cluster.
//!
//! Order of operations:
//! 1. write `config.yaml` if archiving
//! 2. assemble the stage list (bookkeeping prefix + user tasks)
//! 3. resolve every stage (unknown tasks fail here, no host contacted yet)
//! 4. connect to every target and build the cluster
//! 5. run the pipeline
//! 6. write `summary.yaml`, whatever happened in 1 to 5

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use serde_yaml::Value;
use tracing::{error, info};

use crate::archive::Archive;
use crate::cluster::Cluster;
use crate::config::{RunConfig, TaskEntry, KERNEL_TASK};
use crate::context::{RunContext, Summary};
use crate::engine::{Pipeline, PipelineReport};
use crate::errors::{Result, TeuthologyError};
use crate::remote::{connect_all, Connector};
use crate::tasks::internal::{ARCHIVE, BASE, CHECK_CONFLICT, COREDUMP, SYSLOG};
use crate::tasks::TaskRegistry;

/// Per-run metadata that ends up in the summary.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub owner: Option<String>,
    pub description: Option<String>,
}

/// `$USER@hostname` of the invoking user.
pub fn default_owner() -> String {
    let user = std::env::var("USER")
        .or_else(|_| std::env::var("LOGNAME"))
        .unwrap_or_else(|_| "unknown".to_string());
    let host = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "localhost".to_string());
    format!("{user}@{host}")
}

/// Full stage list for a run.
///
/// `internal.check_conflict`, then `kernel` if the config has a top-level
/// `kernel` key, then base/archive/coredump/syslog, then the user tasks in
/// their configured order.
pub fn assemble_tasks(config: &RunConfig) -> Vec<TaskEntry> {
    let mut tasks = vec![TaskEntry::bare(CHECK_CONFLICT)];
    if let Some(kernel) = config.kernel() {
        tasks.push(TaskEntry::new(KERNEL_TASK, kernel.clone()));
    }
    tasks.extend(
        [BASE, ARCHIVE, COREDUMP, SYSLOG]
            .into_iter()
            .map(TaskEntry::bare),
    );
    tasks.extend(config.tasks().iter().cloned());
    tasks
}

pub struct RunDriver {
    connector: Arc<dyn Connector>,
    registry: TaskRegistry,
}

impl RunDriver {
    pub fn new(connector: Arc<dyn Connector>, registry: TaskRegistry) -> Self {
        Self {
            connector,
            registry,
        }
    }

    /// Execute one run and return its summary.
    ///
    /// When archiving, `summary.yaml` is written exactly once on every path
    /// out of this function, including config write errors, unknown tasks,
    /// connection failures and panicking tasks.
    pub async fn run(
        &self,
        config: RunConfig,
        options: RunOptions,
        archive: Option<Archive>,
    ) -> Result<Summary> {
        let owner = options.owner.unwrap_or_else(default_owner);
        let summary = Summary::for_run(owner, options.description);
        let fallback = summary.clone();

        let outcome = AssertUnwindSafe(self.execute(config, summary, archive.as_ref()))
            .catch_unwind()
            .await;

        let (summary, result) = match outcome {
            Ok((mut summary, report)) => {
                let result = record_outcome(&mut summary, report);
                (summary, result)
            }
            Err(_) => {
                let mut summary = fallback;
                let err = TeuthologyError::Other(anyhow::anyhow!("run panicked"));
                summary.mark_failed(err.to_string());
                (summary, Err(err))
            }
        };

        if let Err(err) = &result {
            for msg in err.flatten() {
                error!(error = %msg, "run failed");
            }
        }

        if let Some(archive) = archive {
            if let Err(write_err) = archive.finish(&summary) {
                error!(error = %write_err, "failed to write summary");
                if result.is_ok() {
                    return Err(write_err);
                }
            }
        }

        result.map(|()| summary)
    }

    /// Write the config, resolve, connect and run the pipeline.
    ///
    /// Hands the summary back on every path, as left by the stages.
    async fn execute(
        &self,
        config: RunConfig,
        summary: Summary,
        archive: Option<&Archive>,
    ) -> (Summary, Result<PipelineReport>) {
        if let Some(archive) = archive {
            if let Err(err) = archive.write_config(config.document()) {
                return (summary, Err(err));
            }
        }

        let pipeline = match Pipeline::resolve(&self.registry, &assemble_tasks(&config)) {
            Ok(pipeline) => pipeline,
            Err(err) => return (summary, Err(err)),
        };
        info!(
            stages = ?pipeline.names().collect::<Vec<_>>(),
            "assembled pipeline"
        );

        let cluster = match self.connect(&config).await {
            Ok(cluster) => cluster,
            Err(err) => return (summary, Err(err)),
        };

        let archive_dir = archive.map(|a| a.dir().to_path_buf());
        let mut ctx = RunContext::new(cluster, summary, config, archive_dir);
        let report = pipeline.run(&mut ctx).await;
        (ctx.into_summary(), Ok(report))
    }

    async fn connect(&self, config: &RunConfig) -> Result<Cluster> {
        let mut cluster = Cluster::new();
        let connected = connect_all(Arc::clone(&self.connector), config.targets()).await;
        for ((_, host), roles) in connected.into_iter().zip(config.roles()) {
            cluster.add(host?, roles.iter().cloned())?;
        }
        Ok(cluster)
    }
}

fn record_outcome(summary: &mut Summary, report: Result<PipelineReport>) -> Result<()> {
    let report = match report {
        Ok(report) => report,
        Err(err) => {
            summary.mark_failed(err.to_string());
            return Err(err);
        }
    };

    let entered: Vec<Value> = report.entered.iter().map(|s| Value::from(s.as_str())).collect();
    summary.insert("stages_entered", Value::Sequence(entered));

    match report.into_result() {
        Ok(()) => {
            if summary.is_failed() {
                info!("all stages completed but a stage reported failure");
            } else {
                summary.mark_succeeded();
            }
            Ok(())
        }
        Err(err) => {
            summary.mark_failed(err.to_string());
            Err(err)
        }
    }
}
