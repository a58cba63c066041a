// src/tasks/internal.rs

//! Bookkeeping stages the run driver prepends to every task list.
//!
//! None of these take parameters. Their exits mostly collect per-host
//! failures and report them together, so one bad host does not hide the
//! state of the others.

use std::path::Path;

use anyhow::{bail, Context};
use futures::future::BoxFuture;
use tracing::{debug, info, warn};

use crate::cluster::{BroadcastPolicy, BroadcastReport};
use crate::context::RunContext;
use crate::errors::TeuthologyError;
use crate::remote::{args, raw, Arg};
use crate::tasks::{Task, TaskRegistry, REMOTE_ARCHIVE_DIR, TEST_DIR};

pub const CHECK_CONFLICT: &str = "internal.check_conflict";
pub const BASE: &str = "internal.base";
pub const ARCHIVE: &str = "internal.archive";
pub const COREDUMP: &str = "internal.coredump";
pub const SYSLOG: &str = "internal.syslog";

const RSYSLOG_CONF: &str = "/etc/rsyslog.d/80-cephtest.conf";

pub(crate) fn register(registry: &mut TaskRegistry) {
    registry.register(CHECK_CONFLICT, |_| Ok(Box::new(CheckConflict)));
    registry.register(BASE, |_| Ok(Box::new(Base)));
    registry.register(ARCHIVE, |_| Ok(Box::new(Archive)));
    registry.register(COREDUMP, |_| Ok(Box::new(Coredump)));
    registry.register(SYSLOG, |_| Ok(Box::new(Syslog)));
}

fn coredump_dir() -> String {
    format!("{REMOTE_ARCHIVE_DIR}/coredump")
}

fn syslog_dir() -> String {
    format!("{REMOTE_ARCHIVE_DIR}/syslog")
}

/// Turn collected per-host failures into one error.
fn ensure_all_ok(what: &str, report: &BroadcastReport) -> anyhow::Result<()> {
    let failures: Vec<String> = report
        .failures()
        .map(|(host, err)| format!("{host}: {err}"))
        .collect();
    if failures.is_empty() {
        return Ok(());
    }
    bail!("{what} failed on {} host(s): {}", failures.len(), failures.join("; "))
}

/// Refuses to start if a previous run left its scratch directory behind.
#[derive(Debug, Default)]
pub struct CheckConflict;

impl Task for CheckConflict {
    fn enter<'a>(&'a mut self, ctx: &'a mut RunContext) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            info!("checking for old test directory");
            let report = ctx
                .cluster
                .run(&args(["test", "!", "-e", TEST_DIR]), BroadcastPolicy::CollectAll)
                .await?;

            let mut conflicts = Vec::new();
            for (host, err) in report.failures() {
                match err {
                    TeuthologyError::CommandFailed { .. } => conflicts.push(host.to_string()),
                    other => bail!("checking {host} for conflicts: {other}"),
                }
            }

            if !conflicts.is_empty() {
                bail!(
                    "{TEST_DIR} already exists on {}; is another run in progress? (`teuthology nuke` cleans up)",
                    conflicts.join(", ")
                );
            }
            Ok(())
        })
    }
}

/// Creates the scratch directory and removes it again.
///
/// Removal uses `rmdir`, so anything a task forgot to clean up turns into a
/// teardown error instead of being silently deleted.
#[derive(Debug, Default)]
pub struct Base;

impl Task for Base {
    fn enter<'a>(&'a mut self, ctx: &'a mut RunContext) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            info!("creating test directory");
            ctx.cluster
                .run(&args(["mkdir", "-m0755", "--", TEST_DIR]), BroadcastPolicy::FailFast)
                .await?;
            Ok(())
        })
    }

    fn exit<'a>(
        &'a mut self,
        ctx: &'a mut RunContext,
        _failure: Option<&'a TeuthologyError>,
    ) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            info!("tidying up after the test");
            let mut cmd = args(["find", TEST_DIR, "-ls"]);
            cmd.push(raw(";"));
            cmd.extend(args(["rmdir", "--", TEST_DIR]));

            let report = ctx.cluster.run(&cmd, BroadcastPolicy::CollectAll).await?;
            for (host, output) in report.outputs() {
                debug!(%host, leftovers = %output.stdout_text(), "test directory listing");
            }
            ensure_all_ok("removing the test directory", &report)
        })
    }
}

/// Creates the remote archive directory and pulls it into the local archive
/// on exit.
#[derive(Debug, Default)]
pub struct Archive;

impl Archive {
    async fn fetch(ctx: &RunContext, local: &Path) -> anyhow::Result<()> {
        let remote_dir = local.join("remote");
        tokio::fs::create_dir_all(&remote_dir)
            .await
            .with_context(|| format!("creating {}", remote_dir.display()))?;

        let mut failures = Vec::new();
        for host in ctx.cluster.hosts() {
            let tar = args(["tar", "czf", "-", "-C", REMOTE_ARCHIVE_DIR, "--", "."]);
            let dest = remote_dir.join(format!("{}.tgz", host.name().replace('/', "_")));
            let result: anyhow::Result<()> = async {
                let output = host.run(&tar).await?;
                tokio::fs::write(&dest, &output.stdout)
                    .await
                    .with_context(|| format!("writing {}", dest.display()))?;
                Ok(())
            }
            .await;

            match result {
                Ok(()) => info!(host = %host.name(), dest = %dest.display(), "archived"),
                Err(e) => {
                    warn!(host = %host.name(), error = %e, "archive transfer failed");
                    failures.push(format!("{}: {e:#}", host.name()));
                }
            }
        }

        if !failures.is_empty() {
            bail!("archive transfer failed: {}", failures.join("; "));
        }
        Ok(())
    }
}

impl Task for Archive {
    fn enter<'a>(&'a mut self, ctx: &'a mut RunContext) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            info!("creating archive directory");
            ctx.cluster
                .run(
                    &args(["install", "-d", "-m0755", "--", REMOTE_ARCHIVE_DIR]),
                    BroadcastPolicy::FailFast,
                )
                .await?;
            Ok(())
        })
    }

    fn exit<'a>(
        &'a mut self,
        ctx: &'a mut RunContext,
        _failure: Option<&'a TeuthologyError>,
    ) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            let fetched = match ctx.archive().map(Path::to_path_buf) {
                Some(local) => {
                    info!(archive = %local.display(), "transferring archived files");
                    Self::fetch(ctx, &local).await
                }
                None => Ok(()),
            };

            info!("removing archived files");
            let report = ctx
                .cluster
                .run(&args(["rm", "-rf", "--", REMOTE_ARCHIVE_DIR]), BroadcastPolicy::CollectAll)
                .await?;

            fetched?;
            ensure_all_ok("removing the archive directory", &report)
        })
    }
}

/// Points the kernel core pattern into the archive and flags the run failed
/// if any daemon dumped core.
#[derive(Debug, Default)]
pub struct Coredump;

impl Coredump {
    /// Restore the default core pattern, then drop the directory if empty.
    ///
    /// `rmdir` runs whether or not the restore worked; an empty directory
    /// left behind would read as a coredump.
    fn restore_command(dir: &str) -> Vec<Arg> {
        let mut cmd = args(["sudo", "sysctl", "-w", "kernel.core_pattern=core"]);
        cmd.push(raw(";"));
        cmd.extend(args(["rmdir", "--ignore-fail-on-non-empty", "--", dir]));
        cmd
    }
}

impl Task for Coredump {
    fn enter<'a>(&'a mut self, ctx: &'a mut RunContext) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            let dir = coredump_dir();
            let mut cmd = args(["install", "-d", "-m0755", "--", dir.as_str()]);
            cmd.push(raw("&&"));
            cmd.extend(args([
                "sudo".to_string(),
                "sysctl".to_string(),
                "-w".to_string(),
                format!("kernel.core_pattern={dir}/%t.%p.core"),
            ]));
            ctx.cluster.run(&cmd, BroadcastPolicy::FailFast).await?;
            Ok(())
        })
    }

    fn exit<'a>(
        &'a mut self,
        ctx: &'a mut RunContext,
        _failure: Option<&'a TeuthologyError>,
    ) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            let dir = coredump_dir();
            let restored = ctx
                .cluster
                .run(&Self::restore_command(&dir), BroadcastPolicy::CollectAll)
                .await?;

            // The directory only survives rmdir if a core landed in it.
            let mut probe: Vec<Arg> = args(["if", "test", "-e", dir.as_str()]);
            probe.push(raw(";"));
            probe.extend(args(["then", "echo", "OK"]));
            probe.push(raw(";"));
            probe.push(raw("fi"));
            let found = ctx.cluster.run(&probe, BroadcastPolicy::CollectAll).await?;

            for (host, output) in found.outputs() {
                if output.stdout_text() == "OK" {
                    warn!(%host, "found coredumps");
                    ctx.summary.mark_failed(format!("Found coredumps on {host}"));
                }
            }

            ensure_all_ok("restoring the core pattern", &restored)
        })
    }
}

/// Routes syslog into the archive for the duration of the run and scans it
/// for kernel trouble afterwards.
#[derive(Debug, Default)]
pub struct Syslog;

impl Syslog {
    fn restart_rsyslog() -> Vec<Arg> {
        args(["sudo", "service", "rsyslog", "restart"])
    }
}

impl Task for Syslog {
    fn enter<'a>(&'a mut self, ctx: &'a mut RunContext) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            info!("starting syslog monitoring");
            let dir = syslog_dir();
            let kern = format!("kern.* -{dir}/kern.log;RSYSLOG_FileFormat");
            let misc = format!("*.*;kern.none -{dir}/misc.log;RSYSLOG_FileFormat");

            let mut cmd = args(["install", "-d", "-m0755", "--", dir.as_str()]);
            cmd.push(raw("&&"));
            cmd.extend(args(["printf", "%s\\n", kern.as_str(), misc.as_str()]));
            cmd.push(raw("|"));
            cmd.extend(args(["sudo", "tee", RSYSLOG_CONF]));
            cmd.push(raw(">/dev/null"));
            cmd.push(raw("&&"));
            cmd.extend(Self::restart_rsyslog());

            ctx.cluster.run(&cmd, BroadcastPolicy::FailFast).await?;
            Ok(())
        })
    }

    fn exit<'a>(
        &'a mut self,
        ctx: &'a mut RunContext,
        _failure: Option<&'a TeuthologyError>,
    ) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            info!("shutting down syslog monitoring");
            let mut cmd = args(["sudo", "rm", "-f", "--", RSYSLOG_CONF]);
            cmd.push(raw("&&"));
            cmd.extend(Self::restart_rsyslog());
            let stopped = ctx.cluster.run(&cmd, BroadcastPolicy::CollectAll).await?;

            info!("checking logs for errors");
            let mut scan = args([
                "grep",
                "-E",
                "--binary-files=text",
                r"\bBUG\b|\bINFO\b|\bDEADLOCK\b",
            ]);
            scan.push(raw(format!("{}/*.log", syslog_dir())));
            scan.push(raw("|"));
            scan.extend(args(["grep", "-v", "task .* blocked for more than .* seconds"]));
            scan.push(raw("|"));
            scan.extend(args(["head", "-n", "1"]));

            for host in ctx.cluster.hosts().cloned().collect::<Vec<_>>() {
                let output = host.run_unchecked(&scan).await?;
                let line = output.stdout_text();
                if !line.is_empty() {
                    warn!(host = %host.name(), %line, "found errors in syslog");
                    ctx.summary
                        .mark_failed(format!("{line} in syslog on {}", host.name()));
                }
            }

            ensure_all_ok("stopping syslog monitoring", &stopped)
        })
    }
}
