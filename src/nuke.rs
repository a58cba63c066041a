// src/nuke.rs

//! Out-of-band forced reset of a set of hosts.
//!
//! Nuke does not go through the pipeline and keeps no summary. It kills the
//! test daemons, lazily unmounts stale FUSE mounts and removes the scratch
//! directory on every host it can reach. Hosts that are already clean are
//! fine; hosts that cannot be reached are reported and skipped.

use std::sync::Arc;

use tracing::{info, warn};

use crate::cluster::{BroadcastPolicy, Cluster};
use crate::config::NukeConfig;
use crate::errors::{Result, TeuthologyError};
use crate::remote::{args, connect_all, raw, Arg, Connector};
use crate::tasks::TEST_DIR;

/// Daemon binaries killed on every host.
pub const DAEMONS: &[&str] = &[
    "/tmp/cephtest/binary/usr/local/bin/cmon",
    "/tmp/cephtest/binary/usr/local/bin/cosd",
    "/tmp/cephtest/binary/usr/local/bin/cmds",
    "/tmp/cephtest/binary/usr/local/bin/cfuse",
];

/// Glob for stale client mount points.
pub const MOUNT_PATTERN: &str = "/tmp/cephtest/mnt.*";

/// `killall --quiet <daemons> ; fusermount -u <mounts> ; rm -rf <testdir>`
///
/// Each step runs whatever the previous one did, and the final `rm -rf`
/// decides the exit status.
pub fn nuke_command() -> Vec<Arg> {
    let mut cmd = args(["killall", "--quiet"]);
    cmd.extend(args(DAEMONS.iter().copied()));
    cmd.push(raw(";"));
    cmd.extend(args(["fusermount", "-u"]));
    cmd.push(raw(MOUNT_PATTERN));
    cmd.push(raw(";"));
    cmd.extend(args(["rm", "-rf", "--", TEST_DIR]));
    cmd
}

/// Per-host outcome of a nuke.
#[derive(Debug, Default)]
pub struct NukeReport {
    /// Hosts the cleanup command succeeded on.
    pub cleaned: Vec<String>,
    /// Hosts that could not be reached or whose cleanup failed.
    pub failed: Vec<(String, TeuthologyError)>,
}

impl NukeReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Connect to every target and run the cleanup command on all reachable
/// hosts.
pub async fn nuke(connector: Arc<dyn Connector>, config: &NukeConfig) -> Result<NukeReport> {
    info!(targets = ?config.targets, "nuking targets");

    let mut report = NukeReport::default();
    let mut cluster = Cluster::new();
    for (target, host) in connect_all(connector, &config.targets).await {
        match host {
            Ok(host) => cluster.add(host, [target])?,
            Err(err) => report.failed.push((target, err)),
        }
    }

    if cluster.is_empty() {
        warn!("no host could be reached");
        return Ok(report);
    }

    info!("killing daemons, unmounting, and removing data");
    let broadcast = cluster
        .run(&nuke_command(), BroadcastPolicy::CollectAll)
        .await?;
    for result in broadcast.results {
        match result.result {
            Ok(_) => report.cleaned.push(result.host),
            Err(err) => report.failed.push((result.host, err)),
        }
    }

    for (host, err) in &report.failed {
        warn!(%host, error = %err, "nuke failed on host");
    }
    info!(cleaned = report.cleaned.len(), failed = report.failed.len(), "done");
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::render;

    #[test]
    fn command_keeps_shell_control_tokens_raw() {
        let rendered = render(&nuke_command());
        assert!(rendered.starts_with("killall --quiet /tmp/cephtest/binary/usr/local/bin/cmon"));
        assert!(rendered.contains(" ; fusermount -u /tmp/cephtest/mnt.* ; "));
        assert!(rendered.ends_with("rm -rf -- /tmp/cephtest"));
    }
}
