// src/cluster.rs

//! Hosts and the roles they play in one run.
//!
//! A [`Cluster`] keeps hosts in insertion order. Lookups never reorder, so
//! "first host with role X" conventions used by tasks stay stable.

use std::collections::BTreeSet;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::errors::{Result, TeuthologyError};
use crate::remote::{render, Arg, CommandOutput, Host};

/// How a broadcast reacts to a failing host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BroadcastPolicy {
    /// Abort the broadcast on the first failure and return that error.
    #[default]
    FailFast,
    /// Attempt every host and collect failures per host.
    CollectAll,
}

/// Outcome of a command on one host of a broadcast.
#[derive(Debug)]
pub struct HostResult {
    pub host: String,
    pub result: Result<CommandOutput>,
}

/// Per-host results of a broadcast, in cluster order.
#[derive(Debug, Default)]
pub struct BroadcastReport {
    pub results: Vec<HostResult>,
}

impl BroadcastReport {
    pub fn is_success(&self) -> bool {
        self.results.iter().all(|r| r.result.is_ok())
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &TeuthologyError)> {
        self.results
            .iter()
            .filter_map(|r| r.result.as_ref().err().map(|e| (r.host.as_str(), e)))
    }

    /// Successful outputs keyed by host name.
    pub fn outputs(&self) -> impl Iterator<Item = (&str, &CommandOutput)> {
        self.results
            .iter()
            .filter_map(|r| r.result.as_ref().ok().map(|o| (r.host.as_str(), o)))
    }
}

#[derive(Debug, Clone)]
struct Member {
    host: Host,
    roles: BTreeSet<String>,
}

#[derive(Debug, Clone, Default)]
pub struct Cluster {
    members: Vec<Member>,
}

impl Cluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a host with its role set.
    pub fn add<I, S>(&mut self, host: Host, roles: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let roles: BTreeSet<String> = roles.into_iter().map(Into::into).collect();
        if roles.is_empty() {
            return Err(TeuthologyError::config(format!(
                "host '{}' must be assigned at least one role",
                host.name()
            )));
        }
        if self.members.iter().any(|m| m.host.name() == host.name()) {
            return Err(TeuthologyError::config(format!(
                "host '{}' added to the cluster twice",
                host.name()
            )));
        }

        debug!(host = %host.name(), ?roles, "adding host to cluster");
        self.members.push(Member { host, roles });
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// All hosts, in insertion order.
    pub fn hosts(&self) -> impl Iterator<Item = &Host> {
        self.members.iter().map(|m| &m.host)
    }

    pub fn roles_of(&self, host: &str) -> Option<&BTreeSet<String>> {
        self.members
            .iter()
            .find(|m| m.host.name() == host)
            .map(|m| &m.roles)
    }

    /// Hosts whose role set satisfies `predicate`, in insertion order.
    pub fn hosts_with<P>(&self, predicate: P) -> Vec<&Host>
    where
        P: Fn(&BTreeSet<String>) -> bool,
    {
        self.members
            .iter()
            .filter(|m| predicate(&m.roles))
            .map(|m| &m.host)
            .collect()
    }

    pub fn hosts_with_role(&self, role: &str) -> Vec<&Host> {
        self.hosts_with(|roles| roles.contains(role))
    }

    /// A sub-cluster of the hosts matching `predicate`, keeping their roles.
    pub fn only<P>(&self, predicate: P) -> Cluster
    where
        P: Fn(&BTreeSet<String>) -> bool,
    {
        Cluster {
            members: self
                .members
                .iter()
                .filter(|m| predicate(&m.roles))
                .cloned()
                .collect(),
        }
    }

    /// Broadcast one command to every host concurrently.
    ///
    /// All dispatched work is joined before returning. Under
    /// [`BroadcastPolicy::FailFast`] the first failure aborts the remaining
    /// hosts and is returned as the error; under
    /// [`BroadcastPolicy::CollectAll`] every host is attempted and the report
    /// carries one result per host.
    pub async fn run(&self, args: &[Arg], policy: BroadcastPolicy) -> Result<BroadcastReport> {
        let command = render(args);
        debug!(%command, hosts = self.members.len(), ?policy, "broadcasting command");

        let mut set = JoinSet::new();
        for (idx, member) in self.members.iter().enumerate() {
            let host = member.host.clone();
            let command = command.clone();
            set.spawn(async move {
                let attempt = AssertUnwindSafe(host.run_rendered_checked(command))
                    .catch_unwind()
                    .await;
                let result = attempt.unwrap_or_else(|_| {
                    Err(TeuthologyError::Other(anyhow::anyhow!(
                        "command on {} panicked",
                        host.name()
                    )))
                });
                (idx, result)
            });
        }

        let mut slots: Vec<Option<Result<CommandOutput>>> =
            self.members.iter().map(|_| None).collect();

        while let Some(joined) = set.join_next().await {
            let (idx, result) = match joined {
                Ok(pair) => pair,
                Err(e) if e.is_cancelled() => continue,
                Err(e) => {
                    warn!(error = %e, "broadcast task did not complete");
                    continue;
                }
            };

            if policy == BroadcastPolicy::FailFast {
                if let Err(err) = result {
                    set.abort_all();
                    while set.join_next().await.is_some() {}
                    return Err(err);
                }
            }
            slots[idx] = Some(result);
        }

        let results = self
            .members
            .iter()
            .zip(slots)
            .map(|(member, slot)| HostResult {
                host: member.host.name().to_string(),
                result: slot.unwrap_or_else(|| {
                    Err(TeuthologyError::Other(anyhow::anyhow!(
                        "broadcast to {} did not complete",
                        member.host.name()
                    )))
                }),
            })
            .collect::<Vec<_>>();

        let mut report = BroadcastReport { results };
        if policy == BroadcastPolicy::FailFast {
            if let Some(pos) = report.results.iter().position(|r| r.result.is_err()) {
                if let Err(err) = report.results.swap_remove(pos).result {
                    return Err(err);
                }
            }
        }
        for (host, err) in report.failures() {
            warn!(%host, error = %err, "broadcast failed on host");
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use futures::future::BoxFuture;

    use super::*;
    use crate::remote::RemoteHandle;

    #[derive(Debug)]
    struct Echo;

    impl RemoteHandle for Echo {
        fn run(&self, command: String) -> BoxFuture<'_, anyhow::Result<CommandOutput>> {
            Box::pin(async move {
                Ok(CommandOutput {
                    stdout: command.into_bytes(),
                    ..Default::default()
                })
            })
        }
    }

    /// Always exits with the given status.
    #[derive(Debug)]
    struct Exit(i32);

    impl RemoteHandle for Exit {
        fn run(&self, _command: String) -> BoxFuture<'_, anyhow::Result<CommandOutput>> {
            let exit_code = self.0;
            Box::pin(async move {
                Ok(CommandOutput {
                    exit_code,
                    ..Default::default()
                })
            })
        }
    }

    fn host(name: &str) -> Host {
        Host::new(name, Arc::new(Echo))
    }

    /// h1..h3 where only h2 exits non-zero.
    fn cluster_with_failing_h2() -> Cluster {
        let mut cluster = Cluster::new();
        cluster.add(host("h1"), ["a"]).unwrap();
        cluster.add(Host::new("h2", Arc::new(Exit(2))), ["b"]).unwrap();
        cluster.add(host("h3"), ["c"]).unwrap();
        cluster
    }

    fn names(hosts: Vec<&Host>) -> Vec<&str> {
        hosts.into_iter().map(Host::name).collect()
    }

    #[test]
    fn hosts_with_keeps_insertion_order() {
        let mut cluster = Cluster::new();
        cluster.add(host("h1"), ["a"]).unwrap();
        cluster.add(host("h2"), ["b"]).unwrap();
        cluster.add(host("h3"), ["a", "c"]).unwrap();

        assert_eq!(names(cluster.hosts_with(|r| r.contains("a"))), vec!["h1", "h3"]);
        assert_eq!(names(cluster.hosts_with_role("c")), vec!["h3"]);
        assert!(cluster.hosts_with_role("missing").is_empty());
    }

    #[test]
    fn add_rejects_empty_roles_and_duplicate_hosts() {
        let mut cluster = Cluster::new();
        let empty: [&str; 0] = [];
        assert!(matches!(
            cluster.add(host("h1"), empty),
            Err(TeuthologyError::Configuration(_))
        ));

        cluster.add(host("h1"), ["a"]).unwrap();
        assert!(matches!(
            cluster.add(host("h1"), ["b"]),
            Err(TeuthologyError::Configuration(_))
        ));
        assert_eq!(cluster.len(), 1);
    }

    #[test]
    fn only_builds_sub_cluster_with_roles() {
        let mut cluster = Cluster::new();
        cluster.add(host("h1"), ["mon.a", "osd.0"]).unwrap();
        cluster.add(host("h2"), ["client.0"]).unwrap();

        let osds = cluster.only(|r| r.iter().any(|role| role.starts_with("osd.")));
        assert_eq!(osds.len(), 1);
        assert!(osds.roles_of("h1").unwrap().contains("mon.a"));
        assert!(osds.roles_of("h2").is_none());
    }

    #[tokio::test]
    async fn broadcast_returns_results_in_cluster_order() {
        let mut cluster = Cluster::new();
        for name in ["h1", "h2", "h3"] {
            cluster.add(host(name), [name]).unwrap();
        }

        let report = cluster
            .run(&crate::remote::args(["echo", "hi"]), BroadcastPolicy::FailFast)
            .await
            .unwrap();

        let hosts: Vec<_> = report.results.iter().map(|r| r.host.as_str()).collect();
        assert_eq!(hosts, vec!["h1", "h2", "h3"]);
        assert!(report.is_success());
        assert_eq!(report.outputs().next().unwrap().1.stdout_text(), "echo hi");
    }

    #[tokio::test]
    async fn fail_fast_returns_the_failing_host_error() {
        let cluster = cluster_with_failing_h2();

        let err = cluster
            .run(&crate::remote::args(["true"]), BroadcastPolicy::FailFast)
            .await
            .unwrap_err();

        match err {
            TeuthologyError::CommandFailed {
                host,
                command,
                exit_code,
            } => {
                assert_eq!(host, "h2");
                assert_eq!(command, "true");
                assert_eq!(exit_code, 2);
            }
            other => panic!("expected CommandFailed on h2, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn collect_all_reports_every_host_in_order() {
        let cluster = cluster_with_failing_h2();

        let report = cluster
            .run(&crate::remote::args(["true"]), BroadcastPolicy::CollectAll)
            .await
            .unwrap();

        let hosts: Vec<_> = report.results.iter().map(|r| r.host.as_str()).collect();
        assert_eq!(hosts, vec!["h1", "h2", "h3"]);
        assert!(!report.is_success());

        let failed: Vec<_> = report.failures().map(|(h, _)| h).collect();
        assert_eq!(failed, vec!["h2"]);
        assert!(matches!(
            report.results[1].result,
            Err(TeuthologyError::CommandFailed { exit_code: 2, .. })
        ));
        let ok: Vec<_> = report.outputs().map(|(h, _)| h).collect();
        assert_eq!(ok, vec!["h1", "h3"]);
    }
}
