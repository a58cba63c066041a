// src/tasks/exec.rs

//! User-facing tasks: `exec` and `nop`.

use anyhow::{anyhow, bail, Context};
use futures::future::BoxFuture;
use serde_yaml::Value;
use tracing::info;

use crate::cluster::BroadcastPolicy;
use crate::context::RunContext;
use crate::remote::raw;
use crate::tasks::{Task, TaskRegistry};

/// Role name that selects every host.
const ALL_ROLES: &str = "all";

pub(crate) fn register(registry: &mut TaskRegistry) {
    registry.register("exec", |params| Ok(Box::new(ExecTask::from_params(params)?)));
    registry.register("nop", |_| Ok(Box::new(NopTask)));
}

/// Does nothing on enter or exit.
#[derive(Debug, Default)]
pub struct NopTask;

impl Task for NopTask {
    fn enter<'a>(&'a mut self, _ctx: &'a mut RunContext) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async { Ok(()) })
    }
}

/// Runs shell command lines on the hosts holding a role.
///
/// ```yaml
/// - exec:
///     client.0:
///       - echo hello
///       - test -d /tmp/cephtest
///     all:
///       - uptime
/// ```
///
/// Roles are processed in the order written. Each command is broadcast to
/// every host with the role and must succeed everywhere before the next one
/// starts.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecTask {
    steps: Vec<(String, Vec<String>)>,
}

impl ExecTask {
    pub fn from_params(params: &Value) -> anyhow::Result<Self> {
        let mapping = params
            .as_mapping()
            .ok_or_else(|| anyhow!("expected a mapping of role -> list of commands"))?;

        let mut steps = Vec::with_capacity(mapping.len());
        for (role, commands) in mapping {
            let role = role
                .as_str()
                .ok_or_else(|| anyhow!("role names must be strings, got {role:?}"))?
                .to_string();
            let commands: Vec<String> = serde_yaml::from_value(commands.clone())
                .with_context(|| format!("commands for role '{role}' must be a list of strings"))?;
            steps.push((role, commands));
        }
        Ok(Self { steps })
    }
}

impl Task for ExecTask {
    fn enter<'a>(&'a mut self, ctx: &'a mut RunContext) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            for (role, commands) in &self.steps {
                let targets = if role == ALL_ROLES {
                    ctx.cluster.clone()
                } else {
                    ctx.cluster.only(|roles| roles.contains(role.as_str()))
                };
                if targets.is_empty() {
                    bail!("no host has role '{role}'");
                }

                for command in commands {
                    info!(%role, %command, "exec");
                    targets
                        .run(&[raw(command.clone())], BroadcastPolicy::FailFast)
                        .await?;
                }
            }
            Ok(())
        })
    }
}
