// src/tasks/kernel.rs

//! The `kernel` stage, injected from the top-level `kernel` key.
//!
//! It records the running kernel of every host in the summary and, when a
//! version was requested, fails the run before any test work starts if a host
//! is running something else.

use anyhow::{anyhow, bail};
use futures::future::BoxFuture;
use serde_yaml::Value;
use tracing::{info, warn};

use crate::cluster::BroadcastPolicy;
use crate::config::KERNEL_TASK;
use crate::context::RunContext;
use crate::remote::args;
use crate::tasks::{Task, TaskRegistry};

pub(crate) fn register(registry: &mut TaskRegistry) {
    registry.register(KERNEL_TASK, |params| {
        Ok(Box::new(KernelTask::from_params(params)?))
    });
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelTask {
    version: Option<String>,
}

impl KernelTask {
    /// Accepts null, a version string, or `{version: ...}`.
    pub fn from_params(params: &Value) -> anyhow::Result<Self> {
        let version = match params {
            Value::Null => None,
            Value::String(v) => Some(v.clone()),
            Value::Mapping(m) => match m.get("version") {
                None | Some(Value::Null) => None,
                Some(Value::String(v)) => Some(v.clone()),
                Some(other) => bail!("`kernel.version` must be a string, got {other:?}"),
            },
            other => return Err(anyhow!("unsupported kernel config: {other:?}")),
        };
        Ok(Self { version })
    }
}

impl Task for KernelTask {
    fn enter<'a>(&'a mut self, ctx: &'a mut RunContext) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            let report = ctx
                .cluster
                .run(&args(["uname", "-r"]), BroadcastPolicy::FailFast)
                .await?;

            let mut running = serde_yaml::Mapping::new();
            let mut mismatched = Vec::new();
            for (host, output) in report.outputs() {
                let release = output.stdout_text();
                info!(%host, %release, "running kernel");
                if let Some(wanted) = &self.version {
                    if &release != wanted {
                        warn!(%host, %release, %wanted, "kernel mismatch");
                        mismatched.push(format!("{host} runs {release}"));
                    }
                }
                running.insert(Value::from(host), Value::from(release));
            }
            ctx.summary.insert("kernel", Value::Mapping(running));

            if let Some(wanted) = &self.version {
                if !mismatched.is_empty() {
                    bail!("expected kernel {wanted}: {}", mismatched.join(", "));
                }
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_null_string_and_mapping() {
        assert_eq!(KernelTask::from_params(&Value::Null).unwrap().version, None);
        assert_eq!(
            KernelTask::from_params(&Value::from("6.8.0")).unwrap().version.as_deref(),
            Some("6.8.0")
        );
        let m: Value = serde_yaml::from_str("{version: 6.1.0, branch: ignored}").unwrap();
        assert_eq!(
            KernelTask::from_params(&m).unwrap().version.as_deref(),
            Some("6.1.0")
        );
    }

    #[test]
    fn rejects_other_shapes() {
        assert!(KernelTask::from_params(&Value::from(42)).is_err());
        let m: Value = serde_yaml::from_str("{version: [a]}").unwrap();
        assert!(KernelTask::from_params(&m).is_err());
    }
}
