// src/config/validate.rs

use std::collections::HashSet;

use serde_yaml::{Mapping, Value};

use crate::config::model::{NukeConfig, RawRunConfig, RunConfig, TaskEntry};
use crate::errors::{Result, TeuthologyError};

/// Task name reserved for the top-level `kernel` key.
pub const KERNEL_TASK: &str = "kernel";

impl TryFrom<RawRunConfig> for RunConfig {
    type Error = TeuthologyError;

    fn try_from(raw: RawRunConfig) -> std::result::Result<Self, Self::Error> {
        validate_targets(&raw.targets)?;
        validate_roles(&raw.targets, &raw.roles)?;
        let tasks = parse_tasks(&raw.tasks)?;
        Ok(RunConfig::new_unchecked(
            raw.targets,
            raw.roles,
            tasks,
            raw.kernel,
            raw.document,
        ))
    }
}

impl TryFrom<Mapping> for NukeConfig {
    type Error = TeuthologyError;

    fn try_from(document: Mapping) -> std::result::Result<Self, Self::Error> {
        let targets = match document.get("targets") {
            Some(value) => serde_yaml::from_value::<Vec<String>>(value.clone()).map_err(|e| {
                TeuthologyError::config(format!("`targets` must be a list of host names: {e}"))
            })?,
            None => Vec::new(),
        };
        validate_targets(&targets)?;
        Ok(NukeConfig { targets })
    }
}

fn validate_targets(targets: &[String]) -> Result<()> {
    if targets.is_empty() {
        return Err(TeuthologyError::config(
            "config must list at least one host under `targets`",
        ));
    }

    let mut seen = HashSet::new();
    for target in targets {
        if target.trim().is_empty() {
            return Err(TeuthologyError::config("`targets` contains an empty host name"));
        }
        if !seen.insert(target.as_str()) {
            return Err(TeuthologyError::config(format!(
                "host '{target}' appears more than once in `targets`"
            )));
        }
    }
    Ok(())
}

fn validate_roles(targets: &[String], roles: &[Vec<String>]) -> Result<()> {
    if roles.len() != targets.len() {
        return Err(TeuthologyError::config(format!(
            "`roles` has {} entries but `targets` has {}; they must line up one per host",
            roles.len(),
            targets.len()
        )));
    }

    for (target, host_roles) in targets.iter().zip(roles) {
        if host_roles.is_empty() {
            return Err(TeuthologyError::config(format!(
                "host '{target}' has an empty role list"
            )));
        }
    }
    Ok(())
}

fn parse_tasks(tasks: &[Mapping]) -> Result<Vec<TaskEntry>> {
    tasks
        .iter()
        .enumerate()
        .map(|(idx, entry)| {
            if entry.len() != 1 {
                return Err(TeuthologyError::config(format!(
                    "task entry {idx} must be a mapping with exactly one key (got {})",
                    entry.len()
                )));
            }

            let (key, params) = entry
                .iter()
                .next()
                .ok_or_else(|| TeuthologyError::config(format!("task entry {idx} is empty")))?;

            let name = match key {
                Value::String(name) => name.clone(),
                other => {
                    return Err(TeuthologyError::config(format!(
                        "task entry {idx} has a non-string name: {other:?}"
                    )));
                }
            };

            if name == KERNEL_TASK {
                return Err(TeuthologyError::config(
                    "kernel installation must be a top-level `kernel` item, not part of the tasks list",
                ));
            }

            Ok(TaskEntry::new(name, params.clone()))
        })
        .collect()
}
