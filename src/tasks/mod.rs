// src/tasks/mod.rs

//! Task trait and the name -> factory registry.
//!
//! A task is a two-phase scoped operation: `enter` does the setup, `exit`
//! undoes it. The engine calls `exit` only for tasks whose `enter` returned
//! `Ok`. Built-in bookkeeping tasks and user tasks are registered the same way
//! and resolved once, before any host is contacted.
//!
//! - [`internal`]: conflict check, base dir, archive, coredump, syslog.
//! - [`kernel`]: kernel version check for the top-level `kernel` key.
//! - [`exec`]: user-facing `exec` and `nop`.

pub mod exec;
pub mod internal;
pub mod kernel;

use std::collections::BTreeMap;
use std::fmt;

use futures::future::BoxFuture;
use serde_yaml::Value;

use crate::context::RunContext;
use crate::errors::{Result, TeuthologyError};

/// Scratch directory every run works under on the remote hosts.
pub const TEST_DIR: &str = "/tmp/cephtest";

/// Remote directory whose contents are pulled into the local archive.
pub const REMOTE_ARCHIVE_DIR: &str = "/tmp/cephtest/archive";

/// One stage of the pipeline.
pub trait Task: Send {
    /// Perform setup. Values for later stages go into `ctx`.
    fn enter<'a>(&'a mut self, ctx: &'a mut RunContext) -> BoxFuture<'a, anyhow::Result<()>>;

    /// Undo what `enter` did.
    ///
    /// `failure` is the error that triggered unwinding, if any. Tasks with
    /// nothing to undo keep the default no-op.
    fn exit<'a>(
        &'a mut self,
        _ctx: &'a mut RunContext,
        _failure: Option<&'a TeuthologyError>,
    ) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async { Ok(()) })
    }
}

/// Builds a task from its (possibly null) config value.
///
/// Factories validate their parameters; an `Err` surfaces as a configuration
/// error before anything runs.
pub type TaskFactory = Box<dyn Fn(&Value) -> anyhow::Result<Box<dyn Task>> + Send + Sync>;

/// Maps dotted task names to factories.
pub struct TaskRegistry {
    factories: BTreeMap<String, TaskFactory>,
}

impl fmt::Debug for TaskRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskRegistry")
            .field("tasks", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl TaskRegistry {
    /// A registry with nothing in it.
    pub fn empty() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// A registry holding every built-in task.
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        internal::register(&mut registry);
        kernel::register(&mut registry);
        exec::register(&mut registry);
        registry
    }

    /// Register (or replace) a task factory.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(&Value) -> anyhow::Result<Box<dyn Task>> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Box::new(factory));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Resolve a task by name and build it from `params`.
    pub fn resolve(&self, name: &str, params: &Value) -> Result<Box<dyn Task>> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| TeuthologyError::UnknownTask(name.to_string()))?;
        factory(params).map_err(|e| {
            TeuthologyError::config(format!("invalid parameters for task '{name}': {e:#}"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_cover_bookkeeping_stages() {
        let registry = TaskRegistry::with_builtins();
        for name in [
            "internal.check_conflict",
            "kernel",
            "internal.base",
            "internal.archive",
            "internal.coredump",
            "internal.syslog",
            "exec",
            "nop",
        ] {
            assert!(registry.contains(name), "missing built-in {name}");
        }
    }

    #[test]
    fn unknown_name_is_unknown_task() {
        let registry = TaskRegistry::with_builtins();
        match registry.resolve("no.such.task", &Value::Null) {
            Err(TeuthologyError::UnknownTask(name)) => assert_eq!(name, "no.such.task"),
            Err(other) => panic!("expected UnknownTask, got {other:?}"),
            Ok(_) => panic!("expected UnknownTask, got a task"),
        }
    }

    #[test]
    fn bad_params_are_configuration_errors() {
        let registry = TaskRegistry::with_builtins();
        let err = registry
            .resolve("exec", &Value::from("not a mapping"))
            .err()
            .expect("exec should reject a string");
        assert!(matches!(err, TeuthologyError::Configuration(_)));
    }
}
