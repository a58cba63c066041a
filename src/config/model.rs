// src/config/model.rs

use serde::Deserialize;
use serde_yaml::{Mapping, Value};

/// Merged run configuration as read from one or more YAML documents.
///
/// ```yaml
/// targets:
///   - ubuntu@node1
///   - ubuntu@node2
/// roles:
///   - [mon.a, osd.0]
///   - [osd.1, client.0]
/// kernel:
///   version: 6.8.0-45-generic
/// tasks:
///   - exec:
///       client.0: [uname -a]
///   - nop:
/// ```
///
/// This is the unchecked shape. Use [`RunConfig`] (built through
/// `TryFrom<RawRunConfig>`) everywhere else.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawRunConfig {
    /// Host identifiers, `[user@]host[:port]`.
    #[serde(default)]
    pub targets: Vec<String>,

    /// One role list per target, positionally aligned with `targets`.
    #[serde(default)]
    pub roles: Vec<Vec<String>>,

    /// Ordered single-key mappings: task name -> parameters (or null).
    #[serde(default)]
    pub tasks: Vec<Mapping>,

    /// Top-level `kernel` entry. `Some(Value::Null)` when the key is present
    /// without a value, `None` when absent.
    #[serde(skip)]
    pub kernel: Option<Value>,

    /// The whole merged document, unknown keys included.
    #[serde(skip)]
    pub document: Mapping,
}

impl RawRunConfig {
    pub fn from_mapping(document: Mapping) -> serde_yaml::Result<Self> {
        let mut raw: RawRunConfig = serde_yaml::from_value(Value::Mapping(document.clone()))?;
        raw.kernel = document.get("kernel").cloned();
        raw.document = document;
        Ok(raw)
    }
}

/// One entry of the task list: a task name and its opaque parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskEntry {
    pub name: String,
    pub params: Value,
}

impl TaskEntry {
    pub fn new(name: impl Into<String>, params: Value) -> Self {
        Self {
            name: name.into(),
            params,
        }
    }

    /// Entry with null parameters.
    pub fn bare(name: impl Into<String>) -> Self {
        Self::new(name, Value::Null)
    }
}

/// Validated run configuration.
#[derive(Debug, Clone)]
pub struct RunConfig {
    targets: Vec<String>,
    roles: Vec<Vec<String>>,
    tasks: Vec<TaskEntry>,
    kernel: Option<Value>,
    document: Mapping,
}

impl RunConfig {
    /// Construct without validation; only `validate.rs` should call this.
    pub(crate) fn new_unchecked(
        targets: Vec<String>,
        roles: Vec<Vec<String>>,
        tasks: Vec<TaskEntry>,
        kernel: Option<Value>,
        document: Mapping,
    ) -> Self {
        Self {
            targets,
            roles,
            tasks,
            kernel,
            document,
        }
    }

    pub fn targets(&self) -> &[String] {
        &self.targets
    }

    pub fn roles(&self) -> &[Vec<String>] {
        &self.roles
    }

    /// User tasks, in configured order, without bookkeeping stages.
    pub fn tasks(&self) -> &[TaskEntry] {
        &self.tasks
    }

    pub fn kernel(&self) -> Option<&Value> {
        self.kernel.as_ref()
    }

    /// The merged document, as written to `config.yaml`.
    pub fn document(&self) -> &Mapping {
        &self.document
    }
}

/// Validated input for `nuke`: only `targets` is read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NukeConfig {
    pub targets: Vec<String>,
}
