#![allow(dead_code)]

use serde_yaml::{Mapping, Value};
use teuthology::config::{RawRunConfig, RunConfig};

/// Builder for run config documents to simplify test setup.
pub struct RunConfigBuilder {
    doc: Mapping,
    targets: Vec<Value>,
    roles: Vec<Value>,
    tasks: Vec<Value>,
}

impl RunConfigBuilder {
    pub fn new() -> Self {
        Self {
            doc: Mapping::new(),
            targets: Vec::new(),
            roles: Vec::new(),
            tasks: Vec::new(),
        }
    }

    /// Add a target with its roles.
    pub fn target(mut self, name: &str, roles: &[&str]) -> Self {
        self.targets.push(Value::from(name));
        self.roles
            .push(Value::Sequence(roles.iter().map(|r| Value::from(*r)).collect()));
        self
    }

    /// Add a task with null parameters.
    pub fn task(self, name: &str) -> Self {
        self.task_with(name, Value::Null)
    }

    pub fn task_with(mut self, name: &str, params: Value) -> Self {
        let mut entry = Mapping::new();
        entry.insert(Value::from(name), params);
        self.tasks.push(Value::Mapping(entry));
        self
    }

    /// Set the top-level `kernel` key.
    pub fn kernel(self, value: Value) -> Self {
        self.key("kernel", value)
    }

    /// Set an arbitrary top-level key.
    pub fn key(mut self, key: &str, value: Value) -> Self {
        self.doc.insert(Value::from(key), value);
        self
    }

    pub fn build_mapping(self) -> Mapping {
        let mut doc = self.doc;
        doc.insert(Value::from("targets"), Value::Sequence(self.targets));
        doc.insert(Value::from("roles"), Value::Sequence(self.roles));
        doc.insert(Value::from("tasks"), Value::Sequence(self.tasks));
        doc
    }

    pub fn build_yaml(self) -> String {
        serde_yaml::to_string(&self.build_mapping()).expect("Failed to serialize config")
    }

    pub fn try_build(self) -> teuthology::errors::Result<RunConfig> {
        let raw = RawRunConfig::from_mapping(self.build_mapping())?;
        RunConfig::try_from(raw)
    }

    pub fn build(self) -> RunConfig {
        self.try_build()
            .expect("Failed to build valid config from builder")
    }
}

impl Default for RunConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
