// src/context.rs

//! Shared state handed to every stage of a run.

use std::path::{Path, PathBuf};

use serde_yaml::{Mapping, Value};

use crate::cluster::Cluster;
use crate::config::RunConfig;

/// Summary of a run, written to `summary.yaml` once the pipeline is done.
///
/// Keys keep insertion order so the file reads owner first, then whatever
/// stages appended.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Summary {
    fields: Mapping,
}

impl Summary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Summary pre-filled with `owner` and, if given, `description`.
    pub fn for_run(owner: impl Into<String>, description: Option<String>) -> Self {
        let mut summary = Self::new();
        summary.insert("owner", Value::String(owner.into()));
        if let Some(description) = description {
            summary.insert("description", description);
        }
        summary
    }

    pub fn insert(&mut self, key: &str, value: impl Into<Value>) {
        self.fields.insert(Value::from(key), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    /// Mark the run failed. The first recorded reason wins.
    pub fn mark_failed(&mut self, reason: impl Into<String>) {
        self.insert("success", false);
        if !self.contains_key("failure_reason") {
            self.insert("failure_reason", Value::String(reason.into()));
        }
    }

    /// Mark the run successful unless something already said otherwise.
    pub fn mark_succeeded(&mut self) {
        if !self.contains_key("success") {
            self.insert("success", true);
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.get("success"), Some(Value::Bool(false)))
    }

    pub fn to_yaml(&self) -> serde_yaml::Result<String> {
        serde_yaml::to_string(&self.fields)
    }
}

/// Mutable state shared across the whole pipeline.
///
/// Stages run one at a time and receive `&mut RunContext`, so there is no
/// locking here.
#[derive(Debug)]
pub struct RunContext {
    pub cluster: Cluster,
    pub summary: Summary,
    pub config: RunConfig,
    archive: Option<PathBuf>,
}

impl RunContext {
    pub fn new(
        cluster: Cluster,
        summary: Summary,
        config: RunConfig,
        archive: Option<PathBuf>,
    ) -> Self {
        Self {
            cluster,
            summary,
            config,
            archive,
        }
    }

    /// Local archive directory for this run, if one was requested.
    pub fn archive(&self) -> Option<&Path> {
        self.archive.as_deref()
    }

    pub fn into_summary(self) -> Summary {
        self.summary
    }
}
