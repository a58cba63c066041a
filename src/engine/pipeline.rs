// src/engine/pipeline.rs

use tracing::{debug, error, info};

use crate::config::TaskEntry;
use crate::context::RunContext;
use crate::engine::stack::{Stage, StageStack};
use crate::errors::{Result, TeuthologyError};
use crate::tasks::TaskRegistry;

/// An ordered list of resolved stages, ready to run.
///
/// Building a pipeline resolves every entry up front, so an unknown task name
/// or bad parameters fail before any stage has had a side effect.
#[derive(Debug)]
pub struct Pipeline {
    stages: Vec<Stage>,
}

/// What happened during one pipeline run.
#[derive(Debug, Default)]
pub struct PipelineReport {
    /// Stages whose enter succeeded, in entry order.
    pub entered: Vec<String>,
    /// Stages whose exit was attempted, in exit order.
    pub exited: Vec<String>,
    /// Stages never entered because an earlier stage failed.
    pub skipped: Vec<String>,
    /// The enter failure and/or collected exit failures, if any.
    pub error: Option<TeuthologyError>,
}

impl PipelineReport {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn into_result(self) -> Result<()> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl Pipeline {
    pub fn resolve(registry: &TaskRegistry, entries: &[TaskEntry]) -> Result<Self> {
        let stages = entries
            .iter()
            .enumerate()
            .map(|(index, entry)| {
                let task = registry.resolve(&entry.name, &entry.params)?;
                debug!(stage = %entry.name, index, "resolved stage");
                Ok(Stage {
                    name: entry.name.clone(),
                    index,
                    task,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { stages })
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.stages.iter().map(|s| s.name.as_str())
    }

    /// Enter every stage in order, then unwind whatever was entered.
    ///
    /// Stops entering at the first enter failure. Unwinding always happens,
    /// in reverse entry order, and every exit is attempted even if an earlier
    /// one failed. The returned report carries the combined error.
    pub async fn run(self, ctx: &mut RunContext) -> PipelineReport {
        let total = self.stages.len();
        let mut stack = StageStack::new();
        let mut trigger: Option<TeuthologyError> = None;
        let mut skipped = Vec::new();

        let mut pending = self.stages.into_iter();
        for mut stage in pending.by_ref() {
            info!(stage = %stage.name, index = stage.index, total, "entering stage");
            match stage.enter(ctx).await {
                Ok(()) => stack.push(stage),
                Err(err) => {
                    error!(
                        stage = %stage.name,
                        index = stage.index,
                        error = %err,
                        "stage enter failed; unwinding"
                    );
                    trigger = Some(err.into());
                    break;
                }
            }
        }
        for stage in pending {
            debug!(stage = %stage.name, index = stage.index, "skipping stage");
            skipped.push(stage.name);
        }

        if trigger.is_none() {
            info!(stages = stack.len(), "all stages entered");
        }

        let entered = stack.names();
        let unwound = stack.unwind(ctx, trigger.as_ref()).await;

        let error = if unwound.errors.is_empty() {
            trigger
        } else {
            Some(TeuthologyError::AggregateTeardown {
                trigger: trigger.map(Box::new),
                teardown: unwound.errors,
            })
        };

        PipelineReport {
            entered,
            exited: unwound.exited,
            skipped,
            error,
        }
    }
}
