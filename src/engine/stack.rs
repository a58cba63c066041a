// src/engine/stack.rs

//! LIFO stack of entered stages.
//!
//! A stage is pushed only after its `enter` returned `Ok`, and popped exactly
//! once during unwinding. Teardown order is therefore the mirror image of the
//! entry order actually achieved, whatever triggered the unwind.

use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use tracing::{error, info};

use crate::context::RunContext;
use crate::errors::{Phase, StageError, TeuthologyError};
use crate::tasks::Task;

/// A resolved task together with its position in the pipeline.
pub struct Stage {
    pub name: String,
    pub index: usize,
    pub task: Box<dyn Task>,
}

impl fmt::Debug for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stage")
            .field("name", &self.name)
            .field("index", &self.index)
            .finish_non_exhaustive()
    }
}

impl Stage {
    pub(crate) fn error(&self, phase: Phase, cause: anyhow::Error) -> StageError {
        StageError {
            stage: self.name.clone(),
            index: self.index,
            phase,
            cause,
        }
    }

    /// Run `enter`, turning a panic into a [`StageError`].
    pub(crate) async fn enter(&mut self, ctx: &mut RunContext) -> Result<(), StageError> {
        let attempt = AssertUnwindSafe(self.task.enter(ctx)).catch_unwind().await;
        match attempt {
            Ok(Ok(())) => Ok(()),
            Ok(Err(cause)) => Err(self.error(Phase::Enter, cause)),
            Err(panic) => Err(self.error(Phase::Enter, panic_cause(panic))),
        }
    }

    /// Run `exit`, turning a panic into a [`StageError`].
    pub(crate) async fn exit(
        &mut self,
        ctx: &mut RunContext,
        failure: Option<&TeuthologyError>,
    ) -> Result<(), StageError> {
        let attempt = AssertUnwindSafe(self.task.exit(ctx, failure))
            .catch_unwind()
            .await;
        match attempt {
            Ok(Ok(())) => Ok(()),
            Ok(Err(cause)) => Err(self.error(Phase::Exit, cause)),
            Err(panic) => Err(self.error(Phase::Exit, panic_cause(panic))),
        }
    }
}

fn panic_cause(panic: Box<dyn Any + Send>) -> anyhow::Error {
    let msg = panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string());
    anyhow::anyhow!("task panicked: {msg}")
}

/// What unwinding did: which stages exited (in exit order) and which exits
/// failed.
#[derive(Debug, Default)]
pub struct Unwound {
    pub exited: Vec<String>,
    pub errors: Vec<StageError>,
}

#[derive(Debug, Default)]
pub struct StageStack {
    entered: Vec<Stage>,
}

impl StageStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, stage: Stage) {
        self.entered.push(stage);
    }

    pub fn len(&self) -> usize {
        self.entered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entered.is_empty()
    }

    /// Names of entered stages, in entry order.
    pub fn names(&self) -> Vec<String> {
        self.entered.iter().map(|s| s.name.clone()).collect()
    }

    /// Pop every stage and run its exit, most recently entered first.
    ///
    /// A failing exit is recorded and unwinding carries on with the next
    /// stage, so every entered stage gets exactly one exit attempt.
    pub async fn unwind(
        &mut self,
        ctx: &mut RunContext,
        trigger: Option<&TeuthologyError>,
    ) -> Unwound {
        let mut unwound = Unwound::default();

        while let Some(mut stage) = self.entered.pop() {
            info!(stage = %stage.name, index = stage.index, "exiting stage");
            if let Err(err) = stage.exit(ctx, trigger).await {
                error!(
                    stage = %stage.name,
                    index = stage.index,
                    error = %err,
                    "stage exit failed; continuing teardown"
                );
                unwound.errors.push(err);
            }
            unwound.exited.push(stage.name);
        }

        unwound
    }
}
