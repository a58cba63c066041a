// src/errors.rs

//! Crate-wide error type and exit-code mapping.

use std::fmt;

use thiserror::Error;

/// Which half of a stage produced an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Enter,
    Exit,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Enter => f.write_str("enter"),
            Phase::Exit => f.write_str("exit"),
        }
    }
}

/// Failure raised by a task while entering or exiting its stage.
#[derive(Error, Debug)]
#[error("stage {index} '{stage}' failed during {phase}: {cause:#}")]
pub struct StageError {
    pub stage: String,
    pub index: usize,
    pub phase: Phase,
    pub cause: anyhow::Error,
}

#[derive(Error, Debug)]
pub enum TeuthologyError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Connection to {host} failed: {reason}")]
    Connection { host: String, reason: String },

    #[error("Command failed on {host} with exit status {exit_code}: {command}")]
    CommandFailed {
        host: String,
        command: String,
        exit_code: i32,
    },

    #[error("Unknown task: {0}")]
    UnknownTask(String),

    #[error(transparent)]
    Stage(#[from] StageError),

    #[error("{} teardown error(s) while unwinding{}", .teardown.len(), trigger_suffix(.trigger))]
    AggregateTeardown {
        trigger: Option<Box<TeuthologyError>>,
        teardown: Vec<StageError>,
    },

    #[error("Run failed: {0}")]
    RunFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

fn trigger_suffix(trigger: &Option<Box<TeuthologyError>>) -> String {
    match trigger {
        Some(err) => format!(" after: {err}"),
        None => String::new(),
    }
}

/// Process exit codes, grouped so scripts can tell failure classes apart.
pub mod exit_code {
    pub const SUCCESS: i32 = 0;
    pub const TASK_FAILURE: i32 = 1;
    pub const CONFIGURATION: i32 = 2;
    pub const INFRASTRUCTURE: i32 = 3;
}

impl TeuthologyError {
    pub fn config(msg: impl Into<String>) -> Self {
        TeuthologyError::Configuration(msg.into())
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            TeuthologyError::Configuration(_)
            | TeuthologyError::UnknownTask(_)
            | TeuthologyError::Yaml(_) => exit_code::CONFIGURATION,
            TeuthologyError::Connection { .. }
            | TeuthologyError::Io(_)
            | TeuthologyError::Other(_) => exit_code::INFRASTRUCTURE,
            TeuthologyError::CommandFailed { .. }
            | TeuthologyError::RunFailed(_)
            | TeuthologyError::Stage(_)
            | TeuthologyError::AggregateTeardown { .. } => exit_code::TASK_FAILURE,
        }
    }

    /// Every individual failure carried by this error, trigger first.
    ///
    /// Used to log the full set of collected errors at the end of a run.
    pub fn flatten(&self) -> Vec<String> {
        match self {
            TeuthologyError::AggregateTeardown { trigger, teardown } => {
                let mut out = Vec::with_capacity(teardown.len() + 1);
                if let Some(trigger) = trigger {
                    out.extend(trigger.flatten());
                }
                out.extend(teardown.iter().map(|e| e.to_string()));
                out
            }
            other => vec![other.to_string()],
        }
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, TeuthologyError>;
