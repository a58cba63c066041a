// src/remote/host.rs

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::errors::{Result, TeuthologyError};
use crate::remote::backend::{CommandOutput, RemoteHandle};
use crate::remote::command::{render, Arg};

/// A connected remote host.
///
/// Cloning is cheap: clones share the same underlying connection.
#[derive(Clone)]
pub struct Host {
    name: String,
    remote: Arc<dyn RemoteHandle>,
}

impl fmt::Debug for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Host")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl Host {
    pub fn new(name: impl Into<String>, remote: Arc<dyn RemoteHandle>) -> Self {
        Self {
            name: name.into(),
            remote,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run a command and fail with [`TeuthologyError::CommandFailed`] if it
    /// exits non-zero.
    pub async fn run(&self, args: &[Arg]) -> Result<CommandOutput> {
        self.run_rendered_checked(render(args)).await
    }

    /// Run a command and return its output whatever the exit status.
    pub async fn run_unchecked(&self, args: &[Arg]) -> Result<CommandOutput> {
        self.run_rendered(render(args)).await
    }

    pub(crate) async fn run_rendered(&self, command: String) -> Result<CommandOutput> {
        debug!(host = %self.name, %command, "running remote command");
        let output = self
            .remote
            .run(command)
            .await
            .map_err(|e| TeuthologyError::Connection {
                host: self.name.clone(),
                reason: format!("{e:#}"),
            })?;
        debug!(
            host = %self.name,
            exit_code = output.exit_code,
            "remote command finished"
        );
        Ok(output)
    }

    /// Same as [`Host::run`], for a pre-rendered command line.
    pub(crate) async fn run_rendered_checked(&self, command: String) -> Result<CommandOutput> {
        let output = self.run_rendered(command.clone()).await?;
        if !output.success() {
            return Err(TeuthologyError::CommandFailed {
                host: self.name.clone(),
                command,
                exit_code: output.exit_code,
            });
        }
        Ok(output)
    }
}
