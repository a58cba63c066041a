// src/remote/backend.rs

//! Pluggable remote transport abstraction.
//!
//! The cluster and the tasks talk to a [`RemoteHandle`] instead of a concrete
//! SSH session. Production code uses [`SshConnector`](super::ssh::SshConnector);
//! tests provide fakes that record commands and script failures.

use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;

/// Result of running one command on one host.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: Vec<u8>,
    pub stderr: String,
    pub exit_code: i32,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Stdout decoded lossily and trimmed; most commands print text.
    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).trim().to_string()
    }
}

/// Capability to execute a rendered command line on one host.
///
/// Implementations must tolerate being called from several stages over the
/// lifetime of one connection, and from several tasks concurrently.
pub trait RemoteHandle: Send + Sync + fmt::Debug {
    /// Run `command` through the remote shell.
    ///
    /// An `Err` means the transport itself failed. A command that ran but
    /// exited non-zero is an `Ok` with a non-zero `exit_code`.
    fn run(&self, command: String) -> BoxFuture<'_, anyhow::Result<CommandOutput>>;
}

/// Establishes a [`RemoteHandle`] for a target string.
pub trait Connector: Send + Sync {
    fn connect(&self, target: String) -> BoxFuture<'_, anyhow::Result<Arc<dyn RemoteHandle>>>;
}
