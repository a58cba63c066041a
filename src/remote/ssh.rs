// src/remote/ssh.rs

//! Production transport: the system `ssh` binary driven through
//! `tokio::process::Command`.
//!
//! Every command is a fresh non-interactive `ssh` invocation with batch-mode
//! options, so a stalled host or an unexpected password prompt fails instead
//! of hanging the run. Connection multiplexing, if wanted, is left to the
//! user's `~/.ssh/config` (`ControlMaster`).

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use futures::future::BoxFuture;
use tokio::process::Command;
use tracing::{debug, info};

use crate::remote::backend::{CommandOutput, Connector, RemoteHandle};

/// ssh reserves exit status 255 for its own errors.
const SSH_ERROR_STATUS: i32 = 255;

/// Options shared by every connection made through one [`SshConnector`].
#[derive(Debug, Clone)]
pub struct SshOptions {
    pub connect_timeout: Duration,
    pub identity_file: Option<PathBuf>,
}

impl Default for SshOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            identity_file: None,
        }
    }
}

/// A parsed `[user@]host[:port]` target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshTarget {
    pub user: Option<String>,
    pub host: String,
    pub port: Option<u16>,
}

impl SshTarget {
    pub fn parse(target: &str) -> Result<Self> {
        let target = target.trim();
        let (user, rest) = match target.split_once('@') {
            Some((user, rest)) if !user.is_empty() => (Some(user.to_string()), rest),
            Some(_) => bail!("empty user in target '{target}'"),
            None => (None, target),
        };

        let (host, port) = match rest.rsplit_once(':') {
            Some((host, port)) => {
                let port = port
                    .parse::<u16>()
                    .with_context(|| format!("invalid port in target '{target}'"))?;
                (host, Some(port))
            }
            None => (rest, None),
        };

        if host.is_empty() {
            bail!("empty host in target '{target}'");
        }

        Ok(Self {
            user,
            host: host.to_string(),
            port,
        })
    }

    fn destination(&self) -> String {
        match &self.user {
            Some(user) => format!("{user}@{}", self.host),
            None => self.host.clone(),
        }
    }
}

/// Connects to targets with the system `ssh` client.
#[derive(Debug, Clone, Default)]
pub struct SshConnector {
    options: SshOptions,
}

impl SshConnector {
    pub fn new(options: SshOptions) -> Self {
        Self { options }
    }
}

impl Connector for SshConnector {
    fn connect(&self, target: String) -> BoxFuture<'_, Result<Arc<dyn RemoteHandle>>> {
        Box::pin(async move {
            let parsed = SshTarget::parse(&target)?;
            let remote = SshRemote {
                target: parsed,
                options: self.options.clone(),
            };

            // Probe once so unreachable hosts fail here rather than in the
            // middle of the first stage.
            let probe = remote
                .exec("true".to_string())
                .await
                .with_context(|| format!("probing {target}"))?;
            if !probe.success() {
                return Err(anyhow!(
                    "ssh probe exited with status {}: {}",
                    probe.exit_code,
                    probe.stderr.trim()
                ));
            }

            info!(%target, "connected");
            Ok(Arc::new(remote) as Arc<dyn RemoteHandle>)
        })
    }
}

/// One host reachable through `ssh`.
#[derive(Debug, Clone)]
pub struct SshRemote {
    target: SshTarget,
    options: SshOptions,
}

impl SshRemote {
    fn build_args(&self, command: String) -> Vec<String> {
        let mut args = Vec::new();

        if let Some(identity) = &self.options.identity_file {
            args.push("-i".to_string());
            args.push(identity.display().to_string());
        }

        if let Some(port) = self.target.port {
            args.push("-p".to_string());
            args.push(port.to_string());
        }

        args.extend([
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", self.options.connect_timeout.as_secs().max(1)),
            "-o".to_string(),
            "ServerAliveInterval=15".to_string(),
            "-o".to_string(),
            "ServerAliveCountMax=3".to_string(),
        ]);

        args.push(self.target.destination());
        args.push(command);
        args
    }

    async fn exec(&self, command: String) -> Result<CommandOutput> {
        let args = self.build_args(command);
        debug!(host = %self.target.host, ?args, "spawning ssh");

        let output = Command::new("ssh")
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .with_context(|| format!("spawning ssh for {}", self.target.host))?;

        Ok(CommandOutput {
            stdout: output.stdout,
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            exit_code: output.status.code().unwrap_or(-1),
        })
    }
}

impl RemoteHandle for SshRemote {
    fn run(&self, command: String) -> BoxFuture<'_, Result<CommandOutput>> {
        Box::pin(async move {
            let output = self.exec(command).await?;
            if output.exit_code == SSH_ERROR_STATUS && !output.stderr.is_empty() {
                bail!("ssh to {} failed: {}", self.target.host, output.stderr.trim());
            }
            Ok(output)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_user_host_and_port() {
        let t = SshTarget::parse("ubuntu@node1.example.com:2222").unwrap();
        assert_eq!(t.user.as_deref(), Some("ubuntu"));
        assert_eq!(t.host, "node1.example.com");
        assert_eq!(t.port, Some(2222));
        assert_eq!(t.destination(), "ubuntu@node1.example.com");
    }

    #[test]
    fn bare_host_has_no_user_or_port() {
        let t = SshTarget::parse("node2").unwrap();
        assert_eq!(t.user, None);
        assert_eq!(t.port, None);
        assert_eq!(t.destination(), "node2");
    }

    #[test]
    fn rejects_malformed_targets() {
        assert!(SshTarget::parse("@node").is_err());
        assert!(SshTarget::parse("user@").is_err());
        assert!(SshTarget::parse("node:notaport").is_err());
    }

    #[test]
    fn command_is_last_argument_after_destination() {
        let remote = SshRemote {
            target: SshTarget::parse("root@h1:2200").unwrap(),
            options: SshOptions::default(),
        };
        let args = remote.build_args("uname -r".to_string());
        assert_eq!(args[0], "-p");
        assert_eq!(args[1], "2200");
        assert!(args.contains(&"BatchMode=yes".to_string()));
        assert_eq!(args[args.len() - 2], "root@h1");
        assert_eq!(args[args.len() - 1], "uname -r");
    }
}
