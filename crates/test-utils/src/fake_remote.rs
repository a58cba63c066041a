use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use anyhow::anyhow;
use futures::future::BoxFuture;
use teuthology::remote::{CommandOutput, Connector, RemoteHandle};

/// One command as seen by a [`FakeRemote`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCommand {
    pub host: String,
    pub command: String,
}

pub type CommandLog = Arc<Mutex<Vec<RecordedCommand>>>;

/// A scripted reply: the first rule whose host matches and whose needle is a
/// substring of the command wins.
#[derive(Debug, Clone)]
struct Rule {
    host: Option<String>,
    needle: String,
    reply: Reply,
}

#[derive(Debug, Clone)]
enum Reply {
    Output(CommandOutput),
    TransportError(String),
}

/// A fake remote that:
/// - records every command it is asked to run
/// - answers with the first matching scripted reply, or exit 0 and no output.
#[derive(Debug)]
pub struct FakeRemote {
    host: String,
    log: CommandLog,
    rules: Vec<Rule>,
}

impl RemoteHandle for FakeRemote {
    fn run(&self, command: String) -> BoxFuture<'_, anyhow::Result<CommandOutput>> {
        Box::pin(async move {
            {
                let mut guard = self.log.lock().unwrap();
                guard.push(RecordedCommand {
                    host: self.host.clone(),
                    command: command.clone(),
                });
            }

            let rule = self.rules.iter().find(|r| {
                r.host.as_deref().is_none_or(|h| h == self.host) && command.contains(&r.needle)
            });
            match rule.map(|r| &r.reply) {
                Some(Reply::Output(output)) => Ok(output.clone()),
                Some(Reply::TransportError(msg)) => Err(anyhow!("{msg}")),
                None => Ok(CommandOutput::default()),
            }
        })
    }
}

/// Hands out [`FakeRemote`]s sharing one command log.
#[derive(Debug, Default)]
pub struct FakeConnector {
    log: CommandLog,
    attempts: Arc<Mutex<Vec<String>>>,
    unreachable: BTreeSet<String>,
    rules: Vec<Rule>,
}

impl FakeConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connecting to `target` fails.
    pub fn unreachable(mut self, target: &str) -> Self {
        self.unreachable.insert(target.to_string());
        self
    }

    /// A command containing `needle` on `host` gets `output`.
    pub fn respond_on(mut self, host: &str, needle: &str, output: CommandOutput) -> Self {
        self.rules.push(Rule {
            host: Some(host.to_string()),
            needle: needle.to_string(),
            reply: Reply::Output(output),
        });
        self
    }

    /// A command containing `needle` on `host` exits with `code`.
    pub fn fail_on(self, host: &str, needle: &str, code: i32) -> Self {
        self.respond_on(
            host,
            needle,
            CommandOutput {
                exit_code: code,
                ..CommandOutput::default()
            },
        )
    }

    /// A command containing `needle` on `host` loses the connection.
    pub fn drop_on(mut self, host: &str, needle: &str) -> Self {
        self.rules.push(Rule {
            host: Some(host.to_string()),
            needle: needle.to_string(),
            reply: Reply::TransportError("connection reset by peer".to_string()),
        });
        self
    }

    /// Every recorded command, in order.
    pub fn commands(&self) -> Vec<RecordedCommand> {
        self.log.lock().unwrap().clone()
    }

    /// Commands recorded for `host`, in order.
    pub fn commands_for(&self, host: &str) -> Vec<String> {
        self.commands()
            .into_iter()
            .filter(|c| c.host == host)
            .map(|c| c.command)
            .collect()
    }

    /// Targets a connection was attempted to, in attempt order.
    pub fn connect_attempts(&self) -> Vec<String> {
        self.attempts.lock().unwrap().clone()
    }
}

impl Connector for FakeConnector {
    fn connect(&self, target: String) -> BoxFuture<'_, anyhow::Result<Arc<dyn RemoteHandle>>> {
        Box::pin(async move {
            self.attempts.lock().unwrap().push(target.clone());
            if self.unreachable.contains(&target) {
                return Err(anyhow!("ssh: connect to host {target} port 22: Connection refused"));
            }
            let remote: Arc<dyn RemoteHandle> = Arc::new(FakeRemote {
                host: target,
                log: Arc::clone(&self.log),
                rules: self.rules.clone(),
            });
            Ok(remote)
        })
    }
}

/// Build a [`teuthology::remote::Host`] backed by a fresh fake remote.
pub fn fake_host(name: &str, log: &CommandLog) -> teuthology::remote::Host {
    teuthology::remote::Host::new(
        name,
        Arc::new(FakeRemote {
            host: name.to_string(),
            log: Arc::clone(log),
            rules: Vec::new(),
        }),
    )
}
