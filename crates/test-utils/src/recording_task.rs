use std::sync::{Arc, Mutex};

use anyhow::bail;
use futures::future::BoxFuture;
use teuthology::context::RunContext;
use teuthology::errors::TeuthologyError;
use teuthology::tasks::{Task, TaskRegistry};

/// What a [`RecordingTask`] saw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Enter(String),
    Exit(String),
}

pub type EventLog = Arc<Mutex<Vec<Event>>>;

/// How a [`RecordingTask`] misbehaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Behaviour {
    #[default]
    Succeed,
    FailEnter,
    FailExit,
    PanicEnter,
    PanicExit,
}

/// A task that:
/// - pushes `Enter(name)` / `Exit(name)` into a shared log
/// - fails or panics in the phase its [`Behaviour`] says.
///
/// The event is logged before failing, so the log shows every attempt.
pub struct RecordingTask {
    name: String,
    log: EventLog,
    behaviour: Behaviour,
}

impl RecordingTask {
    pub fn new(name: &str, log: EventLog, behaviour: Behaviour) -> Self {
        Self {
            name: name.to_string(),
            log,
            behaviour,
        }
    }
}

impl Task for RecordingTask {
    fn enter<'a>(&'a mut self, ctx: &'a mut RunContext) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            self.log.lock().unwrap().push(Event::Enter(self.name.clone()));
            match self.behaviour {
                Behaviour::FailEnter => bail!("{} refused to enter", self.name),
                Behaviour::PanicEnter => panic!("{} blew up on enter", self.name),
                _ => {}
            }
            ctx.summary
                .insert(&format!("entered.{}", self.name), true);
            Ok(())
        })
    }

    fn exit<'a>(
        &'a mut self,
        _ctx: &'a mut RunContext,
        _failure: Option<&'a TeuthologyError>,
    ) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            self.log.lock().unwrap().push(Event::Exit(self.name.clone()));
            match self.behaviour {
                Behaviour::FailExit => bail!("{} refused to exit", self.name),
                Behaviour::PanicExit => panic!("{} blew up on exit", self.name),
                _ => Ok(()),
            }
        })
    }
}

/// Register a recording task under `name`.
pub fn register_recording(
    registry: &mut TaskRegistry,
    name: &str,
    log: &EventLog,
    behaviour: Behaviour,
) {
    let task_name = name.to_string();
    let log = Arc::clone(log);
    registry.register(name, move |_params| {
        Ok(Box::new(RecordingTask::new(&task_name, Arc::clone(&log), behaviour)) as Box<dyn Task>)
    });
}

/// A registry holding only recording tasks.
pub fn recording_registry(log: &EventLog, tasks: &[(&str, Behaviour)]) -> TaskRegistry {
    let mut registry = TaskRegistry::empty();
    for (name, behaviour) in tasks {
        register_recording(&mut registry, name, log, *behaviour);
    }
    registry
}

/// Names in the log, filtered to one kind of event.
pub fn entered(log: &EventLog) -> Vec<String> {
    log.lock()
        .unwrap()
        .iter()
        .filter_map(|e| match e {
            Event::Enter(n) => Some(n.clone()),
            Event::Exit(_) => None,
        })
        .collect()
}

pub fn exited(log: &EventLog) -> Vec<String> {
    log.lock()
        .unwrap()
        .iter()
        .filter_map(|e| match e {
            Event::Exit(n) => Some(n.clone()),
            Event::Enter(_) => None,
        })
        .collect()
}
