// src/remote/mod.rs

//! Remote execution layer.
//!
//! - [`command`] builds and quotes command lines from [`Arg`] tokens.
//! - [`backend`] defines the [`RemoteHandle`] / [`Connector`] traits the rest
//!   of the crate talks to.
//! - [`host`] wraps a handle with a name and exit-status checking.
//! - [`ssh`] is the production transport.

pub mod backend;
pub mod command;
pub mod host;
pub mod ssh;

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::task::JoinSet;
use tracing::{info, warn};

pub use backend::{CommandOutput, Connector, RemoteHandle};
pub use command::{args, raw, render, Arg};
pub use host::Host;
pub use ssh::{SshConnector, SshOptions};

use crate::errors::{Result, TeuthologyError};

/// Connect to every target concurrently.
///
/// Results come back in target order, one per target, whether or not the
/// connection succeeded. Callers decide whether a single failure is fatal.
pub async fn connect_all(
    connector: Arc<dyn Connector>,
    targets: &[String],
) -> Vec<(String, Result<Host>)> {
    info!(count = targets.len(), "opening connections");

    let mut set = JoinSet::new();
    for (idx, target) in targets.iter().cloned().enumerate() {
        let connector = Arc::clone(&connector);
        set.spawn(async move {
            let attempt = AssertUnwindSafe(connector.connect(target.clone()))
                .catch_unwind()
                .await;
            let result = match attempt {
                Ok(Ok(remote)) => Ok(Host::new(target.clone(), remote)),
                Ok(Err(e)) => Err(TeuthologyError::Connection {
                    host: target.clone(),
                    reason: format!("{e:#}"),
                }),
                Err(_) => Err(TeuthologyError::Connection {
                    host: target.clone(),
                    reason: "connector panicked".to_string(),
                }),
            };
            (idx, result)
        });
    }

    let mut slots: Vec<Option<Result<Host>>> = targets.iter().map(|_| None).collect();
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((idx, result)) => slots[idx] = Some(result),
            Err(e) => warn!(error = %e, "connection task did not complete"),
        }
    }

    targets
        .iter()
        .cloned()
        .zip(slots)
        .map(|(target, slot)| {
            let result = slot.unwrap_or_else(|| {
                Err(TeuthologyError::Connection {
                    host: target.clone(),
                    reason: "connection task did not complete".to_string(),
                })
            });
            if let Err(e) = &result {
                warn!(%target, error = %e, "connection failed");
            }
            (target, result)
        })
        .collect()
}
