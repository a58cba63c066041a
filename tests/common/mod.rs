#![allow(dead_code)]

pub use teuthology_test_utils::{builders, fake_remote, init_tracing, recording_task, with_timeout};

use serde_yaml::Value;
use teuthology::cluster::Cluster;
use teuthology::context::{RunContext, Summary};

use crate::common::builders::RunConfigBuilder;
use crate::common::fake_remote::{fake_host, CommandLog};

pub type TestResult = Result<(), Box<dyn std::error::Error>>;

/// A context over `n` fake hosts named `h1..hN`, host `i` holding role
/// `role.i`. Every command run on them lands in the returned log.
pub fn fake_context(n: usize) -> (RunContext, CommandLog) {
    let log = CommandLog::default();
    let mut cluster = Cluster::new();
    let mut builder = RunConfigBuilder::new();
    for i in 1..=n {
        let name = format!("h{i}");
        let role = format!("role.{i}");
        cluster
            .add(fake_host(&name, &log), [role.clone()])
            .expect("distinct fake hosts");
        builder = builder.target(&name, &[role.as_str()]);
    }
    let ctx = RunContext::new(cluster, Summary::new(), builder.build(), None);
    (ctx, log)
}

/// `[a, b, c]` as a YAML sequence of strings.
pub fn names_value(names: &[&str]) -> Value {
    Value::Sequence(names.iter().map(|n| Value::from(*n)).collect())
}
