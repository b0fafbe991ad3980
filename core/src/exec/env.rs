use std::collections::HashMap;

use crate::run::RunContext;
use crate::store::{self, Store};
use crate::task::{NameValue, Task};

pub const ENV_INSTALLDIR: &str = "OPSBOT_INSTALLDIR";
pub const ENV_CONFIGDIR: &str = "OPSBOT_CONFIGDIR";
pub const ENV_CALLER_ID: &str = "OPSBOT_CALLER_ID";
pub const ENV_CHANNEL: &str = "OPSBOT_CHANNEL";
pub const ENV_USER: &str = "OPSBOT_USER";
pub const ENV_PROTOCOL: &str = "OPSBOT_PROTOCOL";

/// Host variables handed through to every external task.
pub const PASSTHROUGH_VARS: &[&str] = &["HOME", "HOSTNAME", "LANG", "PATH", "USER"];

/// Layers pipeline parameters under the run's dynamic ones. Each layer only
/// fills keys still missing: job parameters, then stored namespace
/// parameters, then host pass-through variables.
pub fn layer_environment<F>(
    env: &mut HashMap<String, String>,
    job_params: &[NameValue],
    stored: &HashMap<String, String>,
    host: F,
) where
    F: Fn(&str) -> Option<String>,
{
    for p in job_params {
        env.entry(p.name.clone()).or_insert_with(|| p.value.clone());
    }
    for (k, v) in stored {
        env.entry(k.clone()).or_insert_with(|| v.clone());
    }
    for var in PASSTHROUGH_VARS {
        if env.contains_key(*var) {
            continue;
        }
        if let Some(v) = host(var) {
            env.insert((*var).to_string(), v);
        }
    }
}

/// Environment for one external task invocation. The task's stored
/// parameters fill gaps unless this is the pipeline's first task, whose
/// namespace was already merged when the pipeline started.
pub async fn task_environment(
    run: &RunContext,
    task: &Task,
    store: &dyn Store,
) -> HashMap<String, String> {
    let (mut env, merge_stored) = {
        let mut st = run.state();
        let starting = st.pipe_starting;
        st.pipe_starting = false;
        (st.environment.clone(), !starting)
    };

    if merge_stored {
        match store::namespace_parameters(store, task.param_namespace()).await {
            Ok(stored) => {
                for (k, v) in stored {
                    env.entry(k).or_insert(v);
                }
            }
            Err(e) => tracing::warn!(
                error.kind = "store",
                task = %task.name(),
                reason = %e,
                "unable to read stored parameters"
            ),
        }
    }

    env.insert(ENV_CHANNEL.into(), run.channel.clone());
    env.insert(ENV_USER.into(), run.user.clone());
    env.insert(ENV_PROTOCOL.into(), run.protocol.clone());

    env.retain(|k, _| {
        if k.is_empty() {
            tracing::error!(
                task = %task.name(),
                "empty name while populating environment, skipping"
            );
            return false;
        }
        true
    });
    env
}
