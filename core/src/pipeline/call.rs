use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;

use crate::context::Engine;
use crate::error::TaskOutcome;
use crate::exec::{call_external, CallResult, ExternalCall};
use crate::robot::Robot;
use crate::run::RunContext;
use crate::task::Task;

impl Engine {
    /// Runs one task: a native handler in-process, anything with a path as
    /// an external process.
    pub(crate) async fn call_task(
        &self,
        run: &Arc<RunContext>,
        task: &Arc<Task>,
        command: &str,
        args: &[String],
    ) -> CallResult {
        run.set_current_task(task.name(), &task.base.description);
        if task.base.disabled {
            let msg = format!(
                "callTask failed on disabled task {}; reason: {}",
                task.name(),
                task.base.reason
            );
            tracing::error!(error.kind = "task.disabled", task = %task.name(), "{}", msg);
            return CallResult::new(TaskOutcome::ConfigurationError, msg);
        }

        let logger = run.state().logger.clone();
        if let Some(logger) = logger {
            let desc = if task.base.description.is_empty() {
                "Starting task".to_string()
            } else {
                format!("Starting task: {}", task.base.description)
            };
            logger.section(task.name(), &desc);
        }

        tracing::debug!(
            task = %task.name(),
            command = %command,
            args = ?args,
            "dispatching command"
        );
        if task.is_native() {
            return self.call_native(run, task, command, args).await;
        }

        let services = self.services();
        let cfg = self.config();
        call_external(ExternalCall {
            runner: services.runner.as_ref(),
            store: services.store.as_ref(),
            paths: &cfg.paths,
            run,
            task,
            command,
            args,
        })
        .await
    }

    async fn call_native(
        &self,
        run: &Arc<RunContext>,
        task: &Arc<Task>,
        command: &str,
        args: &[String],
    ) -> CallResult {
        let Some(handler) = self.inner.handlers.get(task.name()) else {
            tracing::error!(error.kind = "task.handler", task = %task.name(), "no handler registered");
            return CallResult::new(TaskOutcome::ConfigurationError, "");
        };
        let robot = Robot::new(self.clone(), run.clone(), task.clone());
        let fut = handler.handle(&robot, command, args);
        match AssertUnwindSafe(fut).catch_unwind().await {
            Ok(outcome) => CallResult::new(outcome, ""),
            Err(panic) => {
                let reason = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                tracing::error!(
                    error.kind = "task.panic",
                    task = %task.name(),
                    command = %command,
                    args = ?args,
                    reason = %reason,
                    "task panicked"
                );
                CallResult::new(TaskOutcome::Fail, "")
            }
        }
    }
}
