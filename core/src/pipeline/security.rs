use std::sync::Arc;

use crate::context::Engine;
use crate::error::TaskOutcome;
use crate::robot::Robot;
use crate::run::{RunContext, RunEvent};
use crate::task::{Task, TaskKind};

const NOT_AUTHORIZED: &str = "Sorry, you're not authorized for that command";
const AUTH_MISCONFIGURED: &str =
    "Sorry, authorization isn't configured properly for that command; ask an administrator to check the logs";
const NOT_ELEVATED: &str = "Sorry, this command requires elevation";
const ELEVATE_MISCONFIGURED: &str =
    "Sorry, elevation isn't configured properly for that command; ask an administrator to check the logs";

impl Engine {
    pub(crate) fn denied(&self, run: &RunContext, task: &Task, command: &str, reason: &str) {
        tracing::warn!(
            run_id = %run.id(),
            user = %run.user,
            task = %task.name(),
            command = %command,
            reason = %reason,
            "policy check denied"
        );
        self.emit(RunEvent::PolicyDenied {
            run_id: run.id(),
            task: task.name().to_string(),
            command: command.to_string(),
            reason: reason.to_string(),
        });
    }

    async fn deny_with(&self, run: &Arc<RunContext>, task: &Arc<Task>, command: &str, reason: &str, msg: &str) {
        self.denied(run, task, command, reason);
        Robot::new(self.clone(), run.clone(), task.clone())
            .reply(msg)
            .await;
    }

    /// User allow-list, admin requirement, then the authorizer task when the
    /// command calls for one.
    pub(crate) async fn authorize(
        &self,
        run: &Arc<RunContext>,
        task: &Arc<Task>,
        command: &str,
        args: &[String],
    ) -> bool {
        let base = &task.base;
        if !base.users.is_empty() && !base.users.iter().any(|u| u == &run.user) {
            self.deny_with(run, task, command, "user not in allow-list", NOT_AUTHORIZED)
                .await;
            return false;
        }
        if base.require_admin && !self.is_admin(&run.user) {
            self.deny_with(run, task, command, "admin required", super::ADMIN_ONLY_MESSAGE)
                .await;
            return false;
        }

        let needs_authorizer = match &task.kind {
            TaskKind::Plugin(p) => {
                p.authorize_all_commands || p.authorized_commands.iter().any(|c| c == command)
            }
            TaskKind::Job(_) => base.authorizer.is_some(),
        };
        if !needs_authorizer {
            return true;
        }

        let name = base
            .authorizer
            .clone()
            .or_else(|| self.config().default_authorizer.clone())
            .unwrap_or_default();
        let Some(authorizer) = run.tasks.get_by_name(&name).filter(|t| !t.is_job()) else {
            tracing::error!(
                error.kind = "policy.config",
                task = %task.name(),
                authorizer = %name,
                "authorization required but no usable authorizer configured"
            );
            self.deny_with(run, task, command, "authorizer missing", AUTH_MISCONFIGURED)
                .await;
            return false;
        };

        let mut auth_args = vec![
            task.name().to_string(),
            base.auth_require.clone(),
            command.to_string(),
        ];
        auth_args.extend(args.iter().cloned());
        let result = self
            .call_task(run, &authorizer, "authorize", &auth_args)
            .await;
        match result.outcome {
            TaskOutcome::Success => true,
            TaskOutcome::ConfigurationError | TaskOutcome::MechanismFail => {
                self.deny_with(run, task, command, "authorizer failed", AUTH_MISCONFIGURED)
                    .await;
                false
            }
            other => {
                tracing::debug!(outcome = %other, "authorizer refused");
                self.deny_with(run, task, command, "not authorized", NOT_AUTHORIZED)
                    .await;
                false
            }
        }
    }

    /// Elevation is requested at most once per run: after a successful
    /// elevation no later command in the run asks again, immediate or not.
    pub(crate) async fn check_elevation(
        &self,
        run: &Arc<RunContext>,
        task: &Arc<Task>,
        command: &str,
    ) -> bool {
        let immediate = match &task.kind {
            TaskKind::Plugin(p) => {
                if p.elevate_immediate_commands.iter().any(|c| c == command) {
                    Some(true)
                } else if p.elevated_commands.iter().any(|c| c == command) {
                    Some(false)
                } else {
                    None
                }
            }
            TaskKind::Job(_) => task.base.elevator.as_ref().map(|_| false),
        };
        let Some(immediate) = immediate else {
            return true;
        };
        if run.state().elevated {
            return true;
        }
        match self.elevate(run, task, immediate).await {
            TaskOutcome::Success => true,
            TaskOutcome::ConfigurationError | TaskOutcome::MechanismFail => {
                self.deny_with(run, task, command, "elevator failed", ELEVATE_MISCONFIGURED)
                    .await;
                false
            }
            _ => {
                self.deny_with(run, task, command, "elevation failed", NOT_ELEVATED)
                    .await;
                false
            }
        }
    }

    /// Calls the task's elevator (or the default one). Success marks the run
    /// as elevated.
    pub(crate) async fn elevate(
        &self,
        run: &Arc<RunContext>,
        task: &Arc<Task>,
        immediate: bool,
    ) -> TaskOutcome {
        let name = task
            .base
            .elevator
            .clone()
            .or_else(|| self.config().default_elevator.clone())
            .unwrap_or_default();
        let Some(elevator) = run.tasks.get_by_name(&name).filter(|t| !t.is_job()) else {
            tracing::error!(
                error.kind = "policy.config",
                task = %task.name(),
                elevator = %name,
                "elevation required but no usable elevator configured"
            );
            return TaskOutcome::ConfigurationError;
        };
        let arg = if immediate { "true" } else { "false" };
        let result = self
            .call_task(run, &elevator, "elevate", &[arg.to_string()])
            .await;
        if result.outcome.is_success() {
            run.state().elevated = true;
        }
        result.outcome
    }
}
