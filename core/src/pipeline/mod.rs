//! Sequential execution of a run's task chain.

mod call;
mod security;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio::task::JoinHandle;

use crate::context::Engine;
use crate::error::{EngineError, TaskOutcome};
use crate::exec::env::{layer_environment, ENV_CALLER_ID, ENV_CONFIGDIR, ENV_INSTALLDIR};
use crate::history::start_run_history;
use crate::registry::TaskTable;
use crate::robot::Robot;
use crate::run::{RunContext, RunEvent, RunGuard, RunId, RunParams, TriggerKind};
use crate::store;
use crate::task::{TaskSpec, RUN_COMMAND};

pub const ADMIN_ONLY_MESSAGE: &str = "Sorry, that command is only available to bot administrators";

/// A trigger, ready to run.
pub struct PipelineRequest {
    pub start: TaskSpec,
    pub params: RunParams,
    /// Table the run resolves tasks against; `None` takes the registry's
    /// current snapshot when the run starts.
    pub tasks: Option<Arc<TaskTable>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOutcome {
    pub run_id: RunId,
    /// Index in the task's history; 0 when no history is kept.
    pub run_index: u64,
    pub outcome: TaskOutcome,
    /// Name of the task that stopped the chain, if any.
    pub failed_task: Option<String>,
}

impl Engine {
    /// Runs a pipeline on its own task.
    pub fn spawn_pipeline(&self, req: PipelineRequest) -> JoinHandle<PipelineOutcome> {
        let engine = self.clone();
        tokio::spawn(async move { engine.run_pipeline(req).await })
    }

    pub async fn run_pipeline(&self, req: PipelineRequest) -> PipelineOutcome {
        let PipelineRequest {
            start,
            mut params,
            tasks,
        } = req;
        let task = start.task.clone();
        let is_job = task.is_job();
        let verbose = task.as_job().is_some_and(|j| j.verbose) || params.trigger == TriggerKind::RunJob;
        let interactive = params.interactive;
        let trigger = params.trigger;
        if params.protocol.is_empty() {
            params.protocol = self.connector().protocol().to_string();
        }

        let tasks = tasks.unwrap_or_else(|| self.tasks().snapshot());
        let run = Arc::new(RunContext::new(params, tasks));
        let pipe_name = task.name().to_string();
        {
            let mut st = run.state();
            st.pipe_name = pipe_name.clone();
            st.pipe_desc = task.base.description.clone();
            st.namespace = task.param_namespace().to_string();
            st.format = self.config().default_message_format;
        }

        // History.
        let mut run_index = 0;
        if task.base.history_logs > 0 || is_job {
            let services = self.services();
            let history = start_run_history(
                services.store.as_ref(),
                services.history.as_deref(),
                &pipe_name,
                task.base.history_logs,
                self.zone().history_timestamp(),
            )
            .await;
            run_index = history.run_index;
            run.state().logger = history.logger;
        }

        // Environment: dynamic parameters first, then gaps filled from job
        // parameters, stored parameters and the host.
        let stored = match store::namespace_parameters(self.store(), task.param_namespace()).await {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(
                    error.kind = "store",
                    namespace = %task.param_namespace(),
                    reason = %e,
                    "unable to read stored parameters"
                );
                HashMap::new()
            }
        };
        {
            let job_params = task.as_job().map(|j| j.parameters.as_slice()).unwrap_or(&[]);
            let mut st = run.state();
            layer_environment(&mut st.environment, job_params, &stored, |var| {
                std::env::var(var).ok()
            });
            st.pipe_starting = true;
        }

        // Registration.
        let run_id = self.runs().register(&run);
        let _guard = RunGuard::new(self.runs().clone(), run_id);
        {
            let cfg = self.config();
            let paths = &cfg.paths;
            let mut st = run.state();
            st.environment
                .insert(ENV_INSTALLDIR.into(), paths.install_dir.clone());
            st.environment
                .insert(ENV_CONFIGDIR.into(), paths.effective_config_dir().to_string());
            st.environment
                .insert(ENV_CALLER_ID.into(), run_id.to_string());
        }
        self.emit(RunEvent::RunStarted {
            run_id,
            pipeline: pipe_name.clone(),
            trigger,
            timestamp: Utc::now(),
        });
        let robot = Robot::new(self.clone(), run.clone(), task.clone());
        if verbose {
            robot
                .say(&format!("Starting job '{pipe_name}', run {run_index}"))
                .await;
        }

        let mut current = start;
        let outcome = loop {
            let task = current.task.clone();
            let command = current.command.clone();
            let args = current.arguments.clone();

            if let Some(plugin) = task.as_plugin() {
                if plugin.is_admin_command(&command) && !self.is_admin(&run.user) {
                    self.denied(&run, &task, &command, "admin command");
                    robot.say(ADMIN_ONLY_MESSAGE).await;
                    break TaskOutcome::Fail;
                }
            }
            if !run.bypass_security {
                if !self.authorize(&run, &task, &command, &args).await {
                    break TaskOutcome::Fail;
                }
                if !self.check_elevation(&run, &task, &command).await {
                    break TaskOutcome::Fail;
                }
            }

            self.emit(RunEvent::TaskStarted {
                run_id,
                task: task.name().to_string(),
                command: command.clone(),
                args: args.clone(),
            });
            tracing::debug!(
                run_id = %run_id,
                task = %task.name(),
                command = %command,
                args = ?args,
                "running task"
            );
            let started = Instant::now();
            let result = self.call_task(&run, &task, &command, &args).await;
            run.state().pipe_starting = false;
            let elapsed = started.elapsed();
            tracing::debug!(
                run_id = %run_id,
                task = %task.name(),
                outcome = %result.outcome,
                duration_ms = elapsed.as_millis() as u64,
                "task finished"
            );
            self.emit(RunEvent::TaskFinished {
                run_id,
                task: task.name().to_string(),
                outcome: result.outcome,
                duration_ms: elapsed.as_millis() as u64,
            });

            if !result.outcome.is_normal() {
                if interactive && !result.error.is_empty() {
                    robot.reply(&result.error).await;
                }
                break result.outcome;
            }
            let next = run.state().queue.pop_front();
            match next {
                Some(spec) => current = spec,
                None => break TaskOutcome::Normal,
            }
        };

        self.runs().deregister(run_id);
        let logger = run.state().logger.take();
        if let Some(logger) = logger {
            logger.section("done", "pipeline has completed");
            logger.close();
        }

        let failed_task = (!outcome.is_normal()).then(|| current.task.name().to_string());
        if outcome.is_normal() && verbose {
            robot
                .say(&format!("Finished job '{pipe_name}', run {run_index}"))
                .await;
        }
        if let (Some(failed), true) = (&failed_task, is_job) {
            robot
                .reply(&format!(
                    "Job '{pipe_name}', run number {run_index} failed in task: '{failed}'"
                ))
                .await;
        }

        self.emit(RunEvent::RunFinished {
            run_id,
            pipeline: pipe_name,
            outcome,
            timestamp: Utc::now(),
        });
        PipelineOutcome {
            run_id,
            run_index,
            outcome,
            failed_task,
        }
    }

    /// Starts a job by name on behalf of `user`. Required parameters must be
    /// present in `parameters`.
    pub async fn run_job(
        &self,
        name: &str,
        user: &str,
        channel: &str,
        parameters: HashMap<String, String>,
    ) -> Result<PipelineOutcome, EngineError> {
        let task = self.tasks().resolve_by_name(name)?;
        let Some(job) = task.as_job() else {
            return Err(EngineError::TaskNotFound(name.to_string()));
        };
        if task.base.disabled {
            return Err(EngineError::TaskDisabled(
                name.to_string(),
                task.base.reason.clone(),
            ));
        }
        if let Some(missing) = job
            .required_parameters
            .iter()
            .find(|p| !parameters.contains_key(p.as_str()))
        {
            return Err(EngineError::MissingParameter {
                job: name.to_string(),
                param: missing.clone(),
            });
        }
        Ok(self
            .run_pipeline(PipelineRequest {
                start: TaskSpec::new(task.clone(), RUN_COMMAND, Vec::new()),
                params: RunParams {
                    user: user.to_string(),
                    channel: channel.to_string(),
                    protocol: String::new(),
                    raw_message: String::new(),
                    trigger: TriggerKind::RunJob,
                    interactive: true,
                    bypass_security: false,
                    environment: parameters,
                },
                tasks: None,
            })
            .await)
    }

    /// Calls every enabled plugin once with the "init" command.
    pub async fn init_plugins(&self) -> Vec<(String, TaskOutcome)> {
        let tasks = self.tasks().snapshot();
        let mut results = Vec::new();
        for task in tasks.plugins().filter(|t| !t.base.disabled) {
            let out = self
                .run_pipeline(PipelineRequest {
                    start: TaskSpec::new(task.clone(), "init", Vec::new()),
                    params: RunParams {
                        user: String::new(),
                        channel: String::new(),
                        protocol: String::new(),
                        raw_message: String::new(),
                        trigger: TriggerKind::System,
                        interactive: false,
                        bypass_security: true,
                        environment: HashMap::new(),
                    },
                    tasks: Some(tasks.clone()),
                })
                .await;
            results.push((task.name().to_string(), out.outcome));
        }
        results
    }

    /// Kills the external process a live run is waiting on.
    pub fn abort_run(&self, id: RunId) -> Result<bool, EngineError> {
        let run = self
            .runs()
            .lookup(id)
            .ok_or(EngineError::RunNotFound(id.as_u64()))?;
        Ok(run.abort(crate::exec::ABORTED_MESSAGE))
    }
}
