//! External-process invocation for tasks with a path.

pub mod env;
mod io_pump;
mod path;
mod traits;

use std::future::Future;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::config::PathsConfig;
use crate::error::TaskOutcome;
use crate::history::HistoryLogger;
use crate::run::{ProcessHandle, RunContext};
use crate::store::Store;
use crate::task::Task;

pub use io_pump::LineStream;
pub use path::{fix_interpreter_args, read_interpreter, resolve_task_path};
pub use traits::{ProcessExit, ProcessRunner, ProcessSession, ProcessStartArgs, Signal};

pub const ABORTED_MESSAGE: &str = "pipeline aborted";

pub struct ExternalCall<'a> {
    pub runner: &'a dyn ProcessRunner,
    pub store: &'a dyn Store,
    pub paths: &'a PathsConfig,
    pub run: &'a RunContext,
    pub task: &'a Task,
    pub command: &'a str,
    pub args: &'a [String],
}

/// Outcome plus an optional message suitable for the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallResult {
    pub outcome: TaskOutcome,
    pub error: String,
}

impl CallResult {
    pub fn new(outcome: TaskOutcome, error: impl Into<String>) -> Self {
        Self {
            outcome,
            error: error.into(),
        }
    }
}

fn errors_calling(task: &str) -> String {
    format!(
        "There were errors calling external plugin '{task}', you might want to ask an administrator to check the logs"
    )
}

pub async fn call_external(call: ExternalCall<'_>) -> CallResult {
    let task_name = call.task.name();
    let full_path = match resolve_task_path(call.task, call.paths).await {
        Ok(p) => p,
        Err(e) => {
            tracing::error!(error.kind = "exec.path", task = %task_name, reason = %e);
            return CallResult::new(
                TaskOutcome::MechanismFail,
                format!("Error getting path for {task_name}: {e}"),
            );
        }
    };
    let interpreter = match read_interpreter(&full_path).await {
        Ok(i) => i,
        Err(e) => {
            tracing::error!(
                error.kind = "exec.interpreter",
                task = %task_name,
                reason = %e,
                "unable to call external task, no interpreter found"
            );
            return CallResult::new(
                TaskOutcome::MechanismFail,
                "There was a problem calling an external plugin",
            );
        }
    };

    let mut args = Vec::with_capacity(call.args.len() + 1);
    args.push(call.command.to_string());
    args.extend(call.args.iter().cloned());
    let args = fix_interpreter_args(&interpreter, args);

    let envs = env::task_environment(call.run, call.task, call.store).await;
    let logger = call.run.state().logger.clone();
    let program = full_path.display().to_string();
    tracing::debug!(
        program = %program,
        interpreter = %interpreter,
        args = ?args,
        env_keys = ?envs.keys().collect::<Vec<_>>(),
        "calling external task"
    );

    let start = ProcessStartArgs {
        program: program.clone(),
        args,
        envs,
        capture_stdout: logger.is_some(),
    };
    let mut session = match call.runner.start(&start).await {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error.kind = "exec.spawn", program = %program, reason = %e);
            return CallResult::new(TaskOutcome::MechanismFail, errors_calling(task_name));
        }
    };

    let (abort_tx, mut abort_rx) = mpsc::channel::<String>(1);
    call.run.attach_process(ProcessHandle::new(session.pid(), abort_tx));
    let result = supervise(session.as_mut(), logger, &mut abort_rx, task_name, &program).await;
    call.run.detach_process();
    result
}

async fn or_abort<F: Future>(
    fut: F,
    abort_rx: &mut mpsc::Receiver<String>,
) -> Result<F::Output, String> {
    tokio::select! {
        out = fut => Ok(out),
        Some(reason) = abort_rx.recv() => Err(reason),
    }
}

async fn supervise(
    session: &mut dyn ProcessSession,
    logger: Option<Arc<dyn HistoryLogger>>,
    abort_rx: &mut mpsc::Receiver<String>,
    task_name: &str,
    program: &str,
) -> CallResult {
    let stdout = session.stdout();
    let stderr = session.stderr();
    let mut error = String::new();

    // Both streams must close before the exit status is collected.
    let drained = match logger {
        Some(logger) => {
            let out = stdout.map(|s| io_pump::pump_to_history(s, LineStream::Stdout, logger.clone()));
            let err = stderr.map(|s| io_pump::pump_to_history(s, LineStream::Stderr, logger));
            or_abort(
                async move {
                    let mut res = Ok(());
                    for h in [out, err].into_iter().flatten() {
                        match h.await {
                            Ok(Ok(_)) => {}
                            Ok(Err(e)) => res = Err(e.to_string()),
                            Err(e) => res = Err(e.to_string()),
                        }
                    }
                    res.map(|_| String::new())
                },
                abort_rx,
            )
            .await
        }
        None => {
            let out = stdout.map(io_pump::drain);
            let err = stderr.map(io_pump::collect);
            or_abort(
                async move {
                    if let Some(h) = out {
                        let _ = h.await;
                    }
                    match err {
                        Some(h) => match h.await {
                            Ok(Ok(text)) => Ok(text),
                            Ok(Err(e)) => Err(e.to_string()),
                            Err(e) => Err(e.to_string()),
                        },
                        None => Ok(String::new()),
                    }
                },
                abort_rx,
            )
            .await
        }
    };

    let stderr_text = match drained {
        Ok(Ok(text)) => text,
        Ok(Err(e)) => {
            tracing::error!(error.kind = "exec.stream", program = %program, reason = %e);
            return CallResult::new(TaskOutcome::MechanismFail, errors_calling(task_name));
        }
        Err(reason) => return kill(session, program, &reason).await,
    };
    if !stderr_text.is_empty() {
        tracing::warn!(program = %program, stderr = %stderr_text, "output from stderr of external task");
        error = format!(
            "There was error output while calling external task '{task_name}', you might want to ask an administrator to check the logs"
        );
    }

    let exit = match or_abort(session.wait(), abort_rx).await {
        Ok(Ok(exit)) => exit,
        Ok(Err(e)) => {
            tracing::error!(error.kind = "exec.wait", program = %program, reason = %e);
            return CallResult::new(TaskOutcome::MechanismFail, errors_calling(task_name));
        }
        Err(reason) => return kill(session, program, &reason).await,
    };

    let outcome = match exit.code {
        Some(code) => TaskOutcome::from_code(code),
        None => TaskOutcome::Fail,
    };
    if !matches!(outcome, TaskOutcome::Normal | TaskOutcome::Success) {
        tracing::error!(
            error.kind = "exec.exit",
            program = %program,
            code = ?exit.code,
            "external task exited with an error"
        );
        error = errors_calling(task_name);
    }
    CallResult::new(outcome, error)
}

async fn kill(session: &mut dyn ProcessSession, program: &str, reason: &str) -> CallResult {
    tracing::warn!(program = %program, reason = %reason, "aborting external task");
    if let Err(e) = session.signal(Signal::Kill).await {
        tracing::error!(error.kind = "exec.signal", program = %program, reason = %e);
    }
    let _ = session.wait().await;
    CallResult::new(TaskOutcome::Fail, ABORTED_MESSAGE)
}
