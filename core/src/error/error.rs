use thiserror::Error;

use super::exec::ExecError;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("engine failed: {0}")]
    Engine(#[from] EngineError),
    #[error("command failed: {0}")]
    Command(String),
    #[error("config error: {0}")]
    Config(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("config error: {0}")]
    Config(String),
    #[error("invalid task name '{0}'")]
    InvalidTaskName(String),
    #[error("duplicate task name '{0}'")]
    DuplicateTask(String),
    #[error("task not found: {0}")]
    TaskNotFound(String),
    #[error("task '{0}' is disabled: {1}")]
    TaskDisabled(String, String),
    #[error("missing required parameter '{param}' for job '{job}'")]
    MissingParameter { job: String, param: String },
    #[error("handler registration rejected for '{name}': {reason}")]
    Registration { name: String, reason: String },
    #[error("invalid timezone '{0}'")]
    Timezone(String),
    #[error("invalid schedule '{schedule}' for task '{task}': {reason}")]
    Schedule {
        task: String,
        schedule: String,
        reason: String,
    },
    #[error("run not found: {0}")]
    RunNotFound(u64),
    #[error("exec error: {0}")]
    Exec(#[from] ExecError),
    #[error("plugin error: {0}")]
    Plugin(#[from] anyhow::Error),
}
