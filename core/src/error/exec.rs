use std::path::PathBuf;

use thiserror::Error;

/// Mechanism failures while locating, starting or talking to an external task.
#[derive(Error, Debug)]
pub enum ExecError {
    #[error("path empty for external task: {0}")]
    EmptyPath(String),
    #[error("invalid path for external task: {path} ({source})")]
    InvalidPath {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("couldn't locate external task {0}")]
    NotFound(String),
    #[error("problem getting interpreter for {path}: {reason}")]
    Interpreter { path: PathBuf, reason: String },
    #[error("spawn failed: {0}")]
    Spawn(String),
    #[error("stream io error: {stream} {source}")]
    StreamIo {
        stream: &'static str,
        source: std::io::Error,
    },
    #[error("wait failed: {0}")]
    Wait(String),
}
