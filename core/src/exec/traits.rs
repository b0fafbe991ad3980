use std::collections::HashMap;

use async_trait::async_trait;
use tokio::io::AsyncRead;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Kill,
    Term,
}

#[derive(Debug, Clone)]
pub struct ProcessStartArgs {
    pub program: String,
    pub args: Vec<String>,
    /// The complete environment; nothing is inherited from the engine process.
    pub envs: HashMap<String, String>,
    /// When false, stdout is discarded rather than piped.
    pub capture_stdout: bool,
}

/// `code` is `None` when the process was terminated by a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessExit {
    pub code: Option<i32>,
}

#[async_trait]
pub trait ProcessSession: Send {
    fn pid(&self) -> Option<u32>;
    fn stdout(&mut self) -> Option<Box<dyn AsyncRead + Unpin + Send>>;
    fn stderr(&mut self) -> Option<Box<dyn AsyncRead + Unpin + Send>>;
    async fn signal(&mut self, signal: Signal) -> anyhow::Result<()>;
    async fn wait(&mut self) -> anyhow::Result<ProcessExit>;
}

#[async_trait]
pub trait ProcessRunner: Send + Sync {
    fn name(&self) -> &str;
    async fn start(&self, args: &ProcessStartArgs) -> anyhow::Result<Box<dyn ProcessSession>>;
}
