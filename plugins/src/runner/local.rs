use std::process::Stdio;

use anyhow::{Context, Result};
use async_trait::async_trait;
use opsbot_core::api::{ProcessExit, ProcessRunner, ProcessSession, ProcessStartArgs, Signal};
use tokio::io::AsyncRead;
use tokio::process::{Child, Command};

/// Runs external tasks as local child processes with a scrubbed environment.
#[derive(Default)]
pub struct LocalProcessRunner;

impl LocalProcessRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ProcessRunner for LocalProcessRunner {
    fn name(&self) -> &str {
        "local"
    }

    async fn start(&self, args: &ProcessStartArgs) -> Result<Box<dyn ProcessSession>> {
        let stdout = if args.capture_stdout {
            Stdio::piped()
        } else {
            Stdio::null()
        };
        let child = Command::new(&args.program)
            .args(&args.args)
            .env_clear()
            .envs(&args.envs)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("starting '{}'", args.program))?;

        Ok(Box::new(LocalProcessSession { child }))
    }
}

struct LocalProcessSession {
    child: Child,
}

#[async_trait]
impl ProcessSession for LocalProcessSession {
    fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    fn stdout(&mut self) -> Option<Box<dyn AsyncRead + Unpin + Send>> {
        self.child
            .stdout
            .take()
            .map(|s| Box::new(s) as Box<dyn AsyncRead + Unpin + Send>)
    }

    fn stderr(&mut self) -> Option<Box<dyn AsyncRead + Unpin + Send>> {
        self.child
            .stderr
            .take()
            .map(|s| Box::new(s) as Box<dyn AsyncRead + Unpin + Send>)
    }

    async fn signal(&mut self, signal: Signal) -> Result<()> {
        match signal {
            // tokio only exposes SIGKILL portably.
            Signal::Kill | Signal::Term => self.child.kill().await?,
        }
        Ok(())
    }

    async fn wait(&mut self) -> Result<ProcessExit> {
        let status = self.child.wait().await?;
        Ok(ProcessExit {
            code: status.code(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tokio::io::AsyncReadExt;

    #[cfg(unix)]
    #[tokio::test]
    async fn runs_with_only_the_given_environment() {
        let runner = LocalProcessRunner::new();
        let mut session = runner
            .start(&ProcessStartArgs {
                program: "/bin/sh".into(),
                args: vec!["-c".into(), "echo \"$greeting\" >&2; exit 3".into()],
                envs: HashMap::from([("greeting".to_string(), "hi".to_string())]),
                capture_stdout: false,
            })
            .await
            .unwrap();
        assert!(session.stdout().is_none());
        let mut err = String::new();
        session
            .stderr()
            .unwrap()
            .read_to_string(&mut err)
            .await
            .unwrap();
        assert_eq!(err.trim(), "hi");
        assert_eq!(session.wait().await.unwrap().code, Some(3));
    }
}
