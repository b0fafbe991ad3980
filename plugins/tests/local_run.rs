#![cfg(unix)]

use std::collections::HashMap;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use opsbot_core::api::{
    Engine, EngineConfig, HandlerRegistry, JobDef, NameValue, Services, TaskCommonDef,
    TaskOutcome,
};
use opsbot_plugins::connector::TerminalConnector;
use opsbot_plugins::history::FileHistoryProvider;
use opsbot_plugins::runner::LocalProcessRunner;
use opsbot_plugins::store::MemoryStore;
use pretty_assertions::assert_eq;
use tokio::io::{AsyncReadExt, DuplexStream};

fn script(dir: &Path, name: &str, body: &str) {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
}

fn job(name: &str, path: &str, history_logs: usize) -> JobDef {
    JobDef {
        common: TaskCommonDef {
            path: path.into(),
            history_logs,
            ..TaskCommonDef::named(name)
        },
        parameters: vec![NameValue::new("GREETING", "world")],
        ..JobDef::default()
    }
}

fn engine(dir: &Path, jobs: Vec<JobDef>) -> (Engine, Arc<FileHistoryProvider>, DuplexStream) {
    let mut cfg = EngineConfig::default();
    cfg.paths.install_dir = dir.join("bin").display().to_string();
    cfg.jobs = jobs;
    let (out, read) = tokio::io::duplex(64 * 1024);
    let history = Arc::new(FileHistoryProvider::new(dir.join("history")));
    let services = Services {
        connector: Arc::new(TerminalConnector::new("terminal", &[], Box::new(out))),
        store: Arc::new(MemoryStore::new()),
        history: Some(history.clone()),
        runner: Arc::new(LocalProcessRunner::new()),
    };
    let engine = Engine::build(cfg, Arc::new(HandlerRegistry::new()), services).unwrap();
    (engine, history, read)
}

async fn read_until(path: &Path, needle: &str) -> String {
    for _ in 0..200 {
        if let Ok(text) = tokio::fs::read_to_string(path).await {
            if text.contains(needle) {
                return text;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("{} never contained {needle:?}", path.display());
}

#[tokio::test]
async fn shell_job_output_lands_in_history() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("bin")).unwrap();
    script(
        &dir.path().join("bin"),
        "hello.sh",
        "echo \"hello $GREETING from $OPSBOT_USER via $1\"\necho oops >&2\nexit 0\n",
    );
    let (engine, history, mut read) = engine(dir.path(), vec![job("hello", "hello.sh", 2)]);

    let out = engine
        .run_job("hello", "alice", "general", HashMap::new())
        .await
        .unwrap();
    assert_eq!(out.outcome, TaskOutcome::Normal);

    let log = read_until(&history.log_path("hello", out.run_index), "pipeline has completed").await;
    assert!(log.contains("OUT hello world from alice via run"), "{log}");
    assert!(log.contains("ERR oops"), "{log}");

    drop(engine);
    let mut chat = vec![0u8; 4096];
    let n = read.read(&mut chat).await.unwrap();
    let chat = String::from_utf8_lossy(&chat[..n]);
    assert!(chat.contains("#general: Starting job 'hello', run 0"), "{chat}");
}

#[tokio::test]
async fn exit_codes_map_to_outcomes() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("bin")).unwrap();
    script(&dir.path().join("bin"), "misconfigured.sh", "exit 3\n");
    script(&dir.path().join("bin"), "approve.sh", "exit 7\n");
    let (engine, _history, _read) = engine(
        dir.path(),
        vec![
            job("misconfigured", "misconfigured.sh", 0),
            job("approve", "approve.sh", 0),
        ],
    );

    let out = engine
        .run_job("misconfigured", "alice", "general", HashMap::new())
        .await
        .unwrap();
    assert_eq!(out.outcome, TaskOutcome::ConfigurationError);
    assert_eq!(out.failed_task.as_deref(), Some("misconfigured"));

    let out = engine
        .run_job("approve", "alice", "general", HashMap::new())
        .await
        .unwrap();
    assert_eq!(out.outcome, TaskOutcome::Success);
}
