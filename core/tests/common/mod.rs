#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use opsbot_core::api::{
    Checkout, Connector, Engine, EngineConfig, HandlerRegistry, HistoryLogger, HistoryProvider,
    MessageFormat, NativeHandler, PipelineRequest, ProcessExit, ProcessRunner, ProcessSession,
    ProcessStartArgs, ReplyMatcher, RetVal, Robot, RunParams, Services, Signal, Store,
    TaskOutcome, TaskSpec, TriggerKind,
};
use tokio::io::AsyncRead;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sent {
    pub user: String,
    pub channel: String,
    pub msg: String,
}

#[derive(Default)]
pub struct RecordingConnector {
    pub sent: Mutex<Vec<Sent>>,
    pub heard: Mutex<u32>,
}

impl RecordingConnector {
    pub fn messages(&self) -> Vec<String> {
        self.sent.lock().unwrap().iter().map(|s| s.msg.clone()).collect()
    }

    fn record(&self, user: &str, channel: &str, msg: &str) -> RetVal {
        self.sent.lock().unwrap().push(Sent {
            user: user.to_string(),
            channel: channel.to_string(),
            msg: msg.to_string(),
        });
        RetVal::Ok
    }
}

#[async_trait]
impl Connector for RecordingConnector {
    fn protocol(&self) -> &str {
        "test"
    }

    async fn send_channel_message(&self, channel: &str, msg: &str, _f: MessageFormat) -> RetVal {
        self.record("", channel, msg)
    }

    async fn send_user_channel_message(
        &self,
        user: &str,
        channel: &str,
        msg: &str,
        _f: MessageFormat,
    ) -> RetVal {
        self.record(user, channel, msg)
    }

    async fn send_user_message(&self, user: &str, msg: &str, _f: MessageFormat) -> RetVal {
        self.record(user, "", msg)
    }

    async fn message_heard(&self, _user: &str, _channel: &str) {
        *self.heard.lock().unwrap() += 1;
    }

    async fn user_attribute(&self, user: &str, attr: &str) -> Result<String, RetVal> {
        match attr {
            "email" => Ok(format!("{user}@example.com")),
            _ => Err(RetVal::AttributeNotFound),
        }
    }
}

#[derive(Default)]
pub struct MapStore {
    data: tokio::sync::Mutex<HashMap<String, (u64, serde_json::Value)>>,
}

#[async_trait]
impl Store for MapStore {
    async fn checkout(&self, key: &str, _for_update: bool) -> anyhow::Result<Checkout> {
        let data = self.data.lock().await;
        Ok(match data.get(key) {
            Some((v, value)) => Checkout {
                token: Some(v.to_string()),
                value: Some(value.clone()),
            },
            None => Checkout {
                token: Some("0".into()),
                value: None,
            },
        })
    }

    async fn update(&self, key: &str, token: &str, value: serde_json::Value) -> anyhow::Result<()> {
        let mut data = self.data.lock().await;
        let current = data.get(key).map(|(v, _)| *v).unwrap_or(0);
        anyhow::ensure!(current.to_string() == token, "stale token");
        data.insert(key.to_string(), (current + 1, value));
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingLogger {
    pub lines: Mutex<Vec<String>>,
    pub closed: Mutex<bool>,
}

impl HistoryLogger for RecordingLogger {
    fn log(&self, line: &str) {
        self.lines.lock().unwrap().push(line.to_string());
    }

    fn section(&self, name: &str, info: &str) {
        self.lines.lock().unwrap().push(format!("*** {name} - {info}"));
    }

    fn close(&self) {
        *self.closed.lock().unwrap() = true;
    }
}

#[derive(Default)]
pub struct RecordingHistory {
    /// (tag, index) -> logger
    pub logs: Mutex<Vec<(String, u64, Arc<RecordingLogger>)>>,
}

impl RecordingHistory {
    pub fn lines(&self, tag: &str, index: u64) -> Vec<String> {
        self.logs
            .lock()
            .unwrap()
            .iter()
            .find(|(t, i, _)| t == tag && *i == index)
            .map(|(_, _, l)| l.lines.lock().unwrap().clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl HistoryProvider for RecordingHistory {
    async fn new_history(
        &self,
        tag: &str,
        index: u64,
        _max_histories: usize,
    ) -> anyhow::Result<Arc<dyn HistoryLogger>> {
        let logger = Arc::new(RecordingLogger::default());
        self.logs
            .lock()
            .unwrap()
            .push((tag.to_string(), index, logger.clone()));
        Ok(logger)
    }
}

/// What a fake process does, keyed by the program's file name.
#[derive(Debug, Clone, Default)]
pub struct Script {
    pub stdout: String,
    pub stderr: String,
    pub code: i32,
    /// Never exits on its own.
    pub hang: bool,
}

impl Script {
    pub fn exit(code: i32) -> Self {
        Self {
            code,
            ..Self::default()
        }
    }
}

#[derive(Default)]
pub struct FakeRunner {
    pub scripts: Mutex<HashMap<String, Script>>,
    pub started: Mutex<Vec<ProcessStartArgs>>,
}

impl FakeRunner {
    pub fn script(&self, file_name: &str, script: Script) {
        self.scripts
            .lock()
            .unwrap()
            .insert(file_name.to_string(), script);
    }

    pub fn started(&self) -> Vec<ProcessStartArgs> {
        self.started.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProcessRunner for FakeRunner {
    fn name(&self) -> &str {
        "fake"
    }

    async fn start(&self, args: &ProcessStartArgs) -> anyhow::Result<Box<dyn ProcessSession>> {
        self.started.lock().unwrap().push(args.clone());
        let file = Path::new(&args.program)
            .file_name()
            .map(|f| f.to_string_lossy().to_string())
            .unwrap_or_default();
        let script = self
            .scripts
            .lock()
            .unwrap()
            .get(&file)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no script for {file}"))?;
        Ok(Box::new(FakeSession {
            script,
            killed: false,
        }))
    }
}

struct FakeSession {
    script: Script,
    killed: bool,
}

#[async_trait]
impl ProcessSession for FakeSession {
    fn pid(&self) -> Option<u32> {
        Some(4242)
    }

    fn stdout(&mut self) -> Option<Box<dyn AsyncRead + Unpin + Send>> {
        Some(Box::new(std::io::Cursor::new(
            self.script.stdout.clone().into_bytes(),
        )))
    }

    fn stderr(&mut self) -> Option<Box<dyn AsyncRead + Unpin + Send>> {
        Some(Box::new(std::io::Cursor::new(
            self.script.stderr.clone().into_bytes(),
        )))
    }

    async fn signal(&mut self, _signal: Signal) -> anyhow::Result<()> {
        self.killed = true;
        Ok(())
    }

    async fn wait(&mut self) -> anyhow::Result<ProcessExit> {
        if self.killed {
            return Ok(ProcessExit { code: None });
        }
        if self.script.hang {
            std::future::pending::<()>().await;
        }
        Ok(ProcessExit {
            code: Some(self.script.code),
        })
    }
}

/// Native handler wrapping an async closure.
pub type HandlerFn = Arc<
    dyn Fn(Robot, String, Vec<String>) -> futures::future::BoxFuture<'static, TaskOutcome>
        + Send
        + Sync,
>;

pub struct FnHandler(pub HandlerFn);

#[async_trait]
impl NativeHandler for FnHandler {
    async fn handle(&self, robot: &Robot, command: &str, args: &[String]) -> TaskOutcome {
        (self.0)(robot.clone(), command.to_string(), args.to_vec()).await
    }
}

pub fn handler<F, Fut>(f: F) -> Arc<dyn NativeHandler>
where
    F: Fn(Robot, String, Vec<String>) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = TaskOutcome> + Send + 'static,
{
    Arc::new(FnHandler(Arc::new(move |r, c, a| Box::pin(f(r, c, a)))))
}

pub struct TestBot {
    pub engine: Engine,
    pub connector: Arc<RecordingConnector>,
    pub runner: Arc<FakeRunner>,
    pub store: Arc<MapStore>,
    pub history: Arc<RecordingHistory>,
    pub dir: tempfile::TempDir,
}

/// Writes an executable-looking script under the install dir.
pub fn write_script(dir: &Path, name: &str) {
    std::fs::write(dir.join(name), "#!/bin/sh\nexit 0\n").unwrap();
}

/// Builds an engine over fakes. `scripts` are created in a temporary
/// install dir before the task table is loaded.
pub fn bot(mut cfg: EngineConfig, handlers: HandlerRegistry, scripts: &[&str]) -> TestBot {
    let dir = tempfile::tempdir().unwrap();
    for s in scripts {
        write_script(dir.path(), s);
    }
    cfg.paths.install_dir = dir.path().display().to_string();
    let connector = Arc::new(RecordingConnector::default());
    let runner = Arc::new(FakeRunner::default());
    let store = Arc::new(MapStore::default());
    let history = Arc::new(RecordingHistory::default());
    let services = Services {
        connector: connector.clone(),
        store: store.clone(),
        history: Some(history.clone()),
        runner: runner.clone(),
    };
    let engine = Engine::build(cfg, Arc::new(handlers), services).unwrap();
    TestBot {
        engine,
        connector,
        runner,
        store,
        history,
        dir,
    }
}

pub fn request(bot: &TestBot, task: &str, command: &str, args: &[&str]) -> PipelineRequest {
    let task = bot.engine.tasks().resolve_by_name(task).unwrap();
    PipelineRequest {
        start: TaskSpec::new(
            task,
            command,
            args.iter().map(|a| a.to_string()).collect(),
        ),
        params: RunParams {
            user: "alice".into(),
            channel: "general".into(),
            protocol: String::new(),
            raw_message: String::new(),
            trigger: TriggerKind::PluginCommand,
            interactive: true,
            bypass_security: false,
            environment: HashMap::new(),
        },
        tasks: None,
    }
}

/// Polls until `user` has a prompt outstanding in `channel`.
pub async fn wait_for_prompt(engine: &Engine, user: &str, channel: &str) {
    let matcher = ReplyMatcher::new(user, channel);
    for _ in 0..200 {
        if engine.replies().is_waiting(&matcher).await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("no prompt for {user} in {channel}");
}
