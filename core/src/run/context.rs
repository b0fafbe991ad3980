use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

use tokio::sync::mpsc;

use crate::connector::MessageFormat;
use crate::history::HistoryLogger;
use crate::registry::TaskTable;
use crate::task::TaskSpec;

use super::RunId;

/// What started a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerKind {
    PluginCommand,
    PluginMessage,
    CatchAll,
    JobTrigger,
    Scheduled,
    RunJob,
    /// Engine-internal runs such as plugin init.
    System,
}

/// Mutable pipeline state. Only ever locked for short, non-async sections.
pub struct RunState {
    pub environment: HashMap<String, String>,
    pub queue: VecDeque<TaskSpec>,
    pub elevated: bool,
    /// Set while the first task runs, so its stored parameters are not merged twice.
    pub pipe_starting: bool,
    pub format: MessageFormat,
    pub logger: Option<Arc<dyn HistoryLogger>>,
    pub pipe_name: String,
    pub pipe_desc: String,
    pub namespace: String,
}

/// Handle used to kill the external process a run is waiting on.
#[derive(Debug, Clone)]
pub struct ProcessHandle {
    pub pid: Option<u32>,
    abort_tx: mpsc::Sender<String>,
}

impl ProcessHandle {
    pub fn new(pid: Option<u32>, abort_tx: mpsc::Sender<String>) -> Self {
        Self { pid, abort_tx }
    }
}

#[derive(Debug, Default)]
struct CurrentTask {
    name: String,
    description: String,
    process: Option<ProcessHandle>,
}

/// Construction parameters for a run.
pub struct RunParams {
    pub user: String,
    pub channel: String,
    pub protocol: String,
    pub raw_message: String,
    pub trigger: TriggerKind,
    pub interactive: bool,
    pub bypass_security: bool,
    pub environment: HashMap<String, String>,
}

/// One pipeline run.
pub struct RunContext {
    id: OnceLock<RunId>,
    pub user: String,
    /// "" for a direct message.
    pub channel: String,
    pub protocol: String,
    pub raw_message: String,
    pub trigger: TriggerKind,
    pub interactive: bool,
    pub bypass_security: bool,
    /// Snapshot taken when the run was created.
    pub tasks: Arc<TaskTable>,
    state: Mutex<RunState>,
    current: Mutex<CurrentTask>,
}

impl RunContext {
    pub fn new(params: RunParams, tasks: Arc<TaskTable>) -> Self {
        Self {
            id: OnceLock::new(),
            user: params.user,
            channel: params.channel,
            protocol: params.protocol,
            raw_message: params.raw_message,
            trigger: params.trigger,
            interactive: params.interactive,
            bypass_security: params.bypass_security,
            tasks,
            state: Mutex::new(RunState {
                environment: params.environment,
                queue: VecDeque::new(),
                elevated: false,
                pipe_starting: false,
                format: MessageFormat::default(),
                logger: None,
                pipe_name: String::new(),
                pipe_desc: String::new(),
                namespace: String::new(),
            }),
            current: Mutex::new(CurrentTask::default()),
        }
    }

    /// `RunId::NONE` until registered.
    pub fn id(&self) -> RunId {
        self.id.get().copied().unwrap_or(RunId::NONE)
    }

    pub(crate) fn set_id(&self, id: RunId) {
        let _ = self.id.set(id);
    }

    pub fn state(&self) -> MutexGuard<'_, RunState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn current(&self) -> MutexGuard<'_, CurrentTask> {
        self.current.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_current_task(&self, name: &str, description: &str) {
        let mut cur = self.current();
        cur.name = name.to_string();
        cur.description = description.to_string();
    }

    /// (name, description) of the task currently executing.
    pub fn current_task(&self) -> (String, String) {
        let cur = self.current();
        (cur.name.clone(), cur.description.clone())
    }

    pub(crate) fn attach_process(&self, handle: ProcessHandle) {
        self.current().process = Some(handle);
    }

    pub(crate) fn detach_process(&self) {
        self.current().process = None;
    }

    pub fn process_pid(&self) -> Option<u32> {
        self.current().process.as_ref().and_then(|p| p.pid)
    }

    /// Signals the attached external process to terminate. Returns false when
    /// no process is attached; native tasks cannot be preempted.
    pub fn abort(&self, reason: &str) -> bool {
        let handle = self.current().process.clone();
        match handle {
            Some(h) => h.abort_tx.try_send(reason.to_string()).is_ok(),
            None => false,
        }
    }
}
