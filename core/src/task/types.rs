use std::any::Any;
use std::fmt;
use std::sync::Arc;

use super::def::{HelpDef, NameValue};
use super::matcher::InputMatcher;

/// Command used for every job invocation.
pub const RUN_COMMAND: &str = "run";

/// Strongly-typed configuration attached to a native task at load time.
#[derive(Clone)]
pub struct TaskConfig(Arc<dyn Any + Send + Sync>);

impl TaskConfig {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Arc::new(value))
    }

    pub(crate) fn from_arc(value: Arc<dyn Any + Send + Sync>) -> Self {
        Self(value)
    }

    pub fn get<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.0.clone().downcast::<T>().ok()
    }
}

impl fmt::Debug for TaskConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TaskConfig(..)")
    }
}

/// Fields shared by plugins and jobs.
#[derive(Debug, Clone, Default)]
pub struct TaskBase {
    pub name: String,
    pub id: String,
    pub description: String,
    pub path: String,
    pub namespace: String,
    pub private_namespace: bool,
    pub user: String,
    pub channel: String,
    pub channels: Vec<String>,
    pub all_channels: bool,
    pub allow_direct: bool,
    pub direct_only: bool,
    pub require_admin: bool,
    pub users: Vec<String>,
    pub elevator: Option<String>,
    pub authorizer: Option<String>,
    pub auth_require: String,
    pub history_logs: usize,
    pub disabled: bool,
    pub reason: String,
    pub config: Option<TaskConfig>,
}

#[derive(Debug, Clone, Default)]
pub struct PluginSpec {
    pub admin_commands: Vec<String>,
    pub elevated_commands: Vec<String>,
    pub elevate_immediate_commands: Vec<String>,
    pub authorized_commands: Vec<String>,
    pub authorize_all_commands: bool,
    pub catch_all: bool,
    pub command_matchers: Vec<InputMatcher>,
    pub message_matchers: Vec<InputMatcher>,
    pub reply_matchers: Vec<InputMatcher>,
    pub help: Vec<HelpDef>,
}

impl PluginSpec {
    pub fn is_admin_command(&self, command: &str) -> bool {
        self.admin_commands.iter().any(|c| c == command)
    }

    /// Custom reply pattern by label, falling back to the matcher's command.
    pub fn reply_matcher(&self, id: &str) -> Option<&InputMatcher> {
        self.reply_matchers
            .iter()
            .find(|m| m.label == id)
            .or_else(|| self.reply_matchers.iter().find(|m| m.command == id))
    }
}

#[derive(Debug, Clone, Default)]
pub struct JobSpec {
    pub parameters: Vec<NameValue>,
    pub required_parameters: Vec<String>,
    pub verbose: bool,
    pub triggers: Vec<InputMatcher>,
}

#[derive(Debug, Clone)]
pub enum TaskKind {
    Plugin(PluginSpec),
    Job(JobSpec),
}

#[derive(Debug, Clone)]
pub struct Task {
    pub base: TaskBase,
    pub kind: TaskKind,
}

impl Task {
    pub fn name(&self) -> &str {
        &self.base.name
    }

    pub fn is_native(&self) -> bool {
        self.base.path.is_empty()
    }

    pub fn is_job(&self) -> bool {
        matches!(self.kind, TaskKind::Job(_))
    }

    pub fn as_plugin(&self) -> Option<&PluginSpec> {
        match &self.kind {
            TaskKind::Plugin(p) => Some(p),
            TaskKind::Job(_) => None,
        }
    }

    pub fn as_job(&self) -> Option<&JobSpec> {
        match &self.kind {
            TaskKind::Job(j) => Some(j),
            TaskKind::Plugin(_) => None,
        }
    }

    /// Key for long-term parameter storage.
    pub fn param_namespace(&self) -> &str {
        if self.base.private_namespace {
            &self.base.name
        } else {
            &self.base.namespace
        }
    }

    /// Whether a plugin may be used in `channel` ("" for a direct message).
    pub fn available_in(&self, channel: &str, default_channels: &[String]) -> bool {
        let b = &self.base;
        if channel.is_empty() {
            return b.allow_direct || b.direct_only;
        }
        if b.direct_only {
            return false;
        }
        if !b.channels.is_empty() {
            return b.channels.iter().any(|c| c == channel);
        }
        if b.all_channels || default_channels.is_empty() {
            return true;
        }
        default_channels.iter().any(|c| c == channel)
    }
}

/// A queued invocation.
#[derive(Debug, Clone)]
pub struct TaskSpec {
    pub task: Arc<Task>,
    pub command: String,
    pub arguments: Vec<String>,
}

impl TaskSpec {
    pub fn new(task: Arc<Task>, command: impl Into<String>, arguments: Vec<String>) -> Self {
        Self {
            task,
            command: command.into(),
            arguments,
        }
    }
}
