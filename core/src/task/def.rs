//! Resolved task definitions as handed to the registry.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskCommonDef {
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Executable path; empty for native tasks.
    #[serde(default)]
    pub path: String,

    #[serde(default)]
    pub namespace: Option<String>,

    #[serde(default)]
    pub private_namespace: bool,

    /// User a scheduled run acts as.
    #[serde(default)]
    pub user: String,

    /// Channel a job reports to, or a scheduled task runs in.
    #[serde(default)]
    pub channel: String,

    #[serde(default)]
    pub channels: Vec<String>,

    #[serde(default)]
    pub all_channels: bool,

    #[serde(default)]
    pub allow_direct: bool,

    #[serde(default)]
    pub direct_only: bool,

    #[serde(default)]
    pub require_admin: bool,

    #[serde(default)]
    pub users: Vec<String>,

    #[serde(default)]
    pub elevator: Option<String>,

    #[serde(default)]
    pub authorizer: Option<String>,

    /// Group or role string handed to the authorizer.
    #[serde(default)]
    pub auth_require: String,

    #[serde(default)]
    pub history_logs: usize,

    #[serde(default)]
    pub disabled: bool,

    /// Native-task configuration, parsed by the handler's typed parser.
    #[serde(default)]
    pub config: Option<toml::Value>,
}

impl TaskCommonDef {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MatcherDef {
    pub regex: String,
    #[serde(default)]
    pub command: String,
    /// Reply matchers are looked up by label first.
    #[serde(default)]
    pub label: String,
    /// Job triggers only: the user allowed to fire the trigger.
    #[serde(default)]
    pub user: String,
    /// Job triggers only: parameter names for the capture groups, in order.
    #[serde(default)]
    pub parameters: Vec<String>,
}

impl MatcherDef {
    pub fn command(regex: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            regex: regex.into(),
            command: command.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameValue {
    pub name: String,
    #[serde(default)]
    pub value: String,
}

impl NameValue {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HelpDef {
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub helptext: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PluginDef {
    #[serde(flatten)]
    pub common: TaskCommonDef,

    #[serde(default)]
    pub admin_commands: Vec<String>,

    #[serde(default)]
    pub elevated_commands: Vec<String>,

    #[serde(default)]
    pub elevate_immediate_commands: Vec<String>,

    #[serde(default)]
    pub authorized_commands: Vec<String>,

    #[serde(default)]
    pub authorize_all_commands: bool,

    #[serde(default)]
    pub catch_all: bool,

    #[serde(default)]
    pub command_matchers: Vec<MatcherDef>,

    #[serde(default)]
    pub message_matchers: Vec<MatcherDef>,

    #[serde(default)]
    pub reply_matchers: Vec<MatcherDef>,

    #[serde(default)]
    pub help: Vec<HelpDef>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobDef {
    #[serde(flatten)]
    pub common: TaskCommonDef,

    /// Fixed parameters; lowest precedence in the run environment.
    #[serde(default)]
    pub parameters: Vec<NameValue>,

    #[serde(default)]
    pub required_parameters: Vec<String>,

    #[serde(default)]
    pub verbose: bool,

    #[serde(default)]
    pub triggers: Vec<MatcherDef>,
}
