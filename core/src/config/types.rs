use serde::{Deserialize, Serialize};

use crate::connector::MessageFormat;
use crate::task::{JobDef, NameValue, PluginDef};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub bot: BotInfo,

    #[serde(default)]
    pub paths: PathsConfig,

    /// Tag of the connector protocol, exported to tasks as OPSBOT_PROTOCOL.
    #[serde(default = "default_protocol")]
    pub protocol: String,

    #[serde(default)]
    pub default_message_format: MessageFormat,

    #[serde(default)]
    pub admin_users: Vec<String>,

    /// User directory for connectors that don't supply their own.
    #[serde(default)]
    pub users: Vec<UserInfo>,

    /// Channels a plugin with no explicit channel list is available in.
    #[serde(default)]
    pub default_channels: Vec<String>,

    #[serde(default)]
    pub default_elevator: Option<String>,

    #[serde(default)]
    pub default_authorizer: Option<String>,

    /// IANA timezone name; the host timezone is used when unset.
    #[serde(default)]
    pub timezone: Option<String>,

    #[serde(default)]
    pub reply: ReplyConfig,

    #[serde(default)]
    pub scheduled_tasks: Vec<ScheduledTaskDef>,

    #[serde(default)]
    pub plugins: Vec<PluginDef>,

    #[serde(default)]
    pub jobs: Vec<JobDef>,
}

fn default_protocol() -> String {
    "terminal".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            logging: LoggingConfig::default(),
            bot: BotInfo::default(),
            paths: PathsConfig::default(),
            protocol: default_protocol(),
            default_message_format: MessageFormat::default(),
            admin_users: Vec::new(),
            users: Vec::new(),
            default_channels: Vec::new(),
            default_elevator: None,
            default_authorizer: None,
            timezone: None,
            reply: ReplyConfig::default(),
            scheduled_tasks: Vec::new(),
            plugins: Vec::new(),
            jobs: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_enabled")]
    pub enabled: bool,

    /// If true, log to stderr.
    #[serde(default = "default_logging_console")]
    pub console: bool,

    /// If true, log to a file under `directory` (or OS temp dir if unset).
    #[serde(default = "default_logging_file")]
    pub file: bool,

    /// EnvFilter string, e.g. "info" or "opsbot_core=debug".
    #[serde(default = "default_logging_level")]
    pub level: String,

    #[serde(default)]
    pub directory: Option<String>,
}

fn default_logging_enabled() -> bool {
    true
}

fn default_logging_console() -> bool {
    true
}

fn default_logging_file() -> bool {
    false
}

fn default_logging_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: default_logging_enabled(),
            console: default_logging_console(),
            file: default_logging_file(),
            level: default_logging_level(),
            directory: None,
        }
    }
}

/// Identity of the robot itself, returned by `Robot::get_bot_attribute`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotInfo {
    #[serde(default = "default_bot_name")]
    pub name: String,
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub alias: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub admin_contact: String,
}

fn default_bot_name() -> String {
    "opsbot".to_string()
}

impl Default for BotInfo {
    fn default() -> Self {
        Self {
            name: default_bot_name(),
            full_name: String::new(),
            alias: String::new(),
            email: String::new(),
            admin_contact: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Where stock external tasks live.
    #[serde(default = "default_install_dir")]
    pub install_dir: String,

    /// Site configuration directory; searched before `install_dir`.
    #[serde(default)]
    pub config_dir: Option<String>,

    #[serde(default)]
    pub history_dir: Option<String>,
}

fn default_install_dir() -> String {
    ".".to_string()
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            install_dir: default_install_dir(),
            config_dir: None,
            history_dir: None,
        }
    }
}

impl PathsConfig {
    /// Value exported as OPSBOT_CONFIGDIR; falls back to the install dir.
    pub fn effective_config_dir(&self) -> &str {
        match self.config_dir.as_deref().map(str::trim) {
            Some(d) if !d.is_empty() => d,
            _ => &self.install_dir,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplyConfig {
    #[serde(default = "default_reply_timeout_ms")]
    pub timeout_ms: u64,

    /// How many times a queued prompt may be re-issued before the caller
    /// is told it was interrupted.
    #[serde(default = "default_max_prompt_retries")]
    pub max_prompt_retries: u32,
}

fn default_reply_timeout_ms() -> u64 {
    45_000
}

fn default_max_prompt_retries() -> u32 {
    3
}

impl Default for ReplyConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_reply_timeout_ms(),
            max_prompt_retries: default_max_prompt_retries(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledTaskDef {
    /// Cron expression; five-field expressions get a leading seconds field.
    pub schedule: String,
    pub name: String,
    /// Plugin command; ignored for jobs, which always run with `run`.
    #[serde(default)]
    pub command: String,
    #[serde(default)]
    pub arguments: Vec<String>,
    /// Seeded into the run environment for jobs.
    #[serde(default)]
    pub parameters: Vec<NameValue>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserInfo {
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub internal_id: String,
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub phone: String,
}
