//! The per-task view handed to native handlers.

use std::any::Any;
use std::sync::Arc;

use tracing::Level;

use crate::connector::MessageFormat;
use crate::context::Engine;
use crate::error::RetVal;
use crate::reply::{resolve_reply_pattern, PromptRequest, ReplyMatcher};
use crate::run::{RunContext, RunId};
use crate::task::{is_identifier, Task, TaskKind, TaskSpec, RUN_COMMAND};

/// Lightweight handle on the running pipeline. Copies made with `fixed()`,
/// `direct()` or `with_format()` change where and how messages go without
/// touching the run itself.
#[derive(Clone)]
pub struct Robot {
    engine: Engine,
    run: Arc<RunContext>,
    task: Arc<Task>,
    user: String,
    channel: String,
    format: MessageFormat,
}

impl Robot {
    pub(crate) fn new(engine: Engine, run: Arc<RunContext>, task: Arc<Task>) -> Self {
        let format = run.state().format;
        Self {
            user: run.user.clone(),
            channel: run.channel.clone(),
            engine,
            run,
            task,
            format,
        }
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    /// "" for a direct message.
    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn protocol(&self) -> &str {
        &self.run.protocol
    }

    pub fn raw_message(&self) -> &str {
        &self.run.raw_message
    }

    pub fn format(&self) -> MessageFormat {
        self.format
    }

    pub fn run_id(&self) -> RunId {
        self.run.id()
    }

    pub fn task_name(&self) -> &str {
        self.task.name()
    }

    pub fn fixed(&self) -> Robot {
        self.with_format(MessageFormat::Fixed)
    }

    pub fn with_format(&self, format: MessageFormat) -> Robot {
        let mut r = self.clone();
        r.format = format;
        r
    }

    pub fn direct(&self) -> Robot {
        let mut r = self.clone();
        r.channel.clear();
        r
    }

    /// Posts to the current channel, or to the user directly.
    pub async fn say(&self, msg: &str) -> RetVal {
        let c = self.engine.connector();
        if self.channel.is_empty() {
            c.send_user_message(&self.user, msg, self.format).await
        } else {
            c.send_channel_message(&self.channel, msg, self.format).await
        }
    }

    /// Like `say`, but addressed to the user.
    pub async fn reply(&self, msg: &str) -> RetVal {
        let c = self.engine.connector();
        if self.channel.is_empty() {
            c.send_user_message(&self.user, msg, self.format).await
        } else {
            c.send_user_channel_message(&self.user, &self.channel, msg, self.format)
                .await
        }
    }

    pub async fn send_channel_message(&self, channel: &str, msg: &str) -> RetVal {
        self.engine
            .connector()
            .send_channel_message(channel, msg, self.format)
            .await
    }

    pub async fn send_user_message(&self, user: &str, msg: &str) -> RetVal {
        self.engine
            .connector()
            .send_user_message(user, msg, self.format)
            .await
    }

    pub async fn send_user_channel_message(&self, user: &str, channel: &str, msg: &str) -> RetVal {
        self.engine
            .connector()
            .send_user_channel_message(user, channel, msg, self.format)
            .await
    }

    pub fn check_admin(&self) -> bool {
        let admin = self.engine.is_admin(&self.user);
        tracing::debug!(user = %self.user, admin, "admin check");
        admin
    }

    /// Sets a pipeline parameter, visible to later tasks in the run.
    pub fn set_parameter(&self, name: &str, value: &str) -> bool {
        if !is_identifier(name) {
            return false;
        }
        self.run
            .state()
            .environment
            .insert(name.to_string(), value.to_string());
        true
    }

    /// "" when unset.
    pub fn get_parameter(&self, name: &str) -> String {
        self.run
            .state()
            .environment
            .get(name)
            .cloned()
            .unwrap_or_default()
    }

    /// Appends a task to this run's queue. Plugins take a command followed by
    /// arguments; jobs take neither and read pipeline parameters instead.
    pub fn add_task(&self, name: &str, cmdargs: &[&str]) -> RetVal {
        let Some(task) = self.run.tasks.get_by_name(name) else {
            return RetVal::TaskNotFound;
        };
        let spec = match &task.kind {
            TaskKind::Plugin(_) => match cmdargs.split_first() {
                Some((cmd, rest)) if !cmd.is_empty() => TaskSpec::new(
                    task.clone(),
                    *cmd,
                    rest.iter().map(|a| a.to_string()).collect(),
                ),
                _ => return RetVal::MissingArguments,
            },
            TaskKind::Job(_) => TaskSpec::new(task.clone(), RUN_COMMAND, Vec::new()),
        };
        self.run.state().queue.push_back(spec);
        RetVal::Ok
    }

    /// Requests elevation through the task's elevator.
    pub async fn elevate(&self, immediate: bool) -> bool {
        self.engine
            .elevate(&self.run, &self.task, immediate)
            .await
            .is_success()
    }

    /// Prompts the user in the current channel (or DM).
    pub async fn prompt_for_reply(&self, tag: &str, prompt: &str) -> (String, RetVal) {
        self.prompt_inner(tag, &self.user, &self.channel, prompt).await
    }

    /// Prompts `user` by direct message.
    pub async fn prompt_user_for_reply(&self, tag: &str, user: &str, prompt: &str) -> (String, RetVal) {
        self.prompt_inner(tag, user, "", prompt).await
    }

    pub async fn prompt_user_channel_for_reply(
        &self,
        tag: &str,
        user: &str,
        channel: &str,
        prompt: &str,
    ) -> (String, RetVal) {
        self.prompt_inner(tag, user, channel, prompt).await
    }

    async fn prompt_inner(
        &self,
        tag: &str,
        user: &str,
        channel: &str,
        prompt: &str,
    ) -> (String, RetVal) {
        let Some(re) = resolve_reply_pattern(tag, self.task.as_plugin()) else {
            tracing::error!(
                task = %self.task.name(),
                tag = %tag,
                "reply matcher not found"
            );
            return (String::new(), RetVal::MatcherNotFound);
        };
        self.engine
            .replies()
            .prompt(PromptRequest {
                connector: self.engine.connector(),
                matcher: ReplyMatcher::new(user, channel),
                re,
                prompt: prompt.to_string(),
                format: self.format,
            })
            .await
    }

    pub async fn get_user_attribute(&self, user: &str, attr: &str) -> (String, RetVal) {
        match self
            .engine
            .connector()
            .user_attribute(user, &attr.to_lowercase())
            .await
        {
            Ok(v) => (v, RetVal::Ok),
            Err(ret) => (String::new(), ret),
        }
    }

    pub async fn get_sender_attribute(&self, attr: &str) -> (String, RetVal) {
        match attr.to_lowercase().as_str() {
            "name" | "username" | "handle" | "user" | "user name" => (self.user.clone(), RetVal::Ok),
            _ => self.get_user_attribute(&self.user, attr).await,
        }
    }

    pub fn get_bot_attribute(&self, attr: &str) -> (String, RetVal) {
        let cfg = self.engine.config();
        let bot = &cfg.bot;
        let value = match attr.to_lowercase().as_str() {
            "name" => bot.name.clone(),
            "fullname" | "realname" => bot.full_name.clone(),
            "alias" => bot.alias.clone(),
            "email" => bot.email.clone(),
            "contact" | "admin" | "admincontact" => bot.admin_contact.clone(),
            "protocol" => self.run.protocol.clone(),
            _ => return (String::new(), RetVal::AttributeNotFound),
        };
        (value, RetVal::Ok)
    }

    /// The typed configuration loaded for this task.
    pub fn task_config<T: Any + Send + Sync>(&self) -> Result<Arc<T>, RetVal> {
        let Some(cfg) = self.task.base.config.as_ref() else {
            return Err(RetVal::NoConfigFound);
        };
        cfg.get::<T>().ok_or(RetVal::InvalidConfigType)
    }

    /// Logs through tracing and, when the run keeps history, into the run's log.
    pub fn log(&self, level: Level, msg: &str) {
        let task = self.task.name();
        match level {
            Level::ERROR => tracing::error!(task = %task, "{}", msg),
            Level::WARN => tracing::warn!(task = %task, "{}", msg),
            Level::INFO => tracing::info!(task = %task, "{}", msg),
            Level::DEBUG => tracing::debug!(task = %task, "{}", msg),
            _ => tracing::trace!(task = %task, "{}", msg),
        }
        let logger = self.run.state().logger.clone();
        if let Some(logger) = logger {
            logger.log(&format!("LOG:{} {}", level, msg));
        }
    }
}
