//! Routes inbound chat messages to pipelines or waiting prompts.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::context::Engine;
use crate::pipeline::{PipelineOutcome, PipelineRequest};
use crate::reply::ReplyMatcher;
use crate::run::{RunParams, TriggerKind};
use crate::task::{Task, TaskSpec, RUN_COMMAND};

pub const CATCHALL_COMMAND: &str = "catchall";

#[derive(Debug, Clone, Default)]
pub struct IncomingMessage {
    pub user: String,
    /// "" for a direct message.
    pub channel: String,
    /// Message text with any robot name/alias prefix already stripped.
    pub text: String,
    /// Whether the message was addressed to the robot.
    pub addressed: bool,
    pub raw: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handled {
    Command,
    Reply,
    Ambient,
    CatchAll,
    Nothing,
}

pub struct Dispatch {
    pub handled: Handled,
    pub runs: Vec<JoinHandle<PipelineOutcome>>,
}

impl Dispatch {
    fn none(handled: Handled) -> Self {
        Self {
            handled,
            runs: Vec::new(),
        }
    }
}

impl Engine {
    pub async fn handle_message(&self, msg: IncomingMessage) -> Dispatch {
        let tasks = self.tasks().snapshot();
        let cfg = self.config();
        let defaults = &cfg.default_channels;
        let matcher = ReplyMatcher::new(&msg.user, &msg.channel);
        let available: Vec<&Arc<Task>> = tasks
            .plugins()
            .filter(|t| !t.base.disabled && t.available_in(&msg.channel, defaults))
            .collect();

        if msg.addressed {
            let mut hits = available.iter().filter_map(|t| {
                let plugin = t.as_plugin()?;
                plugin.command_matchers.iter().find_map(|m| {
                    m.captures(&msg.text)
                        .map(|args| TaskSpec::new((*t).clone(), m.command.clone(), args))
                })
            });
            if let Some(spec) = hits.next() {
                if hits.next().is_some() {
                    tracing::warn!(text = %msg.text, "command matched more than one plugin, using the first");
                }
                if self.replies().interrupt(&matcher).await {
                    tracing::debug!(user = %msg.user, "new command interrupted an outstanding prompt");
                }
                self.connector().message_heard(&msg.user, &msg.channel).await;
                let run = self.spawn_pipeline(self.request(&msg, spec, TriggerKind::PluginCommand, true));
                return Dispatch {
                    handled: Handled::Command,
                    runs: vec![run],
                };
            }
        }

        if self.replies().deliver(&matcher, &msg.text).await {
            return Dispatch::none(Handled::Reply);
        }

        let mut runs = Vec::new();
        for t in &available {
            let Some(plugin) = t.as_plugin() else { continue };
            if let Some(spec) = plugin.message_matchers.iter().find_map(|m| {
                m.captures(&msg.text)
                    .map(|args| TaskSpec::new((*t).clone(), m.command.clone(), args))
            }) {
                runs.push(self.spawn_pipeline(self.request(&msg, spec, TriggerKind::PluginMessage, true)));
            }
        }
        for job in tasks.jobs().filter(|t| !t.base.disabled) {
            let Some(spec) = job.as_job() else { continue };
            for trigger in spec.triggers.iter().filter(|tr| tr.user == msg.user) {
                let Some(captures) = trigger.captures(&msg.text) else { continue };
                let env: HashMap<String, String> = trigger
                    .parameters
                    .iter()
                    .cloned()
                    .zip(captures)
                    .collect();
                let mut req = self.request(
                    &msg,
                    TaskSpec::new(job.clone(), RUN_COMMAND, Vec::new()),
                    TriggerKind::JobTrigger,
                    false,
                );
                if !job.base.channel.is_empty() {
                    req.params.channel = job.base.channel.clone();
                }
                req.params.environment = env;
                runs.push(self.spawn_pipeline(req));
                break;
            }
        }
        if !runs.is_empty() {
            return Dispatch {
                handled: Handled::Ambient,
                runs,
            };
        }

        if msg.addressed {
            for t in available.iter().filter(|t| t.as_plugin().is_some_and(|p| p.catch_all)) {
                let spec = TaskSpec::new((*t).clone(), CATCHALL_COMMAND, vec![msg.text.clone()]);
                runs.push(self.spawn_pipeline(self.request(&msg, spec, TriggerKind::CatchAll, true)));
            }
            if !runs.is_empty() {
                self.connector().message_heard(&msg.user, &msg.channel).await;
                return Dispatch {
                    handled: Handled::CatchAll,
                    runs,
                };
            }
        }
        Dispatch::none(Handled::Nothing)
    }

    fn request(
        &self,
        msg: &IncomingMessage,
        start: TaskSpec,
        trigger: TriggerKind,
        interactive: bool,
    ) -> PipelineRequest {
        PipelineRequest {
            start,
            params: RunParams {
                user: msg.user.clone(),
                channel: msg.channel.clone(),
                protocol: String::new(),
                raw_message: msg.raw.clone(),
                trigger,
                interactive,
                bypass_security: false,
                environment: HashMap::new(),
            },
            tasks: None,
        }
    }
}
