//! Native tasks shipped with the binary.

use std::sync::Arc;

use async_trait::async_trait;
use opsbot_core::api::{EngineError, HandlerRegistry, NativeHandler, RetVal, Robot, TaskOutcome};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct PingConfig {
    pub reply: String,
}

pub struct Ping;

#[async_trait]
impl NativeHandler for Ping {
    async fn handle(&self, robot: &Robot, command: &str, _args: &[String]) -> TaskOutcome {
        match command {
            "init" => TaskOutcome::Normal,
            "ping" => {
                let reply = robot
                    .task_config::<PingConfig>()
                    .map(|c| c.reply.clone())
                    .unwrap_or_else(|_| "PONG".to_string());
                robot.reply(&reply).await;
                TaskOutcome::Normal
            }
            _ => TaskOutcome::Normal,
        }
    }
}

pub struct WhoAmI;

#[async_trait]
impl NativeHandler for WhoAmI {
    async fn handle(&self, robot: &Robot, command: &str, _args: &[String]) -> TaskOutcome {
        if command != "whoami" {
            return TaskOutcome::Normal;
        }
        let msg = match robot.get_sender_attribute("email").await {
            (email, RetVal::Ok) if !email.is_empty() => {
                format!("you are '{}' <{}>", robot.user(), email)
            }
            _ => format!("you are '{}'", robot.user()),
        };
        robot.reply(&msg).await;
        TaskOutcome::Normal
    }
}

/// Elevator that asks the user to confirm with yes/no.
pub struct Confirm;

#[async_trait]
impl NativeHandler for Confirm {
    async fn handle(&self, robot: &Robot, command: &str, _args: &[String]) -> TaskOutcome {
        if command != "elevate" {
            return TaskOutcome::Normal;
        }
        let (answer, ret) = robot
            .prompt_for_reply("YesNo", "This command requires confirmation, are you sure? (yes/no)")
            .await;
        match ret {
            RetVal::Ok if answer.to_lowercase().starts_with('y') => TaskOutcome::Success,
            RetVal::Ok => TaskOutcome::Fail,
            other => {
                robot.log(
                    tracing::Level::DEBUG,
                    &format!("confirmation not received: {other}"),
                );
                TaskOutcome::Fail
            }
        }
    }
}

pub fn register_builtins(handlers: &HandlerRegistry) -> Result<(), EngineError> {
    handlers.register_with_config::<PingConfig>("ping", Arc::new(Ping), "reply = \"PONG\"")?;
    handlers.register("whoami", Arc::new(WhoAmI))?;
    handlers.register("confirm", Arc::new(Confirm))?;
    Ok(())
}
