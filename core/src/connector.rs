//! Messaging-platform capability the engine talks through.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::RetVal;

/// Outgoing-format hint passed with every message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageFormat {
    /// Protocol-native markup.
    #[default]
    Raw,
    /// Fixed-width text.
    Fixed,
    /// Escaped, variable-width text.
    Variable,
}

#[async_trait]
pub trait Connector: Send + Sync {
    /// Protocol tag, exported to external tasks.
    fn protocol(&self) -> &str;

    async fn send_channel_message(&self, channel: &str, msg: &str, format: MessageFormat)
        -> RetVal;

    async fn send_user_channel_message(
        &self,
        user: &str,
        channel: &str,
        msg: &str,
        format: MessageFormat,
    ) -> RetVal;

    async fn send_user_message(&self, user: &str, msg: &str, format: MessageFormat) -> RetVal;

    /// "Typing" style indicator sent when the robot starts acting on a message.
    async fn message_heard(&self, user: &str, channel: &str);

    async fn user_attribute(&self, user: &str, attr: &str) -> Result<String, RetVal>;
}
