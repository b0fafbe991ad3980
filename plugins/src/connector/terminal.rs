use std::collections::HashMap;

use async_trait::async_trait;
use opsbot_core::api::{Connector, MessageFormat, RetVal, UserInfo};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

type Output = Box<dyn AsyncWrite + Unpin + Send>;

/// Prints outgoing messages to a terminal (or any writer).
pub struct TerminalConnector {
    protocol: String,
    users: HashMap<String, UserInfo>,
    out: Mutex<Output>,
}

impl TerminalConnector {
    pub fn new(protocol: impl Into<String>, users: &[UserInfo], out: Output) -> Self {
        Self {
            protocol: protocol.into(),
            users: users.iter().map(|u| (u.name.clone(), u.clone())).collect(),
            out: Mutex::new(out),
        }
    }

    pub fn stdout(protocol: impl Into<String>, users: &[UserInfo]) -> Self {
        Self::new(protocol, users, Box::new(tokio::io::stdout()))
    }

    async fn send(&self, target: &str, msg: &str, format: MessageFormat) -> RetVal {
        let text = match format {
            MessageFormat::Fixed => format!("{target}:\n{msg}\n"),
            MessageFormat::Raw | MessageFormat::Variable => format!("{target}: {msg}\n"),
        };
        let mut out = self.out.lock().await;
        match out.write_all(text.as_bytes()).await {
            Ok(()) => {
                let _ = out.flush().await;
                RetVal::Ok
            }
            Err(e) => {
                tracing::error!(error.kind = "connector", reason = %e, "terminal write failed");
                RetVal::FailedMessageSend
            }
        }
    }
}

#[async_trait]
impl Connector for TerminalConnector {
    fn protocol(&self) -> &str {
        &self.protocol
    }

    async fn send_channel_message(&self, channel: &str, msg: &str, format: MessageFormat) -> RetVal {
        self.send(&format!("#{channel}"), msg, format).await
    }

    async fn send_user_channel_message(
        &self,
        user: &str,
        channel: &str,
        msg: &str,
        format: MessageFormat,
    ) -> RetVal {
        self.send(&format!("#{channel}"), &format!("@{user} {msg}"), format)
            .await
    }

    async fn send_user_message(&self, user: &str, msg: &str, format: MessageFormat) -> RetVal {
        self.send(&format!("(dm:{user})"), msg, format).await
    }

    async fn message_heard(&self, _user: &str, _channel: &str) {}

    async fn user_attribute(&self, user: &str, attr: &str) -> Result<String, RetVal> {
        let u = self.users.get(user).ok_or(RetVal::UserNotFound)?;
        let v = match attr {
            "email" => &u.email,
            "internalid" => &u.internal_id,
            "realname" | "fullname" | "real name" | "full name" => &u.full_name,
            "firstname" | "first name" => &u.first_name,
            "lastname" | "last name" => &u.last_name,
            "phone" => &u.phone,
            _ => return Err(RetVal::AttributeNotFound),
        };
        Ok(v.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn formats_targets_and_resolves_users() {
        let (wr, mut rd) = tokio::io::duplex(4096);
        let users = vec![UserInfo {
            name: "alice".into(),
            email: "alice@example.com".into(),
            ..UserInfo::default()
        }];
        let conn = TerminalConnector::new("terminal", &users, Box::new(wr));

        conn.send_channel_message("general", "hello", MessageFormat::Raw).await;
        conn.send_user_channel_message("alice", "general", "hi", MessageFormat::Raw)
            .await;
        conn.send_user_message("alice", "psst", MessageFormat::Raw).await;
        drop(conn);

        let mut text = String::new();
        rd.read_to_string(&mut text).await.unwrap();
        assert_eq!(text, "#general: hello\n#general: @alice hi\n(dm:alice): psst\n");

        let conn = TerminalConnector::new("terminal", &users, Box::new(tokio::io::sink()));
        assert_eq!(
            conn.user_attribute("alice", "email").await.unwrap(),
            "alice@example.com"
        );
        assert_eq!(conn.user_attribute("alice", "shoe").await, Err(RetVal::AttributeNotFound));
        assert_eq!(conn.user_attribute("bob", "email").await, Err(RetVal::UserNotFound));
    }
}
