//! Reply-wait table: at most one outstanding prompt per (user, channel), with
//! later prompts queued FIFO behind it.

mod stock;

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use regex::Regex;
use tokio::sync::{mpsc, Mutex};

use crate::connector::{Connector, MessageFormat};
use crate::error::RetVal;

pub use stock::resolve_reply_pattern;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReplyMatcher {
    pub user: String,
    /// "" for a direct message.
    pub channel: String,
}

impl ReplyMatcher {
    pub fn new(user: impl Into<String>, channel: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            channel: channel.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyDisposition {
    Replied,
    /// The user started another command or cancelled.
    Interrupted,
    /// The waiter ahead was resolved; issue your own prompt now.
    RetryPrompt,
}

#[derive(Debug, Clone)]
pub struct Reply {
    pub matched: bool,
    pub disposition: ReplyDisposition,
    pub text: String,
}

impl Reply {
    fn signal(disposition: ReplyDisposition) -> Self {
        Self {
            matched: false,
            disposition,
            text: String::new(),
        }
    }
}

struct Waiter {
    id: u64,
    re: Regex,
    tx: mpsc::Sender<Reply>,
}

pub struct PromptRequest<'a> {
    pub connector: &'a dyn Connector,
    pub matcher: ReplyMatcher,
    pub re: Regex,
    pub prompt: String,
    pub format: MessageFormat,
}

pub struct ReplyTable {
    waiters: Mutex<HashMap<ReplyMatcher, VecDeque<Waiter>>>,
    next_id: AtomicU64,
    timeout_ms: AtomicU64,
    max_retries: AtomicU32,
}

impl ReplyTable {
    pub fn new(timeout: Duration, max_retries: u32) -> Self {
        Self {
            waiters: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            timeout_ms: AtomicU64::new(timeout.as_millis() as u64),
            max_retries: AtomicU32::new(max_retries),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.load(Ordering::Relaxed))
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries.load(Ordering::Relaxed)
    }

    /// Applies to prompts sent from now on.
    pub fn set_limits(&self, timeout: Duration, max_retries: u32) {
        self.timeout_ms
            .store(timeout.as_millis() as u64, Ordering::Relaxed);
        self.max_retries.store(max_retries, Ordering::Relaxed);
    }

    /// Prompts (or queues behind an outstanding prompt) and blocks until the
    /// reply, an interruption or the timeout.
    pub async fn prompt(&self, req: PromptRequest<'_>) -> (String, RetVal) {
        let (tx, mut rx) = mpsc::channel::<Reply>(4);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let matcher = req.matcher.clone();

        let is_head = {
            let mut waiters = self.waiters.lock().await;
            let queue = waiters.entry(matcher.clone()).or_default();
            queue.push_back(Waiter {
                id,
                re: req.re.clone(),
                tx,
            });
            queue.len() == 1
        };

        let mut prompted = false;
        if is_head {
            let ret = send_prompt(&req).await;
            if ret != RetVal::Ok {
                self.release(&matcher, id).await;
                return (String::new(), ret);
            }
            prompted = true;
        } else {
            tracing::debug!(
                user = %matcher.user,
                channel = %matcher.channel,
                "delaying prompt, another prompt is outstanding"
            );
        }

        let mut retries = 0u32;
        loop {
            let reply = if prompted {
                match self.wait_prompted(&matcher, id, &mut rx).await {
                    Some(reply) => reply,
                    None => return (String::new(), RetVal::TimeoutExpired),
                }
            } else {
                // Queued: the clock starts once our own prompt goes out.
                rx.recv()
                    .await
                    .unwrap_or_else(|| Reply::signal(ReplyDisposition::Interrupted))
            };

            match reply.disposition {
                ReplyDisposition::Interrupted => return (String::new(), RetVal::Interrupted),
                ReplyDisposition::RetryPrompt => {
                    retries += 1;
                    if retries > self.max_retries() {
                        tracing::debug!(
                            user = %matcher.user,
                            channel = %matcher.channel,
                            retries,
                            "prompt retried too often, giving up"
                        );
                        self.release(&matcher, id).await;
                        return (String::new(), RetVal::Interrupted);
                    }
                    let ret = send_prompt(&req).await;
                    if ret != RetVal::Ok {
                        self.release(&matcher, id).await;
                        return (String::new(), ret);
                    }
                    prompted = true;
                }
                ReplyDisposition::Replied => return classify(reply),
            }
        }
    }

    async fn wait_prompted(
        &self,
        matcher: &ReplyMatcher,
        id: u64,
        rx: &mut mpsc::Receiver<Reply>,
    ) -> Option<Reply> {
        let received = tokio::select! {
            biased;
            r = rx.recv() => Some(r),
            _ = tokio::time::sleep(self.timeout()) => None,
        };
        match received {
            Some(r) => Some(r.unwrap_or_else(|| Reply::signal(ReplyDisposition::Interrupted))),
            None => self.on_timeout(matcher, id, rx).await,
        }
    }

    /// `None` means a genuine timeout. When the waiter is already gone, a
    /// reply was delivered concurrently and is read instead.
    async fn on_timeout(
        &self,
        matcher: &ReplyMatcher,
        id: u64,
        rx: &mut mpsc::Receiver<Reply>,
    ) -> Option<Reply> {
        if self.release(matcher, id).await {
            tracing::warn!(
                user = %matcher.user,
                channel = %matcher.channel,
                "timed out waiting for a reply"
            );
            return None;
        }
        Some(
            rx.recv()
                .await
                .unwrap_or_else(|| Reply::signal(ReplyDisposition::Interrupted)),
        )
    }

    /// Removes waiter `id`; if it was the head, the next waiter is told to
    /// prompt. Returns false if the waiter was no longer queued.
    async fn release(&self, matcher: &ReplyMatcher, id: u64) -> bool {
        let mut waiters = self.waiters.lock().await;
        let Some(queue) = waiters.get_mut(matcher) else {
            return false;
        };
        let Some(pos) = queue.iter().position(|w| w.id == id) else {
            return false;
        };
        queue.remove(pos);
        if pos == 0 {
            advance(&mut waiters, matcher);
        }
        true
    }

    /// Hands `text` to the head waiter for this matcher. Returns false when
    /// nobody is waiting.
    pub async fn deliver(&self, matcher: &ReplyMatcher, text: &str) -> bool {
        let mut waiters = self.waiters.lock().await;
        let Some(head) = waiters.get_mut(matcher).and_then(|q| q.pop_front()) else {
            return false;
        };
        let text = text.trim();
        let reply = Reply {
            matched: head.re.is_match(text),
            disposition: ReplyDisposition::Replied,
            text: text.to_string(),
        };
        let _ = head.tx.try_send(reply);
        advance(&mut waiters, matcher);
        true
    }

    /// Interrupts the head waiter, e.g. because the user issued a new command.
    pub async fn interrupt(&self, matcher: &ReplyMatcher) -> bool {
        let mut waiters = self.waiters.lock().await;
        let Some(head) = waiters.get_mut(matcher).and_then(|q| q.pop_front()) else {
            return false;
        };
        let _ = head.tx.try_send(Reply::signal(ReplyDisposition::Interrupted));
        advance(&mut waiters, matcher);
        true
    }

    pub async fn is_waiting(&self, matcher: &ReplyMatcher) -> bool {
        self.pending(matcher).await > 0
    }

    pub async fn pending(&self, matcher: &ReplyMatcher) -> usize {
        self.waiters
            .lock()
            .await
            .get(matcher)
            .map(VecDeque::len)
            .unwrap_or(0)
    }
}

/// Drops the entry when empty, otherwise tells the new head to prompt.
fn advance(waiters: &mut HashMap<ReplyMatcher, VecDeque<Waiter>>, matcher: &ReplyMatcher) {
    match waiters.get(matcher).and_then(|q| q.front()) {
        Some(next) => {
            let _ = next
                .tx
                .try_send(Reply::signal(ReplyDisposition::RetryPrompt));
        }
        None => {
            waiters.remove(matcher);
        }
    }
}

async fn send_prompt(req: &PromptRequest<'_>) -> RetVal {
    if req.matcher.channel.is_empty() {
        req.connector
            .send_user_message(&req.matcher.user, &req.prompt, req.format)
            .await
    } else {
        req.connector
            .send_user_channel_message(
                &req.matcher.user,
                &req.matcher.channel,
                &req.prompt,
                req.format,
            )
            .await
    }
}

fn classify(reply: Reply) -> (String, RetVal) {
    if reply.matched {
        return (reply.text, RetVal::Ok);
    }
    match reply.text.as_str() {
        "=" => (String::new(), RetVal::UseDefaultValue),
        "-" => (String::new(), RetVal::Interrupted),
        _ => (String::new(), RetVal::ReplyNotMatched),
    }
}
