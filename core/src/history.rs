//! Run-history bookkeeping and the history provider capability.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex as AsyncMutex;

use crate::store::{self, Store, HISTORY_PREFIX};

/// chrono rendering of "Mon Jan 2 15:04:05 MST 2006".
pub const HISTORY_TIME_FORMAT: &str = "%a %b %e %H:%M:%S %Z %Y";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryLog {
    pub log_index: u64,
    pub create_time: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskHistory {
    pub next_index: u64,
    pub histories: Vec<HistoryLog>,
}

impl TaskHistory {
    /// Appends a run, evicting the oldest entries beyond `retain`; returns the run index.
    pub fn push_run(&mut self, create_time: String, retain: usize) -> u64 {
        let log_index = self.next_index;
        self.next_index += 1;
        self.histories.push(HistoryLog {
            log_index,
            create_time,
        });
        let retain = retain.max(1);
        if self.histories.len() > retain {
            let excess = self.histories.len() - retain;
            self.histories.drain(..excess);
        }
        log_index
    }
}

/// Per-run sink for task output. Implementations must not block.
pub trait HistoryLogger: Send + Sync {
    fn log(&self, line: &str);
    fn section(&self, name: &str, info: &str);
    fn close(&self);
}

#[async_trait]
pub trait HistoryProvider: Send + Sync {
    /// Starts a logger for run `index` of `tag`, cleaning up logs beyond `max_histories`.
    async fn new_history(
        &self,
        tag: &str,
        index: u64,
        max_histories: usize,
    ) -> anyhow::Result<Arc<dyn HistoryLogger>>;
}

pub struct RunHistory {
    pub run_index: u64,
    pub logger: Option<Arc<dyn HistoryLogger>>,
}

/// Attempts at a checkout/update cycle before the run goes unrecorded.
const HISTORY_UPDATE_ATTEMPTS: usize = 5;

lazy_static! {
    static ref HISTORY_LOCKS: StdMutex<HashMap<String, Arc<AsyncMutex<()>>>> =
        StdMutex::new(HashMap::new());
}

fn history_lock(key: &str) -> Arc<AsyncMutex<()>> {
    let mut locks = HISTORY_LOCKS.lock().unwrap_or_else(|e| e.into_inner());
    locks.entry(key.to_string()).or_default().clone()
}

/// Records a new run of `pipe_name`. Jobs always keep at least one entry;
/// a logger is only requested when `history_logs > 0`.
///
/// Runs of the same pipeline in this process are serialised on a per-key
/// lock; a stale token from another writer restarts the checkout.
pub async fn start_run_history(
    store: &dyn Store,
    provider: Option<&dyn HistoryProvider>,
    pipe_name: &str,
    history_logs: usize,
    create_time: String,
) -> RunHistory {
    let key = format!("{HISTORY_PREFIX}{pipe_name}");
    let mut out = RunHistory {
        run_index: 0,
        logger: None,
    };

    let lock = history_lock(&key);
    let reserved = {
        let _held = lock.lock().await;
        reserve_run_index(store, &key, pipe_name, history_logs, &create_time).await
    };
    let Some(run_index) = reserved else {
        return out;
    };
    out.run_index = run_index;

    if history_logs > 0 {
        if let Some(provider) = provider {
            match provider.new_history(pipe_name, run_index, history_logs).await {
                Ok(logger) => out.logger = Some(logger),
                Err(e) => tracing::error!(
                    error.kind = "history",
                    reason = %e,
                    "error starting history for '{}', no history will be recorded",
                    pipe_name
                ),
            }
        }
    }
    out
}

async fn reserve_run_index(
    store: &dyn Store,
    key: &str,
    pipe_name: &str,
    history_logs: usize,
    create_time: &str,
) -> Option<u64> {
    for attempt in 1..=HISTORY_UPDATE_ATTEMPTS {
        let mut datum = match store::checkout_datum::<TaskHistory>(store, key, true).await {
            Ok(d) => d,
            Err(e) => {
                tracing::error!(
                    error.kind = "history",
                    key = %key,
                    reason = %e,
                    "error checking out history, no history will be remembered for '{}'",
                    pipe_name
                );
                return None;
            }
        };
        let run_index = datum.value.push_run(create_time.to_string(), history_logs);
        let token = datum.token.clone().unwrap_or_default();
        match store::update_datum(store, key, &token, &datum.value).await {
            Ok(()) => return Some(run_index),
            Err(e) if attempt < HISTORY_UPDATE_ATTEMPTS => {
                tracing::debug!(
                    key = %key,
                    attempt,
                    reason = %e,
                    "history update rejected, checking out again"
                );
            }
            Err(e) => {
                tracing::error!(
                    error.kind = "history",
                    key = %key,
                    reason = %e,
                    "error updating history, no history will be remembered for '{}'",
                    pipe_name
                );
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Checkout;
    use pretty_assertions::assert_eq;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct MapStore {
        data: Mutex<HashMap<String, (u64, serde_json::Value)>>,
        checkout_delay: Option<Duration>,
    }

    #[async_trait]
    impl Store for MapStore {
        async fn checkout(&self, key: &str, _for_update: bool) -> anyhow::Result<Checkout> {
            if let Some(delay) = self.checkout_delay {
                tokio::time::sleep(delay).await;
            }
            let data = self.data.lock().await;
            Ok(match data.get(key) {
                Some((v, value)) => Checkout {
                    token: Some(v.to_string()),
                    value: Some(value.clone()),
                },
                None => Checkout {
                    token: Some("0".into()),
                    value: None,
                },
            })
        }

        async fn update(
            &self,
            key: &str,
            token: &str,
            value: serde_json::Value,
        ) -> anyhow::Result<()> {
            let mut data = self.data.lock().await;
            let current = data.get(key).map(|(v, _)| *v).unwrap_or(0);
            anyhow::ensure!(current.to_string() == token, "stale token");
            data.insert(key.to_string(), (current + 1, value));
            Ok(())
        }
    }

    #[test]
    fn push_run_keeps_most_recent() {
        let mut th = TaskHistory::default();
        for i in 0..5 {
            th.push_run(format!("t{i}"), 2);
        }
        assert_eq!(th.next_index, 5);
        let idx: Vec<u64> = th.histories.iter().map(|h| h.log_index).collect();
        assert_eq!(idx, vec![3, 4]);
    }

    #[tokio::test]
    async fn retains_k_most_recent_of_m_runs() {
        let store = MapStore::default();
        for _ in 0..7 {
            start_run_history(&store, None, "deploy", 3, "now".into()).await;
        }
        let th = store::checkout_datum::<TaskHistory>(&store, "bot:histories:deploy", false)
            .await
            .unwrap()
            .value;
        let idx: Vec<u64> = th.histories.iter().map(|h| h.log_index).collect();
        assert_eq!(idx, vec![4, 5, 6]);
        assert_eq!(th.next_index, 7);
    }

    #[tokio::test]
    async fn jobs_without_retention_remember_one_run() {
        let store = MapStore::default();
        let first = start_run_history(&store, None, "nightly", 0, "a".into()).await;
        let second = start_run_history(&store, None, "nightly", 0, "b".into()).await;
        assert_eq!(first.run_index, 0);
        assert_eq!(second.run_index, 1);
        assert!(second.logger.is_none());
        let th = store::checkout_datum::<TaskHistory>(&store, "bot:histories:nightly", false)
            .await
            .unwrap()
            .value;
        assert_eq!(th.histories.len(), 1);
        assert_eq!(th.histories[0].create_time, "b");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_runs_get_distinct_indices() {
        let store = Arc::new(MapStore {
            checkout_delay: Some(Duration::from_millis(5)),
            ..Default::default()
        });
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move {
                    start_run_history(store.as_ref(), None, "contended", 5, format!("t{i}"))
                        .await
                        .run_index
                })
            })
            .collect();
        let mut indices = HashSet::new();
        for h in handles {
            indices.insert(h.await.unwrap());
        }
        assert_eq!(indices, HashSet::from([0, 1, 2, 3]));

        let th = store::checkout_datum::<TaskHistory>(
            store.as_ref(),
            "bot:histories:contended",
            false,
        )
        .await
        .unwrap()
        .value;
        assert_eq!(th.next_index, 4);
        assert_eq!(th.histories.len(), 4);
    }

    /// Another writer lands between the first checkout and its update.
    #[derive(Default)]
    struct RacedStore {
        inner: MapStore,
        raced: AtomicBool,
    }

    #[async_trait]
    impl Store for RacedStore {
        async fn checkout(&self, key: &str, for_update: bool) -> anyhow::Result<Checkout> {
            self.inner.checkout(key, for_update).await
        }

        async fn update(
            &self,
            key: &str,
            token: &str,
            value: serde_json::Value,
        ) -> anyhow::Result<()> {
            if !self.raced.swap(true, Ordering::SeqCst) {
                let mut other = TaskHistory::default();
                other.push_run("elsewhere".into(), 3);
                self.inner
                    .update(key, token, serde_json::to_value(&other)?)
                    .await?;
            }
            self.inner.update(key, token, value).await
        }
    }

    #[tokio::test]
    async fn stale_token_checks_out_again() {
        let store = RacedStore::default();
        let run = start_run_history(&store, None, "raced", 3, "mine".into()).await;
        assert_eq!(run.run_index, 1);

        let th = store::checkout_datum::<TaskHistory>(&store, "bot:histories:raced", false)
            .await
            .unwrap()
            .value;
        let times: Vec<&str> = th.histories.iter().map(|h| h.create_time.as_str()).collect();
        assert_eq!(times, vec!["elsewhere", "mine"]);
        assert_eq!(th.next_index, 2);
    }
}
