use std::collections::HashMap;

use anyhow::{bail, Result};
use async_trait::async_trait;
use opsbot_core::api::{Checkout, Store};
use tokio::sync::Mutex;

#[derive(Debug, Clone)]
struct Entry {
    version: u64,
    value: serde_json::Value,
}

/// Process-local store with version-number tokens. Nothing survives a restart.
#[derive(Default)]
pub struct MemoryStore {
    data: Mutex<HashMap<String, Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn checkout(&self, key: &str, for_update: bool) -> Result<Checkout> {
        let data = self.data.lock().await;
        let (version, value) = match data.get(key) {
            Some(e) => (e.version, Some(e.value.clone())),
            None => (0, None),
        };
        Ok(Checkout {
            token: for_update.then(|| version.to_string()),
            value,
        })
    }

    async fn update(&self, key: &str, token: &str, value: serde_json::Value) -> Result<()> {
        let expected: u64 = token.parse().unwrap_or(0);
        let mut data = self.data.lock().await;
        let current = data.get(key).map_or(0, |e| e.version);
        if current != expected {
            bail!("stale token for '{key}': expected version {current}, got {expected}");
        }
        data.insert(
            key.to_string(),
            Entry {
                version: current + 1,
                value,
            },
        );
        Ok(())
    }
}
