//! Native (in-process) task handlers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use crate::error::{EngineError, TaskOutcome};
use crate::robot::Robot;
use crate::task::{is_identifier, TaskConfig};

#[async_trait]
pub trait NativeHandler: Send + Sync {
    async fn handle(&self, robot: &Robot, command: &str, args: &[String]) -> TaskOutcome;
}

type ConfigParser = Arc<dyn Fn(&toml::Value) -> anyhow::Result<TaskConfig> + Send + Sync>;

#[derive(Clone)]
struct HandlerEntry {
    handler: Arc<dyn NativeHandler>,
    default_config: Option<toml::Value>,
    parser: Option<ConfigParser>,
}

/// Name -> handler table. Sealed when the engine is built; later
/// registrations are rejected.
#[derive(Default)]
pub struct HandlerRegistry {
    entries: RwLock<HashMap<String, HandlerEntry>>,
    sealed: AtomicBool,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, name: &str, handler: Arc<dyn NativeHandler>) -> Result<(), EngineError> {
        self.insert(
            name,
            HandlerEntry {
                handler,
                default_config: None,
                parser: None,
            },
        )
    }

    /// Registers a handler whose task configuration deserializes into `C`.
    /// `default_config` is TOML used when a task carries no `config` table.
    pub fn register_with_config<C>(
        &self,
        name: &str,
        handler: Arc<dyn NativeHandler>,
        default_config: &str,
    ) -> Result<(), EngineError>
    where
        C: DeserializeOwned + Send + Sync + 'static,
    {
        let default_config = if default_config.trim().is_empty() {
            None
        } else {
            Some(
                toml::from_str::<toml::Value>(default_config).map_err(|e| {
                    EngineError::Registration {
                        name: name.to_string(),
                        reason: format!("invalid default config: {e}"),
                    }
                })?,
            )
        };
        let parser: ConfigParser = Arc::new(|raw: &toml::Value| {
            let cfg: C = raw.clone().try_into()?;
            Ok(TaskConfig::new(cfg))
        });
        self.insert(
            name,
            HandlerEntry {
                handler,
                default_config,
                parser: Some(parser),
            },
        )
    }

    fn insert(&self, name: &str, entry: HandlerEntry) -> Result<(), EngineError> {
        let reject = |reason: &str| EngineError::Registration {
            name: name.to_string(),
            reason: reason.to_string(),
        };
        if self.is_sealed() {
            return Err(reject("registrations are closed once the engine has started"));
        }
        if !is_identifier(name) {
            return Err(reject("name must match [\\w-]+"));
        }
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        if entries.contains_key(name) {
            return Err(reject("duplicate handler name"));
        }
        entries.insert(name.to_string(), entry);
        Ok(())
    }

    pub fn seal(&self) {
        self.sealed.store(true, Ordering::SeqCst);
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed.load(Ordering::SeqCst)
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn NativeHandler>> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.get(name).map(|e| e.handler.clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.contains_key(name)
    }

    /// Builds the typed configuration for task `name`. Without a typed parser
    /// the raw TOML value itself is attached.
    pub fn load_config(
        &self,
        name: &str,
        raw: Option<&toml::Value>,
    ) -> Result<Option<TaskConfig>, String> {
        let entry = {
            let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
            entries.get(name).cloned()
        };
        let Some(entry) = entry else {
            return Ok(raw.cloned().map(TaskConfig::new));
        };
        let Some(value) = raw.or(entry.default_config.as_ref()) else {
            return Ok(None);
        };
        match entry.parser {
            Some(parser) => parser(value)
                .map(Some)
                .map_err(|e| format!("invalid configuration: {e}")),
            None => Ok(Some(TaskConfig::new(value.clone()))),
        }
    }
}
