//! Task registry: name/ID lookup over an atomically replaced snapshot.

mod table;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use crate::error::EngineError;
use crate::handler::HandlerRegistry;
use crate::task::{JobDef, PluginDef, Task};

pub use table::TaskTable;

pub struct TaskRegistry {
    table: RwLock<Arc<TaskTable>>,
    /// Append-only; a name keeps its ID for the life of the process.
    ids: Mutex<HashMap<String, String>>,
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self {
            table: RwLock::new(Arc::new(TaskTable::default())),
            ids: Mutex::new(HashMap::new()),
        }
    }

    /// Stable random ID for `name`: a v4 UUID in simple form, 32 lowercase
    /// hex digits carrying 122 random bits.
    pub fn task_id(&self, name: &str) -> String {
        let mut ids = self.ids.lock().unwrap_or_else(|e| e.into_inner());
        ids.entry(name.to_string())
            .or_insert_with(|| uuid::Uuid::new_v4().simple().to_string())
            .clone()
    }

    /// Builds a new table and swaps it in. Runs holding the previous
    /// snapshot are unaffected.
    pub fn load(
        &self,
        plugins: &[PluginDef],
        jobs: &[JobDef],
        handlers: &HandlerRegistry,
    ) -> Result<Arc<TaskTable>, EngineError> {
        let table = Arc::new(TaskTable::build(plugins, jobs, handlers, &mut |name: &str| {
            self.task_id(name)
        })?);
        *self.table.write().unwrap_or_else(|e| e.into_inner()) = table.clone();
        tracing::info!(tasks = table.len(), "task registry loaded");
        Ok(table)
    }

    pub fn snapshot(&self) -> Arc<TaskTable> {
        self.table.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn resolve_by_name(&self, name: &str) -> Result<Arc<Task>, EngineError> {
        self.snapshot()
            .get_by_name(name)
            .ok_or_else(|| EngineError::TaskNotFound(name.to_string()))
    }

    pub fn resolve_by_id(&self, id: &str) -> Result<Arc<Task>, EngineError> {
        self.snapshot()
            .get_by_id(id)
            .ok_or_else(|| EngineError::TaskNotFound(id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{MatcherDef, TaskCommonDef};

    fn external_plugin(name: &str) -> PluginDef {
        PluginDef {
            common: TaskCommonDef {
                path: format!("plugins/{name}.sh"),
                ..TaskCommonDef::named(name)
            },
            ..PluginDef::default()
        }
    }

    #[test]
    fn ids_are_stable_across_reloads() {
        let reg = TaskRegistry::new();
        let handlers = HandlerRegistry::new();
        reg.load(&[external_plugin("echo")], &[], &handlers).unwrap();
        let first = reg.resolve_by_name("echo").unwrap();
        assert_eq!(first.base.id.len(), 32);
        assert!(first
            .base
            .id
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
        assert_eq!(first.base.id.as_bytes()[12], b'4');
        assert_ne!(reg.task_id("other"), first.base.id);

        reg.load(&[external_plugin("echo")], &[], &handlers).unwrap();
        let second = reg.resolve_by_name("echo").unwrap();
        assert_eq!(first.base.id, second.base.id);
        assert_eq!(reg.resolve_by_id(&first.base.id).unwrap().name(), "echo");
    }

    #[test]
    fn reload_does_not_touch_existing_snapshot() {
        let reg = TaskRegistry::new();
        let handlers = HandlerRegistry::new();
        reg.load(&[external_plugin("a")], &[], &handlers).unwrap();
        let snap = reg.snapshot();

        reg.load(&[external_plugin("b")], &[], &handlers).unwrap();
        assert!(snap.get_by_name("a").is_some());
        assert!(snap.get_by_name("b").is_none());
        assert!(matches!(
            reg.resolve_by_name("a"),
            Err(EngineError::TaskNotFound(_))
        ));
    }

    #[test]
    fn broken_tasks_are_disabled_not_fatal() {
        let reg = TaskRegistry::new();
        let handlers = HandlerRegistry::new();
        let mut bad_regex = external_plugin("bad");
        bad_regex.command_matchers = vec![MatcherDef::command("(unclosed", "x")];
        let native = PluginDef {
            common: TaskCommonDef::named("native"),
            ..PluginDef::default()
        };
        reg.load(&[bad_regex, native], &[], &handlers).unwrap();

        let bad = reg.resolve_by_name("bad").unwrap();
        assert!(bad.base.disabled);
        assert!(bad.base.reason.contains("invalid regex"));
        let native = reg.resolve_by_name("native").unwrap();
        assert!(native.base.disabled);
        assert!(native.base.reason.contains("no native handler"));
    }

    #[test]
    fn namespace_defaults_and_duplicates() {
        let reg = TaskRegistry::new();
        let handlers = HandlerRegistry::new();
        let mut shared = external_plugin("deploy");
        shared.common.namespace = Some("ops".into());
        let mut private = external_plugin("secret");
        private.common.namespace = Some("ops".into());
        private.common.private_namespace = true;
        let job = JobDef {
            common: TaskCommonDef {
                path: "jobs/nightly.sh".into(),
                ..TaskCommonDef::named("nightly")
            },
            ..JobDef::default()
        };
        reg.load(&[shared, private], &[job], &handlers)
            .unwrap();
        assert_eq!(reg.resolve_by_name("deploy").unwrap().param_namespace(), "ops");
        assert_eq!(reg.resolve_by_name("secret").unwrap().param_namespace(), "secret");
        assert_eq!(reg.resolve_by_name("nightly").unwrap().param_namespace(), "nightly");

        let dup = JobDef {
            common: TaskCommonDef::named("deploy"),
            ..JobDef::default()
        };
        assert!(matches!(
            reg.load(&[external_plugin("deploy")], &[dup], &handlers),
            Err(EngineError::DuplicateTask(_))
        ));
    }
}
