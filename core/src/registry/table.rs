use std::collections::HashMap;
use std::sync::Arc;

use crate::error::EngineError;
use crate::handler::HandlerRegistry;
use crate::task::{
    is_identifier, InputMatcher, JobDef, JobSpec, MatcherDef, PluginDef, PluginSpec, Task,
    TaskBase, TaskCommonDef, TaskKind,
};

/// Immutable snapshot of every known task.
#[derive(Debug, Default)]
pub struct TaskTable {
    tasks: Vec<Arc<Task>>,
    by_name: HashMap<String, Arc<Task>>,
    by_id: HashMap<String, Arc<Task>>,
}

impl TaskTable {
    pub fn get_by_name(&self, name: &str) -> Option<Arc<Task>> {
        self.by_name.get(name).cloned()
    }

    pub fn get_by_id(&self, id: &str) -> Option<Arc<Task>> {
        self.by_id.get(id).cloned()
    }

    /// Tasks in definition order, plugins first.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Task>> {
        self.tasks.iter()
    }

    pub fn plugins(&self) -> impl Iterator<Item = &Arc<Task>> {
        self.tasks.iter().filter(|t| !t.is_job())
    }

    pub fn jobs(&self) -> impl Iterator<Item = &Arc<Task>> {
        self.tasks.iter().filter(|t| t.is_job())
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub(crate) fn build(
        plugins: &[PluginDef],
        jobs: &[JobDef],
        handlers: &HandlerRegistry,
        id_for: &mut dyn FnMut(&str) -> String,
    ) -> Result<Self, EngineError> {
        let mut table = TaskTable::default();

        for def in plugins {
            let mut base = base_from(&def.common, handlers, id_for)?;
            let spec = PluginSpec {
                admin_commands: def.admin_commands.clone(),
                elevated_commands: def.elevated_commands.clone(),
                elevate_immediate_commands: def.elevate_immediate_commands.clone(),
                authorized_commands: def.authorized_commands.clone(),
                authorize_all_commands: def.authorize_all_commands,
                catch_all: def.catch_all,
                command_matchers: compile(&def.command_matchers, true, &mut base),
                message_matchers: compile(&def.message_matchers, false, &mut base),
                reply_matchers: compile(&def.reply_matchers, true, &mut base),
                help: def.help.clone(),
            };
            table.insert(Task {
                base,
                kind: TaskKind::Plugin(spec),
            })?;
        }

        for def in jobs {
            let mut base = base_from(&def.common, handlers, id_for)?;
            let spec = JobSpec {
                parameters: def.parameters.clone(),
                required_parameters: def.required_parameters.clone(),
                verbose: def.verbose,
                triggers: compile(&def.triggers, false, &mut base),
            };
            table.insert(Task {
                base,
                kind: TaskKind::Job(spec),
            })?;
        }

        Ok(table)
    }

    fn insert(&mut self, task: Task) -> Result<(), EngineError> {
        if self.by_name.contains_key(&task.base.name) {
            return Err(EngineError::DuplicateTask(task.base.name.clone()));
        }
        if task.base.disabled {
            tracing::warn!(
                task = %task.base.name,
                reason = %task.base.reason,
                "task disabled"
            );
        }
        let task = Arc::new(task);
        self.by_name.insert(task.base.name.clone(), task.clone());
        self.by_id.insert(task.base.id.clone(), task.clone());
        self.tasks.push(task);
        Ok(())
    }
}

fn base_from(
    def: &TaskCommonDef,
    handlers: &HandlerRegistry,
    id_for: &mut dyn FnMut(&str) -> String,
) -> Result<TaskBase, EngineError> {
    if !is_identifier(&def.name) {
        return Err(EngineError::InvalidTaskName(def.name.clone()));
    }
    let namespace = match def.namespace.as_deref().map(str::trim) {
        Some(ns) if !ns.is_empty() => ns.to_string(),
        _ => def.name.clone(),
    };
    let mut base = TaskBase {
        name: def.name.clone(),
        id: id_for(&def.name),
        description: def.description.clone(),
        path: def.path.clone(),
        namespace,
        private_namespace: def.private_namespace,
        user: def.user.clone(),
        channel: def.channel.clone(),
        channels: def.channels.clone(),
        all_channels: def.all_channels,
        allow_direct: def.allow_direct,
        direct_only: def.direct_only,
        require_admin: def.require_admin,
        users: def.users.clone(),
        elevator: def.elevator.clone().filter(|s| !s.is_empty()),
        authorizer: def.authorizer.clone().filter(|s| !s.is_empty()),
        auth_require: def.auth_require.clone(),
        history_logs: def.history_logs,
        disabled: false,
        reason: String::new(),
        config: None,
    };

    if def.disabled {
        disable(&mut base, "disabled in configuration".to_string());
    }
    if def.path.is_empty() {
        if !handlers.contains(&def.name) {
            disable(&mut base, format!("no native handler registered for '{}'", def.name));
        }
        match handlers.load_config(&def.name, def.config.as_ref()) {
            Ok(cfg) => base.config = cfg,
            Err(reason) => disable(&mut base, reason),
        }
    }
    Ok(base)
}

fn compile(defs: &[MatcherDef], anchored: bool, base: &mut TaskBase) -> Vec<InputMatcher> {
    let mut out = Vec::with_capacity(defs.len());
    for def in defs {
        let compiled = if anchored {
            InputMatcher::anchored(def)
        } else {
            InputMatcher::unanchored(def)
        };
        match compiled {
            Ok(m) => out.push(m),
            Err(e) => disable(base, format!("invalid regex '{}': {}", def.regex, e)),
        }
    }
    out
}

/// The first reason is kept.
fn disable(base: &mut TaskBase, reason: String) {
    if !base.disabled {
        base.disabled = true;
        base.reason = reason;
    }
}
