//! Cron-driven pipeline triggers.

mod zone;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use cron::Schedule;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::config::ScheduledTaskDef;
use crate::context::Engine;
use crate::pipeline::PipelineRequest;
use crate::registry::TaskTable;
use crate::run::{RunParams, TriggerKind};
use crate::task::{Task, TaskSpec, RUN_COMMAND};

pub use zone::{parse_schedule, ScheduleZone};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ScheduleReport {
    pub scheduled: Vec<String>,
    /// (task name, reason)
    pub skipped: Vec<(String, String)>,
}

/// Holds the single live schedule.
#[derive(Default)]
pub struct Scheduler {
    live: Mutex<Option<Vec<JoinHandle<()>>>>,
}

struct Planned {
    task: Arc<Task>,
    schedule: Schedule,
    entry: ScheduledTaskDef,
    /// The table `task` was resolved from; every firing runs against it.
    tasks: Arc<TaskTable>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stops the current schedule, then installs one built from `entries`
    /// against a snapshot of the task table.
    pub(crate) async fn rebuild(
        &self,
        engine: &Engine,
        entries: &[ScheduledTaskDef],
    ) -> ScheduleReport {
        let mut live = self.live.lock().await;
        if let Some(old) = live.take() {
            for h in old {
                h.abort();
            }
        }

        let tasks = engine.tasks().snapshot();
        let mut report = ScheduleReport::default();
        let mut handles = Vec::new();
        for entry in entries {
            match plan(entry, &tasks) {
                Ok(planned) => {
                    tracing::info!(
                        task = %entry.name,
                        schedule = %entry.schedule,
                        timezone = %engine.zone().name(),
                        "scheduled task"
                    );
                    report.scheduled.push(entry.name.clone());
                    handles.push(tokio::spawn(fire_loop(engine.clone(), planned)));
                }
                Err(reason) => {
                    tracing::warn!(task = %entry.name, reason = %reason, "not scheduling task");
                    report.skipped.push((entry.name.clone(), reason));
                }
            }
        }
        *live = Some(handles);
        report
    }

    pub async fn stop(&self) {
        if let Some(old) = self.live.lock().await.take() {
            for h in old {
                h.abort();
            }
        }
    }

    pub async fn is_running(&self) -> bool {
        self.live.lock().await.is_some()
    }
}

fn plan(entry: &ScheduledTaskDef, tasks: &Arc<TaskTable>) -> Result<Planned, String> {
    let task = tasks
        .get_by_name(&entry.name)
        .ok_or_else(|| "task not found".to_string())?;
    if task.base.disabled {
        return Err(format!("task is disabled: {}", task.base.reason));
    }
    if !task.is_job() && entry.command.trim().is_empty() {
        return Err("no command given for scheduled plugin".to_string());
    }
    let schedule =
        parse_schedule(&entry.schedule).map_err(|e| format!("invalid schedule: {e}"))?;
    Ok(Planned {
        task,
        schedule,
        entry: entry.clone(),
        tasks: tasks.clone(),
    })
}

async fn fire_loop(engine: Engine, planned: Planned) {
    loop {
        let Some(next) = engine.zone().next_fire(&planned.schedule) else {
            tracing::warn!(task = %planned.entry.name, "schedule has no upcoming times");
            return;
        };
        let wait = (next - Utc::now()).to_std().unwrap_or_default();
        tokio::time::sleep(wait).await;
        tracing::debug!(task = %planned.entry.name, "running scheduled task");
        engine.spawn_pipeline(scheduled_request(&planned));
    }
}

/// Scheduled runs act as the task's configured user and channel, skip
/// security checks and resolve tasks against the table the schedule was
/// built from.
fn scheduled_request(planned: &Planned) -> PipelineRequest {
    let Planned { task, entry, .. } = planned;
    let (spec, environment) = if task.is_job() {
        let env: HashMap<String, String> = entry
            .parameters
            .iter()
            .map(|p| (p.name.clone(), p.value.clone()))
            .collect();
        (TaskSpec::new(task.clone(), RUN_COMMAND, Vec::new()), env)
    } else {
        (
            TaskSpec::new(task.clone(), entry.command.clone(), entry.arguments.clone()),
            HashMap::new(),
        )
    };
    PipelineRequest {
        start: spec,
        params: RunParams {
            user: task.base.user.clone(),
            channel: task.base.channel.clone(),
            protocol: String::new(),
            raw_message: String::new(),
            trigger: TriggerKind::Scheduled,
            interactive: false,
            bypass_security: true,
            environment,
        },
        tasks: Some(planned.tasks.clone()),
    }
}
