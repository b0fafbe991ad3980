use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::sync::broadcast;

use crate::config::EngineConfig;
use crate::connector::Connector;
use crate::error::EngineError;
use crate::exec::ProcessRunner;
use crate::handler::HandlerRegistry;
use crate::history::HistoryProvider;
use crate::registry::{TaskRegistry, TaskTable};
use crate::reply::ReplyTable;
use crate::run::{RunEvent, RunRegistry};
use crate::scheduler::{ScheduleReport, ScheduleZone, Scheduler};
use crate::store::Store;

/// External collaborators the engine calls into.
#[derive(Clone)]
pub struct Services {
    pub connector: Arc<dyn Connector>,
    pub store: Arc<dyn Store>,
    pub history: Option<Arc<dyn HistoryProvider>>,
    pub runner: Arc<dyn ProcessRunner>,
}

#[async_trait::async_trait]
pub trait ServicesFactory: Send + Sync {
    async fn build_services(&self, cfg: &EngineConfig) -> Result<Services, EngineError>;
}

pub(crate) struct EngineInner {
    pub(crate) cfg: RwLock<Arc<EngineConfig>>,
    pub(crate) zone: RwLock<ScheduleZone>,
    pub(crate) tasks: TaskRegistry,
    pub(crate) runs: Arc<RunRegistry>,
    pub(crate) replies: ReplyTable,
    pub(crate) handlers: Arc<HandlerRegistry>,
    pub(crate) scheduler: Scheduler,
    pub(crate) services: Services,
    pub(crate) events: broadcast::Sender<RunEvent>,
}

/// Cheap to clone; every clone shares the same registries.
#[derive(Clone)]
pub struct Engine {
    pub(crate) inner: Arc<EngineInner>,
}

impl Engine {
    /// Seals `handlers`, validates the timezone and loads the task table.
    pub fn build(
        cfg: EngineConfig,
        handlers: Arc<HandlerRegistry>,
        services: Services,
    ) -> Result<Self, EngineError> {
        handlers.seal();
        let zone = ScheduleZone::parse(cfg.timezone.as_deref())?;
        let tasks = TaskRegistry::new();
        tasks.load(&cfg.plugins, &cfg.jobs, &handlers)?;
        let replies = ReplyTable::new(
            Duration::from_millis(cfg.reply.timeout_ms),
            cfg.reply.max_prompt_retries,
        );
        let (events, _) = broadcast::channel(256);

        tracing::info!(
            protocol = %cfg.protocol,
            timezone = %zone.name(),
            "engine ready"
        );
        Ok(Self {
            inner: Arc::new(EngineInner {
                cfg: RwLock::new(Arc::new(cfg)),
                zone: RwLock::new(zone),
                tasks,
                runs: Arc::new(RunRegistry::new()),
                replies,
                handlers,
                scheduler: Scheduler::new(),
                services,
                events,
            }),
        })
    }

    pub async fn from_factory(
        cfg: EngineConfig,
        handlers: Arc<HandlerRegistry>,
        factory: &dyn ServicesFactory,
    ) -> Result<Self, EngineError> {
        let services = factory.build_services(&cfg).await?;
        Self::build(cfg, handlers, services)
    }

    /// The configuration currently in force; a reload swaps it wholesale.
    pub fn config(&self) -> Arc<EngineConfig> {
        self.inner
            .cfg
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn zone(&self) -> ScheduleZone {
        *self.inner.zone.read().unwrap_or_else(|e| e.into_inner())
    }

    pub fn tasks(&self) -> &TaskRegistry {
        &self.inner.tasks
    }

    pub fn runs(&self) -> &Arc<RunRegistry> {
        &self.inner.runs
    }

    pub fn replies(&self) -> &ReplyTable {
        &self.inner.replies
    }

    pub fn services(&self) -> &Services {
        &self.inner.services
    }

    pub fn connector(&self) -> &dyn Connector {
        self.inner.services.connector.as_ref()
    }

    pub fn store(&self) -> &dyn Store {
        self.inner.services.store.as_ref()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        self.inner.events.subscribe()
    }

    pub(crate) fn emit(&self, event: RunEvent) {
        // No subscribers is fine.
        let _ = self.inner.events.send(event);
    }

    pub fn is_admin(&self, user: &str) -> bool {
        self.config().admin_users.iter().any(|a| a == user)
    }

    /// Schedules the current configuration's `scheduled_tasks`, replacing
    /// any running schedule.
    pub async fn start_scheduler(&self) -> ScheduleReport {
        let cfg = self.config();
        self.inner.scheduler.rebuild(self, &cfg.scheduled_tasks).await
    }

    pub async fn stop_scheduler(&self) {
        self.inner.scheduler.stop().await;
    }

    /// Installs `cfg`: task table, timezone, reply limits and the rest of
    /// the configuration, then rebuilds the schedule against them. Runs
    /// already in flight keep the table they started with. On error nothing
    /// is replaced.
    pub async fn reload(&self, cfg: EngineConfig) -> Result<ScheduleReport, EngineError> {
        let zone = ScheduleZone::parse(cfg.timezone.as_deref())?;
        let table: Arc<TaskTable> =
            self.inner
                .tasks
                .load(&cfg.plugins, &cfg.jobs, &self.inner.handlers)?;
        self.inner.replies.set_limits(
            Duration::from_millis(cfg.reply.timeout_ms),
            cfg.reply.max_prompt_retries,
        );
        *self.inner.zone.write().unwrap_or_else(|e| e.into_inner()) = zone;
        *self.inner.cfg.write().unwrap_or_else(|e| e.into_inner()) = Arc::new(cfg);
        tracing::info!(
            tasks = table.len(),
            timezone = %zone.name(),
            "configuration reloaded"
        );
        Ok(self.start_scheduler().await)
    }
}
