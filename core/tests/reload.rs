mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::{bot, handler, request, Script};
use opsbot_core::api::{
    EngineConfig, EngineError, HandlerRegistry, JobDef, PluginDef, RetVal, ScheduledTaskDef,
    TaskCommonDef, TaskOutcome,
};
use pretty_assertions::assert_eq;
use tokio::sync::Notify;

fn job(name: &str) -> JobDef {
    JobDef {
        common: TaskCommonDef {
            path: format!("{name}.sh"),
            ..TaskCommonDef::named(name)
        },
        ..JobDef::default()
    }
}

fn hourly(name: &str) -> ScheduledTaskDef {
    ScheduledTaskDef {
        schedule: "@hourly".into(),
        name: name.into(),
        command: String::new(),
        arguments: vec![],
        parameters: vec![],
    }
}

fn config(job_name: &str, admin: &str) -> EngineConfig {
    let mut cfg = EngineConfig::default();
    cfg.plugins.push(PluginDef {
        common: TaskCommonDef::named("holder"),
        ..PluginDef::default()
    });
    cfg.jobs.push(job(job_name));
    cfg.scheduled_tasks.push(hourly(job_name));
    cfg.admin_users = vec![admin.to_string()];
    cfg
}

#[tokio::test]
async fn reload_replaces_configuration_but_not_live_runs() {
    let started = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let added = Arc::new(Mutex::new(None));
    let handlers = HandlerRegistry::new();
    {
        let (started, release, added) = (started.clone(), release.clone(), added.clone());
        handlers
            .register(
                "holder",
                handler(move |robot, _c, _a| {
                    let (started, release, added) =
                        (started.clone(), release.clone(), added.clone());
                    async move {
                        started.notify_one();
                        release.notified().await;
                        *added.lock().unwrap() = Some(robot.add_task("old-job", &[]));
                        TaskOutcome::Normal
                    }
                }),
            )
            .unwrap();
    }
    let bot = bot(config("old-job", "root"), handlers, &["old-job.sh", "new-job.sh"]);
    bot.runner.script("old-job.sh", Script::exit(0));
    let first = bot.engine.start_scheduler().await;
    assert_eq!(first.scheduled, vec!["old-job".to_string()]);

    let run = bot.engine.spawn_pipeline(request(&bot, "holder", "go", &[]));
    started.notified().await;

    let mut next = config("new-job", "bob");
    next.scheduled_tasks.push(hourly("old-job"));
    next.timezone = Some("UTC".into());
    next.reply.timeout_ms = 1234;
    next.paths.install_dir = bot.dir.path().display().to_string();
    let report = bot.engine.reload(next).await.unwrap();

    assert_eq!(report.scheduled, vec!["new-job".to_string()]);
    assert_eq!(
        report.skipped,
        vec![("old-job".to_string(), "task not found".to_string())]
    );
    assert!(matches!(
        bot.engine.tasks().resolve_by_name("old-job"),
        Err(EngineError::TaskNotFound(_))
    ));
    assert!(bot.engine.is_admin("bob"));
    assert!(!bot.engine.is_admin("root"));
    assert_eq!(bot.engine.config().admin_users, vec!["bob".to_string()]);
    assert_eq!(bot.engine.zone().name(), "UTC");
    assert_eq!(bot.engine.replies().timeout(), Duration::from_millis(1234));

    release.notify_one();
    let out = tokio::time::timeout(Duration::from_secs(5), run)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(out.outcome, TaskOutcome::Normal);
    assert_eq!(*added.lock().unwrap(), Some(RetVal::Ok));
    assert!(bot
        .runner
        .started()
        .iter()
        .any(|s| s.program.ends_with("old-job.sh")));

    let restarted = bot.engine.start_scheduler().await;
    bot.engine.stop_scheduler().await;
    assert_eq!(restarted.scheduled, vec!["new-job".to_string()]);
}

#[tokio::test]
async fn failed_reload_keeps_the_running_configuration() {
    let mut cfg = config("old-job", "root");
    cfg.reply.timeout_ms = 500;
    let bot = bot(cfg, HandlerRegistry::new(), &["old-job.sh"]);

    let mut broken = config("new-job", "bob");
    broken.timezone = Some("Mars/Olympus".into());
    broken.reply.timeout_ms = 9;
    let err = bot.engine.reload(broken).await.unwrap_err();

    assert!(matches!(err, EngineError::Timezone(_)));
    assert!(bot.engine.tasks().resolve_by_name("old-job").is_ok());
    assert!(bot.engine.is_admin("root"));
    assert_eq!(bot.engine.zone().name(), "local");
    assert_eq!(bot.engine.replies().timeout(), Duration::from_millis(500));
}
