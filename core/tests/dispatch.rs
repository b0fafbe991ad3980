mod common;

use std::sync::{Arc, Mutex};

use common::{bot, handler, wait_for_prompt, Script};
use opsbot_core::api::{
    EngineConfig, HandlerRegistry, Handled, IncomingMessage, JobDef, MatcherDef, PluginDef,
    RetVal, TaskCommonDef, TaskOutcome,
};
use pretty_assertions::assert_eq;

fn msg(user: &str, text: &str, addressed: bool) -> IncomingMessage {
    IncomingMessage {
        user: user.into(),
        channel: "general".into(),
        text: text.into(),
        addressed,
        raw: text.into(),
    }
}

type Calls = Arc<Mutex<Vec<(String, Vec<String>)>>>;

fn recording(handlers: &HandlerRegistry, name: &str) -> Calls {
    let calls: Calls = Arc::default();
    let seen = calls.clone();
    handlers
        .register(
            name,
            handler(move |_r, command, args| {
                let seen = seen.clone();
                async move {
                    seen.lock().unwrap().push((command, args));
                    TaskOutcome::Normal
                }
            }),
        )
        .unwrap();
    calls
}

#[tokio::test]
async fn addressed_command_runs_the_matching_plugin() {
    let handlers = HandlerRegistry::new();
    let calls = recording(&handlers, "weather");
    let mut cfg = EngineConfig::default();
    cfg.plugins.push(PluginDef {
        common: TaskCommonDef::named("weather"),
        command_matchers: vec![MatcherDef::command(r"weather (?:in|for) (\w+)", "forecast")],
        ..PluginDef::default()
    });
    let bot = bot(cfg, handlers, &[]);

    let ignored = bot.engine.handle_message(msg("alice", "weather in Paris", false)).await;
    assert_eq!(ignored.handled, Handled::Nothing);

    let d = bot.engine.handle_message(msg("alice", "Weather in Paris", true)).await;
    assert_eq!(d.handled, Handled::Command);
    for run in d.runs {
        assert_eq!(run.await.unwrap().outcome, TaskOutcome::Normal);
    }
    assert_eq!(
        *calls.lock().unwrap(),
        vec![("forecast".to_string(), vec!["Paris".to_string()])]
    );
    assert_eq!(*bot.connector.heard.lock().unwrap(), 1);
}

#[tokio::test]
async fn catch_all_gets_unmatched_addressed_text() {
    let handlers = HandlerRegistry::new();
    let calls = recording(&handlers, "fallback");
    let mut cfg = EngineConfig::default();
    cfg.plugins.push(PluginDef {
        common: TaskCommonDef::named("fallback"),
        catch_all: true,
        ..PluginDef::default()
    });
    let bot = bot(cfg, handlers, &[]);

    let d = bot.engine.handle_message(msg("alice", "do a barrel roll", true)).await;
    assert_eq!(d.handled, Handled::CatchAll);
    for run in d.runs {
        run.await.unwrap();
    }
    assert_eq!(
        *calls.lock().unwrap(),
        vec![("catchall".to_string(), vec!["do a barrel roll".to_string()])]
    );
}

#[tokio::test]
async fn job_trigger_fires_only_for_its_user() {
    let mut cfg = EngineConfig::default();
    cfg.jobs.push(JobDef {
        common: TaskCommonDef {
            path: "release.sh".into(),
            ..TaskCommonDef::named("release")
        },
        triggers: vec![MatcherDef {
            regex: r"build (\S+) finished".into(),
            user: "ci".into(),
            parameters: vec!["BRANCH".into()],
            ..MatcherDef::default()
        }],
        ..JobDef::default()
    });
    let bot = bot(cfg, HandlerRegistry::new(), &["release.sh"]);
    bot.runner.script("release.sh", Script::exit(0));

    let d = bot.engine.handle_message(msg("mallory", "build main finished", false)).await;
    assert_eq!(d.handled, Handled::Nothing);

    let d = bot.engine.handle_message(msg("ci", "build main finished", false)).await;
    assert_eq!(d.handled, Handled::Ambient);
    for run in d.runs {
        assert_eq!(run.await.unwrap().outcome, TaskOutcome::Normal);
    }
    let started = bot.runner.started();
    assert_eq!(started.len(), 1);
    assert_eq!(started[0].args, vec!["run".to_string()]);
    assert_eq!(started[0].envs["BRANCH"], "main");
}

#[tokio::test]
async fn new_command_interrupts_an_outstanding_prompt() {
    let handlers = HandlerRegistry::new();
    let answer = Arc::new(Mutex::new(None));
    let slot = answer.clone();
    handlers
        .register(
            "ask",
            handler(move |robot, _c, _a| {
                let slot = slot.clone();
                async move {
                    let got = robot.prompt_for_reply("SimpleString", "Name?").await;
                    *slot.lock().unwrap() = Some(got);
                    TaskOutcome::Normal
                }
            }),
        )
        .unwrap();
    let calls = recording(&handlers, "ping");
    let mut cfg = EngineConfig::default();
    cfg.plugins.push(PluginDef {
        common: TaskCommonDef::named("ask"),
        ..PluginDef::default()
    });
    cfg.plugins.push(PluginDef {
        common: TaskCommonDef::named("ping"),
        command_matchers: vec![MatcherDef::command("ping", "ping")],
        ..PluginDef::default()
    });
    let bot = bot(cfg, handlers, &[]);

    let req = common::request(&bot, "ask", "go", &[]);
    let run = bot.engine.spawn_pipeline(req);
    wait_for_prompt(&bot.engine, "alice", "general").await;

    let d = bot.engine.handle_message(msg("alice", "ping", true)).await;
    assert_eq!(d.handled, Handled::Command);
    for r in d.runs {
        r.await.unwrap();
    }
    run.await.unwrap();

    assert_eq!(
        answer.lock().unwrap().clone(),
        Some((String::new(), RetVal::Interrupted))
    );
    assert_eq!(calls.lock().unwrap().len(), 1);
}
