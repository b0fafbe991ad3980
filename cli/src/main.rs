use std::sync::Arc;

use clap::Parser;
mod commands;
use commands::cli;
use opsbot_core::api::{
    CliError, Engine, EngineConfig, EngineError, HandlerRegistry, LoggingConfig,
};
use opsbot_plugins::builtins::register_builtins;
use opsbot_plugins::services::PluginServicesFactory;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

static LOG_GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
    std::sync::OnceLock::new();

#[tokio::main]
async fn main() {
    let exit = match real_main().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{e}");
            exit_code_for_error(&e)
        }
    };

    std::process::exit(exit);
}

async fn real_main() -> Result<i32, CliError> {
    let mut args = cli::Args::parse();
    let cfg = commands::load_config(args.config.as_deref())?;
    init_tracing(&cfg.logging).map_err(CliError::Command)?;

    let engine = build_engine(cfg).await?;
    let mut events = engine.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            tracing::trace!(run_id = %event.run_id(), event = ?event, "run event");
        }
    });

    match args.command.take() {
        Some(cli::Commands::RunJob(job_args)) => commands::job::run(&engine, job_args).await,
        Some(cli::Commands::Check) => commands::check::run(&engine).await,
        Some(cli::Commands::Serve(serve_args)) => {
            commands::serve::run(&engine, serve_args, args.config.as_deref()).await
        }
        None => {
            commands::serve::run(
                &engine,
                cli::ServeArgs {
                    user: None,
                    channel: "general".to_string(),
                    no_init: false,
                },
                args.config.as_deref(),
            )
            .await
        }
    }
}

async fn build_engine(cfg: EngineConfig) -> Result<Engine, CliError> {
    let handlers = Arc::new(HandlerRegistry::new());
    register_builtins(&handlers)?;
    let engine = Engine::from_factory(cfg, handlers, &PluginServicesFactory).await?;
    Ok(engine)
}

fn exit_code_for_error(e: &CliError) -> i32 {
    // 0: success
    // 11: config error
    // 12: unknown task or bad job invocation
    // 20: process start / IO error
    // 50: internal/uncategorized
    match e {
        CliError::Config(_) => 11,
        CliError::Engine(ee) => match ee {
            EngineError::Config(_)
            | EngineError::InvalidTaskName(_)
            | EngineError::DuplicateTask(_)
            | EngineError::Registration { .. }
            | EngineError::Timezone(_)
            | EngineError::Schedule { .. } => 11,
            EngineError::TaskNotFound(_)
            | EngineError::TaskDisabled(..)
            | EngineError::MissingParameter { .. }
            | EngineError::RunNotFound(_) => 12,
            EngineError::Exec(_) => 20,
            EngineError::Plugin(_) => 50,
        },
        CliError::Io(_) => 20,
        CliError::Command(_) => 20,
        CliError::Anyhow(_) => 50,
    }
}

fn init_tracing(logging: &LoggingConfig) -> Result<(), String> {
    if !logging.enabled {
        return Ok(());
    }

    let filter = match std::env::var("RUST_LOG") {
        Ok(v) if !v.trim().is_empty() => EnvFilter::from_default_env(),
        _ => EnvFilter::try_new(logging.level.clone()).map_err(|e| e.to_string())?,
    };

    let mut maybe_writer = None;

    if logging.file {
        let dir = match logging
            .directory
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            Some(d) => std::path::PathBuf::from(d),
            None => std::env::temp_dir().join("opsbot"),
        };

        std::fs::create_dir_all(&dir).map_err(|e| format!("create log dir failed: {e}"))?;
        let file_name = format!("opsbot.{}.log", std::process::id());
        let appender = tracing_appender::rolling::never(dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);
        let _ = LOG_GUARD.set(guard);
        maybe_writer = Some(non_blocking);
    }

    if !logging.console && maybe_writer.is_none() {
        return Err("logging disabled for both console and file".to_string());
    }

    let console_layer = logging.console.then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(atty::is(atty::Stream::Stderr))
    });

    let file_layer = maybe_writer.map(|w| {
        tracing_subscriber::fmt::layer()
            .with_writer(w)
            .with_ansi(false)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    Ok(())
}
