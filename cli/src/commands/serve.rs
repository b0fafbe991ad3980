use tokio::io::{AsyncBufReadExt, BufReader};

use opsbot_core::api::{BotInfo, CliError, Engine, Handled, IncomingMessage, ScheduleReport};

use super::cli::ServeArgs;
use super::{default_user, load_config};

/// One stdin line, after terminal control commands are taken out.
#[derive(Debug, PartialEq, Eq)]
enum Line {
    Quit,
    /// Re-read the configuration file.
    Reload,
    SwitchUser(String),
    /// Empty channel switches to direct messages.
    SwitchChannel(String),
    Message { text: String, addressed: bool },
    Blank,
}

fn parse_line(raw: &str, bot: &BotInfo) -> Line {
    let line = raw.trim();
    if line.is_empty() {
        return Line::Blank;
    }
    if line == "|q" || line.eq_ignore_ascii_case("quit") {
        return Line::Quit;
    }
    if line == "|r" {
        return Line::Reload;
    }
    if let Some(user) = line.strip_prefix("|u") {
        return Line::SwitchUser(user.trim().to_string());
    }
    if let Some(channel) = line.strip_prefix("|c") {
        return Line::SwitchChannel(channel.trim().to_string());
    }
    match strip_address(line, bot) {
        Some(text) => Line::Message {
            text: text.to_string(),
            addressed: true,
        },
        None => Line::Message {
            text: line.to_string(),
            addressed: false,
        },
    }
}

/// Removes a leading alias, or the bot name followed by `,` `:` or a space.
fn strip_address<'a>(line: &'a str, bot: &BotInfo) -> Option<&'a str> {
    if !bot.alias.is_empty() {
        if let Some(rest) = line.strip_prefix(bot.alias.as_str()) {
            return Some(rest.trim_start());
        }
    }
    let name = bot.name.as_str();
    if name.is_empty() {
        return None;
    }
    let head = line.get(..name.len())?;
    if !head.eq_ignore_ascii_case(name) {
        return None;
    }
    let rest = &line[name.len()..];
    let rest = rest.strip_prefix([',', ':']).unwrap_or(rest);
    if rest.starts_with(char::is_whitespace) {
        Some(rest.trim_start())
    } else {
        None
    }
}

async fn reload(engine: &Engine, config: Option<&str>) -> Result<ScheduleReport, CliError> {
    let cfg = load_config(config)?;
    Ok(engine.reload(cfg).await?)
}

pub async fn run(engine: &Engine, args: ServeArgs, config: Option<&str>) -> Result<i32, CliError> {
    let mut user = default_user(args.user);
    let mut channel = args.channel;
    let mut bot = engine.config().bot.clone();

    if !args.no_init {
        for (name, outcome) in engine.init_plugins().await {
            if !outcome.is_normal() {
                tracing::warn!(task = %name, outcome = %outcome, "plugin init failed");
            }
        }
    }
    let report = engine.start_scheduler().await;
    tracing::info!(
        scheduled = report.scheduled.len(),
        skipped = report.skipped.len(),
        "scheduler started"
    );
    eprintln!(
        "opsbot terminal: |u<user> switches user, |c<channel> switches channel (|c alone for DM), |r reloads the configuration, |q quits"
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let next = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(raw) = next else { break };
        match parse_line(&raw, &bot) {
            Line::Quit => break,
            Line::Blank => {}
            Line::Reload => match reload(engine, config).await {
                Ok(report) => {
                    bot = engine.config().bot.clone();
                    eprintln!(
                        "(configuration reloaded: {} scheduled, {} skipped)",
                        report.scheduled.len(),
                        report.skipped.len()
                    );
                }
                Err(e) => eprintln!("(reload failed: {e})"),
            },
            Line::SwitchUser(u) if !u.is_empty() => {
                eprintln!("(now acting as {u})");
                user = u;
            }
            Line::SwitchUser(_) => eprintln!("(usage: |u<user>)"),
            Line::SwitchChannel(c) => {
                if c.is_empty() {
                    eprintln!("(now in a direct message)");
                } else {
                    eprintln!("(now in #{c})");
                }
                channel = c;
            }
            Line::Message { text, addressed } => {
                let msg = IncomingMessage {
                    user: user.clone(),
                    addressed: addressed || channel.is_empty(),
                    channel: channel.clone(),
                    text,
                    raw: raw.clone(),
                };
                let dispatch = engine.handle_message(msg).await;
                if dispatch.handled == Handled::Nothing {
                    tracing::debug!(user = %user, "message matched nothing");
                }
                // Runs continue on their own; prompts read later lines.
                drop(dispatch.runs);
            }
        }
    }

    engine.stop_scheduler().await;
    let live = engine.runs().len();
    if live > 0 {
        tracing::info!(live, "exiting with runs still in flight");
    }
    Ok(0)
}
