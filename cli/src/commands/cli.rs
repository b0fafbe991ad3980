use clap::{Args as ClapArgs, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "opsbot", version, about = "Chatops robot with a terminal connector")]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Config file; defaults to $OPSBOT_CONFIG, ~/.opsbot/config.toml, ./config.toml.
    #[arg(long, global = true)]
    pub config: Option<String>,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct ServeArgs {
    /// Terminal identity; defaults to $USER.
    #[arg(long)]
    pub user: Option<String>,

    #[arg(long, default_value = "general")]
    pub channel: String,

    /// Skip the init call to plugins at startup.
    #[arg(long, default_value_t = false)]
    pub no_init: bool,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct RunJobArgs {
    pub name: String,

    #[arg(long)]
    pub user: Option<String>,

    #[arg(long, default_value = "general")]
    pub channel: String,

    /// Job parameter (NAME=VALUE). Can be specified multiple times.
    #[arg(long = "param", action = clap::ArgAction::Append)]
    pub params: Vec<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Read chat lines from stdin (the default).
    Serve(ServeArgs),
    /// Run one job and exit with its outcome code.
    RunJob(RunJobArgs),
    /// Load the configuration and report task and schedule problems.
    Check,
}
