use std::collections::HashMap;

use opsbot_core::api::{CliError, Engine};

use super::cli::RunJobArgs;
use super::default_user;

/// Runs the job to completion; the outcome's numeric code becomes the exit code.
pub async fn run(engine: &Engine, args: RunJobArgs) -> Result<i32, CliError> {
    let params = parse_params(&args.params)?;
    let user = default_user(args.user);
    let out = engine
        .run_job(&args.name, &user, &args.channel, params)
        .await?;
    tracing::info!(
        job = %args.name,
        run_id = %out.run_id,
        run_index = out.run_index,
        outcome = %out.outcome,
        "job finished"
    );
    Ok(out.outcome.as_code())
}

fn parse_params(raw: &[String]) -> Result<HashMap<String, String>, CliError> {
    raw.iter()
        .map(|p| match p.split_once('=') {
            Some((k, v)) if !k.trim().is_empty() => Ok((k.trim().to_string(), v.to_string())),
            _ => Err(CliError::Command(format!(
                "invalid --param '{p}', expected NAME=VALUE"
            ))),
        })
        .collect()
}
