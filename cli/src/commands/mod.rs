pub mod check;
pub mod cli;
pub mod job;
pub mod serve;

use std::path::Path;

use opsbot_core::api::{load_default, load_from_path, CliError, EngineConfig};

/// Loads `--config`, or the default search path when it is absent.
pub fn load_config(path: Option<&str>) -> Result<EngineConfig, CliError> {
    match path {
        Some(path) => load_from_path(Path::new(path)),
        None => load_default(),
    }
    .map_err(|e| CliError::Config(e.to_string()))
}

/// `$USER`, or "operator" when unset.
pub fn default_user(user: Option<String>) -> String {
    user.filter(|u| !u.trim().is_empty())
        .or_else(|| std::env::var("USER").ok().filter(|u| !u.trim().is_empty()))
        .unwrap_or_else(|| "operator".to_string())
}
