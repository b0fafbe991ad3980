use std::path::{Path, PathBuf};

use super::types::EngineConfig;

/// Get the default opsbot data directory: ~/.opsbot
pub fn get_opsbot_data_dir() -> anyhow::Result<PathBuf> {
    let home = dirs::home_dir().ok_or_else(|| anyhow::anyhow!("Cannot determine home directory"))?;
    Ok(home.join(".opsbot"))
}

pub fn load_from_path(path: &Path) -> anyhow::Result<EngineConfig> {
    let s = std::fs::read_to_string(path)?;
    let mut cfg = toml::from_str::<EngineConfig>(&s)?;
    apply_env_overrides(&mut cfg);
    expand_paths(&mut cfg);
    Ok(cfg)
}

pub fn load_default() -> anyhow::Result<EngineConfig> {
    // Priority 1: $OPSBOT_CONFIG
    if let Ok(v) = std::env::var("OPSBOT_CONFIG") {
        if !v.trim().is_empty() {
            return load_from_path(Path::new(v.trim()));
        }
    }

    // Priority 2: ~/.opsbot/config.toml
    let data_dir = get_opsbot_data_dir()?;
    let home_config = data_dir.join("config.toml");

    // Priority 3: ./config.toml (current directory)
    let local_config = Path::new("config.toml");

    let mut cfg: EngineConfig = if home_config.exists() {
        let s = std::fs::read_to_string(&home_config)?;
        toml::from_str::<EngineConfig>(&s)?
    } else if local_config.exists() {
        let s = std::fs::read_to_string(local_config)?;
        toml::from_str::<EngineConfig>(&s)?
    } else {
        EngineConfig::default()
    };

    if cfg
        .paths
        .history_dir
        .as_deref()
        .map(|s| s.trim().is_empty())
        .unwrap_or(true)
    {
        cfg.paths.history_dir = Some(data_dir.join("history").to_string_lossy().to_string());
    }

    apply_env_overrides(&mut cfg);
    expand_paths(&mut cfg);
    Ok(cfg)
}

/// Environment variable overrides (highest priority).
fn apply_env_overrides(cfg: &mut EngineConfig) {
    if let Ok(v) = std::env::var("OPSBOT_INSTALLDIR") {
        if !v.trim().is_empty() {
            cfg.paths.install_dir = v;
        }
    }
    if let Ok(v) = std::env::var("OPSBOT_CONFIGDIR") {
        if !v.trim().is_empty() {
            cfg.paths.config_dir = Some(v);
        }
    }
    if let Ok(v) = std::env::var("OPSBOT_TIMEZONE") {
        if !v.trim().is_empty() {
            cfg.timezone = Some(v);
        }
    }
    if let Ok(v) = std::env::var("OPSBOT_LOG_LEVEL") {
        if !v.trim().is_empty() {
            cfg.logging.level = v;
        }
    }
}

fn expand_paths(cfg: &mut EngineConfig) {
    cfg.paths.install_dir = expand(&cfg.paths.install_dir);
    cfg.paths.config_dir = cfg.paths.config_dir.as_deref().map(expand);
    cfg.paths.history_dir = cfg.paths.history_dir.as_deref().map(expand);
    cfg.logging.directory = cfg.logging.directory.as_deref().map(expand);
}

fn expand(p: &str) -> String {
    shellexpand::tilde(p).into_owned()
}
