use std::path::PathBuf;
use std::sync::Arc;

use opsbot_core::api::{
    get_opsbot_data_dir, Connector, EngineConfig, HistoryProvider, ProcessRunner, Store,
};

use crate::connector::TerminalConnector;
use crate::history::FileHistoryProvider;
use crate::runner::LocalProcessRunner;
use crate::store::MemoryStore;

pub fn build_runner(_cfg: &EngineConfig) -> Arc<dyn ProcessRunner> {
    Arc::new(LocalProcessRunner::new())
}

pub fn build_store(_cfg: &EngineConfig) -> Arc<dyn Store> {
    Arc::new(MemoryStore::new())
}

/// History lives under `paths.history_dir`, or `~/.opsbot/history`.
pub fn build_history(cfg: &EngineConfig) -> Option<Arc<dyn HistoryProvider>> {
    let root = match cfg.paths.history_dir.as_deref().map(str::trim) {
        Some(dir) if !dir.is_empty() => PathBuf::from(shellexpand::tilde(dir).as_ref()),
        _ => get_opsbot_data_dir().ok()?.join("history"),
    };
    Some(Arc::new(FileHistoryProvider::new(root)))
}

pub fn build_connector(cfg: &EngineConfig) -> Arc<dyn Connector> {
    Arc::new(TerminalConnector::stdout(cfg.protocol.clone(), &cfg.users))
}
