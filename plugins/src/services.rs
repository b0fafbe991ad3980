//! ServicesFactory built from configuration, shared by the CLI and tests.
use async_trait::async_trait;
use opsbot_core::api::{EngineConfig, EngineError, Services, ServicesFactory};

use crate::factory;

#[derive(Default)]
pub struct PluginServicesFactory;

#[async_trait]
impl ServicesFactory for PluginServicesFactory {
    async fn build_services(&self, cfg: &EngineConfig) -> Result<Services, EngineError> {
        Ok(Services {
            connector: factory::build_connector(cfg),
            store: factory::build_store(cfg),
            history: factory::build_history(cfg),
            runner: factory::build_runner(cfg),
        })
    }
}
