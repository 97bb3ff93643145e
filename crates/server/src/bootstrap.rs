use std::sync::Arc;
use std::time::Duration;

use pitchsim_agent::runtime::BuyerRuntime;
use pitchsim_core::config::{AppConfig, ConfigError};
use pitchsim_core::errors::ApplicationError;
use thiserror::Error;
use tracing::info;

use crate::sessions::{InMemorySessionStore, SessionStore};

pub struct Application {
    pub config: AppConfig,
    pub runtime: Arc<BuyerRuntime>,
    pub sessions: Arc<dyn SessionStore>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("engine wiring failed ({class}): {0}", class = .0.error_class())]
    Application(#[from] ApplicationError),
}

pub fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let runtime = BuyerRuntime::from_config(&config)?;
    info!(
        event_name = "system.bootstrap.engine_ready",
        correlation_id = "bootstrap",
        generator = runtime.generator_name(),
        topic_rules = runtime.rules().topic_rules().len(),
        "buyer engine wired"
    );

    let sessions: Arc<dyn SessionStore> =
        Arc::new(InMemorySessionStore::new(Duration::from_secs(config.session.ttl_secs)));

    Ok(Application { config, runtime: Arc::new(runtime), sessions })
}
