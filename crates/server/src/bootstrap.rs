use std::sync::Arc;

use slashbot_core::config::AppConfig;
use slashbot_slack::{
    api::{ApiError, SlackApiClient},
    GreetingCommandService, SlashCommandService,
};
use thiserror::Error;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub api: SlackApiClient,
    pub service: Arc<dyn SlashCommandService>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Api(#[from] ApiError),
}

pub fn bootstrap(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        transport = config.transport.as_str(),
        "starting application bootstrap"
    );

    let api = SlackApiClient::from_config(&config.slack)?;

    Ok(Application { config, api, service: Arc::new(GreetingCommandService) })
}
