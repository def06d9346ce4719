mod bootstrap;
mod health;
mod shutdown;
mod socket;
mod webhook;

use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use clap::Parser;
use slashbot_core::config::{AppConfig, LoadOptions, LoggingConfig, TransportMode};
use slashbot_slack::websocket::WebSocketTransport;
use tokio::{net::TcpListener, sync::oneshot};

use crate::{bootstrap::Application, webhook::WebhookState};

#[derive(Debug, Parser)]
#[command(name = "slashbot-server", about = "Slack slash command bot", version)]
struct Args {
    #[arg(long, default_value = "socket", help = "Slack transport: socket or webhook")]
    transport: TransportMode,
    #[arg(long, help = "Path to a slashbot.toml config file")]
    config: Option<PathBuf>,
}

fn init_logging(config: &LoggingConfig) {
    use slashbot_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.effective_level().parse::<Level>().unwrap_or(Level::INFO);

    match config.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

/// Loads the configuration. A failure is logged through a default compact subscriber, since the
/// configured one cannot be built yet.
fn load_config(options: LoadOptions) -> Result<AppConfig> {
    match AppConfig::load(options) {
        Ok(config) => Ok(config),
        Err(error) => {
            let _ = tracing_subscriber::fmt().with_target(false).compact().try_init();
            tracing::error!(
                event_name = "system.config.invalid",
                correlation_id = "bootstrap",
                error = %error,
                "failed to load configuration"
            );
            Err(error).context("failed to load configuration")
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run(Args::parse()).await
}

async fn run(args: Args) -> Result<()> {
    let require_file = args.config.is_some();
    let config = load_config(LoadOptions {
        config_path: args.config,
        require_file,
        transport: args.transport,
        ..LoadOptions::default()
    })?;
    init_logging(&config.logging);

    let app = bootstrap::bootstrap(config)?;
    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        transport = app.config.transport.as_str(),
        "slashbot-server started"
    );

    match app.config.transport {
        TransportMode::Webhook => run_webhook(app).await?,
        TransportMode::Socket => run_socket(app).await?,
    }

    tracing::info!(
        event_name = "system.server.stopped",
        correlation_id = "shutdown",
        "slashbot-server stopped"
    );
    Ok(())
}

async fn run_webhook(app: Application) -> Result<()> {
    let address = app.config.server.listen_address();
    let grace = Duration::from_secs(app.config.server.graceful_shutdown_secs);
    let listener =
        TcpListener::bind(&address).await.with_context(|| format!("failed to bind {address}"))?;

    let router = webhook::router(WebhookState::new(
        app.config.slack.signing_secret.clone(),
        app.service.clone(),
    ))
    .merge(health::router(TransportMode::Webhook));

    tracing::info!(
        event_name = "system.webhook.listening",
        bind_address = %address,
        path = webhook::EVENTS_PATH,
        "webhook server listening"
    );
    shutdown::serve_until(listener, router, shutdown::wait_for_shutdown(), grace).await?;
    Ok(())
}

async fn run_socket(app: Application) -> Result<()> {
    let address = app.config.server.listen_address();
    let grace = Duration::from_secs(app.config.server.graceful_shutdown_secs);
    let listener =
        TcpListener::bind(&address).await.with_context(|| format!("failed to bind {address}"))?;

    let (health_stop, health_stopped) = oneshot::channel::<()>();
    let health_task = tokio::spawn(shutdown::serve_until(
        listener,
        health::router(TransportMode::Socket),
        async move {
            let _ = health_stopped.await;
        },
        grace,
    ));
    tracing::info!(
        event_name = "system.health.start",
        bind_address = %address,
        "health endpoint started"
    );

    let transport = Arc::new(WebSocketTransport::new(
        app.api.clone(),
        app.config.slack.app_token.clone(),
    ));
    let runner = socket::build_runner(transport, app.service.clone());
    let outcome = socket::run_socket_mode(&runner, shutdown::wait_for_shutdown(), grace).await;

    let _ = health_stop.send(());
    if let Err(error) = health_task.await.context("health endpoint task failed")? {
        tracing::warn!(error = %error, "health endpoint stopped with an error");
    }

    outcome.context("socket mode connection failed")
}
