mod bootstrap;
mod health;
mod sessions;
mod sim;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::Router;
use pitchsim_core::config::{AppConfig, LoadOptions};
use tokio::sync::Notify;
use tower_http::trace::TraceLayer;

use crate::bootstrap::Application;
use crate::sim::SimState;

fn init_logging(config: &AppConfig) {
    use pitchsim_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
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

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config)?;
    let sweeper = sessions::spawn_sweeper(
        app.sessions.clone(),
        Duration::from_secs(app.config.session.sweep_interval_secs),
    );

    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;
    let grace = Duration::from_secs(app.config.server.graceful_shutdown_secs);

    let shutdown = Arc::new(Notify::new());
    let server = {
        let shutdown = shutdown.clone();
        let router = router(&app);
        tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move { shutdown.notified().await })
                .await
        })
    };

    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        bind_address = %address,
        generator = app.runtime.generator_name(),
        "pitchsim-server started"
    );
    wait_for_shutdown().await?;
    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        grace_secs = grace.as_secs(),
        "pitchsim-server stopping"
    );

    shutdown.notify_one();
    sweeper.abort();
    match tokio::time::timeout(grace, server).await {
        Ok(joined) => joined??,
        Err(_) => tracing::warn!(
            event_name = "system.server.drain_timeout",
            correlation_id = "shutdown",
            "in-flight requests did not finish within the grace period"
        ),
    }

    Ok(())
}

fn router(app: &Application) -> Router {
    sim::router(SimState { runtime: app.runtime.clone(), sessions: app.sessions.clone() })
        .merge(health::router(app.runtime.clone(), app.sessions.clone()))
        .layer(TraceLayer::new_for_http())
}

async fn wait_for_shutdown() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}
