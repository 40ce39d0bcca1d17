use std::time::Duration;

use anyhow::Result;
use despesas_core::config::{AppConfig, LoadOptions};
use despesas_server::bootstrap;
use tokio::sync::watch;
use tracing::{error, info, warn};

fn init_logging(config: &AppConfig) {
    use despesas_core::config::LogFormat::*;
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

async fn run() -> Result<()> {
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;

    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;

    let (stop_worker, mut worker_stopped) = watch::channel(false);
    let dispatcher = app.dispatcher.clone();
    let worker = tokio::spawn(async move {
        dispatcher
            .run(async move {
                let _ = worker_stopped.changed().await;
            })
            .await;
    });

    info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        bind_address = %address,
        "despesas-server listening"
    );
    axum::serve(listener, app.router()).with_graceful_shutdown(wait_for_shutdown()).await?;
    info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        "despesas-server stopping"
    );

    let _ = stop_worker.send(true);
    let grace = Duration::from_secs(app.config.server.graceful_shutdown_secs);
    if tokio::time::timeout(grace, worker).await.is_err() {
        warn!(
            event_name = "system.server.worker_timeout",
            correlation_id = "shutdown",
            grace_secs = app.config.server.graceful_shutdown_secs,
            "outbox worker did not stop in time"
        );
    }
    app.db_pool.close().await;

    Ok(())
}

async fn wait_for_shutdown() {
    if let Err(signal_error) = tokio::signal::ctrl_c().await {
        error!(
            event_name = "system.server.signal_error",
            correlation_id = "shutdown",
            error = %signal_error,
            "could not listen for ctrl-c"
        );
    }
}
