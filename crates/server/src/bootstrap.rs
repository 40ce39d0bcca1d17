use std::sync::Arc;

use axum::Router;
use secrecy::ExposeSecret;
use thiserror::Error;
use tracing::info;

use despesas_core::config::{AppConfig, ConfigError, LoadOptions};
use despesas_core::token::HmacTokenIssuer;
use despesas_db::{connect_with_settings, migrations, DbPool};
use despesas_engine::{DispatchSettings, Engine, OutboxDispatcher};

use crate::{api, health, notifier};

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub engine: Arc<Engine>,
    pub dispatcher: Arc<OutboxDispatcher>,
}

impl Application {
    /// API routes plus `/health`, served from one listener.
    pub fn router(&self) -> Router {
        api::router(self.engine.clone()).merge(health::router(self.db_pool.clone()))
    }
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("notification gateway setup failed: {0}")]
    Gateway(#[source] reqwest::Error),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );
    config.validate()?;

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let issuer = Arc::new(HmacTokenIssuer::new(
        config.token.signing_key.expose_secret().to_string().into(),
    ));
    let engine = Arc::new(Engine::new(
        db_pool.clone(),
        issuer,
        config.notifications.link_base_url.clone(),
    ));

    let gateway =
        notifier::gateway_from_config(&config.notifications).map_err(BootstrapError::Gateway)?;
    let dispatcher = Arc::new(OutboxDispatcher::new(
        db_pool.clone(),
        gateway,
        DispatchSettings::from(&config.notifications),
    ));
    info!(
        event_name = "system.bootstrap.notifications_ready",
        correlation_id = "bootstrap",
        gateway = if config.notifications.webhook_url.is_some() { "webhook" } else { "log" },
        "notification outbox dispatcher configured"
    );

    Ok(Application { config, db_pool, engine, dispatcher })
}
