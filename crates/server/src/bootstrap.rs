use std::sync::Arc;

use sitespend_core::clock::{Clock, SystemClock};
use sitespend_core::config::{AppConfig, ConfigError, LoadOptions};
use sitespend_core::workflow::WorkflowService;
use sitespend_db::{connect_with_settings, migrations, DbPool, SqlWorkflowStore};
use thiserror::Error;
use tracing::info;

use crate::api::AppService;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub service: Arc<AppService>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config, Arc::new(SystemClock)).await
}

/// Connects, migrates and wires the workflow service. The store handle is built once here.
pub async fn bootstrap_with_config(
    config: AppConfig,
    clock: Arc<dyn Clock>,
) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

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

    let service = Arc::new(WorkflowService::new(
        SqlWorkflowStore::new(db_pool.clone()),
        clock,
        config.reporting.timezone,
    ));
    info!(
        event_name = "system.bootstrap.service_ready",
        correlation_id = "bootstrap",
        timezone = %config.reporting.timezone,
        "workflow service ready"
    );

    Ok(Application { config, db_pool, service })
}
