use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use petitions_core::audit::{AuditSink, InMemoryAuditSink};
use petitions_core::config::{AppConfig, ConfigError, LoadOptions};
use petitions_db::repositories::SqlRequestRepository;
use petitions_db::{connect_with_settings, migrations, DbPool};

use crate::workflow::RequestWorkflowService;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub workflow: RequestWorkflowService<SqlRequestRepository>,
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

pub fn init_logging(config: &AppConfig) {
    use petitions_core::config::LogFormat::{Compact, Json, Pretty};
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

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting workflow bootstrap"
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

    let repository = Arc::new(SqlRequestRepository::new(db_pool.clone()));
    let audit: Arc<dyn AuditSink> = Arc::new(InMemoryAuditSink::default());
    let workflow = RequestWorkflowService::new(repository, audit);

    Ok(Application { config, db_pool, workflow })
}

#[cfg(test)]
mod tests {
    use petitions_core::config::AppConfig;
    use petitions_core::domain::request::{NewRequest, RequestStatus, RequestType, StudentId};

    use super::bootstrap_with_config;

    #[tokio::test]
    async fn bootstrap_wires_the_workflow_against_a_migrated_database() {
        let mut config = AppConfig::default();
        config.database.url = "sqlite::memory:".to_string();
        config.database.max_connections = 1;

        let app = bootstrap_with_config(config).await.expect("bootstrap");

        let request = app
            .workflow
            .create_request(NewRequest {
                request_type: RequestType::Other,
                student_id: StudentId("s-1".to_string()),
                supervisor_id: None,
                project_id: None,
                reason: "boot smoke".to_string(),
            })
            .await
            .expect("create through the sql repository");

        let fetched = app.workflow.get_request(&request.id).await.expect("fetch back");
        assert_eq!(fetched.status, RequestStatus::Pending);
    }
}
