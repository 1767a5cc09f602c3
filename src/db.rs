use crate::config::{DatabaseConfig, RecordBackend};
use crate::database::memory::MemoryRecordStore;
use crate::database::postgres_repository::PostgresRepository;
use crate::database::record_store::RecordStore;
use crate::error::app_error::AppError;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;

async fn init_pool(db_config: &DatabaseConfig) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(db_config.max_connections)
        .min_connections(db_config.min_connections)
        .acquire_timeout(Duration::from_secs(db_config.acquire_timeout))
        .idle_timeout(Duration::from_secs(30))
        .max_lifetime(Duration::from_secs(1800))
        .connect(&db_config.url)
        .await
}

/// Builds the configured record store, running migrations for Postgres.
pub async fn connect_record_store(db_config: &DatabaseConfig) -> Result<Arc<dyn RecordStore>, AppError> {
    match db_config.backend {
        RecordBackend::Memory => {
            tracing::info!("Using in-memory record store");
            Ok(Arc::new(MemoryRecordStore::new()))
        }
        RecordBackend::Postgres => {
            let pool = init_pool(db_config).await.map_err(|e| AppError::db("Failed to initialize database pool", e))?;
            if db_config.run_migrations {
                sqlx::migrate!("./migrations")
                    .run(&pool)
                    .await
                    .map_err(|e| AppError::db("Failed to run migrations", e.into()))?;
            }
            tracing::info!("Database pool initialized successfully");
            Ok(Arc::new(PostgresRepository { pool }))
        }
    }
}
