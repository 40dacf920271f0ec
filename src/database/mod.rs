//! Database connection management.
//!
//! Structured the way the teacher's `database/mod.rs` structures
//! `DatabaseManager`: a thin wrapper around a `PgPool` with a typed config
//! and a `run_migrations` entrypoint. Unlike the teacher's stub (which only
//! probes `information_schema.tables` and leaves a `// Note: in a real
//! implementation...` comment), migrations here are real —
//! `sqlx::migrate!` embeds `migrations/` at compile time and applies them,
//! the same mechanism golem's `cloud-servers-oss/src/db.rs` uses for sqlite.

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;
use tracing::{info, warn};

pub mod file_locks_repository;
pub mod learnings_repository;
pub mod metrics_repository;
pub mod reviews_repository;
pub mod work_items_repository;
pub mod workers_repository;

pub use file_locks_repository::FileLocksRepository;
pub use learnings_repository::LearningsRepository;
pub use metrics_repository::MetricsRepository;
pub use reviews_repository::ReviewsRepository;
pub use work_items_repository::WorkItemsRepository;
pub use workers_repository::WorkersRepository;

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub connection_timeout: Duration,
}

pub struct DatabaseManager {
    pool: PgPool,
}

impl DatabaseManager {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, sqlx::Error> {
        info!("connecting to database: {}", mask_database_url(&config.database_url));

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.connection_timeout)
            .connect(&config.database_url)
            .await
            .map_err(|e| {
                warn!("failed to connect to database: {}", e);
                e
            })?;

        info!("database connection pool created");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        info!("running database migrations");
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("database migrations complete");
        Ok(())
    }
}

fn mask_database_url(url: &str) -> String {
    match url::Url::parse(url) {
        Ok(mut parsed) => {
            if parsed.password().is_some() {
                let _ = parsed.set_password(Some("***"));
            }
            parsed.to_string()
        }
        Err(_) => "***".to_string(),
    }
}
