use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;

const MAX_CONNECTIONS: u32 = 10;

/// Postgres pool shared by the HTTP handlers, the scheduler and `run_analysis`.
pub struct Database {
    pub pool: PgPool,
}

impl Database {
    /// Connects and checks the CRM tables are reachable.
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .acquire_timeout(Duration::from_secs(10))
            .connect(database_url)
            .await?;

        sqlx::query("SELECT 1 FROM crm_lead LIMIT 1")
            .execute(&pool)
            .await
            .map_err(|e| anyhow::anyhow!("crm_lead is not reachable: {}", e))?;
        tracing::debug!("Database pool ready ({} connections max)", MAX_CONNECTIONS);

        Ok(Self { pool })
    }

    /// Adds the AI columns to `crm_lead`. Every statement is idempotent.
    pub async fn run_migrations(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        tracing::info!("Database migrations applied");
        Ok(())
    }
}
