//! One-shot AI analysis over every opportunity, for use from an external cron.

use rust_crm_ai::analysis::AnalysisService;
use rust_crm_ai::config::Config;
use rust_crm_ai::db::Database;
use rust_crm_ai::db_storage::PgOpportunityStore;
use rust_crm_ai::llm_client::OpenAiClient;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let config = Config::from_env()?;
    let db = Database::new(&config.database_url).await?;
    if config.run_migrations {
        db.run_migrations().await?;
    }

    let service = AnalysisService::new(
        Arc::new(PgOpportunityStore::new(db.pool.clone()).with_language(&config.crm_language)),
        Arc::new(OpenAiClient::from_config(&config)?),
    );

    let summary = service.run_scheduled().await?;
    tracing::info!(
        "Run {} complete: {} segmented, {} scored, {} recommendations ({} failed), {} gifts suggested ({} failed)",
        summary.run_id,
        summary.segmented,
        summary.scored,
        summary.recommendations,
        summary.recommendation_failures,
        summary.gifts_suggested,
        summary.gift_failures
    );
    println!("{}", serde_json::to_string_pretty(&summary)?);

    Ok(())
}
