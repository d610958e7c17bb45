use axum::{routing::get, Router};
use rust_crm_ai::analysis::AnalysisService;
use rust_crm_ai::config::Config;
use rust_crm_ai::db::Database;
use rust_crm_ai::db_storage::PgOpportunityStore;
use rust_crm_ai::handlers::{self, AppState};
use rust_crm_ai::llm_client::OpenAiClient;
use rust_crm_ai::scheduler::spawn_analysis_scheduler;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer,
};
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Main entry point for the application.
///
/// Initializes logging, configuration, the database pool and the OpenAI
/// client, starts the analysis scheduler and serves the HTTP API.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rust_crm_ai=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let db = Database::new(&config.database_url).await?;
    tracing::info!("Database connection pool established");
    if config.run_migrations {
        db.run_migrations().await?;
    }

    let generator = OpenAiClient::from_config(&config)?;
    tracing::info!(
        "OpenAI client initialized: {} ({})",
        config.openai_base_url,
        generator.model()
    );

    let analysis = AnalysisService::new(
        Arc::new(PgOpportunityStore::new(db.pool.clone()).with_language(&config.crm_language)),
        Arc::new(generator),
    );

    let scheduler = (config.analysis_interval_secs > 0).then(|| {
        spawn_analysis_scheduler(
            analysis.clone(),
            Duration::from_secs(config.analysis_interval_secs),
        )
    });

    let app_state = Arc::new(AppState {
        analysis,
        api_key: config.api_key.clone(),
    });

    // 10 requests/second per IP, burst of 20
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(10)
            .burst_size(20)
            .key_extractor(SmartIpKeyExtractor)
            .finish()
            .ok_or_else(|| anyhow::anyhow!("Invalid rate limiter configuration"))?,
    );

    let protected_routes = handlers::api_routes(app_state.clone()).layer(
        ServiceBuilder::new()
            .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
            .layer(GovernorLayer {
                config: governor_conf,
            }),
    );

    // Health check bypasses rate limiting
    let app = Router::new()
        .route("/health", get(handlers::health))
        .merge(protected_routes)
        .with_state(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    if let Some(handle) = scheduler {
        handle.abort();
    }
    tracing::info!("Server stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
