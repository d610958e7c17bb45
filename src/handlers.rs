use crate::analysis::AnalysisService;
use crate::errors::AppError;
use crate::models::*;
use axum::{
    extract::{Path, Request, State},
    http::{HeaderMap, StatusCode},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;

/// Shared application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    /// Orchestrator and manual actions over the opportunity store.
    pub analysis: AnalysisService,
    /// Expected `X-Api-Key` value. `None` disables the check.
    pub api_key: Option<String>,
}

/// Health check endpoint.
pub async fn health() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "rust-crm-ai",
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
}

/// `/api/v1` routes, guarded by the API key when one is configured.
pub fn api_routes(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/api/v1/opportunities/ai-analysis",
            post(run_ai_analysis),
        )
        .route("/api/v1/opportunities/gift/suggest", post(suggest_gift))
        .route("/api/v1/opportunities/gift/sent", post(mark_gift_sent))
        .route("/api/v1/opportunities/gift/decline", post(decline_gift))
        .route("/api/v1/opportunities/:id", get(get_opportunity))
        .route("/api/v1/reports/segments", get(segment_report))
        .layer(middleware::from_fn_with_state(state, require_api_key))
}

async fn require_api_key(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    validate_api_key(&state, request.headers())?;
    Ok(next.run(request).await)
}

/// Validate the API key from the X-Api-Key header
fn validate_api_key(state: &AppState, headers: &HeaderMap) -> Result<(), AppError> {
    let Some(ref expected) = state.api_key else {
        return Ok(());
    };

    let key = headers
        .get("X-Api-Key")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized("Missing X-Api-Key header".to_string()))?;

    if !constant_time_compare(key, expected) {
        tracing::warn!("Invalid API key received");
        return Err(AppError::Unauthorized("Invalid API key".to_string()));
    }

    Ok(())
}

/// Constant-time string comparison
fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    a.as_bytes()
        .iter()
        .zip(b.as_bytes().iter())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}

fn require_selection(request: &SelectionRequest) -> Result<(), AppError> {
    if request.ids.is_empty() {
        return Err(AppError::BadRequest(
            "At least one opportunity id is required".to_string(),
        ));
    }
    Ok(())
}

/// POST /api/v1/opportunities/ai-analysis
///
/// Runs segmentation, scoring, next best action and gift suggestion for the
/// selected opportunities.
pub async fn run_ai_analysis(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SelectionRequest>,
) -> Result<Json<AnalysisSummary>, AppError> {
    tracing::info!("POST /opportunities/ai-analysis - ids: {:?}", request.ids);
    require_selection(&request)?;

    let summary = state.analysis.run_ai_analysis(&request.ids).await?;
    Ok(Json(summary))
}

/// POST /api/v1/opportunities/gift/suggest
pub async fn suggest_gift(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SelectionRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    tracing::info!("POST /opportunities/gift/suggest - ids: {:?}", request.ids);
    require_selection(&request)?;

    let outcome = state.analysis.suggest_gifts(&request.ids).await?;
    Ok(Json(json!({
        "success": true,
        "suggested": outcome.suggested,
        "failed": outcome.failed,
        "skipped": outcome.skipped,
    })))
}

/// POST /api/v1/opportunities/gift/sent
pub async fn mark_gift_sent(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SelectionRequest>,
) -> Result<Json<ActionResponse>, AppError> {
    tracing::info!("POST /opportunities/gift/sent - ids: {:?}", request.ids);
    require_selection(&request)?;

    Ok(Json(state.analysis.mark_gifts_sent(&request.ids).await?))
}

/// POST /api/v1/opportunities/gift/decline
pub async fn decline_gift(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SelectionRequest>,
) -> Result<Json<ActionResponse>, AppError> {
    tracing::info!("POST /opportunities/gift/decline - ids: {:?}", request.ids);
    require_selection(&request)?;

    Ok(Json(state.analysis.decline_gifts(&request.ids).await?))
}

/// GET /api/v1/opportunities/:id
pub async fn get_opportunity(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Opportunity>, AppError> {
    tracing::info!("GET /opportunities/{}", id);
    Ok(Json(state.analysis.opportunity(id).await?))
}

/// GET /api/v1/reports/segments
pub async fn segment_report(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<SegmentSummary>>, AppError> {
    Ok(Json(state.analysis.segment_report().await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_time_compare() {
        assert!(constant_time_compare("secret", "secret"));
        assert!(!constant_time_compare("secret", "secreT"));
        assert!(!constant_time_compare("secret", "secret2"));
    }

    #[test]
    fn test_require_selection() {
        assert!(require_selection(&SelectionRequest { ids: vec![] }).is_err());
        assert!(require_selection(&SelectionRequest { ids: vec![1] }).is_ok());
    }
}
