/// HTTP layer tests: routing, API key check and JSON contracts
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::routing::get;
use axum::Router;
use chrono::Utc;
use rust_crm_ai::analysis::AnalysisService;
use rust_crm_ai::errors::AppError;
use rust_crm_ai::handlers::{self, AppState};
use rust_crm_ai::llm_client::TextGenerator;
use rust_crm_ai::memory_store::InMemoryOpportunityStore;
use rust_crm_ai::models::{GiftState, GiftStatus, Opportunity};
use std::sync::Arc;
use tower::ServiceExt;

struct EchoGenerator;

#[async_trait]
impl TextGenerator for EchoGenerator {
    async fn generate(&self, _system: &str, _user: &str) -> Result<String, AppError> {
        Ok("Follow up tomorrow".to_string())
    }
}

fn opportunity(id: i64, probability: f64, gift_status: GiftStatus) -> Opportunity {
    Opportunity {
        id,
        name: format!("Deal {}", id),
        record_type: "opportunity".to_string(),
        active: true,
        probability,
        expected_revenue: 20_000.0,
        create_date: Utc::now(),
        customer_name: Some("Acme".to_string()),
        customer_industry: None,
        stage_name: None,
        activity_deadline: None,
        segment: None,
        deal_score: None,
        recommended_action: None,
        last_updated: None,
        gift: GiftState {
            status: gift_status,
            ..Default::default()
        },
    }
}

fn app(api_key: Option<&str>) -> (Router, Arc<InMemoryOpportunityStore>) {
    let store = Arc::new(InMemoryOpportunityStore::new(vec![
        opportunity(1, 100.0, GiftStatus::Pending),
        opportunity(2, 100.0, GiftStatus::Suggested),
    ]));
    let state = Arc::new(AppState {
        analysis: AnalysisService::new(store.clone(), Arc::new(EchoGenerator)),
        api_key: api_key.map(str::to_string),
    });

    let router = Router::new()
        .route("/health", get(handlers::health))
        .merge(handlers::api_routes(state.clone()))
        .with_state(state);
    (router, store)
}

fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_health() {
    let (app, _) = app(Some("secret"));
    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["status"], "healthy");
}

#[tokio::test]
async fn test_api_key_required_when_configured() {
    let (app, _) = app(Some("secret"));

    let missing = app
        .clone()
        .oneshot(post_json(
            "/api/v1/opportunities/ai-analysis",
            serde_json::json!({"ids": [1]}),
        ))
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);

    let mut request = post_json(
        "/api/v1/opportunities/ai-analysis",
        serde_json::json!({"ids": [1]}),
    );
    request
        .headers_mut()
        .insert("X-Api-Key", "wrong".parse().unwrap());
    let wrong = app.clone().oneshot(request).await.unwrap();
    assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);

    let mut request = post_json(
        "/api/v1/opportunities/ai-analysis",
        serde_json::json!({"ids": [1]}),
    );
    request
        .headers_mut()
        .insert("X-Api-Key", "secret".parse().unwrap());
    let ok = app.oneshot(request).await.unwrap();
    assert_eq!(ok.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_ai_analysis_action() {
    let (app, store) = app(None);

    let response = app
        .oneshot(post_json(
            "/api/v1/opportunities/ai-analysis",
            serde_json::json!({"ids": [1, 2]}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["scored"], 2);
    assert_eq!(body["gifts_suggested"], 1);

    let record = store.get(1).await.unwrap();
    assert_eq!(record.recommended_action.as_deref(), Some("Follow up tomorrow"));
    assert_eq!(record.gift.status, GiftStatus::Suggested);
}

#[tokio::test]
async fn test_empty_selection_is_bad_request() {
    let (app, _) = app(None);
    let response = app
        .oneshot(post_json(
            "/api/v1/opportunities/gift/sent",
            serde_json::json!({"ids": []}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_gift_actions() {
    let (app, store) = app(None);

    let response = app
        .clone()
        .oneshot(post_json(
            "/api/v1/opportunities/gift/sent",
            serde_json::json!({"ids": [1, 2]}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["updated"], 1);
    assert_eq!(body["skipped"], serde_json::json!([1]));
    assert_eq!(store.get(2).await.unwrap().gift.status, GiftStatus::Sent);

    let response = app
        .oneshot(post_json(
            "/api/v1/opportunities/gift/suggest",
            serde_json::json!({"ids": [1]}),
        ))
        .await
        .unwrap();
    let body = json_body(response).await;
    assert_eq!(body["suggested"], 1);
    assert_eq!(store.get(1).await.unwrap().gift.status, GiftStatus::Suggested);
}

#[tokio::test]
async fn test_get_opportunity_and_report() {
    let (app, _) = app(None);

    let found = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/v1/opportunities/2")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(found.status(), StatusCode::OK);
    let body = json_body(found).await;
    assert_eq!(body["id"], 2);
    assert_eq!(body["gift"]["status"], "suggested");

    let missing = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/v1/opportunities/404")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);

    let report = app
        .oneshot(
            Request::builder()
                .uri("/api/v1/reports/segments")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(report.status(), StatusCode::OK);
    let body = json_body(report).await;
    assert_eq!(body.as_array().unwrap().len(), 3);
    assert_eq!(body[0]["segment"], "A");
}
