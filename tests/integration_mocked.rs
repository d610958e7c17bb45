/// Integration tests with a mocked OpenAI-compatible API
/// Exercises the HTTP client and a full analysis run without hitting the real service
use chrono::Utc;
use rust_crm_ai::analysis::AnalysisService;
use rust_crm_ai::config::Config;
use rust_crm_ai::llm_client::{OpenAiClient, TextGenerator};
use rust_crm_ai::memory_store::InMemoryOpportunityStore;
use rust_crm_ai::models::{GiftState, GiftStatus, Opportunity};
use rust_crm_ai::recommendation::RECOMMENDATION_ERROR;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Helper function to create test config
fn create_test_config(openai_base_url: String) -> Config {
    Config {
        database_url: "postgresql://test".to_string(),
        port: 8080,
        openai_api_key: "test-key".to_string(),
        openai_base_url,
        openai_model: "gpt-3.5-turbo".to_string(),
        openai_timeout_secs: 5,
        analysis_interval_secs: 0,
        api_key: None,
        run_migrations: false,
        crm_language: "en_US".to_string(),
    }
}

fn completion(content: &str) -> serde_json::Value {
    serde_json::json!({
        "id": "chatcmpl-test",
        "object": "chat.completion",
        "choices": [
            {
                "index": 0,
                "message": {"role": "assistant", "content": content},
                "finish_reason": "stop"
            }
        ]
    })
}

fn opportunity(id: i64, name: &str, probability: f64, revenue: f64) -> Opportunity {
    Opportunity {
        id,
        name: name.to_string(),
        record_type: "opportunity".to_string(),
        active: true,
        probability,
        expected_revenue: revenue,
        create_date: Utc::now(),
        customer_name: None,
        customer_industry: None,
        stage_name: Some("Proposition".to_string()),
        activity_deadline: None,
        segment: None,
        deal_score: None,
        recommended_action: None,
        last_updated: None,
        gift: GiftState::default(),
    }
}

#[tokio::test]
async fn test_chat_completion_success() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("Authorization", "Bearer test-key"))
        .and(body_partial_json(serde_json::json!({
            "model": "gpt-3.5-turbo",
            "messages": [
                {"role": "system", "content": "be brief"},
                {"role": "user", "content": "hello"}
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("Send a proposal")))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = OpenAiClient::from_config(&create_test_config(mock_server.uri())).unwrap();
    let text = client.generate("be brief", "hello").await.unwrap();

    assert_eq!(text, "Send a proposal");
}

#[tokio::test]
async fn test_chat_completion_api_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(500).set_body_string("Internal Server Error"))
        .mount(&mock_server)
        .await;

    let client = OpenAiClient::from_config(&create_test_config(mock_server.uri())).unwrap();
    let result = client.generate("system", "user").await;

    assert!(result.is_err());
    assert!(result.unwrap_err().to_string().contains("500"));
}

#[tokio::test]
async fn test_chat_completion_without_choices() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"choices": []})))
        .mount(&mock_server)
        .await;

    let client = OpenAiClient::from_config(&create_test_config(mock_server.uri())).unwrap();
    assert!(client.generate("system", "user").await.is_err());
}

#[tokio::test]
async fn test_chat_completion_timeout() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(completion("late"))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&mock_server)
        .await;

    let client = OpenAiClient::new(
        mock_server.uri(),
        "test-key".to_string(),
        "gpt-3.5-turbo".to_string(),
        Duration::from_millis(200),
    )
    .unwrap();

    assert!(client.generate("system", "user").await.is_err());
}

#[tokio::test]
async fn test_analysis_run_against_mocked_api() {
    let mock_server = MockServer::start().await;

    // Failing lead first so it takes precedence
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_string_contains("Lead: Unlucky deal"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .with_priority(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_string_contains("quà tặng"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("Quà chính: Giỏ trái cây")))
        .with_priority(2)
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("Call the buyer")))
        .mount(&mock_server)
        .await;

    let store = Arc::new(InMemoryOpportunityStore::new(vec![
        opportunity(1, "Unlucky deal", 40.0, 3_000.0),
        opportunity(2, "Signed deal", 100.0, 12_000.0),
        opportunity(3, "Open deal", 70.0, 9_000.0),
    ]));
    let client = OpenAiClient::from_config(&create_test_config(mock_server.uri())).unwrap();
    let service = AnalysisService::new(store.clone(), Arc::new(client));

    let summary = service.run_ai_analysis(&[1, 2, 3]).await.unwrap();
    assert_eq!(summary.recommendations, 2);
    assert_eq!(summary.recommendation_failures, 1);
    assert_eq!(summary.gifts_suggested, 1);

    let unlucky = store.get(1).await.unwrap();
    assert_eq!(unlucky.recommended_action.as_deref(), Some(RECOMMENDATION_ERROR));

    let signed = store.get(2).await.unwrap();
    assert_eq!(signed.recommended_action.as_deref(), Some("Call the buyer"));
    assert_eq!(signed.gift.status, GiftStatus::Suggested);
    assert_eq!(
        signed.gift.suggested_gift.as_deref(),
        Some("Quà chính: Giỏ trái cây")
    );
    assert_eq!(signed.gift.gift_value, 12_000.0 * 0.05);

    let open = store.get(3).await.unwrap();
    assert_eq!(open.recommended_action.as_deref(), Some("Call the buyer"));
    assert_eq!(open.gift.status, GiftStatus::Pending);
}
