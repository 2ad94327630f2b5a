use pagegist::agent::{AgentError, ModelCandidate, SummaryClient};
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer, models: &[&str]) -> SummaryClient {
    SummaryClient::new(
        "test-key",
        &format!("{}/v1", server.uri()),
        models.iter().copied().map(ModelCandidate::new).collect(),
    )
    .unwrap()
}

fn model_path(model: &str) -> String {
    format!("/v1/models/{model}:generateContent")
}

fn summary_body(text: &str) -> serde_json::Value {
    json!({
        "candidates": [{
            "content": { "parts": [{ "text": text }] },
            "finishReason": "STOP"
        }]
    })
}

async fn mount(server: &MockServer, model: &str, response: ResponseTemplate, calls: u64) {
    Mock::given(method("POST"))
        .and(path(model_path(model)))
        .respond_with(response)
        .expect(calls)
        .mount(server)
        .await;
}

#[tokio::test]
async fn first_model_success() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(model_path("m1")))
        .and(query_param("key", "test-key"))
        .and(body_partial_json(json!({
            "generationConfig": { "maxOutputTokens": 500 }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(summary_body("  A short summary.\n")))
        .expect(1)
        .mount(&server)
        .await;
    mount(&server, "m2", ResponseTemplate::new(200), 0).await;

    let summary = client(&server, &["m1", "m2"])
        .summarize("Some page text")
        .await
        .unwrap();
    assert_eq!(summary.text, "A short summary.");
    assert_eq!(summary.model, "m1");
    assert_eq!(summary.word_count(), 3);
}

#[tokio::test]
async fn prompt_wraps_page_text() {
    let server = MockServer::start().await;
    let prompt = "Summarize this webpage concisely in clear, simple language. \
Focus on the main points and key takeaways:\n\nThe page body";

    Mock::given(method("POST"))
        .and(path(model_path("m1")))
        .and(body_partial_json(json!({
            "contents": [{ "parts": [{ "text": prompt }] }]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(summary_body("ok")))
        .expect(1)
        .mount(&server)
        .await;

    client(&server, &["m1"]).summarize("The page body").await.unwrap();
}

#[tokio::test]
async fn not_found_falls_through_to_next_model() {
    let server = MockServer::start().await;
    mount(
        &server,
        "m1",
        ResponseTemplate::new(404).set_body_json(json!({
            "error": { "code": 404, "message": "models/m1 is not found", "status": "NOT_FOUND" }
        })),
        1,
    )
    .await;
    mount(
        &server,
        "m2",
        ResponseTemplate::new(200).set_body_json(summary_body("From the second model")),
        1,
    )
    .await;

    let summary = client(&server, &["m1", "m2"]).summarize("text").await.unwrap();
    assert_eq!(summary.model, "m2");
    assert_eq!(summary.text, "From the second model");
}

#[tokio::test]
async fn rate_limit_stops_immediately() {
    let server = MockServer::start().await;
    mount(
        &server,
        "m1",
        ResponseTemplate::new(429).set_body_json(json!({
            "error": { "code": 429, "message": "Resource has been exhausted", "status": "RESOURCE_EXHAUSTED" }
        })),
        1,
    )
    .await;
    mount(&server, "m2", ResponseTemplate::new(200).set_body_json(summary_body("x")), 0).await;

    let err = client(&server, &["m1", "m2"]).summarize("text").await.unwrap_err();
    assert!(matches!(err, AgentError::RateLimited), "{err:?}");
    assert!(err.to_string().contains("Rate limit"));
}

#[tokio::test]
async fn invalid_api_key_stops_immediately() {
    let server = MockServer::start().await;
    mount(
        &server,
        "m1",
        ResponseTemplate::new(400).set_body_json(json!({
            "error": { "code": 400, "message": "API key not valid. Please pass a valid API key.", "status": "INVALID_ARGUMENT" }
        })),
        1,
    )
    .await;
    mount(&server, "m2", ResponseTemplate::new(200).set_body_json(summary_body("x")), 0).await;

    let err = client(&server, &["m1", "m2"]).summarize("text").await.unwrap_err();
    assert!(matches!(err, AgentError::InvalidApiKey), "{err:?}");
}

#[tokio::test]
async fn permission_denied_stops_immediately() {
    let server = MockServer::start().await;
    mount(&server, "m1", ResponseTemplate::new(403).set_body_string("Forbidden"), 1).await;
    mount(&server, "m2", ResponseTemplate::new(200).set_body_json(summary_body("x")), 0).await;

    let err = client(&server, &["m1", "m2"]).summarize("text").await.unwrap_err();
    assert!(matches!(err, AgentError::PermissionDenied), "{err:?}");
}

#[tokio::test]
async fn safety_stop_is_fatal() {
    let server = MockServer::start().await;
    mount(
        &server,
        "m1",
        ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{ "finishReason": "SAFETY", "content": { "parts": [] } }]
        })),
        1,
    )
    .await;
    mount(&server, "m2", ResponseTemplate::new(200).set_body_json(summary_body("x")), 0).await;

    let err = client(&server, &["m1", "m2"]).summarize("text").await.unwrap_err();
    assert!(err.to_string().contains("SAFETY"), "{err}");
}

#[tokio::test]
async fn empty_responses_exhaust_all_models() {
    let server = MockServer::start().await;
    for model in ["m1", "m2", "m3"] {
        mount(
            &server,
            model,
            ResponseTemplate::new(200).set_body_json(json!({ "candidates": [] })),
            1,
        )
        .await;
    }

    let err = client(&server, &["m1", "m2", "m3"])
        .summarize("text")
        .await
        .unwrap_err();
    assert!(matches!(err, AgentError::EmptyResponse), "{err:?}");
}

#[tokio::test]
async fn server_errors_report_last_failure() {
    let server = MockServer::start().await;
    mount(&server, "m1", ResponseTemplate::new(500).set_body_string("oops"), 1).await;
    mount(
        &server,
        "m2",
        ResponseTemplate::new(503).set_body_json(json!({
            "error": { "code": 503, "message": "The model is overloaded.", "status": "UNAVAILABLE" }
        })),
        1,
    )
    .await;

    let err = client(&server, &["m1", "m2"]).summarize("text").await.unwrap_err();
    match err {
        AgentError::Api { status, message } => {
            assert_eq!(status, 503);
            assert_eq!(message, "The model is overloaded.");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn unparsable_error_body_uses_status() {
    let server = MockServer::start().await;
    mount(&server, "m1", ResponseTemplate::new(500).set_body_string("<html>"), 1).await;

    let err = client(&server, &["m1"]).summarize("text").await.unwrap_err();
    assert_eq!(err.to_string(), "API error: 500");
}

#[tokio::test]
async fn all_models_missing() {
    let server = MockServer::start().await;
    for model in ["m1", "m2"] {
        mount(&server, model, ResponseTemplate::new(404), 1).await;
    }

    let err = client(&server, &["m1", "m2"]).summarize("text").await.unwrap_err();
    assert!(matches!(&err, AgentError::ModelNotFound(m) if m == "m2"), "{err:?}");
}

#[tokio::test]
async fn no_candidates_is_generic_failure() {
    let server = MockServer::start().await;
    let err = client(&server, &[]).summarize("text").await.unwrap_err();
    assert!(matches!(err, AgentError::AllModelsFailed));
}

#[tokio::test]
async fn unreachable_host_is_network_error() {
    let client = SummaryClient::new(
        "test-key",
        "http://127.0.0.1:1/v1",
        vec![ModelCandidate::new("m1"), ModelCandidate::new("m2")],
    )
    .unwrap();

    let err = client.summarize("text").await.unwrap_err();
    assert!(matches!(err, AgentError::Network(_)), "{err:?}");
    assert!(err.to_string().contains("internet connection"));
}

#[tokio::test]
async fn unparsable_success_body_falls_through() {
    let server = MockServer::start().await;
    mount(&server, "m1", ResponseTemplate::new(200).set_body_string("not json"), 1).await;
    mount(
        &server,
        "m2",
        ResponseTemplate::new(200).set_body_json(summary_body("Recovered")),
        1,
    )
    .await;

    let summary = client(&server, &["m1", "m2"]).summarize("text").await.unwrap();
    assert_eq!(summary.model, "m2");
    assert_eq!(summary.text, "Recovered");
}

#[tokio::test]
async fn unparsable_success_body_on_last_model_is_parse_error() {
    let server = MockServer::start().await;
    mount(&server, "m1", ResponseTemplate::new(200).set_body_string("not json"), 1).await;

    let err = client(&server, &["m1"]).summarize("text").await.unwrap_err();
    assert!(matches!(err, AgentError::ParseError(_)), "{err:?}");
}
