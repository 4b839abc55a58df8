//! Integration tests for the request/response endpoints.

use std::time::Duration;

use rag_chat::{ChatError, ServiceClient};
use rag_common::{Config, Error};
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn service_for(server: &MockServer) -> ServiceClient {
    let mut config = Config::default();
    config.server.endpoint = server.uri();
    config.server.request_timeout_secs = 5;
    ServiceClient::new(&config).unwrap().with_token("secret")
}

#[tokio::test]
async fn test_login_accepts_valid_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/login"))
        .and(body_json(json!({"token": "secret"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "ok"})))
        .expect(1)
        .mount(&server)
        .await;

    service_for(&server).login(" secret ").await.unwrap();
}

#[tokio::test]
async fn test_login_rejection_is_auth_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/login"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"detail": "Invalid token"})))
        .mount(&server)
        .await;

    let err = service_for(&server).login("wrong").await.unwrap_err();
    assert!(err.is_auth());
    assert!(err.to_string().contains("Invalid token"));
}

#[tokio::test]
async fn test_login_with_blank_token_sends_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let err = service_for(&server).login("  ").await.unwrap_err();
    assert!(err.is_input_error());
}

#[tokio::test]
async fn test_logout() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/logout"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    service_for(&server).logout().await.unwrap();
}

#[tokio::test]
async fn test_fetch_config_sends_bearer_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/config"))
        .and(header("authorization", "Bearer secret"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"ready": true, "llm_model": "llama-3"})),
        )
        .mount(&server)
        .await;

    let config = service_for(&server).fetch_config().await.unwrap();
    assert!(config.is_ready());
    assert_eq!(config.values["llm_model"], "llama-3");
}

#[tokio::test]
async fn test_wait_until_ready_polls() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/config"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ready": false})))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/config"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ready": true})))
        .expect(1)
        .mount(&server)
        .await;

    let config = service_for(&server)
        .wait_until_ready(Duration::from_millis(10), 5)
        .await
        .unwrap();
    assert!(config.is_ready());
}

#[tokio::test]
async fn test_wait_until_ready_gives_up() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/config"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ready": false})))
        .expect(3)
        .mount(&server)
        .await;

    let err = service_for(&server)
        .wait_until_ready(Duration::from_millis(10), 3)
        .await
        .unwrap_err();
    assert!(matches!(err, ChatError::Common(Error::Timeout)));
}

#[tokio::test]
async fn test_wait_until_ready_stops_on_auth_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/config"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"detail": "Unauthorized"})))
        .expect(1)
        .mount(&server)
        .await;

    let err = service_for(&server)
        .wait_until_ready(Duration::from_millis(10), 5)
        .await
        .unwrap_err();
    assert!(err.is_auth());
}

#[tokio::test]
async fn test_ask_without_streaming() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ask"))
        .and(query_param("query", "what is it?"))
        .and(query_param("history", "h-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "answer": "A database.",
            "history": "h-2",
            "rewritten_query": "what is aperturedb",
            "duration": 1.25
        })))
        .expect(1)
        .mount(&server)
        .await;

    let response = service_for(&server)
        .ask("  what is it? ", Some("h-1"))
        .await
        .unwrap();
    assert_eq!(response.answer, "A database.");
    assert_eq!(response.history.as_deref(), Some("h-2"));
    assert_eq!(response.duration, Some(1.25));
}

#[tokio::test]
async fn test_ask_server_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ask"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .mount(&server)
        .await;

    let err = service_for(&server).ask("q", None).await.unwrap_err();
    assert!(!err.is_auth());
    assert!(err.to_string().contains("503"));
}
