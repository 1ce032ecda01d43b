/// Integration tests for the push gateway client using wiremock.
///
/// These run against a local mock HTTP server, so they exercise the real
/// request path (auth header, payload shape, error mapping, circuit
/// breaker) without any external dependency.
use serde_json::json;
use talentgate_api::errors::AppError;
use talentgate_api::notifications::PushGatewayClient;
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn push_send_posts_bearer_auth_and_payload() {
    let server = MockServer::start().await;
    let account_id = Uuid::new_v4();

    Mock::given(method("POST"))
        .and(path("/v1/push"))
        .and(header("Authorization", "Bearer test-key"))
        .and(body_partial_json(json!({
            "account_id": account_id,
            "title": "Profile Unlocked",
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let client = PushGatewayClient::new(server.uri(), "test-key".to_string()).unwrap();
    let result = client
        .send(
            account_id,
            "Profile Unlocked",
            "You unlocked A*** V.",
            &json!({"type": "unlock"}),
        )
        .await;

    assert!(result.is_ok());
}

#[tokio::test]
async fn push_send_maps_server_errors_to_external_api_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/push"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let client = PushGatewayClient::new(server.uri(), "test-key".to_string()).unwrap();
    let result = client
        .send(Uuid::new_v4(), "Title", "Body", &json!({}))
        .await;

    match result {
        Err(AppError::ExternalApiError(msg)) => {
            assert!(msg.contains("500"), "unexpected message: {}", msg);
        }
        other => panic!("Expected ExternalApiError, got {:?}", other.err()),
    }
}

#[tokio::test]
async fn circuit_opens_after_consecutive_push_failures() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/push"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let client = PushGatewayClient::new(server.uri(), "test-key".to_string()).unwrap();

    // Five consecutive failures trip the breaker.
    for _ in 0..5 {
        let result = client
            .send(Uuid::new_v4(), "Title", "Body", &json!({}))
            .await;
        assert!(result.is_err());
    }

    // The next call is rejected without reaching the server.
    let requests_before = server.received_requests().await.unwrap().len();
    let result = client
        .send(Uuid::new_v4(), "Title", "Body", &json!({}))
        .await;
    let requests_after = server.received_requests().await.unwrap().len();

    match result {
        Err(AppError::ExternalApiError(msg)) => {
            assert!(msg.contains("circuit open"), "unexpected message: {}", msg);
        }
        other => panic!("Expected circuit rejection, got {:?}", other.err()),
    }
    assert_eq!(requests_before, requests_after);
}

#[tokio::test]
async fn concurrent_pushes_all_succeed() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/push"))
        .respond_with(ResponseTemplate::new(200))
        .expect(8)
        .mount(&server)
        .await;

    let client = PushGatewayClient::new(server.uri(), "test-key".to_string()).unwrap();

    let mut handles = Vec::new();
    for i in 0..8 {
        let client = client.clone();
        handles.push(tokio::spawn(async move {
            client
                .send(
                    Uuid::new_v4(),
                    "Title",
                    &format!("Body {}", i),
                    &json!({"n": i}),
                )
                .await
        }));
    }

    for handle in handles {
        assert!(handle.await.unwrap().is_ok());
    }
}
