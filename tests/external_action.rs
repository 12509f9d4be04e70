//! Integration tests for the External Action against a mocked third-party endpoint.

#![cfg(feature = "external")]

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use voice_actions::prelude::*;
use voice_actions::{DEFAULT_EXTERNAL_ACTION_TIMEOUT, signature};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

const SECRET_B64: &str = "czNjcjN0LWJvb2tpbmcta2V5"; // "s3cr3t-booking-key"

fn booking_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "length": {"type": "string", "enum": ["30m", "1hr"]},
            "time": {"type": "string"}
        }
    })
}

fn booking_config(server: &MockServer) -> ExternalActionConfig {
    ExternalActionConfig::new(
        "book_meeting",
        "Book a meeting",
        format!("{}/book", server.uri()),
        booking_schema(),
    )
    .with_signature_secret(SECRET_B64)
    .speak_on_receive(true)
}

fn booking_input(config: &ExternalActionConfig, params: Value) -> ActionInput {
    let action_config = Arc::new(config.clone().into_action_config().unwrap());
    ActionInput::new(action_config, "conv-e2e", TurnId(1), params)
}

#[tokio::test]
async fn test_successful_call_is_signed_and_mapped() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/book"))
        .and(header("content-type", "application/json"))
        .and(header("accept", "application/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "result": {"success": true},
            "agent_message": "Booked for 10:30am"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let config = booking_config(&server);
    let action = ExternalAction::new(config.clone(), reqwest::Client::new()).unwrap();
    let params = json!({"length": "30m", "time": "10:30am"});
    let output = action
        .run(booking_input(&config, params.clone()))
        .await
        .unwrap();

    assert_eq!(output.action_type, ActionType::EXTERNAL);
    assert_eq!(output.response, json!({"success": true}));
    assert_eq!(output.agent_message.as_deref(), Some("Booked for 10:30am"));

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];

    let body: Value = serde_json::from_slice(&request.body).unwrap();
    assert_eq!(body, json!({"payload": params}));

    let signature_header = request
        .headers
        .get(voice_actions::SIGNATURE_HEADER)
        .expect("signed request")
        .to_str()
        .unwrap();
    signature::verify_with_encoded_secret(SECRET_B64, &request.body, signature_header).unwrap();
}

#[tokio::test]
async fn test_unsigned_when_no_secret_configured() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": 1})))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = booking_config(&server);
    config.signature_secret = None;
    let action = ExternalAction::new(config.clone(), reqwest::Client::new()).unwrap();
    let output = action
        .run(booking_input(&config, json!({"time": "noon"})))
        .await
        .unwrap();
    assert_eq!(output.response, json!(1));
    assert!(output.agent_message.is_none());

    let requests = server.received_requests().await.unwrap();
    assert!(
        requests[0]
            .headers
            .get(voice_actions::SIGNATURE_HEADER)
            .is_none()
    );
}

/// An endpoint that checks the signature the way a receiver would.
async fn verifying_server(secret_b64: &'static str) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/book"))
        .respond_with(move |request: &Request| {
            let verified = request
                .headers
                .get(voice_actions::SIGNATURE_HEADER)
                .and_then(|value| value.to_str().ok())
                .map(|value| {
                    signature::verify_with_encoded_secret(secret_b64, &request.body, value).is_ok()
                })
                .unwrap_or(false);
            if verified {
                ResponseTemplate::new(200).set_body_json(json!({"result": {"success": true}}))
            } else {
                ResponseTemplate::new(signature::REJECTION_STATUS).set_body_string("bad signature")
            }
        })
        .mount(&server)
        .await;
    server
}

#[tokio::test]
async fn test_receiver_rejects_wrong_or_missing_signature() {
    let server = verifying_server(SECRET_B64).await;
    let params = json!({"length": "30m", "time": "10:30am"});

    let config = booking_config(&server);
    let action = ExternalAction::new(config.clone(), reqwest::Client::new()).unwrap();
    let output = action
        .run(booking_input(&config, params.clone()))
        .await
        .unwrap();
    assert_eq!(output.response, json!({"success": true}));

    // "wr0ng-key"
    let wrong = booking_config(&server).with_signature_secret("d3Iwbmcta2V5");
    let unsigned = ExternalActionConfig {
        signature_secret: None,
        ..booking_config(&server)
    };
    for config in [wrong, unsigned] {
        let action = ExternalAction::new(config.clone(), reqwest::Client::new()).unwrap();
        let err = action
            .run(booking_input(&config, params.clone()))
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(signature::REJECTION_STATUS));
    }
}

#[tokio::test]
async fn test_invalid_params_never_reach_the_network() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": {}})))
        .expect(0)
        .mount(&server)
        .await;

    let config = booking_config(&server);
    let action = ExternalAction::new(config.clone(), reqwest::Client::new()).unwrap();

    for params in [
        json!({"length": "2hr", "time": "10:30am"}),
        json!({"length": "30m", "time": 1030}),
        json!(["30m"]),
    ] {
        let err = action
            .run(booking_input(&config, params))
            .await
            .unwrap_err();
        assert!(matches!(err, ActionError::Validation(_)), "{err}");
    }
}

#[tokio::test]
async fn test_non_2xx_is_transport_error_with_status_and_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("calendar exploded"))
        .expect(1)
        .mount(&server)
        .await;

    let config = booking_config(&server);
    let action = ExternalAction::new(config.clone(), reqwest::Client::new()).unwrap();
    let err = action
        .run(booking_input(&config, json!({"length": "30m", "time": "10:30am"})))
        .await
        .unwrap_err();

    match err {
        ActionError::Transport { status, body, .. } => {
            assert_eq!(status, Some(500));
            assert_eq!(body.as_deref(), Some("calendar exploded"));
        }
        other => panic!("expected transport error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_missing_result_is_response_format_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
        .mount(&server)
        .await;

    let config = booking_config(&server);
    let action = ExternalAction::new(config.clone(), reqwest::Client::new()).unwrap();
    let err = action
        .run(booking_input(&config, json!({"length": "1hr", "time": "9am"})))
        .await
        .unwrap_err();
    assert!(matches!(err, ActionError::ResponseFormat(_)));
}

#[tokio::test]
async fn test_non_json_body_is_response_format_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>ok</html>"))
        .mount(&server)
        .await;

    let config = booking_config(&server);
    let action = ExternalAction::new(config.clone(), reqwest::Client::new()).unwrap();
    let err = action
        .run(booking_input(&config, json!({})))
        .await
        .unwrap_err();
    assert!(matches!(err, ActionError::ResponseFormat(_)));
}

#[tokio::test]
async fn test_timeout_boundary() {
    let ceiling = Duration::from_millis(400);
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/slow"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"result": "late"}))
                .set_delay(ceiling + Duration::from_millis(300)),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/fast"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"result": "on time"}))
                .set_delay(ceiling - Duration::from_millis(300)),
        )
        .mount(&server)
        .await;

    let mut slow = booking_config(&server);
    slow.url = format!("{}/slow", server.uri());
    let action = ExternalAction::new(slow.clone(), reqwest::Client::new())
        .unwrap()
        .with_timeout(ceiling);
    let err = action
        .run(booking_input(&slow, json!({})))
        .await
        .unwrap_err();
    assert!(matches!(err, ActionError::Timeout(d) if d == ceiling));

    let mut fast = booking_config(&server);
    fast.url = format!("{}/fast", server.uri());
    let action = ExternalAction::new(fast.clone(), reqwest::Client::new())
        .unwrap()
        .with_timeout(ceiling);
    let output = action.run(booking_input(&fast, json!({}))).await.unwrap();
    assert_eq!(output.response, json!("on time"));
}

#[tokio::test]
async fn test_unreachable_endpoint_is_transport_error() {
    let config = ExternalActionConfig::new(
        "book_meeting",
        "Book a meeting",
        "http://127.0.0.1:9/book",
        booking_schema(),
    );

    let action = ExternalAction::new(config.clone(), reqwest::Client::new()).unwrap();
    let err = action
        .run(booking_input(&config, json!({})))
        .await
        .unwrap_err();
    assert!(matches!(err, ActionError::Transport { status: None, .. }));
}

#[tokio::test]
#[ignore = "exercises the real 10 second ceiling"]
async fn test_default_ceiling_is_ten_seconds() {
    let server = MockServer::start().await;
    let epsilon = Duration::from_millis(500);
    Mock::given(method("POST"))
        .and(path("/over"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"result": null}))
                .set_delay(DEFAULT_EXTERNAL_ACTION_TIMEOUT + epsilon),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/under"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"result": null}))
                .set_delay(DEFAULT_EXTERNAL_ACTION_TIMEOUT - epsilon),
        )
        .mount(&server)
        .await;

    for (route, expect_timeout) in [("/over", true), ("/under", false)] {
        let mut config = booking_config(&server);
        config.url = format!("{}{}", server.uri(), route);
        let action = ExternalAction::new(config.clone(), reqwest::Client::new()).unwrap();
        let result = action.run(booking_input(&config, json!({}))).await;
        assert_eq!(
            matches!(result, Err(ActionError::Timeout(_))),
            expect_timeout,
            "{route}"
        );
    }
}
