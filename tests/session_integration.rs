//! Integration tests for the signed API session.
//!
//! These tests drive a real `ApiSession` against a mock HTTP server and
//! verify signing, fingerprinting, retry, and credential invalidation.

use std::collections::HashMap;
use std::time::Duration;

use feedwatch_core::{ApiError, ApiSession, BogusSigner, SigningParams};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const FEED_PATH: &str = "/aweme/v1/web/aweme/post/";

fn base_cookies() -> HashMap<String, String> {
    let mut cookies = HashMap::new();
    cookies.insert("sessionid".to_string(), "abc123".to_string());
    cookies
}

async fn session_for(server: &MockServer) -> ApiSession {
    ApiSession::builder()
        .cookies(base_cookies())
        .signer(Box::new(BogusSigner::new(SigningParams::default(), "seed")))
        .host(server.uri())
        .max_attempts(3)
        .base_delay(Duration::from_millis(10))
        .build()
        .expect("session builds")
}

fn ok_body() -> serde_json::Value {
    json!({"status_code": 0, "aweme_list": [], "has_more": 0})
}

#[tokio::test]
async fn test_call_carries_token_fingerprint_and_web_id() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(FEED_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(ok_body()))
        .mount(&server)
        .await;
    // Bootstrap page fetch for the web id falls back when this 404s; the
    // call must still go out with the fallback id.
    let session = session_for(&server).await;

    let payload = session
        .call(
            FEED_PATH,
            &[("sec_user_id".to_string(), "MS4wLjABAAAAx".to_string())],
            None,
        )
        .await
        .expect("call succeeds");
    assert_eq!(payload["status_code"], 0);

    let requests = server.received_requests().await.expect("recording enabled");
    let api_request = requests
        .iter()
        .find(|r| r.url.path() == FEED_PATH)
        .expect("feed request sent");
    let query = api_request.url.query().unwrap_or_default();
    assert!(query.contains("a_bogus="), "signed token missing: {query}");
    assert!(query.contains("msToken="), "msToken missing: {query}");
    assert!(query.contains("webid="), "webid missing: {query}");
    assert!(query.contains("aid="), "fingerprint bag missing: {query}");
    assert!(
        query.contains("sec_user_id=MS4wLjABAAAAx"),
        "caller params missing: {query}"
    );
}

#[tokio::test]
async fn test_transient_failures_are_retried_until_success() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(FEED_PATH))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(FEED_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(ok_body()))
        .mount(&server)
        .await;

    let session = session_for(&server).await;
    let result = session.call(FEED_PATH, &[], None).await;
    assert!(result.is_ok(), "third attempt should succeed: {result:?}");
}

#[tokio::test]
async fn test_exhaustion_flags_credentials_for_reauth() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(FEED_PATH))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let session = session_for(&server).await;
    let err = session.call(FEED_PATH, &[], None).await.unwrap_err();
    match err {
        ApiError::Exhausted { attempts, .. } => assert_eq!(attempts, 3),
        other => panic!("expected Exhausted, got {other:?}"),
    }
    assert!(session.needs_reauth());
}

#[tokio::test]
async fn test_auth_rejection_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(FEED_PATH))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let session = session_for(&server).await;
    let err = session.call(FEED_PATH, &[], None).await.unwrap_err();
    assert!(matches!(err, ApiError::AuthInvalid { http_status: 403 }));
    assert!(session.needs_reauth());

    let api_calls = server
        .received_requests()
        .await
        .expect("recording enabled")
        .iter()
        .filter(|r| r.url.path() == FEED_PATH)
        .count();
    assert_eq!(api_calls, 1, "403 must not be retried");
}

#[tokio::test]
async fn test_upstream_status_code_rejection() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(FEED_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"status_code": 8, "status_msg": "risk control"})),
        )
        .mount(&server)
        .await;

    let session = ApiSession::builder()
        .cookies(base_cookies())
        .signer(Box::new(BogusSigner::new(SigningParams::default(), "seed")))
        .host(server.uri())
        .max_attempts(1)
        .build()
        .expect("session builds");

    let err = session.call(FEED_PATH, &[], None).await.unwrap_err();
    match err {
        ApiError::Exhausted { last_error, .. } => {
            assert!(last_error.contains("risk control"), "{last_error}");
        }
        other => panic!("expected Exhausted, got {other:?}"),
    }
}

#[tokio::test]
async fn test_empty_success_body_is_a_bot_gate() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(FEED_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string(""))
        .mount(&server)
        .await;

    let session = ApiSession::builder()
        .cookies(base_cookies())
        .signer(Box::new(BogusSigner::new(SigningParams::default(), "seed")))
        .host(server.uri())
        .max_attempts(1)
        .build()
        .expect("session builds");

    let err = session.call(FEED_PATH, &[], None).await.unwrap_err();
    match err {
        ApiError::Exhausted { last_error, .. } => {
            assert!(last_error.contains("empty response body"), "{last_error}");
        }
        other => panic!("expected Exhausted, got {other:?}"),
    }
}

#[tokio::test]
async fn test_post_body_travels_as_form() {
    let server = MockServer::start().await;
    let list_path = "/aweme/v1/web/aweme/listcollection/";
    Mock::given(method("POST"))
        .and(path(list_path))
        .respond_with(ResponseTemplate::new(200).set_body_json(ok_body()))
        .mount(&server)
        .await;

    let session = session_for(&server).await;
    let body = vec![
        ("cursor".to_string(), "0".to_string()),
        ("count".to_string(), "18".to_string()),
    ];
    session
        .call(list_path, &[], Some(&body))
        .await
        .expect("post call succeeds");

    let requests = server.received_requests().await.expect("recording enabled");
    let post = requests
        .iter()
        .find(|r| r.url.path() == list_path)
        .expect("post sent");
    let form = String::from_utf8_lossy(&post.body);
    assert!(form.contains("cursor=0"), "{form}");
    assert!(form.contains("count=18"), "{form}");
}
