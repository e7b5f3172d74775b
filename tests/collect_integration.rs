//! Integration tests for the collection engine.
//!
//! Each test stands up a mock API, points a real session at it, and runs
//! the engine end to end: pagination, incremental cutoff, limits, search-id
//! threading, and the failure ceiling.

use std::collections::HashMap;
use std::time::Duration;

use feedwatch_core::{
    ApiSession, BogusSigner, CollectionEngine, ContentItem, ContentType, ItemKind, SigningParams,
    StopReason, Target,
};
use serde_json::{Value, json};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const POST_PATH: &str = "/aweme/v1/web/aweme/post/";
const SEARCH_PATH: &str = "/aweme/v1/web/search/item/";
const DETAIL_PATH: &str = "/aweme/v1/web/aweme/detail/";

async fn session_for(server: &MockServer) -> ApiSession {
    let mut cookies = HashMap::new();
    cookies.insert("sessionid".to_string(), "abc".to_string());
    ApiSession::builder()
        .cookies(cookies)
        .signer(Box::new(BogusSigner::new(SigningParams::default(), "seed")))
        .host(server.uri())
        .max_attempts(1)
        .base_delay(Duration::from_millis(5))
        .build()
        .expect("session builds")
}

fn video_entry(id: &str, time: i64) -> Value {
    json!({
        "aweme_id": id,
        "aweme_type": 0,
        "create_time": time,
        "desc": format!("clip {id}"),
        "video": {"play_addr": {"url_list": [format!("https://cdn.test/{id}.mp4")]}}
    })
}

fn pinned_entry(id: &str, time: i64) -> Value {
    let mut entry = video_entry(id, time);
    entry["is_top"] = json!(1);
    entry
}

fn page(entries: Vec<Value>, cursor: i64, has_more: i64) -> Value {
    json!({
        "status_code": 0,
        "aweme_list": entries,
        "max_cursor": cursor,
        "has_more": has_more
    })
}

fn prior_snapshot(time: i64) -> Vec<ContentItem> {
    vec![ContentItem {
        id: "prior".to_string(),
        kind: ItemKind::Video,
        description: String::new(),
        created_at: time,
        author: None,
        cover_url: None,
        media_urls: None,
        duration: None,
        raw_type_code: 0,
        pinned: false,
    }]
}

fn post_target() -> Target {
    Target::resolve("MS4wLjABAAAAsubject", Some(ContentType::Post)).expect("target resolves")
}

#[tokio::test]
async fn test_pagination_follows_cursor_until_exhausted() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(POST_PATH))
        .and(query_param("max_cursor", "0"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(page(vec![video_entry("a", 300), video_entry("b", 200)], 200, 1)),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(POST_PATH))
        .and(query_param("max_cursor", "200"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(page(vec![video_entry("c", 100)], 0, 0)),
        )
        .mount(&server)
        .await;

    let session = session_for(&server).await;
    let collection = CollectionEngine::default()
        .collect(&session, &post_target(), 0, &[])
        .await
        .expect("collection runs");

    assert_eq!(collection.stop, StopReason::Exhausted);
    assert!(!collection.truncated);
    assert_eq!(
        collection
            .items
            .iter()
            .map(|i| i.id.as_str())
            .collect::<Vec<_>>(),
        ["a", "b", "c"]
    );
}

#[tokio::test]
async fn test_incremental_cutoff_keeps_only_newer_items() {
    let t = 1_700_000_000;
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(POST_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(
            vec![
                video_entry("n1", t + 5),
                video_entry("n2", t + 3),
                video_entry("o1", t - 1),
                video_entry("o2", t - 2),
            ],
            999,
            1,
        )))
        .mount(&server)
        .await;

    let session = session_for(&server).await;
    let collection = CollectionEngine::default()
        .collect(&session, &post_target(), 0, &prior_snapshot(t))
        .await
        .expect("collection runs");

    assert_eq!(collection.stop, StopReason::Cutoff);
    assert_eq!(
        collection
            .items
            .iter()
            .map(|i| i.id.as_str())
            .collect::<Vec<_>>(),
        ["n1", "n2"]
    );

    // The cutoff fired mid-page, so no second page was requested.
    let api_calls = server
        .received_requests()
        .await
        .expect("recording enabled")
        .iter()
        .filter(|r| r.url.path() == POST_PATH)
        .count();
    assert_eq!(api_calls, 1);
}

#[tokio::test]
async fn test_pinned_item_does_not_stop_incremental_run() {
    let t = 1_700_000_000;
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(POST_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(
            vec![
                pinned_entry("pinned-old", t - 50),
                video_entry("fresh", t + 10),
            ],
            0,
            0,
        )))
        .mount(&server)
        .await;

    let session = session_for(&server).await;
    let collection = CollectionEngine::default()
        .collect(&session, &post_target(), 0, &prior_snapshot(t))
        .await
        .expect("collection runs");

    assert_eq!(collection.stop, StopReason::Exhausted);
    assert_eq!(collection.items.len(), 1);
    assert_eq!(collection.items[0].id, "fresh");
}

#[tokio::test]
async fn test_limit_stops_collection_mid_page() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(POST_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(
            vec![
                video_entry("a", 500),
                video_entry("b", 400),
                video_entry("c", 300),
                video_entry("d", 200),
            ],
            777,
            1,
        )))
        .mount(&server)
        .await;

    let session = session_for(&server).await;
    let collection = CollectionEngine::default()
        .collect(&session, &post_target(), 3, &[])
        .await
        .expect("collection runs");

    assert_eq!(collection.stop, StopReason::LimitReached);
    assert_eq!(collection.items.len(), 3);
    assert!(!collection.truncated);
}

#[tokio::test]
async fn test_retry_ceiling_yields_empty_partial_result() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(POST_PATH))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let session = session_for(&server).await;
    let engine = CollectionEngine::new(2).page_backoff(Duration::from_millis(5));
    let collection = engine
        .collect(&session, &post_target(), 0, &[])
        .await
        .expect("failures truncate, they do not error");

    assert_eq!(collection.stop, StopReason::Aborted);
    assert!(collection.truncated);
    assert!(collection.items.is_empty());
}

#[tokio::test]
async fn test_repeating_page_with_stuck_cursor_terminates() {
    let server = MockServer::start().await;
    // The upstream keeps claiming more pages but serves the same entry at
    // the same cursor. The run must end with a partial result instead of
    // requesting that page forever.
    Mock::given(method("GET"))
        .and(path(POST_PATH))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(page(vec![video_entry("stuck", 100)], 0, 1)),
        )
        .mount(&server)
        .await;

    let session = session_for(&server).await;
    let engine = CollectionEngine::new(2).page_backoff(Duration::from_millis(5));
    let collection = tokio::time::timeout(
        Duration::from_secs(5),
        engine.collect(&session, &post_target(), 0, &[]),
    )
    .await
    .expect("run must terminate")
    .expect("failures truncate, they do not error");

    assert_eq!(collection.stop, StopReason::Aborted);
    assert!(collection.truncated);
    assert_eq!(collection.items.len(), 1);
    assert_eq!(collection.items[0].id, "stuck");
}

#[tokio::test]
async fn test_search_threads_impression_id_into_next_page() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(SEARCH_PATH))
        .and(query_param("offset", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status_code": 0,
            "data": [{"aweme_info": video_entry("s1", 300)}],
            "cursor": 18,
            "has_more": 1,
            "log_pb": {"impr_id": "20260825-imprint"}
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(SEARCH_PATH))
        .and(query_param("offset", "18"))
        .and(query_param("search_id", "20260825-imprint"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status_code": 0,
            "data": [{"aweme_info": video_entry("s2", 200)}],
            "cursor": 0,
            "has_more": 0,
            "log_pb": {"impr_id": "20260825-imprint"}
        })))
        .mount(&server)
        .await;

    let session = session_for(&server).await;
    let target = Target::resolve("funny cats", Some(ContentType::Search)).expect("target resolves");
    let collection = CollectionEngine::default()
        .collect(&session, &target, 0, &[])
        .await
        .expect("collection runs");

    assert_eq!(
        collection
            .items
            .iter()
            .map(|i| i.id.as_str())
            .collect::<Vec<_>>(),
        ["s1", "s2"]
    );
}

#[tokio::test]
async fn test_single_item_detail_fetch() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(DETAIL_PATH))
        .and(query_param("aweme_id", "7421000000000000000"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status_code": 0,
            "aweme_detail": video_entry("7421000000000000000", 100)
        })))
        .mount(&server)
        .await;

    let session = session_for(&server).await;
    let target = Target::resolve("7421000000000000000", Some(ContentType::SingleItem))
        .expect("target resolves");
    let collection = CollectionEngine::default()
        .collect(&session, &target, 0, &[])
        .await
        .expect("collection runs");

    assert_eq!(collection.items.len(), 1);
    assert_eq!(collection.items[0].id, "7421000000000000000");
    assert_eq!(collection.stop, StopReason::Exhausted);
}

#[tokio::test]
async fn test_rerun_against_fresh_snapshot_collects_nothing() {
    let t = 1_700_000_000;
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(POST_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(
            vec![video_entry("a", t), video_entry("b", t - 10)],
            0,
            0,
        )))
        .mount(&server)
        .await;

    let session = session_for(&server).await;
    let engine = CollectionEngine::default();
    let target = post_target();

    let first = engine
        .collect(&session, &target, 0, &[])
        .await
        .expect("first run");
    assert_eq!(first.items.len(), 2);

    let second = engine
        .collect(&session, &target, 0, &first.items)
        .await
        .expect("second run");
    assert_eq!(second.stop, StopReason::Cutoff);
    assert!(second.items.is_empty());
}
