// tests/metrics.rs
//
// Full app (shipped config + /metrics) exercised via tower::ServiceExt::oneshot.

use serde_json::json;
use shuttle_axum::axum::{
    body::{self, Body},
    http::{Request, StatusCode},
};
use tower::ServiceExt as _;

const BODY_LIMIT: usize = 1024 * 1024;

#[tokio::test]
async fn metrics_expose_tagging_series() {
    let app = meeting_tagger::app().await.expect("app");

    let tag = Request::builder()
        .method("POST")
        .uri("/tag")
        .header("content-type", "application/json")
        .body(Body::from(
            json!({ "text": "Аудит по МСФО и риски дедлайна" }).to_string(),
        ))
        .expect("build POST /tag");
    let resp = app.clone().oneshot(tag).await.expect("oneshot /tag");
    assert_eq!(resp.status(), StatusCode::OK);

    let req = Request::builder()
        .method("GET")
        .uri("/metrics")
        .body(Body::empty())
        .expect("build GET /metrics");
    let resp = app.oneshot(req).await.expect("oneshot /metrics");
    assert_eq!(resp.status(), StatusCode::OK);

    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read metrics body")
        .to_vec();
    let text = String::from_utf8(bytes).expect("utf8");

    for series in [
        "tagging_reloads_total",
        "tagging_rules_active",
        "tagging_calls_total",
        "tagging_cache_misses_total",
    ] {
        assert!(text.contains(series), "missing {series} in:\n{text}");
    }
    assert!(text.contains(r#"outcome="ok""#), "initial load not counted:\n{text}");
}
