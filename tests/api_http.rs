// tests/api_http.rs
//
// HTTP-level tests for the public API Router without opening sockets.
// We exercise the router directly via tower::ServiceExt::oneshot.
//
// Covered:
// - GET /health, GET /types, GET /refresh-types
// - POST /analyze (success, blend below threshold, missing image, bad model reply, disabled gateway,
//   non-multipart body, oversized upload)

use std::sync::Arc;

use axum::{
    body::{self, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::Value as Json;
use tower::ServiceExt as _; // for `oneshot`

use incident_image_analyzer::analyze::gateway::{DisabledGateway, DynGateway, MockGateway};
use incident_image_analyzer::config::{AiConfig, AppConfig};
use incident_image_analyzer::registry::StaticTypeSource;
use incident_image_analyzer::{build_state_with, router};

const BODY_LIMIT: usize = 1024 * 1024; // 1MB, safe for tests
const BOUNDARY: &str = "X-INCIDENT-TEST-BOUNDARY";

fn test_config(max_upload_bytes: usize) -> AppConfig {
    AppConfig {
        ai: AiConfig::default(),
        types_source_url: None,
        max_upload_bytes,
    }
}

/// Build the same Router the binary uses, with a scripted gateway.
async fn test_router(gateway: DynGateway) -> Router {
    test_router_with_limit(gateway, BODY_LIMIT).await
}

async fn test_router_with_limit(gateway: DynGateway, max_upload_bytes: usize) -> Router {
    let source = Arc::new(StaticTypeSource::new(["Wildfire", "Flood", "Earthquake"]));
    let state = build_state_with(&test_config(max_upload_bytes), source, gateway).await;
    router(state)
}

enum Part<'a> {
    Text(&'a str, &'a str),
    File(&'a str, &'a [u8]),
}

fn multipart(parts: &[Part<'_>]) -> (String, Vec<u8>) {
    let mut out = Vec::new();
    for p in parts {
        out.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match p {
            Part::Text(name, value) => {
                out.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
                );
                out.extend_from_slice(value.as_bytes());
            }
            Part::File(name, bytes) => {
                out.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{name}\"; filename=\"photo.jpg\"\r\nContent-Type: image/jpeg\r\n\r\n"
                    )
                    .as_bytes(),
                );
                out.extend_from_slice(bytes);
            }
        }
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    (format!("multipart/form-data; boundary={BOUNDARY}"), out)
}

fn analyze_request(parts: &[Part<'_>]) -> Request<Body> {
    let (content_type, body) = multipart(parts);
    Request::builder()
        .method("POST")
        .uri("/analyze")
        .header("content-type", content_type)
        .body(Body::from(body))
        .expect("build POST /analyze")
}

async fn json_body(resp: axum::response::Response) -> Json {
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body")
        .to_vec();
    serde_json::from_slice(&bytes).expect("parse json")
}

const JPEG: &[u8] = b"\xff\xd8\xff\xe0\x00\x10JFIF\x00fake";

#[tokio::test]
async fn api_health_reports_provider_and_types() {
    let app = test_router(Arc::new(MockGateway::canned())).await;

    let req = Request::builder()
        .method("GET")
        .uri("/health")
        .body(Body::empty())
        .expect("build GET /health");

    let resp = app.oneshot(req).await.expect("oneshot /health");
    assert_eq!(resp.status(), StatusCode::OK, "health should be 200");

    let v = json_body(resp).await;
    assert_eq!(v["status"], "ok");
    assert_eq!(v["provider"], "mock");
    assert_eq!(v["types_loaded"], 3);
}

#[tokio::test]
async fn api_analyze_with_empty_description_uses_image_probability() {
    let mock = Arc::new(MockGateway::replying([
        r#"```json
{"disaster_probability": 0.9, "disaster_type": "Wildfire", "disaster_severity": "high", "reasoning": "Flames spread across a hillside."}
```"#,
        r#"{"similarity_score": -1, "reformulated_description": "A wildfire is spreading across a hillside."}"#,
    ]));
    let app = test_router(mock.clone()).await;

    let resp = app
        .oneshot(analyze_request(&[
            Part::File("image", JPEG),
            Part::Text("description", ""),
            Part::Text("type", "Wildfire"),
            Part::Text("severity", "High"),
        ]))
        .await
        .expect("oneshot /analyze");
    assert_eq!(resp.status(), StatusCode::OK);

    let v = json_body(resp).await;
    // Contract checks for UI consumers
    for key in [
        "is_incident",
        "probability",
        "reformulated_description",
        "type",
        "severity",
        "reasoning",
    ] {
        assert!(v.get(key).is_some(), "missing '{key}'");
    }
    assert_eq!(v["is_incident"], true);
    assert_eq!(v["probability"], 0.9);
    assert_eq!(v["type"], "Wildfire");
    assert_eq!(v["severity"], "High");
    assert_eq!(
        v["reformulated_description"],
        "A wildfire is spreading across a hillside."
    );
    assert_eq!(mock.calls().len(), 2);
}

#[tokio::test]
async fn api_analyze_blends_similarity_below_threshold() {
    let mock = Arc::new(MockGateway::replying([
        r#"{"disaster_probability": 0.5, "disaster_type": "Flood", "disaster_severity": "Low", "reasoning": "Some standing water."}"#,
        r#"{"similarity_score": 0.2, "reformulated_description": "Standing water on a street."}"#,
    ]));
    let app = test_router(mock).await;

    let resp = app
        .oneshot(analyze_request(&[
            Part::File("image", JPEG),
            Part::Text("description", "massive explosion downtown"),
            Part::Text("type", "Flood"),
            Part::Text("severity", "Low"),
        ]))
        .await
        .expect("oneshot /analyze");
    assert_eq!(resp.status(), StatusCode::OK);

    let v = json_body(resp).await;
    let p = v["probability"].as_f64().expect("probability is a number");
    assert!((p - 0.44).abs() < 1e-9, "got {p}");
    assert_eq!(v["is_incident"], false);
}

#[tokio::test]
async fn api_analyze_without_image_is_400() {
    let mock = Arc::new(MockGateway::canned());
    let app = test_router(mock.clone()).await;

    let resp = app
        .oneshot(analyze_request(&[
            Part::Text("description", "fire"),
            Part::Text("type", "Wildfire"),
            Part::Text("severity", "High"),
        ]))
        .await
        .expect("oneshot /analyze");
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let v = json_body(resp).await;
    assert_eq!(v["error"], "Image file required");
    assert!(mock.calls().is_empty(), "no model call without an image");
}

#[tokio::test]
async fn api_analyze_non_json_reply_is_500_with_raw_text() {
    let mock = Arc::new(MockGateway::replying(["I cannot analyze this image."]));
    let app = test_router(mock.clone()).await;

    let resp = app
        .oneshot(analyze_request(&[
            Part::File("image", JPEG),
            Part::Text("description", "fire"),
        ]))
        .await
        .expect("oneshot /analyze");
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let v = json_body(resp).await;
    assert_eq!(v["error"], "Failed to parse model response as JSON");
    assert_eq!(v["raw"], "I cannot analyze this image.");
    assert_eq!(v["stage"], "image_analysis");
    assert_eq!(mock.calls().len(), 1, "second stage must not run");
}

#[tokio::test]
async fn api_analyze_out_of_range_probability_is_schema_error() {
    let mock = Arc::new(MockGateway::replying([
        r#"{"disaster_probability": 1.7, "disaster_type": "Flood", "disaster_severity": "Low", "reasoning": "r"}"#,
    ]));
    let app = test_router(mock).await;

    let resp = app
        .oneshot(analyze_request(&[Part::File("image", JPEG)]))
        .await
        .expect("oneshot /analyze");
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let v = json_body(resp).await;
    assert_eq!(v["error"], "Output format invalid");
    assert_eq!(v["details"][0]["field"], "disaster_probability");
}

#[tokio::test]
async fn api_analyze_with_disabled_gateway_is_502() {
    let app = test_router(Arc::new(DisabledGateway)).await;

    let resp = app
        .oneshot(analyze_request(&[Part::File("image", JPEG)]))
        .await
        .expect("oneshot /analyze");
    assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    let v = json_body(resp).await;
    assert_eq!(v["error"], "Model gateway unavailable");
}

#[tokio::test]
async fn api_types_and_refresh_return_current_set() {
    let app = test_router(Arc::new(MockGateway::canned())).await;

    let resp = app
        .clone()
        .oneshot(Request::get("/types").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let v = json_body(resp).await;
    assert_eq!(v["count"], 3);
    assert_eq!(v["types"][0], "Wildfire");

    let resp = app
        .oneshot(Request::get("/refresh-types").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let v = json_body(resp).await;
    assert_eq!(v["types"], serde_json::json!(["Wildfire", "Flood", "Earthquake"]));
}

#[tokio::test]
async fn api_demo_mode_field_is_validated() {
    let app = test_router(Arc::new(MockGateway::canned())).await;

    let resp = app
        .oneshot(analyze_request(&[
            Part::File("image", JPEG),
            Part::Text("demo_mode", "perhaps"),
        ]))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn api_analyze_rejects_non_multipart_body_with_json_error() {
    let mock = Arc::new(MockGateway::canned());
    let app = test_router(mock.clone()).await;

    let req = Request::builder()
        .method("POST")
        .uri("/analyze")
        .header("content-type", "application/json")
        .body(Body::from(r#"{"description": "fire"}"#))
        .expect("build POST /analyze");

    let resp = app.oneshot(req).await.expect("oneshot /analyze");
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let v = json_body(resp).await;
    assert!(
        v["error"].as_str().is_some_and(|e| e.contains("multipart")),
        "error body: {v}"
    );
    assert!(mock.calls().is_empty());
}

#[tokio::test]
async fn api_analyze_oversized_upload_is_413() {
    let mock = Arc::new(MockGateway::canned());
    let app = test_router_with_limit(mock.clone(), 1024).await;

    let big = vec![0xAB_u8; 4096];
    let resp = app
        .oneshot(analyze_request(&[Part::File("image", &big)]))
        .await
        .expect("oneshot /analyze");
    assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
    let v = json_body(resp).await;
    assert_eq!(v["error"], "Upload exceeds the size limit");
    assert!(mock.calls().is_empty());
}
