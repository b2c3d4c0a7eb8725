//! Tests for the mock course backend itself.
//!
//! The sync tests trust this backend to produce the same envelopes as the
//! real one, so its wire behaviour is pinned down here.

mod mock_backend;

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use mock_backend::{MockBackend, Shape};
use serde_json::{json, Value};
use syllabus_client::MemoryStore;
use tower::ServiceExt;
use uuid::Uuid;

async fn call(
    store: &Arc<MemoryStore>,
    shape: Shape,
    token: Option<&str>,
    request: Request<Body>,
) -> (StatusCode, Value) {
    let app = mock_backend::router(Arc::clone(store), shape, token.map(str::to_string));
    let response = app.oneshot(request).await.expect("Request failed");
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Failed to read body");
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("Body is not JSON")
    };
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .body(Body::empty())
        .expect("Failed to build request")
}

fn patch_json(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method(Method::PATCH)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("Failed to build request")
}

#[tokio::test]
async fn test_modules_deep_in_each_envelope() {
    let store = Arc::new(MemoryStore::new());
    let course = store.seed_course("Rust 101", &[("Basics", &["Install"])]);
    let uri = format!("/api/courses/{}/modules/deep", course.id);

    let (status, body) = call(&store, Shape::SuccessFlag, None, get(&uri)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["data"][0]["module"]["title"], json!("Basics"));

    let (status, body) = call(&store, Shape::StatusCode, None, get(&uri)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status_code"], json!(200));
    assert_eq!(
        body["data"][0]["lessons"][0]["lesson"]["title"],
        json!("Install")
    );

    let (status, body) = call(&store, Shape::Bare, None, get(&uri)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.is_array());
    assert_eq!(body[0]["module"]["position"], json!(1));
}

#[tokio::test]
async fn test_unknown_course_failure_shapes() {
    let store = Arc::new(MemoryStore::new());
    let uri = format!("/api/courses/{}", Uuid::new_v4());

    let (status, body) = call(&store, Shape::SuccessFlag, None, get(&uri)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], json!(false));
    assert!(body["message"].is_string());

    let (status, body) = call(&store, Shape::StatusCode, None, get(&uri)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], json!("NOT_FOUND"));

    let (status, body) = call(&store, Shape::Bare, None, get(&uri)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_positions_path_must_match_body() {
    let store = Arc::new(MemoryStore::new());
    let course = store.seed_course("Rust 101", &[("Basics", &[]), ("Traits", &[])]);
    let modules = store.module_ids(course.id);
    let body = json!({
        "course_id": course.id,
        "modules": [{ "id": modules[1], "position": 1 }, { "id": modules[0], "position": 2 }],
    });

    let other = format!("/api/courses/{}/modules/positions", Uuid::new_v4());
    let (status, _) = call(&store, Shape::Bare, None, patch_json(&other, &body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(store.module_ids(course.id), modules);

    let uri = format!("/api/courses/{}/modules/positions", course.id);
    let (status, _) = call(&store, Shape::Bare, None, patch_json(&uri, &body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(store.module_ids(course.id), vec![modules[1], modules[0]]);
}

#[tokio::test]
async fn test_token_is_enforced() {
    let store = Arc::new(MemoryStore::new());
    let course = store.seed_course("Private", &[]);
    let uri = format!("/api/courses/{}", course.id);

    let (status, body) = call(&store, Shape::Bare, Some("s3cret"), get(&uri)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].is_string());

    let request = Request::builder()
        .uri(&uri)
        .header(header::AUTHORIZATION, "Bearer s3cret")
        .body(Body::empty())
        .expect("Failed to build request");
    let (status, body) = call(&store, Shape::Bare, Some("s3cret"), request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["title"], json!("Private"));
}

#[tokio::test]
async fn test_missing_assignment_per_shape() {
    let store = Arc::new(MemoryStore::new());
    let course = store.seed_course("Rust 101", &[("Basics", &["Install"])]);
    let lesson = store.lesson_ids(course.id)[0];
    let uri = format!("/api/lessons/{lesson}/assignment");

    let (status, body) = call(&store, Shape::StatusCode, None, get(&uri)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], Value::Null);

    let (status, _) = call(&store, Shape::Bare, None, get(&uri)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_served_over_tcp() {
    let backend = MockBackend::spawn(Shape::StatusCode).await;
    let course = backend.store.seed_course("Rust 101", &[("Basics", &[])]);

    let response = reqwest::get(format!("{}/courses/{}", backend.base_url, course.id))
        .await
        .expect("Request failed");
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let body: Value = response.json().await.expect("Body is not JSON");
    assert_eq!(body["data"]["slug"], json!(course.slug));
    assert!(backend.store.calls().contains(&"GET course".to_string()));
}
