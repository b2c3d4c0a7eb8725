//! An in-process course backend for integration tests.
//!
//! Serves the course API over a [`MemoryStore`] on an ephemeral port. The
//! response envelope is selectable so the HTTP adapter is exercised against
//! every shape the real backend produces.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, patch},
    Json, Router,
};
use serde::Serialize;
use serde_json::{json, Value};
use syllabus_client::{HttpStore, MemoryStore, RemoteFailure, RemoteResult, RemoteStore};
use syllabus_tree::{LessonPositionsRequest, ModuleDeepPayload, ModulePositionsRequest};
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

/// How the backend wraps results and failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    /// `{success, data}`; failures are `{success: false, message}` with HTTP 200.
    SuccessFlag,
    /// `{message, status_code, timestamp, data}`; failures are `{code, message}` with their HTTP status.
    StatusCode,
    /// Bare values; failures are `{error}` with their HTTP status.
    Bare,
}

#[derive(Clone)]
struct Backend {
    store: Arc<MemoryStore>,
    shape: Shape,
    token: Option<String>,
}

impl Backend {
    fn reply<T: Serialize>(&self, result: RemoteResult<T>) -> Response {
        match result {
            Ok(data) => {
                let body = match self.shape {
                    Shape::SuccessFlag => json!({ "success": true, "data": data }),
                    Shape::StatusCode => json!({
                        "message": "OK",
                        "status_code": 200,
                        "timestamp": chrono::Utc::now().to_rfc3339(),
                        "data": data,
                    }),
                    Shape::Bare => serde_json::to_value(&data).unwrap_or(Value::Null),
                };
                (StatusCode::OK, Json(body)).into_response()
            }
            Err(failure) => {
                let status = failure
                    .status
                    .and_then(|code| StatusCode::from_u16(code).ok())
                    .unwrap_or(StatusCode::SERVICE_UNAVAILABLE);
                match self.shape {
                    Shape::SuccessFlag => (
                        StatusCode::OK,
                        Json(json!({ "success": false, "message": failure.message })),
                    )
                        .into_response(),
                    Shape::StatusCode => (
                        status,
                        Json(json!({
                            "code": status.canonical_reason().unwrap_or("ERROR").to_uppercase().replace(' ', "_"),
                            "message": failure.message,
                        })),
                    )
                        .into_response(),
                    Shape::Bare => {
                        (status, Json(json!({ "error": failure.message }))).into_response()
                    }
                }
            }
        }
    }
}

async fn require_token(State(backend): State<Backend>, request: Request, next: Next) -> Response {
    if let Some(token) = &backend.token {
        let expected = format!("Bearer {token}");
        let given = request
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok());
        if given != Some(expected.as_str()) {
            return backend.reply::<()>(Err(RemoteFailure::from_status(
                401,
                "missing or invalid bearer token",
            )));
        }
    }
    next.run(request).await
}

// ============================================================================
// Handlers
// ============================================================================

async fn get_course(State(b): State<Backend>, Path(course_id): Path<Uuid>) -> Response {
    b.reply(b.store.fetch_course(course_id).await)
}

async fn get_modules_deep(State(b): State<Backend>, Path(course_id): Path<Uuid>) -> Response {
    b.reply(b.store.fetch_modules_deep(course_id).await)
}

async fn post_module_deep(
    State(b): State<Backend>,
    Path(course_id): Path<Uuid>,
    Json(payload): Json<ModuleDeepPayload>,
) -> Response {
    b.reply(b.store.create_or_update_module_deep(course_id, &payload).await)
}

async fn patch_module_positions(
    State(b): State<Backend>,
    Path(course_id): Path<Uuid>,
    Json(request): Json<ModulePositionsRequest>,
) -> Response {
    if request.course_id != course_id {
        return b.reply::<()>(Err(RemoteFailure::from_status(400, "course_id does not match the path")));
    }
    b.reply(b.store.update_module_positions(&request).await)
}

async fn patch_lesson_positions(
    State(b): State<Backend>,
    Path(module_id): Path<Uuid>,
    Json(request): Json<LessonPositionsRequest>,
) -> Response {
    if request.module_id != module_id {
        return b.reply::<()>(Err(RemoteFailure::from_status(400, "module_id does not match the path")));
    }
    b.reply(b.store.update_lesson_positions(&request).await)
}

async fn delete_module(State(b): State<Backend>, Path(module_id): Path<Uuid>) -> Response {
    b.reply(b.store.delete_module(module_id).await)
}

async fn delete_lesson(State(b): State<Backend>, Path(lesson_id): Path<Uuid>) -> Response {
    b.reply(b.store.delete_lesson(lesson_id).await)
}

async fn get_contents(State(b): State<Backend>, Path(lesson_id): Path<Uuid>) -> Response {
    b.reply(b.store.fetch_lesson_contents(lesson_id).await)
}

async fn get_questions(State(b): State<Backend>, Path(lesson_id): Path<Uuid>) -> Response {
    b.reply(b.store.fetch_lesson_questions(lesson_id).await)
}

async fn get_assignment(State(b): State<Backend>, Path(lesson_id): Path<Uuid>) -> Response {
    match b.store.fetch_lesson_assignment(lesson_id).await {
        Ok(None) if b.shape == Shape::Bare => {
            b.reply::<()>(Err(RemoteFailure::from_status(404, "assignment not found")))
        }
        other => b.reply(other),
    }
}

async fn get_options(State(b): State<Backend>, Path(question_id): Path<Uuid>) -> Response {
    b.reply(b.store.fetch_question_options(question_id).await)
}

// ============================================================================
// Router and server
// ============================================================================

/// Builds the course API router over `store`.
pub fn router(store: Arc<MemoryStore>, shape: Shape, token: Option<String>) -> Router {
    let backend = Backend {
        store,
        shape,
        token,
    };

    let api_routes = Router::new()
        .route("/courses/:course_id", get(get_course))
        .route(
            "/courses/:course_id/modules/deep",
            get(get_modules_deep).post(post_module_deep),
        )
        .route(
            "/courses/:course_id/modules/positions",
            patch(patch_module_positions),
        )
        .route(
            "/modules/:module_id/lessons/positions",
            patch(patch_lesson_positions),
        )
        .route("/modules/:module_id", delete(delete_module))
        .route("/lessons/:lesson_id", delete(delete_lesson))
        .route("/lessons/:lesson_id/contents", get(get_contents))
        .route("/lessons/:lesson_id/questions", get(get_questions))
        .route("/lessons/:lesson_id/assignment", get(get_assignment))
        .route("/lesson-questions/:question_id/options", get(get_options))
        .layer(middleware::from_fn_with_state(backend.clone(), require_token));

    Router::new()
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(backend)
}

/// A running mock backend. The server stops when this is dropped.
pub struct MockBackend {
    /// The data behind the API.
    pub store: Arc<MemoryStore>,
    /// API root, e.g. `http://127.0.0.1:41234/api`.
    pub base_url: String,
    handle: JoinHandle<()>,
}

impl MockBackend {
    /// Starts a backend without authentication.
    pub async fn spawn(shape: Shape) -> Self {
        Self::spawn_with_token(shape, None).await
    }

    /// Starts a backend that requires `Authorization: Bearer <token>` when `token` is set.
    pub async fn spawn_with_token(shape: Shape, token: Option<&str>) -> Self {
        let store = Arc::new(MemoryStore::new());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind");
        let addr = listener.local_addr().expect("Failed to get local addr");
        let app = router(Arc::clone(&store), shape, token.map(str::to_string));

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.expect("Server failed");
        });

        Self {
            store,
            base_url: format!("http://{addr}/api"),
            handle,
        }
    }

    /// An HTTP adapter pointed at this backend.
    pub fn http_store(&self, token: Option<&str>) -> Arc<HttpStore> {
        Arc::new(
            HttpStore::new(
                self.base_url.clone(),
                token.map(str::to_string),
                Duration::from_secs(5),
            )
            .expect("Failed to build HTTP store"),
        )
    }
}

impl Drop for MockBackend {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
