//! HTTP binding for the sync endpoints.
//!
//! | Method | Path                 | Body / query        | Response       |
//! |--------|----------------------|---------------------|----------------|
//! | GET    | `/api/v2/sync`       | `?last_pulled_at=…` | `PullResponse` |
//! | POST   | `/api/v2/sync/pull`  | `PullRequest`       | `PullResponse` |
//! | POST   | `/api/v2/sync`       | `PushRequest`       | `PushResponse` |
//! | GET    | `/health`            |                     | `{"status"}`   |
//!
//! A push answers 200 when every table applied, 422 when tables were
//! rejected for client reasons only, and 500 when any table hit a storage
//! failure. The body is a `PushResponse` in all three cases.

use crate::error::ServerError;
use crate::handler::RequestHandler;
use axum::body::Bytes;
use axum::extract::rejection::QueryRejection;
use axum::extract::{DefaultBodyLimit, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use deltasync_protocol::{JsonDecode, PullRequest, PullResponse, PushRequest};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Request body limit for sync endpoints.
const MAX_BODY_BYTES: usize = 64 * 1024 * 1024;

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = match &self {
            ServerError::InvalidRequest(_)
            | ServerError::InvalidRecord { .. }
            | ServerError::Protocol(_) => StatusCode::BAD_REQUEST,
            ServerError::UnknownTable(_) => StatusCode::NOT_FOUND,
            ServerError::NotAccepted(_) => StatusCode::FORBIDDEN,
            ServerError::UnsupportedOperation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            ServerError::TooManyRecords { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        let body = serde_json::json!({
            "error": self.to_string(),
            "code": status.as_u16(),
        });
        (status, Json(body)).into_response()
    }
}

/// Builds the sync router.
pub fn router(handler: Arc<RequestHandler>) -> Router {
    Router::new()
        .route("/api/v2/sync", get(pull_query).post(push))
        .route("/api/v2/sync/pull", post(pull_body))
        .route("/health", get(health))
        .with_state(handler)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
}

async fn pull_query(
    State(handler): State<Arc<RequestHandler>>,
    query: Result<Query<PullRequest>, QueryRejection>,
) -> Result<Json<PullResponse>, ServerError> {
    let Query(request) = query.map_err(|e| ServerError::InvalidRequest(e.body_text()))?;
    Ok(Json(handler.handle_pull(request).await?))
}

async fn pull_body(
    State(handler): State<Arc<RequestHandler>>,
    body: Bytes,
) -> Result<Json<PullResponse>, ServerError> {
    // Some clients post an empty body on first sync.
    let request = if body.iter().all(u8::is_ascii_whitespace) {
        PullRequest::initial()
    } else {
        PullRequest::decode_json(&body)?
    };
    Ok(Json(handler.handle_pull(request).await?))
}

async fn push(
    State(handler): State<Arc<RequestHandler>>,
    body: Bytes,
) -> Result<Response, ServerError> {
    let request = PushRequest::decode_json(&body)?;
    let response = handler.handle_push(request).await?;

    let status = if response.ok {
        StatusCode::OK
    } else if response.has_retryable_failures() {
        StatusCode::INTERNAL_SERVER_ERROR
    } else {
        StatusCode::UNPROCESSABLE_ENTITY
    };
    Ok((status, Json(response)).into_response())
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
