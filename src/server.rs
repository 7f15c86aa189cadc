//! HTTP surface for the answer engine.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/api/chat` | `{"message"}` → `{"response", "sources"}` |
//! | `GET`  | `/api/health` | Health check (returns version) |
//!
//! Errors use `{ "error": { "code": "bad_request", "message": "..." } }`.
//! CORS is open to all origins, methods and headers.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use sitesage_core::models::QueryResult;

use crate::engine::AnswerEngine;

/// Bind `bind_addr` and serve until the process is terminated.
pub async fn run_server(engine: Arc<AnswerEngine>, bind_addr: &str) -> anyhow::Result<()> {
    let listener = TcpListener::bind(bind_addr).await?;
    serve(engine, listener).await
}

/// Serve on an already-bound listener.
pub async fn serve(engine: Arc<AnswerEngine>, listener: TcpListener) -> anyhow::Result<()> {
    info!("listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router(engine)).await?;
    Ok(())
}

pub fn router(engine: Arc<AnswerEngine>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/chat", post(handle_chat))
        .route("/api/health", get(handle_health))
        .layer(cors)
        .with_state(engine)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

// ============ POST /api/chat ============

#[derive(Deserialize)]
struct ChatRequest {
    message: String,
}

async fn handle_chat(
    State(engine): State<Arc<AnswerEngine>>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<QueryResult>, AppError> {
    let Json(request) = payload.map_err(|e| bad_request(e.body_text()))?;
    let message = request.message.trim();
    if message.is_empty() {
        return Err(bad_request("message must not be empty"));
    }

    Ok(Json(engine.answer_query(message).await))
}

// ============ GET /api/health ============

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    version: &'static str,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "sitesage",
        version: env!("CARGO_PKG_VERSION"),
    })
}
