//! Handlers for the generation routes and the error-to-status mapping.

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::{Value, json};
use tracing::{error, warn};

use super::AppState;
use super::body::parse_body;
use crate::error::Error;
use crate::prompt::{GenerationResult, Mode};

/// POST /generate
pub async fn generate(State(state): State<AppState>, body: Bytes) -> Response {
    handle(&state, Mode::Completion, &body).await
}

/// POST /chat
pub async fn chat(State(state): State<AppState>, body: Bytes) -> Response {
    handle(&state, Mode::Chat, &body).await
}

/// POST /tool
pub async fn tool(State(state): State<AppState>, body: Bytes) -> Response {
    handle(&state, Mode::Tool, &body).await
}

/// POST /rag
pub async fn rag(State(state): State<AppState>, body: Bytes) -> Response {
    handle(&state, Mode::Rag, &body).await
}

async fn handle(state: &AppState, mode: Mode, body: &[u8]) -> Response {
    let parsed = match parse_body(mode, body) {
        Ok(parsed) => parsed,
        Err(e) => return error_response(mode, e),
    };

    let run = state.orchestrator.run(&parsed.request, parsed.sampling);
    match tokio::time::timeout(state.request_timeout, run).await {
        Ok(Ok(result)) => (StatusCode::OK, Json(response_body(mode, &result))).into_response(),
        Ok(Err(e)) => error_response(mode, e),
        Err(_) => {
            warn!(%mode, timeout_secs = state.request_timeout.as_secs(), "request timed out");
            (
                StatusCode::GATEWAY_TIMEOUT,
                Json(json!({ "error": "generation timed out" })),
            )
                .into_response()
        }
    }
}

/// Wraps the result under the route's response key.
fn response_body(mode: Mode, result: &GenerationResult) -> Value {
    match mode {
        Mode::Completion | Mode::Chat => json!({ "generated_text": result.text() }),
        Mode::Tool => json!({ "tool_response": result }),
        Mode::Rag => json!({ "rag_response": result }),
    }
}

fn error_response(mode: Mode, err: Error) -> Response {
    if err.is_client_error() {
        warn!(%mode, "rejected request: {err}");
        (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": err.to_string() })),
        )
            .into_response()
    } else if err.is_completion_error() {
        warn!(%mode, "unusable completion: {err}");
        (
            StatusCode::BAD_GATEWAY,
            Json(json!({ "error": err.to_string() })),
        )
            .into_response()
    } else {
        error!(%mode, "request failed: {err}");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({
                "error": "An unexpected error occurred",
                "details": err.to_string(),
            })),
        )
            .into_response()
    }
}
