//! HTTP surface: one POST route per generation mode plus a health check.
//!
//! ```text
//! GET  /health
//! POST /generate   {"prompt", "temperature"?, "max_tokens"?}                 -> {"generated_text"}
//! POST /chat       {"conversation", ...}                                      -> {"generated_text"}
//! POST /tool       {"conversation", "tools", ...}                             -> {"tool_response"}
//! POST /rag        {"conversation", "documents", "citation_mode"?, ...}       -> {"rag_response"}
//! ```

pub mod api;
pub mod body;
pub mod health;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use tokio::net::TcpListener;
use tracing::info;

use crate::orchestrator::Orchestrator;

/// Router state handed to every handler. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub request_timeout: Duration,
    pub max_body_bytes: usize,
}

impl AppState {
    pub fn new(orchestrator: Orchestrator, request_timeout: Duration) -> Self {
        Self {
            orchestrator: Arc::new(orchestrator),
            request_timeout,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }

    pub fn with_max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }
}

/// Grounding documents make bodies much larger than axum's 2 MiB default.
pub const DEFAULT_MAX_BODY_BYTES: usize = 32 * 1024 * 1024;

pub fn build_router(state: AppState) -> Router {
    let body_limit = DefaultBodyLimit::max(state.max_body_bytes);
    Router::new()
        .route("/health", get(health::health))
        .route("/generate", post(api::generate))
        .route("/chat", post(api::chat))
        .route("/tool", post(api::tool))
        .route("/rag", post(api::rag))
        .layer(body_limit)
        .with_state(state)
}

pub async fn serve(addr: &str, state: AppState) -> anyhow::Result<()> {
    let app = build_router(state);

    let listener = TcpListener::bind(addr).await?;
    info!("cmdr-serve listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutdown signal received");
    }
}
