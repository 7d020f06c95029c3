// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Local HTTP and WebSocket API over the session controller.

pub mod auth;
pub mod http;
pub mod state;
pub mod ws;

pub use state::AppState;

use std::sync::Arc;

use axum::http::StatusCode;
use axum::middleware;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::controller::SessionController;
use crate::error::ErrorCode;

/// Error response envelope shared across HTTP and WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: ErrorBody,
}

/// Error body containing a machine-readable code and human-readable message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

impl ErrorCode {
    /// Convert this error code into a transport [`ErrorBody`].
    pub fn to_error_body(&self, message: impl Into<String>) -> ErrorBody {
        ErrorBody { code: self.as_str().to_owned(), message: message.into() }
    }

    /// Convert this error code into an axum JSON error response.
    pub fn to_http_response(
        &self,
        message: impl Into<String>,
    ) -> (StatusCode, Json<ErrorResponse>) {
        let status =
            StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = ErrorResponse { success: false, error: self.to_error_body(message) };
        (status, Json(body))
    }
}

/// Build the axum `Router` with all HTTP and WebSocket routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/v1/health", get(http::health))
        .route("/api/v1/tools", get(http::tools))
        .route("/api/v1/tools/{tool}/installed", get(http::installed))
        .route("/api/v1/tools/{tool}/authenticated", get(http::authenticated))
        .route("/api/v1/tools/{tool}/install", post(http::install))
        .route("/api/v1/tools/{tool}/login", post(http::login))
        .route("/api/v1/tools/{tool}/logout", post(http::logout))
        .route("/api/v1/tools/{tool}/extract", post(http::extract))
        .route("/api/v1/tools/{tool}/connect", post(http::connect))
        .route("/api/v1/tools/{tool}/copy", post(http::copy))
        .route("/ws", get(ws::ws_handler))
        .layer(middleware::from_fn_with_state(state.clone(), auth::auth_layer))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind `host:port` and serve the controller API until `shutdown` fires.
pub async fn serve(
    controller: Arc<SessionController>,
    host: &str,
    port: u16,
    auth_token: Option<String>,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let router = build_router(Arc::new(AppState::new(controller, auth_token)));
    let addr = format!("{host}:{port}");
    let listener = TcpListener::bind(&addr).await?;
    info!("HTTP listening on {}", listener.local_addr()?);
    axum::serve(listener, router).with_graceful_shutdown(shutdown.cancelled_owned()).await?;
    Ok(())
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
