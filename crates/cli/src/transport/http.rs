// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP handlers for the local controller API.
//!
//! Every response carries `success`; failures use the shared
//! [`ErrorResponse`](crate::transport::ErrorResponse) envelope.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::controller::{ConnectOutcome, LoginOutcome, ToolConnectionState};
use crate::credential::CredentialDescriptor;
use crate::error::ErrorCode;
use crate::tool::ToolId;
use crate::transport::state::AppState;

// -- Types --------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub success: bool,
    pub status: String,
    pub uptime_secs: u64,
    pub ws_clients: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSummary {
    pub tool: ToolId,
    pub display_name: String,
    #[serde(flatten)]
    pub state: ToolConnectionState,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsResponse {
    pub success: bool,
    pub tools: Vec<ToolSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckResponse {
    pub success: bool,
    pub tool: ToolId,
    pub result: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionResponse {
    pub success: bool,
    pub tool: ToolId,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CredentialResponse {
    pub success: bool,
    pub credential: CredentialDescriptor,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConnectResponse {
    pub success: bool,
    pub tool: ToolId,
    pub outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential: Option<CredentialDescriptor>,
}

// -- Helpers ------------------------------------------------------------------

/// Parse the `{tool}` path segment into a known tool.
fn parse_tool(raw: &str) -> Result<ToolId, Response> {
    raw.parse::<ToolId>()
        .map_err(|e| ErrorCode::BadRequest.to_http_response(e.to_string()).into_response())
}

macro_rules! tool_or_reject {
    ($raw:expr) => {
        match parse_tool(&$raw) {
            Ok(tool) => tool,
            Err(resp) => return resp,
        }
    };
}

// -- Handlers -----------------------------------------------------------------

/// `GET /api/v1/health`
pub async fn health(State(s): State<Arc<AppState>>) -> impl IntoResponse {
    Json(HealthResponse {
        success: true,
        status: "running".to_owned(),
        uptime_secs: s.started_at.elapsed().as_secs(),
        ws_clients: s.ws_clients.load(Ordering::Relaxed),
    })
}

/// `GET /api/v1/tools`
pub async fn tools(State(s): State<Arc<AppState>>) -> impl IntoResponse {
    let registry = s.controller.registry();
    let tools = s
        .controller
        .states()
        .into_iter()
        .map(|(tool, state)| ToolSummary {
            tool,
            display_name: registry.get(tool).display_name.clone(),
            state,
        })
        .collect();
    Json(ToolsResponse { success: true, tools })
}

/// `GET /api/v1/tools/{tool}/installed`
pub async fn installed(State(s): State<Arc<AppState>>, Path(raw): Path<String>) -> Response {
    let tool = tool_or_reject!(raw);
    let result = s.controller.check_installed(tool).await;
    Json(CheckResponse { success: true, tool, result }).into_response()
}

/// `GET /api/v1/tools/{tool}/authenticated`
pub async fn authenticated(State(s): State<Arc<AppState>>, Path(raw): Path<String>) -> Response {
    let tool = tool_or_reject!(raw);
    let result = s.controller.check_authenticated(tool).await;
    Json(CheckResponse { success: true, tool, result }).into_response()
}

/// `POST /api/v1/tools/{tool}/install`
pub async fn install(State(s): State<Arc<AppState>>, Path(raw): Path<String>) -> Response {
    let tool = tool_or_reject!(raw);
    match s.controller.install(tool).await {
        Ok(()) => Json(ActionResponse { success: true, tool, message: "installed".to_owned() })
            .into_response(),
        Err(e) => e.code().to_http_response(e.to_string()).into_response(),
    }
}

/// `POST /api/v1/tools/{tool}/login`
pub async fn login(State(s): State<Arc<AppState>>, Path(raw): Path<String>) -> Response {
    let tool = tool_or_reject!(raw);
    let message = match s.controller.login(tool).await {
        Ok(LoginOutcome::SignedIn(signal)) => signal.as_str(),
        Ok(LoginOutcome::AlreadyInProgress) => "already_in_progress",
        Ok(LoginOutcome::AlreadyConnected) => "already_connected",
        Err(e) => return e.code().to_http_response(e.to_string()).into_response(),
    };
    Json(ActionResponse { success: true, tool, message: message.to_owned() }).into_response()
}

/// `POST /api/v1/tools/{tool}/logout`
pub async fn logout(State(s): State<Arc<AppState>>, Path(raw): Path<String>) -> Response {
    let tool = tool_or_reject!(raw);
    let outcome = s.controller.logout(tool).await;
    Json(outcome).into_response()
}

/// `POST /api/v1/tools/{tool}/extract`
pub async fn extract(State(s): State<Arc<AppState>>, Path(raw): Path<String>) -> Response {
    let tool = tool_or_reject!(raw);
    let credential = s.controller.extract(tool).await;
    Json(CredentialResponse { success: true, credential }).into_response()
}

/// `POST /api/v1/tools/{tool}/connect`
pub async fn connect(State(s): State<Arc<AppState>>, Path(raw): Path<String>) -> Response {
    let tool = tool_or_reject!(raw);
    let (outcome, credential) = match s.controller.connect(tool).await {
        Ok(ConnectOutcome::Connected(found)) => ("connected", Some(found)),
        Ok(ConnectOutcome::AlreadyInProgress) => ("already_in_progress", None),
        Ok(ConnectOutcome::AlreadyConnected) => ("already_connected", s.controller.last_known(tool)),
        Err(e) => return e.code().to_http_response(e.to_string()).into_response(),
    };
    Json(ConnectResponse { success: true, tool, outcome, credential }).into_response()
}

/// `POST /api/v1/tools/{tool}/copy`
pub async fn copy(State(s): State<Arc<AppState>>, Path(raw): Path<String>) -> Response {
    let tool = tool_or_reject!(raw);
    let outcome = s.controller.copy(tool).await;
    Json(ActionResponse { success: outcome.success, tool, message: outcome.message })
        .into_response()
}

#[cfg(test)]
#[path = "http_tests.rs"]
mod tests;
