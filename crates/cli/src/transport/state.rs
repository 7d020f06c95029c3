// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::atomic::AtomicI32;
use std::sync::Arc;
use std::time::Instant;

use crate::controller::SessionController;
use crate::transport::auth::ApiToken;

/// Shared state passed to all handlers via the axum `State` extractor.
pub struct AppState {
    pub controller: Arc<SessionController>,
    /// Bearer token required on every route except health; `None` disables auth.
    pub auth_token: Option<ApiToken>,
    pub started_at: Instant,
    pub ws_clients: AtomicI32,
}

impl AppState {
    pub fn new(controller: Arc<SessionController>, auth_token: Option<String>) -> Self {
        Self {
            controller,
            auth_token: auth_token.map(ApiToken::new),
            started_at: Instant::now(),
            ws_clients: AtomicI32::new(0),
        }
    }
}
