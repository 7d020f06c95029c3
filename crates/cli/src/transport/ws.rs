// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! WebSocket feed of controller events.
//!
//! Each [`ControllerEvent`] is sent as one JSON text frame, internally tagged
//! by `event`. Client frames other than close are ignored.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{RawQuery, State, WebSocketUpgrade};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast::error::RecvError;
use tracing::debug;

use crate::event::ControllerEvent;
use crate::transport::auth;
use crate::transport::state::AppState;

/// WebSocket upgrade handler. Accepts the token as a Bearer header or a
/// `token` query parameter.
pub async fn ws_handler(
    State(state): State<Arc<AppState>>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let presented = auth::bearer_token(&headers)
        .into_iter()
        .chain(query.as_deref().and_then(auth::query_token));
    if let Err(code) = auth::authorize(state.auth_token.as_ref(), presented) {
        return code.to_http_response("unauthorized").into_response();
    }

    ws.on_upgrade(move |socket| handle_connection(state, socket)).into_response()
}

/// Per-connection event loop.
async fn handle_connection(state: Arc<AppState>, socket: WebSocket) {
    let mut events = state.controller.subscribe();
    state.ws_clients.fetch_add(1, Ordering::Relaxed);

    let (mut ws_tx, mut ws_rx) = socket.split();

    loop {
        tokio::select! {
            event = events.recv() => {
                let event = match event {
                    Ok(e) => e,
                    Err(RecvError::Lagged(n)) => {
                        debug!("ws client lagged, skipped {n} events");
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                };
                if send_json(&mut ws_tx, &event).await.is_err() {
                    break;
                }
            }
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    state.ws_clients.fetch_sub(1, Ordering::Relaxed);
}

async fn send_json<S>(tx: &mut S, event: &ControllerEvent) -> Result<(), ()>
where
    S: SinkExt<Message> + Unpin,
{
    let text = serde_json::to_string(event).map_err(|_| ())?;
    tx.send(Message::Text(text.into())).await.map_err(|_| ())
}

#[cfg(test)]
#[path = "ws_tests.rs"]
mod tests;
