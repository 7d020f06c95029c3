// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Short-lived localhost listeners that receive OAuth redirects.

use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::extract::{Query, State};
use axum::response::Html;
use axum::routing::get;
use axum::Router;
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::tool::ToolId;

/// Paths a provider may redirect to.
pub const ACCEPTED_PATHS: &[&str] =
    &["/callback", "/oauth/callback", "/oauth2callback", "/auth/callback", "/success"];

/// Bound on how long `stop` waits for in-flight requests before aborting.
const STOP_DRAIN: Duration = Duration::from_secs(1);

const SUCCESS_PAGE: &str = "<!doctype html><html><head><title>Authentication complete</title>\
<style>body{font-family:system-ui,sans-serif;text-align:center;padding-top:15vh}</style></head>\
<body><h1>Authentication complete</h1><p>You can close this window and return to the app.</p>\
</body></html>";

const ERROR_PAGE: &str = "<!doctype html><html><head><title>Authentication failed</title></head>\
<body style=\"font-family:system-ui,sans-serif;text-align:center;padding-top:15vh\">\
<h1>Authentication failed</h1><p>Return to the app for details.</p></body></html>";

/// First redirect received by a callback listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackOutcome {
    pub tool: ToolId,
    pub path: String,
    pub code: Option<String>,
    /// Provider-reported `error` parameter.
    pub error: Option<String>,
}

struct CallbackState {
    tool: ToolId,
    completion: Mutex<Option<oneshot::Sender<CallbackOutcome>>>,
    shutdown: CancellationToken,
    close_grace: Duration,
}

struct ServerEntry {
    lease: u64,
    port: u16,
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

/// A listener started for one login attempt.
#[derive(Debug)]
pub struct StartedServer {
    pub port: u16,
    /// Identifies this listener to [`CallbackServers::release`] and
    /// [`CallbackServers::abandon`], which leave a newer listener alone.
    pub lease: u64,
    /// Resolves with the first accepted request; closed if the server stops first.
    pub completion: oneshot::Receiver<CallbackOutcome>,
}

/// Per-tool callback listeners. At most one is live per tool.
#[derive(Default)]
pub struct CallbackServers {
    servers: Mutex<HashMap<ToolId, ServerEntry>>,
    next_lease: AtomicU64,
}

impl CallbackServers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a listener for `tool` on `port`, or an ephemeral port if taken.
    ///
    /// Any listener already running for `tool` is stopped first.
    pub async fn start(
        &self,
        tool: ToolId,
        port: u16,
        close_grace: Duration,
    ) -> anyhow::Result<StartedServer> {
        self.stop(tool).await;

        let listener = bind_with_fallback(port).await?;
        let bound = listener.local_addr()?.port();
        let (tx, rx) = oneshot::channel();
        let shutdown = CancellationToken::new();
        let state = Arc::new(CallbackState {
            tool,
            completion: Mutex::new(Some(tx)),
            shutdown: shutdown.clone(),
            close_grace,
        });

        let router = build_router(state);
        let sd = shutdown.clone();
        let task = tokio::spawn(async move {
            if let Err(e) =
                axum::serve(listener, router).with_graceful_shutdown(sd.cancelled_owned()).await
            {
                warn!(%tool, "callback server error: {e}");
            }
            debug!(%tool, "callback server closed");
        });

        info!(%tool, port = bound, "callback server listening");
        let lease = self.next_lease.fetch_add(1, Ordering::Relaxed);
        let replaced =
            self.servers.lock().insert(tool, ServerEntry { lease, port: bound, shutdown, task });
        if let Some(replaced) = replaced {
            abort(tool, replaced);
        }
        Ok(StartedServer { port: bound, lease, completion: rx })
    }

    /// Port of the live listener for `tool`, if any.
    pub fn port(&self, tool: ToolId) -> Option<u16> {
        let servers = self.servers.lock();
        servers.get(&tool).filter(|e| !e.task.is_finished()).map(|e| e.port)
    }

    pub fn is_active(&self, tool: ToolId) -> bool {
        self.port(tool).is_some()
    }

    /// Close the listener for `tool` immediately.
    pub async fn stop(&self, tool: ToolId) {
        let entry = self.servers.lock().remove(&tool);
        if let Some(entry) = entry {
            close(tool, entry).await;
        }
    }

    /// Close `tool`'s listener if it is still the one `lease` started.
    pub async fn release(&self, tool: ToolId, lease: u64) {
        let entry = self.take_lease(tool, lease);
        if let Some(entry) = entry {
            close(tool, entry).await;
        }
    }

    /// Synchronous [`release`](Self::release) for drop paths: the listener
    /// task is aborted, which closes its socket without draining.
    pub fn abandon(&self, tool: ToolId, lease: u64) {
        if let Some(entry) = self.take_lease(tool, lease) {
            abort(tool, entry);
        }
    }

    fn take_lease(&self, tool: ToolId, lease: u64) -> Option<ServerEntry> {
        let mut servers = self.servers.lock();
        match servers.get(&tool) {
            Some(entry) if entry.lease == lease => servers.remove(&tool),
            _ => None,
        }
    }

    /// Close every listener.
    pub async fn stop_all(&self) {
        let entries: Vec<(ToolId, ServerEntry)> = self.servers.lock().drain().collect();
        for (tool, entry) in entries {
            close(tool, entry).await;
        }
    }
}

async fn close(tool: ToolId, entry: ServerEntry) {
    entry.shutdown.cancel();
    let mut task = entry.task;
    if tokio::time::timeout(STOP_DRAIN, &mut task).await.is_err() {
        task.abort();
        let _ = task.await;
    }
    debug!(%tool, port = entry.port, "callback server stopped");
}

fn abort(tool: ToolId, entry: ServerEntry) {
    entry.shutdown.cancel();
    entry.task.abort();
    debug!(%tool, port = entry.port, "callback server aborted");
}

async fn bind_with_fallback(port: u16) -> anyhow::Result<TcpListener> {
    let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
    match TcpListener::bind(addr).await {
        Ok(listener) => Ok(listener),
        Err(e) if port != 0 && e.kind() == std::io::ErrorKind::AddrInUse => {
            warn!(port, "callback port in use, falling back to ephemeral port");
            TcpListener::bind(SocketAddr::from((Ipv4Addr::LOCALHOST, 0)))
                .await
                .context("bind ephemeral callback port")
        }
        Err(e) => Err(e).with_context(|| format!("bind callback port {port}")),
    }
}

fn build_router(state: Arc<CallbackState>) -> Router {
    let mut router = Router::new();
    for path in ACCEPTED_PATHS {
        router = router.route(path, get(handle_callback));
    }
    router.with_state(state)
}

async fn handle_callback(
    State(state): State<Arc<CallbackState>>,
    uri: axum::http::Uri,
    Query(params): Query<HashMap<String, String>>,
) -> Html<&'static str> {
    let error = params.get("error").cloned();
    let page = if error.is_some() { ERROR_PAGE } else { SUCCESS_PAGE };

    let sender = state.completion.lock().take();
    let Some(sender) = sender else {
        debug!(tool = %state.tool, "repeat callback request ignored");
        return Html(page);
    };

    let outcome = CallbackOutcome {
        tool: state.tool,
        path: uri.path().to_owned(),
        code: params.get("code").cloned(),
        error,
    };
    info!(tool = %state.tool, has_code = outcome.code.is_some(), "callback received");
    let _ = sender.send(outcome);

    let shutdown = state.shutdown.clone();
    let grace = state.close_grace;
    tokio::spawn(async move {
        tokio::time::sleep(grace).await;
        shutdown.cancel();
    });

    Html(page)
}

#[cfg(test)]
#[path = "callback_tests.rs"]
mod tests;
