// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use super::*;
use crate::test_support::{http_client, port_is_free};

const GRACE: Duration = Duration::from_millis(100);

#[tokio::test]
async fn redirect_signals_completion_with_code() -> anyhow::Result<()> {
    let servers = CallbackServers::new();
    let started = servers.start(ToolId::Codex, 0, GRACE).await?;
    let port = started.port;

    let resp = http_client()?
        .get(format!("http://127.0.0.1:{port}/auth/callback?code=abc123&state=s"))
        .send()
        .await?;
    assert!(resp.status().is_success());
    assert!(resp.text().await?.contains("Authentication complete"));

    let outcome = started.completion.await?;
    assert_eq!(outcome.tool, ToolId::Codex);
    assert_eq!(outcome.path, "/auth/callback");
    assert_eq!(outcome.code.as_deref(), Some("abc123"));
    assert!(outcome.error.is_none());

    servers.stop_all().await;
    Ok(())
}

#[tokio::test]
async fn repeat_requests_do_not_hang_or_double_signal() -> anyhow::Result<()> {
    let servers = CallbackServers::new();
    let started = servers.start(ToolId::Gemini, 0, Duration::from_secs(5)).await?;
    let client = http_client()?;
    let url = format!("http://127.0.0.1:{}/oauth2callback?code=x", started.port);

    let (a, b) = tokio::join!(client.get(&url).send(), client.get(&url).send());
    assert!(a?.status().is_success());
    assert!(b?.status().is_success());

    let outcome = started.completion.await?;
    assert_eq!(outcome.code.as_deref(), Some("x"));

    servers.stop(ToolId::Gemini).await;
    Ok(())
}

#[tokio::test]
async fn provider_error_is_reported() -> anyhow::Result<()> {
    let servers = CallbackServers::new();
    let started = servers.start(ToolId::Claude, 0, GRACE).await?;
    let resp = http_client()?
        .get(format!("http://127.0.0.1:{}/callback?error=access_denied", started.port))
        .send()
        .await?;
    assert!(resp.text().await?.contains("Authentication failed"));
    let outcome = started.completion.await?;
    assert_eq!(outcome.error.as_deref(), Some("access_denied"));
    servers.stop_all().await;
    Ok(())
}

#[tokio::test]
async fn unknown_path_is_not_found() -> anyhow::Result<()> {
    let servers = CallbackServers::new();
    let started = servers.start(ToolId::Claude, 0, GRACE).await?;
    let resp =
        http_client()?.get(format!("http://127.0.0.1:{}/favicon.ico", started.port)).send().await?;
    assert_eq!(resp.status().as_u16(), 404);
    servers.stop_all().await;
    Ok(())
}

#[tokio::test]
async fn occupied_port_falls_back_to_ephemeral() -> anyhow::Result<()> {
    let blocker = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let taken = blocker.local_addr()?.port();

    let servers = CallbackServers::new();
    let started = servers.start(ToolId::Codex, taken, GRACE).await?;
    assert_ne!(started.port, taken);
    assert_eq!(servers.port(ToolId::Codex), Some(started.port));

    servers.stop_all().await;
    Ok(())
}

#[tokio::test]
async fn restart_replaces_previous_listener() -> anyhow::Result<()> {
    let servers = CallbackServers::new();
    let first = servers.start(ToolId::Codex, 0, GRACE).await?;
    let second = servers.start(ToolId::Codex, 0, GRACE).await?;

    assert!(port_is_free(first.port).await);
    assert_eq!(servers.port(ToolId::Codex), Some(second.port));
    // The replaced listener's completion channel is closed, not left pending.
    assert!(first.completion.await.is_err());

    servers.stop_all().await;
    Ok(())
}

#[tokio::test]
async fn listener_closes_after_grace() -> anyhow::Result<()> {
    let servers = CallbackServers::new();
    let started = servers.start(ToolId::Gemini, 0, Duration::from_millis(20)).await?;
    http_client()?
        .get(format!("http://127.0.0.1:{}/success", started.port))
        .send()
        .await?;

    let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
    while servers.is_active(ToolId::Gemini) && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(!servers.is_active(ToolId::Gemini));
    Ok(())
}

#[tokio::test]
async fn stop_releases_port() -> anyhow::Result<()> {
    let servers = CallbackServers::new();
    let started = servers.start(ToolId::Claude, 0, GRACE).await?;
    servers.stop(ToolId::Claude).await;
    assert!(port_is_free(started.port).await);
    assert!(!servers.is_active(ToolId::Claude));
    Ok(())
}

#[tokio::test]
async fn stale_lease_leaves_newer_listener_running() -> anyhow::Result<()> {
    let servers = CallbackServers::new();
    let first = servers.start(ToolId::Codex, 0, GRACE).await?;
    let second = servers.start(ToolId::Codex, 0, GRACE).await?;

    servers.release(ToolId::Codex, first.lease).await;
    servers.abandon(ToolId::Codex, first.lease);
    assert_eq!(servers.port(ToolId::Codex), Some(second.port));

    servers.release(ToolId::Codex, second.lease).await;
    assert!(!servers.is_active(ToolId::Codex));
    assert!(port_is_free(second.port).await);
    Ok(())
}

#[tokio::test]
async fn abandon_frees_port_without_awaiting() -> anyhow::Result<()> {
    let servers = CallbackServers::new();
    let started = servers.start(ToolId::Gemini, 0, GRACE).await?;
    servers.abandon(ToolId::Gemini, started.lease);
    assert!(!servers.is_active(ToolId::Gemini));

    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !port_is_free(started.port).await && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(port_is_free(started.port).await);
    assert!(started.completion.await.is_err());
    Ok(())
}
