// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Presenting the OAuth URL: the system browser, or an embedded surface
//! whose navigations are inspected for completion.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use anyhow::Context;
use reqwest::{Client, Url};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::report::ensure_crypto_provider;

/// Bound on the synthetic request to the local callback listener.
const FORWARD_TIMEOUT: Duration = Duration::from_secs(5);

/// Opens a URL outside the app.
pub trait UrlOpener: Send + Sync {
    fn open(&self, url: &str) -> anyhow::Result<()>;
}

/// Hands URLs to the platform's default browser.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemOpener;

impl UrlOpener for SystemOpener {
    fn open(&self, url: &str) -> anyhow::Result<()> {
        open::that_detached(url).context("failed to open browser")?;
        info!("opened {url} in system browser");
        Ok(())
    }
}

/// Something that happened in an embedded browser surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationEvent {
    /// A navigation or redirect reached `url`.
    Navigated(String),
    /// The user closed the window.
    Closed,
}

/// An in-app browser window. The GUI lives outside this crate.
pub trait BrowserSurface: Send {
    fn navigate(&mut self, url: &str) -> anyhow::Result<()>;

    fn close(&mut self);

    /// Next navigation event; `None` once the surface is gone.
    fn next_event(&mut self) -> Pin<Box<dyn Future<Output = Option<NavigationEvent>> + Send + '_>>;
}

/// Creates a browser surface for one login attempt.
pub trait BrowserLauncher: Send + Sync {
    fn launch(&self) -> anyhow::Result<Box<dyn BrowserSurface>>;
}

/// Result of testing one navigated URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationMatch {
    Success { code: Option<String> },
    Error(String),
    Continue,
}

fn query_value(url: &Url, key: &str) -> Option<String> {
    url.query_pairs().find(|(k, _)| k == key).map(|(_, v)| v.into_owned())
}

/// Classify a navigated URL.
///
/// Order: tool-specific success fragments, then generic success (a `code`
/// query parameter outside an authorize endpoint, or a success-like path),
/// then errors (an `error` parameter or a denied/error path).
pub fn classify_navigation(url: &str, tool_patterns: &[&str]) -> NavigationMatch {
    let Ok(parsed) = Url::parse(url) else {
        return NavigationMatch::Continue;
    };
    let code = query_value(&parsed, "code").filter(|c| !c.is_empty());

    if tool_patterns.iter().any(|p| url.contains(p)) {
        return NavigationMatch::Success { code };
    }

    let path = parsed.path().to_lowercase();
    if code.is_some() && !path.ends_with("/authorize") && !path.ends_with("/auth") {
        return NavigationMatch::Success { code };
    }
    if path.contains("success") || path.contains("authenticated") {
        return NavigationMatch::Success { code: None };
    }

    if let Some(error) = query_value(&parsed, "error") {
        let detail = match query_value(&parsed, "error_description") {
            Some(desc) => format!("{error}: {desc}"),
            None => error,
        };
        return NavigationMatch::Error(detail);
    }
    if path.contains("denied") || path.split('/').any(|seg| seg == "error") {
        return NavigationMatch::Error(format!("navigated to {}", parsed.path()));
    }

    NavigationMatch::Continue
}

/// How an embedded browser session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrowserOutcome {
    Success { code: Option<String> },
    Denied(String),
    /// The user closed the window before any match.
    Closed,
}

/// Drives one embedded browser window through `Opened → Matched*`.
pub struct EmbeddedBrowser {
    surface: Box<dyn BrowserSurface>,
    patterns: &'static [&'static str],
    callback_base: Option<String>,
    close_delay: Duration,
}

impl EmbeddedBrowser {
    pub fn new(
        surface: Box<dyn BrowserSurface>,
        patterns: &'static [&'static str],
        close_delay: Duration,
    ) -> Self {
        Self { surface, patterns, callback_base: None, close_delay }
    }

    /// Local callback server to forward completion to (`http://127.0.0.1:<port>`).
    pub fn with_callback(mut self, port: u16) -> Self {
        self.callback_base = Some(format!("http://127.0.0.1:{port}"));
        self
    }

    /// Open `url` and wait for the first matching navigation.
    ///
    /// Events after the first match are never consumed. Cancelling closes
    /// the window and yields [`BrowserOutcome::Closed`].
    pub async fn run(
        mut self,
        url: &str,
        cancel: &CancellationToken,
    ) -> anyhow::Result<BrowserOutcome> {
        self.surface.navigate(url)?;
        debug!("embedded browser opened");

        loop {
            let event = tokio::select! {
                event = self.surface.next_event() => event,
                _ = cancel.cancelled() => {
                    self.surface.close();
                    return Ok(BrowserOutcome::Closed);
                }
            };
            let Some(NavigationEvent::Navigated(next)) = event else {
                info!("embedded browser closed by user");
                return Ok(BrowserOutcome::Closed);
            };

            match classify_navigation(&next, self.patterns) {
                NavigationMatch::Continue => continue,
                NavigationMatch::Success { code } => {
                    info!(has_code = code.is_some(), "embedded browser matched success");
                    self.forward_to_callback(code.as_deref()).await;
                    tokio::time::sleep(self.close_delay).await;
                    self.surface.close();
                    return Ok(BrowserOutcome::Success { code });
                }
                NavigationMatch::Error(detail) => {
                    warn!("embedded browser matched error: {detail}");
                    self.surface.close();
                    return Ok(BrowserOutcome::Denied(detail));
                }
            }
        }
    }

    /// Replay the completion against the local callback listener, then show
    /// its success page in the window.
    async fn forward_to_callback(&mut self, code: Option<&str>) {
        let Some(ref base) = self.callback_base else {
            return;
        };
        let success = format!("{base}/success");
        let target = match code {
            Some(code) => Url::parse_with_params(&format!("{base}/callback"), [("code", code)])
                .map(String::from)
                .unwrap_or_else(|_| success.clone()),
            None => success.clone(),
        };
        match send_callback(&target).await {
            Ok(()) => debug!("forwarded completion to callback server"),
            Err(e) => warn!("failed to forward to callback server: {e:#}"),
        }
        if let Err(e) = self.surface.navigate(&success) {
            debug!("success page not shown: {e:#}");
        }
    }
}

async fn send_callback(target: &str) -> anyhow::Result<()> {
    ensure_crypto_provider();
    let client = Client::builder().timeout(FORWARD_TIMEOUT).no_proxy().build()?;
    client.get(target).send().await?.error_for_status()?;
    Ok(())
}

#[cfg(test)]
#[path = "browser_tests.rs"]
mod tests;
