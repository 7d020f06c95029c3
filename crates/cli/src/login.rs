// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One login attempt: spawn the CLI, then race every completion channel.
//!
//! The race is a single `select!` loop whose arms are the scraped output,
//! the credential poll, the callback listener, the embedded browser, the
//! URL fallback timer, the wall-clock deadline, controller cancellation and
//! child exit. Returning from the loop drops every timer, so an attempt
//! resolves exactly once. A [`TeardownGuard`] covers the case where the
//! attempt future itself is dropped before teardown finishes.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin};
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::browser::{BrowserLauncher, BrowserOutcome, EmbeddedBrowser, UrlOpener};
use crate::callback::{CallbackOutcome, CallbackServers};
use crate::config::Config;
use crate::credential::{CredentialLocator, Fingerprint};
use crate::env::PreparedEnv;
use crate::error::LoginError;
use crate::event::{ControllerEvent, Phase};
use crate::install::is_installed;
use crate::process;
use crate::scrape::{OutputScraper, ScrapeEvent};
use crate::strategy::{CodeDelivery, LoginStrategy};
use crate::tool::{BrowserMode, ToolDescriptor, ToolId};

/// How long cleanup waits for the embedded browser task to wind down.
const BROWSER_SHUTDOWN: Duration = Duration::from_secs(1);

/// Floor for the credential poll period; `interval` rejects zero.
const MIN_POLL: Duration = Duration::from_millis(1);

/// Timers for one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoginTiming {
    pub poll: Duration,
    pub url_fallback: Duration,
    pub flush_grace: Duration,
    pub kill_grace: Duration,
    pub callback_close_grace: Duration,
    pub browser_close_delay: Duration,
    pub timeout: Duration,
}

impl LoginTiming {
    pub fn from_config(config: &Config, descriptor: &ToolDescriptor) -> Self {
        Self {
            poll: config.credential_poll(),
            url_fallback: config.url_fallback(),
            flush_grace: config.flush_grace(),
            kill_grace: config.kill_grace(),
            callback_close_grace: config.callback_close_grace(),
            browser_close_delay: config.browser_close_delay(),
            timeout: config.login_timeout().unwrap_or(descriptor.login_timeout),
        }
    }

    fn poll_period(&self) -> Duration {
        self.poll.max(MIN_POLL)
    }
}

/// Which channel won the race.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginSignal {
    /// A success phrase or driver marker in the output.
    Output(String),
    /// A credential location changed since the attempt began.
    Credentials,
    /// The callback listener received the redirect.
    Callback,
    /// The embedded browser matched a success URL.
    Browser,
    /// The CLI exited cleanly without any other signal.
    ProcessExit,
}

impl LoginSignal {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Output(_) => "output",
            Self::Credentials => "credentials",
            Self::Callback => "callback",
            Self::Browser => "browser",
            Self::ProcessExit => "process_exit",
        }
    }
}

/// Everything one attempt borrows from the controller.
pub struct LoginAttempt<'a> {
    pub descriptor: &'a ToolDescriptor,
    pub strategy: &'a dyn LoginStrategy,
    pub env: &'a PreparedEnv,
    pub locator: &'a CredentialLocator,
    pub callbacks: &'a CallbackServers,
    pub opener: Arc<dyn UrlOpener>,
    pub browser: Option<Arc<dyn BrowserLauncher>>,
    pub automation_program: &'a Path,
    pub events: broadcast::Sender<ControllerEvent>,
    pub timing: LoginTiming,
    /// Cancelled by the controller on shutdown.
    pub cancel: CancellationToken,
}

/// Kills the process group and drops the callback listener when an attempt
/// is dropped mid-flight. Disarmed once the async teardown has run.
struct TeardownGuard<'a> {
    callbacks: &'a CallbackServers,
    tool: ToolId,
    lease: u64,
    pid: Option<u32>,
    browser_cancel: CancellationToken,
    armed: bool,
}

impl TeardownGuard<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for TeardownGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        warn!(tool = %self.tool, pid = self.pid, "login attempt dropped before teardown");
        self.browser_cancel.cancel();
        if let Some(pid) = self.pid {
            process::kill_group(pid);
        }
        self.callbacks.abandon(self.tool, self.lease);
    }
}

/// Mutable per-attempt state threaded through the race handlers.
struct AttemptState {
    scraper: OutputScraper,
    stdin: Option<ChildStdin>,
    answered: Vec<bool>,
    code_delivered: bool,
    auth_url: Option<String>,
    opened_externally: bool,
    callback_port: u16,
    browser_cancel: CancellationToken,
    browser_task: Option<JoinHandle<()>>,
}

/// Outcome of handling one output chunk.
enum OutputStep {
    Continue,
    /// A new authorization URL was seen.
    Url(String),
    Done(Result<LoginSignal, LoginError>),
}

impl LoginAttempt<'_> {
    /// Run the attempt to completion and tear everything down.
    pub async fn run(self) -> Result<LoginSignal, LoginError> {
        let tool = self.descriptor.id;
        if self.descriptor.requires_automation
            && !program_available(self.automation_program, self.env).await
        {
            return Err(LoginError::PrerequisiteMissing(format!(
                "automation driver not found: {}",
                self.automation_program.display()
            )));
        }

        let argv = self.strategy.login_argv(self.descriptor, self.automation_program);
        let baseline = self.locator.fingerprint(self.descriptor).await;
        let server = self
            .callbacks
            .start(tool, self.descriptor.callback_port, self.timing.callback_close_grace)
            .await?;
        let mut guard = TeardownGuard {
            callbacks: self.callbacks,
            tool,
            lease: server.lease,
            pid: None,
            browser_cancel: CancellationToken::new(),
            armed: true,
        };

        let mut child = match process::spawn(&argv, self.env, None) {
            Ok(child) => child,
            Err(e) => {
                self.callbacks.release(tool, server.lease).await;
                guard.disarm();
                return Err(LoginError::SpawnFailed(format!("{e:#}")));
            }
        };
        guard.pid = child.id();
        info!(%tool, pid = child.id(), timeout_secs = self.timing.timeout.as_secs(), "login started");

        let mut state = match OutputScraper::new(
            self.strategy.success_phrases(),
            self.strategy.failure_phrases(),
        ) {
            Ok(scraper) => AttemptState {
                scraper,
                stdin: child.stdin.take(),
                answered: vec![false; self.strategy.prompt_responses().len()],
                code_delivered: false,
                auth_url: None,
                opened_externally: false,
                callback_port: server.port,
                browser_cancel: guard.browser_cancel.clone(),
                browser_task: None,
            },
            Err(e) => {
                process::terminate(&mut child, Duration::ZERO, self.timing.kill_grace).await;
                self.callbacks.release(tool, server.lease).await;
                guard.disarm();
                return Err(e.into());
            }
        };

        let result = self.race(&mut child, &mut state, server.completion, &baseline).await;

        state.browser_cancel.cancel();
        if let Some(task) = state.browser_task.take() {
            if tokio::time::timeout(BROWSER_SHUTDOWN, task).await.is_err() {
                warn!(%tool, "embedded browser did not close in time");
            }
        }
        drop(state.stdin.take());
        process::terminate(&mut child, self.timing.flush_grace, self.timing.kill_grace).await;
        self.callbacks.release(tool, server.lease).await;
        guard.disarm();

        match result {
            Ok(ref signal) => info!(%tool, ?signal, "login completed"),
            Err(ref e) => warn!(%tool, "login failed: {e}"),
        }
        result
    }

    async fn race(
        &self,
        child: &mut Child,
        state: &mut AttemptState,
        mut callback: oneshot::Receiver<CallbackOutcome>,
        baseline: &Fingerprint,
    ) -> Result<LoginSignal, LoginError> {
        let tool = self.descriptor.id;
        let mut output = process::pump_output(child, 64);
        let mut output_open = true;
        let mut callback_open = true;

        let (browser_tx, mut browser_rx) = oneshot::channel::<anyhow::Result<BrowserOutcome>>();
        let mut browser_tx = Some(browser_tx);
        let mut browser_open = false;

        let period = self.timing.poll_period();
        let mut poll = tokio::time::interval_at(Instant::now() + period, period);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let deadline = tokio::time::sleep(self.timing.timeout);
        tokio::pin!(deadline);
        let fallback = tokio::time::sleep(self.timing.url_fallback);
        tokio::pin!(fallback);
        let mut fallback_armed = false;
        let exit_settle = tokio::time::sleep(self.timing.flush_grace);
        tokio::pin!(exit_settle);
        let mut exit_code: Option<Option<i32>> = None;

        loop {
            tokio::select! {
                chunk = output.recv(), if output_open => match chunk {
                    Some((_, raw)) => match self.on_output(state, &raw).await {
                        OutputStep::Continue => {}
                        OutputStep::Url(url) => {
                            if self.present_url(state, &url, &mut browser_tx) {
                                browser_open = true;
                            } else {
                                self.open_externally(state);
                            }
                            if !state.opened_externally {
                                fallback.as_mut().reset(Instant::now() + self.timing.url_fallback);
                                fallback_armed = true;
                            }
                        }
                        OutputStep::Done(result) => return result,
                    },
                    None => {
                        output_open = false;
                        if let Some(code) = exit_code {
                            return self.on_exit(state, code, baseline).await;
                        }
                    }
                },

                _ = poll.tick() => {
                    if self.locator.fingerprint(self.descriptor).await.appeared_since(baseline) {
                        debug!(%tool, "credential location changed");
                        return Ok(LoginSignal::Credentials);
                    }
                }

                received = &mut callback, if callback_open => {
                    callback_open = false;
                    if let Ok(outcome) = received {
                        if let Some(error) = outcome.error {
                            return Err(LoginError::AuthenticationDenied(error));
                        }
                        if self.deliver_code(state, outcome.code.as_deref()).await {
                            return Ok(LoginSignal::Callback);
                        }
                    }
                }

                outcome = &mut browser_rx, if browser_open => {
                    browser_open = false;
                    match outcome {
                        Ok(Ok(BrowserOutcome::Success { code })) => {
                            if self.deliver_code(state, code.as_deref()).await {
                                return Ok(LoginSignal::Browser);
                            }
                        }
                        Ok(Ok(BrowserOutcome::Denied(detail))) => {
                            return Err(LoginError::AuthenticationDenied(detail));
                        }
                        Ok(Ok(BrowserOutcome::Closed)) => {
                            if self.locator.check_authenticated(self.descriptor).await {
                                return Ok(LoginSignal::Credentials);
                            }
                            return Err(LoginError::AuthenticationDenied(
                                "login window closed before completion".to_owned(),
                            ));
                        }
                        Ok(Err(e)) => {
                            warn!(%tool, "embedded browser failed: {e:#}");
                            self.open_externally(state);
                        }
                        Err(_) => {}
                    }
                }

                () = &mut fallback, if fallback_armed => {
                    fallback_armed = false;
                    self.open_externally(state);
                }

                () = &mut deadline => {
                    return Err(LoginError::Timeout(self.timing.timeout));
                }

                () = self.cancel.cancelled() => {
                    info!(%tool, "login cancelled");
                    return Err(LoginError::Cancelled);
                }

                status = child.wait(), if exit_code.is_none() => {
                    let code = match status {
                        Ok(status) => status.code(),
                        Err(e) => return Err(LoginError::Internal(format!("wait: {e}"))),
                    };
                    debug!(%tool, ?code, "login process exited");
                    if !output_open {
                        return self.on_exit(state, code, baseline).await;
                    }
                    exit_code = Some(code);
                    exit_settle.as_mut().reset(Instant::now() + self.timing.flush_grace);
                }

                () = &mut exit_settle, if exit_code.is_some() => {
                    let code = exit_code.flatten();
                    return self.on_exit(state, code, baseline).await;
                }
            }
        }
    }

    async fn on_output(&self, state: &mut AttemptState, raw: &str) -> OutputStep {
        let tool = self.descriptor.id;
        let (clean, events) = state.scraper.feed(raw);
        for line in clean.lines().map(str::trim).filter(|l| !l.is_empty()) {
            debug!(%tool, "cli: {line}");
            self.emit(ControllerEvent::Log { tool, line: line.to_owned() });
        }

        for (i, prompt) in self.strategy.prompt_responses().iter().enumerate() {
            if !state.answered[i] && state.scraper.transcript().contains(prompt.pattern) {
                state.answered[i] = true;
                debug!(%tool, pattern = prompt.pattern, "answering prompt");
                write_stdin(&mut state.stdin, prompt.input).await;
            }
        }

        let mut step = OutputStep::Continue;
        for event in events {
            match event {
                ScrapeEvent::Failure(reason) => {
                    return OutputStep::Done(Err(LoginError::AuthenticationDenied(reason)));
                }
                ScrapeEvent::Success(phrase) => {
                    return OutputStep::Done(Ok(LoginSignal::Output(phrase)));
                }
                ScrapeEvent::AuthUrl(url) => {
                    info!(%tool, "authorization URL detected");
                    state.auth_url = Some(url.clone());
                    self.emit(ControllerEvent::status(
                        tool,
                        Phase::AuthUrl,
                        format!("Complete sign-in in the browser: {url}"),
                    ));
                    step = OutputStep::Url(url);
                }
            }
        }
        step
    }

    /// Decide after the child exited and its output drained.
    async fn on_exit(
        &self,
        state: &mut AttemptState,
        code: Option<i32>,
        baseline: &Fingerprint,
    ) -> Result<LoginSignal, LoginError> {
        for event in state.scraper.finish() {
            match event {
                ScrapeEvent::Failure(reason) => return Err(LoginError::AuthenticationDenied(reason)),
                ScrapeEvent::Success(phrase) => return Ok(LoginSignal::Output(phrase)),
                ScrapeEvent::AuthUrl(_) => {}
            }
        }
        if self.locator.fingerprint(self.descriptor).await.appeared_since(baseline) {
            return Ok(LoginSignal::Credentials);
        }
        match code {
            Some(0) => Ok(LoginSignal::ProcessExit),
            code => Err(LoginError::ProcessExited { code }),
        }
    }

    /// Launch the embedded browser when the tool uses one. Returns whether
    /// it did; otherwise the caller opens the URL externally.
    fn present_url(
        &self,
        state: &mut AttemptState,
        url: &str,
        browser_tx: &mut Option<oneshot::Sender<anyhow::Result<BrowserOutcome>>>,
    ) -> bool {
        if self.descriptor.browser != BrowserMode::Embedded {
            return false;
        }
        let Some(ref launcher) = self.browser else {
            return false;
        };
        let Some(tx) = browser_tx.take() else {
            return false;
        };
        let surface = match launcher.launch() {
            Ok(surface) => surface,
            Err(e) => {
                warn!(tool = %self.descriptor.id, "cannot open embedded browser: {e:#}");
                return false;
            }
        };

        let browser = EmbeddedBrowser::new(
            surface,
            self.strategy.success_url_patterns(),
            self.timing.browser_close_delay,
        )
        .with_callback(state.callback_port);
        let cancel = state.browser_cancel.clone();
        let url = url.to_owned();
        state.browser_task = Some(tokio::spawn(async move {
            let outcome = browser.run(&url, &cancel).await;
            let _ = tx.send(outcome);
        }));
        true
    }

    fn open_externally(&self, state: &mut AttemptState) {
        if state.opened_externally {
            return;
        }
        let Some(ref url) = state.auth_url else {
            return;
        };
        state.opened_externally = true;
        if let Err(e) = self.opener.open(url) {
            warn!(tool = %self.descriptor.id, "{e:#}");
        }
    }

    /// Hand an authorization code to the child when the strategy wants it
    /// there. Returns true when the signal completes the attempt.
    async fn deliver_code(&self, state: &mut AttemptState, code: Option<&str>) -> bool {
        let CodeDelivery::Stdin { .. } = self.strategy.code_delivery() else {
            return true;
        };
        let Some(code) = code else {
            return true;
        };
        if state.code_delivered {
            return false;
        }
        state.code_delivered = true;
        if let Some(line) = self.strategy.code_delivery().stdin_line(code) {
            debug!(tool = %self.descriptor.id, "forwarding authorization code to login process");
            write_stdin(&mut state.stdin, &line).await;
        }
        false
    }

    fn emit(&self, event: ControllerEvent) {
        let _ = self.events.send(event);
    }
}

async fn write_stdin(stdin: &mut Option<ChildStdin>, text: &str) {
    let Some(pipe) = stdin.as_mut() else {
        return;
    };
    let result = async {
        pipe.write_all(text.as_bytes()).await?;
        pipe.flush().await
    }
    .await;
    if let Err(e) = result {
        debug!("stdin closed: {e}");
        *stdin = None;
    }
}

/// Whether `program` can be executed: an existing file for paths, a `PATH`
/// lookup for bare names.
pub async fn program_available(program: &Path, env: &PreparedEnv) -> bool {
    if program.components().count() > 1 {
        return program.is_file();
    }
    is_installed(&program.to_string_lossy(), env).await
}

#[cfg(test)]
#[path = "login_tests.rs"]
mod tests;
