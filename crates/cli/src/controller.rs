// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The session controller: owns per-tool connection state and composes
//! install, login and extraction into `connect`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::browser::{BrowserLauncher, SystemOpener, UrlOpener};
use crate::callback::CallbackServers;
use crate::clipboard::{Clipboard, SystemClipboard};
use crate::config::Config;
use crate::credential::{
    CredentialDescriptor, CredentialLocator, LogoutOutcome, SecureStore, SystemSecureStore,
};
use crate::env::{prepare_current, PreparedEnv};
use crate::error::LoginError;
use crate::event::{ControllerEvent, Phase};
use crate::install::{is_installed, Installer};
use crate::login::{LoginAttempt, LoginSignal, LoginTiming};
use crate::report::Reporter;
use crate::strategy;
use crate::tool::{ToolDescriptor, ToolId, ToolRegistry};

/// Headroom on top of the child grace periods when shutdown waits for
/// attempts to tear down.
const SHUTDOWN_SLACK: Duration = Duration::from_secs(2);

/// Connection flags for one tool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolConnectionState {
    pub connected: bool,
    pub in_progress: bool,
}

/// Result of a `connect` request.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectOutcome {
    Connected(CredentialDescriptor),
    /// Another attempt for the tool is running; nothing was done.
    AlreadyInProgress,
    /// The tool is already connected; nothing was done.
    AlreadyConnected,
}

/// Result of a `login` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    SignedIn(LoginSignal),
    /// Another attempt for the tool is running; nothing was done.
    AlreadyInProgress,
    /// The tool is already connected; nothing was done.
    AlreadyConnected,
}

/// Why an attempt was turned away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Busy {
    InProgress,
    Connected,
}

impl From<Busy> for ConnectOutcome {
    fn from(busy: Busy) -> Self {
        match busy {
            Busy::InProgress => Self::AlreadyInProgress,
            Busy::Connected => Self::AlreadyConnected,
        }
    }
}

impl From<Busy> for LoginOutcome {
    fn from(busy: Busy) -> Self {
        match busy {
            Busy::InProgress => Self::AlreadyInProgress,
            Busy::Connected => Self::AlreadyConnected,
        }
    }
}

/// Result of a `copy` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopyOutcome {
    pub success: bool,
    pub message: String,
}

/// Clears `in_progress` however an attempt exits.
struct InProgressGuard<'a> {
    states: &'a Mutex<HashMap<ToolId, ToolConnectionState>>,
    idle: &'a Notify,
    tool: ToolId,
}

impl Drop for InProgressGuard<'_> {
    fn drop(&mut self) {
        self.states.lock().entry(self.tool).or_default().in_progress = false;
        self.idle.notify_waiters();
    }
}

/// Builder for [`SessionController`]. Defaults talk to the real system.
pub struct ControllerBuilder {
    config: Config,
    home: PathBuf,
    registry: ToolRegistry,
    env: Option<PreparedEnv>,
    store: Arc<dyn SecureStore>,
    opener: Arc<dyn UrlOpener>,
    browser: Option<Arc<dyn BrowserLauncher>>,
    clipboard: Arc<dyn Clipboard>,
    automation_program: Option<PathBuf>,
    cancel: CancellationToken,
}

impl ControllerBuilder {
    pub fn new(config: Config, home: impl Into<PathBuf>) -> Self {
        Self {
            config,
            home: home.into(),
            registry: ToolRegistry::builtin(),
            env: None,
            store: Arc::new(SystemSecureStore),
            opener: Arc::new(SystemOpener),
            browser: None,
            clipboard: Arc::new(SystemClipboard),
            automation_program: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn registry(mut self, registry: ToolRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn env(mut self, env: PreparedEnv) -> Self {
        self.env = Some(env);
        self
    }

    pub fn secure_store(mut self, store: Arc<dyn SecureStore>) -> Self {
        self.store = store;
        self
    }

    pub fn opener(mut self, opener: Arc<dyn UrlOpener>) -> Self {
        self.opener = opener;
        self
    }

    pub fn browser(mut self, launcher: Arc<dyn BrowserLauncher>) -> Self {
        self.browser = Some(launcher);
        self
    }

    pub fn clipboard(mut self, clipboard: Arc<dyn Clipboard>) -> Self {
        self.clipboard = clipboard;
        self
    }

    pub fn automation_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.automation_program = Some(program.into());
        self
    }

    /// Token whose cancellation aborts in-flight login attempts.
    pub fn cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn build(self) -> anyhow::Result<SessionController> {
        let automation_program = match self.automation_program {
            Some(p) => p,
            None => self.config.automation_program()?,
        };
        let env = self.env.unwrap_or_else(|| prepare_current(&self.home));
        let reporter = self
            .config
            .token_endpoint
            .clone()
            .map(|endpoint| Reporter::new(endpoint, self.config.token_endpoint_token.clone()));
        let installer = Installer::new(
            env.clone(),
            Arc::clone(&self.opener),
            self.config.prerequisite_poll(),
            self.config.prerequisite_window(),
        );
        let (events, _) = broadcast::channel(256);

        Ok(SessionController {
            locator: CredentialLocator::new(&self.home, self.store),
            registry: self.registry,
            env,
            callbacks: Arc::new(CallbackServers::new()),
            opener: self.opener,
            browser: self.browser,
            clipboard: self.clipboard,
            installer,
            reporter,
            automation_program,
            states: Mutex::new(HashMap::new()),
            idle: Notify::new(),
            last_known: Mutex::new(HashMap::new()),
            events,
            cancel: self.cancel,
            config: self.config,
        })
    }
}

/// Owns every tool's connection state. Locks are never held across `.await`.
pub struct SessionController {
    config: Config,
    registry: ToolRegistry,
    env: PreparedEnv,
    locator: CredentialLocator,
    callbacks: Arc<CallbackServers>,
    opener: Arc<dyn UrlOpener>,
    browser: Option<Arc<dyn BrowserLauncher>>,
    clipboard: Arc<dyn Clipboard>,
    installer: Installer,
    reporter: Option<Reporter>,
    automation_program: PathBuf,
    states: Mutex<HashMap<ToolId, ToolConnectionState>>,
    /// Signalled whenever an attempt clears `in_progress`.
    idle: Notify,
    last_known: Mutex<HashMap<ToolId, CredentialDescriptor>>,
    events: broadcast::Sender<ControllerEvent>,
    cancel: CancellationToken,
}

impl SessionController {
    pub fn builder(config: Config, home: impl Into<PathBuf>) -> ControllerBuilder {
        ControllerBuilder::new(config, home)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ControllerEvent> {
        self.events.subscribe()
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn home(&self) -> &Path {
        self.locator.home()
    }

    pub fn callbacks(&self) -> &Arc<CallbackServers> {
        &self.callbacks
    }

    pub fn state(&self, tool: ToolId) -> ToolConnectionState {
        self.states.lock().get(&tool).copied().unwrap_or_default()
    }

    /// Snapshot of every tool's flags, in registry order.
    pub fn states(&self) -> Vec<(ToolId, ToolConnectionState)> {
        let states = self.states.lock();
        ToolId::ALL.iter().map(|id| (*id, states.get(id).copied().unwrap_or_default())).collect()
    }

    pub fn last_known(&self, tool: ToolId) -> Option<CredentialDescriptor> {
        self.last_known.lock().get(&tool).cloned()
    }

    fn emit(&self, event: ControllerEvent) {
        let _ = self.events.send(event);
    }

    fn status(&self, tool: ToolId, phase: Phase, message: impl Into<String>) {
        self.emit(ControllerEvent::status(tool, phase, message));
    }

    fn descriptor(&self, tool: ToolId) -> &ToolDescriptor {
        self.registry.get(tool)
    }

    /// Claim `tool` for one attempt. At most one claim is live per tool.
    fn begin_attempt(&self, tool: ToolId) -> Result<InProgressGuard<'_>, Busy> {
        let mut states = self.states.lock();
        let state = states.entry(tool).or_default();
        if state.in_progress {
            return Err(Busy::InProgress);
        }
        if state.connected {
            return Err(Busy::Connected);
        }
        state.in_progress = true;
        Ok(InProgressGuard { states: &self.states, idle: &self.idle, tool })
    }

    fn any_in_progress(&self) -> bool {
        self.states.lock().values().any(|s| s.in_progress)
    }

    pub async fn check_installed(&self, tool: ToolId) -> bool {
        let installed = is_installed(&self.descriptor(tool).executable, &self.env).await;
        self.emit(ControllerEvent::PrerequisiteStatus { tool, installed });
        installed
    }

    /// Probe every tool, then announce that prerequisites are known.
    pub async fn check_prerequisites(&self) -> Vec<(ToolId, bool)> {
        let mut out = Vec::with_capacity(ToolId::ALL.len());
        for tool in ToolId::ALL {
            out.push((tool, self.check_installed(tool).await));
        }
        self.emit(ControllerEvent::PrerequisitesReady);
        out
    }

    pub async fn check_authenticated(&self, tool: ToolId) -> bool {
        self.locator.check_authenticated(self.descriptor(tool)).await
    }

    pub async fn install(&self, tool: ToolId) -> Result<(), LoginError> {
        let descriptor = self.descriptor(tool);
        self.status(tool, Phase::Installing, format!("Installing {}", descriptor.display_name));
        let events = self.events.clone();
        let result = self
            .installer
            .install(descriptor, move |line| {
                let _ = events.send(ControllerEvent::Log { tool, line: line.to_owned() });
            })
            .await;
        match result {
            Ok(()) => {
                self.status(tool, Phase::Installed, format!("{} installed", descriptor.display_name));
                Ok(())
            }
            Err(e) => {
                self.status(tool, Phase::Failed, e.to_string());
                Err(e)
            }
        }
    }

    /// Run one login attempt unless another is running or the tool is
    /// already connected.
    pub async fn login(&self, tool: ToolId) -> Result<LoginOutcome, LoginError> {
        let _guard = match self.begin_attempt(tool) {
            Ok(guard) => guard,
            Err(busy) => return Ok(busy.into()),
        };
        self.run_login(tool).await.map(LoginOutcome::SignedIn)
    }

    /// The attempt itself; callers hold the tool's [`InProgressGuard`].
    async fn run_login(&self, tool: ToolId) -> Result<LoginSignal, LoginError> {
        let descriptor = self.descriptor(tool);
        let strategy = strategy::for_tool(tool);
        self.status(
            tool,
            Phase::Authenticating,
            format!("Signing in to {}", descriptor.display_name),
        );
        let attempt = LoginAttempt {
            descriptor,
            strategy: strategy.as_ref(),
            env: &self.env,
            locator: &self.locator,
            callbacks: &self.callbacks,
            opener: Arc::clone(&self.opener),
            browser: self.browser.clone(),
            automation_program: &self.automation_program,
            events: self.events.clone(),
            timing: LoginTiming::from_config(&self.config, descriptor),
            cancel: self.cancel.child_token(),
        };
        match attempt.run().await {
            Ok(signal) => {
                self.emit(ControllerEvent::AuthCompleted { tool });
                Ok(signal)
            }
            Err(e) => {
                self.status(tool, Phase::Failed, e.to_string());
                Err(e)
            }
        }
    }

    /// Read credentials after the settle delay; never fails.
    pub async fn extract(&self, tool: ToolId) -> CredentialDescriptor {
        let descriptor = self.descriptor(tool);
        let strategy = strategy::for_tool(tool);
        self.status(tool, Phase::Extracting, "Reading credentials");
        let found =
            self.locator.extract(descriptor, strategy.as_ref(), self.config.settle_delay()).await;
        self.last_known.lock().insert(tool, found.clone());
        self.emit(ControllerEvent::CredentialsStored { tool, storage: found.storage.clone() });
        if let Some(ref reporter) = self.reporter {
            reporter.submit(&found);
        }
        found
    }

    pub async fn logout(&self, tool: ToolId) -> LogoutOutcome {
        let outcome = self.locator.logout(self.descriptor(tool), &self.env).await;
        if outcome.success {
            self.states.lock().entry(tool).or_default().connected = false;
            self.last_known.lock().remove(&tool);
            self.status(tool, Phase::LoggedOut, outcome.message.clone());
        } else {
            self.status(tool, Phase::Failed, outcome.message.clone());
        }
        outcome
    }

    /// Install if needed, log in unless already authenticated, then extract.
    ///
    /// A second call while one is running, or once connected, is a no-op.
    pub async fn connect(&self, tool: ToolId) -> Result<ConnectOutcome, LoginError> {
        let _guard = match self.begin_attempt(tool) {
            Ok(guard) => guard,
            Err(busy) => return Ok(busy.into()),
        };

        let descriptor = self.descriptor(tool);
        info!(%tool, "connect started");
        self.status(tool, Phase::Checking, format!("Checking {}", descriptor.display_name));

        if !self.check_installed(tool).await {
            self.install(tool).await?;
        }

        if self.check_authenticated(tool).await {
            info!(%tool, "already authenticated, skipping login");
        } else {
            self.run_login(tool).await?;
        }

        let found = self.extract(tool).await;
        self.states.lock().entry(tool).or_default().connected = true;
        self.status(tool, Phase::Connected, found.message.clone());
        self.emit(ControllerEvent::ShowSuccess { tool });
        info!(%tool, status = found.status.as_str(), "connected");
        Ok(ConnectOutcome::Connected(found))
    }

    /// Copy the tool's secret to the clipboard, extracting first if needed.
    pub async fn copy(&self, tool: ToolId) -> CopyOutcome {
        let cached = self.last_known(tool).filter(|d| d.copy_text.is_some());
        let found = match cached {
            Some(d) => d,
            None => self.extract(tool).await,
        };
        let Some(text) = found.copy_text else {
            return CopyOutcome {
                success: false,
                message: format!("No copyable credential for {tool}"),
            };
        };

        let clipboard = Arc::clone(&self.clipboard);
        let result = tokio::task::spawn_blocking(move || clipboard.write(&text)).await;
        match result {
            Ok(Ok(())) => CopyOutcome {
                success: true,
                message: format!("{tool} credential copied to clipboard"),
            },
            Ok(Err(e)) => {
                warn!(%tool, "clipboard write failed: {e:#}");
                CopyOutcome { success: false, message: format!("Clipboard unavailable: {e:#}") }
            }
            Err(e) => CopyOutcome { success: false, message: format!("Clipboard task failed: {e}") },
        }
    }

    /// Cancel in-flight attempts, wait for their teardown, then close every
    /// callback listener.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let drain = self.config.flush_grace() + self.config.kill_grace() + SHUTDOWN_SLACK;
        let deadline = tokio::time::Instant::now() + drain;
        loop {
            let idle = self.idle.notified();
            tokio::pin!(idle);
            idle.as_mut().enable();
            if !self.any_in_progress() {
                break;
            }
            if tokio::time::timeout_at(deadline, idle).await.is_err() {
                warn!("login attempts still tearing down at shutdown");
                break;
            }
        }
        self.callbacks.stop_all().await;
    }
}

#[cfg(test)]
#[path = "controller_tests.rs"]
mod tests;
