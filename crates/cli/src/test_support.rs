// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test infrastructure: fakes, fixtures, and assertion helpers.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::browser::{BrowserLauncher, BrowserSurface, NavigationEvent, UrlOpener};
use crate::clipboard::Clipboard;
use crate::config::Config;
use crate::controller::ControllerBuilder;
use crate::credential::SecureStore;
use crate::env::prepare_current;
use crate::process::is_process_alive;
use crate::report::ensure_crypto_provider;
use crate::tool::{builtin, BrowserMode, ToolDescriptor, ToolId};

/// Assert that an expression evaluates to `Err` whose Display output
/// contains the given substring.
#[macro_export]
macro_rules! assert_err_contains {
    ($expr:expr, $substr:expr) => {{
        let result = $expr;
        let err = result.expect_err(concat!("expected Err for: ", stringify!($expr)));
        let msg = err.to_string();
        assert!(msg.contains($substr), "expected error containing {:?}, got: {msg:?}", $substr);
    }};
}

/// Whether `pid` has exited. A zombie nobody has reaped yet counts as exited.
pub fn process_exited(pid: u32) -> bool {
    match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
        Ok(stat) => stat
            .rsplit_once(')')
            .is_some_and(|(_, rest)| rest.trim_start().starts_with('Z')),
        Err(_) => !is_process_alive(pid),
    }
}

/// Poll `check` every 20 ms until it holds or `within` elapses.
pub async fn eventually(within: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + within;
    while !check() {
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    true
}

/// Plain HTTP client for poking local listeners.
pub fn http_client() -> anyhow::Result<reqwest::Client> {
    ensure_crypto_provider();
    Ok(reqwest::Client::builder().timeout(Duration::from_secs(5)).build()?)
}

/// Whether nothing is listening on `127.0.0.1:port`.
pub async fn port_is_free(port: u16) -> bool {
    tokio::net::TcpListener::bind(("127.0.0.1", port)).await.is_ok()
}

/// A port that was free a moment ago.
pub fn free_port() -> anyhow::Result<u16> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    Ok(listener.local_addr()?.port())
}

/// Write `contents` to `path`, creating parent directories.
pub fn write_file(path: &Path, contents: &str) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, contents)?;
    Ok(())
}

/// Create an executable `sh` script named `name` in `dir`.
#[cfg(unix)]
pub fn fake_bin(dir: &Path, name: &str, script: &str) -> anyhow::Result<PathBuf> {
    use std::os::unix::fs::PermissionsExt;

    std::fs::create_dir_all(dir)?;
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{script}\n"))?;
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))?;
    Ok(path)
}

/// Descriptor for `id` whose CLI is a scripted fake under `bin`.
///
/// The callback port is ephemeral, the browser is external and no driver
/// is involved; tests adjust the rest.
#[cfg(unix)]
pub fn scripted_tool(id: ToolId, bin: &Path, login_script: &str) -> anyhow::Result<ToolDescriptor> {
    let exe = fake_bin(bin, &format!("fake-{id}"), login_script)?;
    let exe = exe.to_string_lossy().into_owned();
    let mut descriptor = builtin(id);
    descriptor.executable = exe.clone();
    descriptor.login_command = vec![exe];
    descriptor.logout_command = None;
    descriptor.callback_port = 0;
    descriptor.requires_automation = false;
    descriptor.browser = BrowserMode::External;
    descriptor.login_timeout = Duration::from_secs(10);
    Ok(descriptor)
}

/// Controller builder wired to in-memory fakes and short timings.
pub fn test_controller(home: &Path) -> ControllerBuilder {
    ControllerBuilder::new(Config::test(), home)
        .env(prepare_current(home))
        .secure_store(Arc::new(MemorySecureStore::default()))
        .opener(Arc::new(RecordingOpener::default()))
        .clipboard(Arc::new(MemoryClipboard::default()))
        .automation_program(home.join("missing-driver"))
}

/// Secure store backed by a map.
#[derive(Default)]
pub struct MemorySecureStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemorySecureStore {
    pub fn insert(&self, service: &str, secret: &str) {
        self.entries.lock().insert(service.to_owned(), secret.to_owned());
    }

    pub fn get(&self, service: &str) -> Option<String> {
        self.entries.lock().get(service).cloned()
    }
}

impl SecureStore for MemorySecureStore {
    fn read(&self, service: &str) -> anyhow::Result<Option<String>> {
        Ok(self.get(service))
    }

    fn delete(&self, service: &str) -> anyhow::Result<bool> {
        Ok(self.entries.lock().remove(service).is_some())
    }
}

/// URL opener that only records.
#[derive(Default)]
pub struct RecordingOpener {
    opened: Mutex<Vec<String>>,
}

impl RecordingOpener {
    pub fn opened(&self) -> Vec<String> {
        self.opened.lock().clone()
    }
}

impl UrlOpener for RecordingOpener {
    fn open(&self, url: &str) -> anyhow::Result<()> {
        self.opened.lock().push(url.to_owned());
        Ok(())
    }
}

/// Clipboard that keeps the last write.
#[derive(Default)]
pub struct MemoryClipboard {
    contents: Mutex<Option<String>>,
}

impl MemoryClipboard {
    pub fn contents(&self) -> Option<String> {
        self.contents.lock().clone()
    }
}

impl Clipboard for MemoryClipboard {
    fn write(&self, text: &str) -> anyhow::Result<()> {
        *self.contents.lock() = Some(text.to_owned());
        Ok(())
    }
}

#[derive(Default)]
struct SurfaceLog {
    visited: Vec<String>,
    closed: bool,
    sent: usize,
    consumed: usize,
}

/// In-memory browser surface; events are injected through its handle.
pub struct MemorySurface {
    rx: mpsc::UnboundedReceiver<NavigationEvent>,
    log: Arc<Mutex<SurfaceLog>>,
}

/// Test-side end of a [`MemorySurface`].
#[derive(Clone)]
pub struct MemorySurfaceHandle {
    tx: mpsc::UnboundedSender<NavigationEvent>,
    log: Arc<Mutex<SurfaceLog>>,
}

impl MemorySurface {
    #[allow(clippy::new_ret_no_self)]
    pub fn new() -> (Self, MemorySurfaceHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let log = Arc::new(Mutex::new(SurfaceLog::default()));
        (Self { rx, log: Arc::clone(&log) }, MemorySurfaceHandle { tx, log })
    }
}

impl MemorySurfaceHandle {
    fn push(&self, event: NavigationEvent) {
        if self.tx.send(event).is_ok() {
            self.log.lock().sent += 1;
        }
    }

    /// Simulate a navigation or redirect.
    pub fn navigate_to(&self, url: &str) {
        self.push(NavigationEvent::Navigated(url.to_owned()));
    }

    /// Simulate the user closing the window.
    pub fn user_close(&self) {
        self.push(NavigationEvent::Closed);
    }

    /// URLs the surface was told to load, in order.
    pub fn visited(&self) -> Vec<String> {
        self.log.lock().visited.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.log.lock().closed
    }

    /// Injected events the browser never consumed.
    pub fn pending_events(&self) -> usize {
        let log = self.log.lock();
        log.sent.saturating_sub(log.consumed)
    }
}

impl BrowserSurface for MemorySurface {
    fn navigate(&mut self, url: &str) -> anyhow::Result<()> {
        self.log.lock().visited.push(url.to_owned());
        Ok(())
    }

    fn close(&mut self) {
        self.log.lock().closed = true;
    }

    fn next_event(&mut self) -> Pin<Box<dyn Future<Output = Option<NavigationEvent>> + Send + '_>> {
        Box::pin(async move {
            let event = self.rx.recv().await;
            if event.is_some() {
                self.log.lock().consumed += 1;
            }
            event
        })
    }
}

/// Launcher whose windows replay a fixed list of events.
#[derive(Default)]
pub struct ScriptedLauncher {
    events: Vec<NavigationEvent>,
    launched: Mutex<Vec<MemorySurfaceHandle>>,
}

impl ScriptedLauncher {
    pub fn new(events: Vec<NavigationEvent>) -> Self {
        Self { events, launched: Mutex::new(Vec::new()) }
    }

    /// Handles of every window opened so far.
    pub fn launched(&self) -> Vec<MemorySurfaceHandle> {
        self.launched.lock().clone()
    }
}

impl BrowserLauncher for ScriptedLauncher {
    fn launch(&self) -> anyhow::Result<Box<dyn BrowserSurface>> {
        let (surface, handle) = MemorySurface::new();
        for event in &self.events {
            handle.push(event.clone());
        }
        self.launched.lock().push(handle);
        Ok(Box::new(surface))
    }
}
