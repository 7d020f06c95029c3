// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::process::{Command, Stdio};
use std::sync::Arc;

use tracing::debug;

/// OS secure-credential store, addressed by service name.
///
/// Implementations block; callers run them on the blocking pool.
pub trait SecureStore: Send + Sync + 'static {
    /// Secret stored under `service`, if any.
    fn read(&self, service: &str) -> anyhow::Result<Option<String>>;

    /// Remove the entry. Returns whether one existed.
    fn delete(&self, service: &str) -> anyhow::Result<bool>;
}

/// Platform store: `security` on macOS, `secret-tool` elsewhere on unix.
///
/// A missing helper binary reads as "no entry".
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemSecureStore;

impl SystemSecureStore {
    fn lookup_cmd(service: &str) -> Option<Command> {
        if cfg!(target_os = "macos") {
            let mut cmd = Command::new("security");
            cmd.args(["find-generic-password", "-s", service, "-w"]);
            Some(cmd)
        } else if cfg!(unix) {
            let mut cmd = Command::new("secret-tool");
            cmd.args(["lookup", "service", service]);
            Some(cmd)
        } else {
            None
        }
    }

    fn delete_cmd(service: &str) -> Option<Command> {
        if cfg!(target_os = "macos") {
            let mut cmd = Command::new("security");
            cmd.args(["delete-generic-password", "-s", service]);
            Some(cmd)
        } else if cfg!(unix) {
            let mut cmd = Command::new("secret-tool");
            cmd.args(["clear", "service", service]);
            Some(cmd)
        } else {
            None
        }
    }
}

impl SecureStore for SystemSecureStore {
    fn read(&self, service: &str) -> anyhow::Result<Option<String>> {
        let Some(mut cmd) = Self::lookup_cmd(service) else {
            return Ok(None);
        };
        let output = match cmd.stdin(Stdio::null()).stderr(Stdio::null()).output() {
            Ok(o) => o,
            Err(e) => {
                debug!("secure store helper unavailable: {e}");
                return Ok(None);
            }
        };
        if !output.status.success() {
            debug!(service, "secure store entry not found");
            return Ok(None);
        }
        let secret = String::from_utf8_lossy(&output.stdout).trim().to_owned();
        Ok((!secret.is_empty()).then_some(secret))
    }

    fn delete(&self, service: &str) -> anyhow::Result<bool> {
        // secret-tool clear exits 0 even without a match; probe first.
        if self.read(service)?.is_none() {
            return Ok(false);
        }
        let Some(mut cmd) = Self::delete_cmd(service) else {
            return Ok(false);
        };
        let status = cmd.stdin(Stdio::null()).stdout(Stdio::null()).stderr(Stdio::null()).status()?;
        Ok(status.success())
    }
}

/// [`SecureStore::read`] on the blocking pool.
pub async fn read_blocking(
    store: &Arc<dyn SecureStore>,
    service: &str,
) -> anyhow::Result<Option<String>> {
    let store = Arc::clone(store);
    let service = service.to_owned();
    tokio::task::spawn_blocking(move || store.read(&service)).await?
}

/// [`SecureStore::delete`] on the blocking pool.
pub async fn delete_blocking(store: &Arc<dyn SecureStore>, service: &str) -> anyhow::Result<bool> {
    let store = Arc::clone(store);
    let service = service.to_owned();
    tokio::task::spawn_blocking(move || store.delete(&service)).await?
}
