// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Checking for and installing a tool's executable.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::browser::UrlOpener;
use crate::env::PreparedEnv;
use crate::error::LoginError;
use crate::process;
use crate::tool::ToolDescriptor;

/// Manual download page opened when the runtime cannot be provisioned.
pub const RUNTIME_DOWNLOAD_URL: &str = "https://nodejs.org/en/download";

/// Whether `executable` resolves on the prepared `PATH`.
pub async fn is_installed(executable: &str, env: &PreparedEnv) -> bool {
    let lookup = if cfg!(windows) { "where" } else { "which" };
    let mut cmd = Command::new(lookup);
    cmd.arg(executable).stdin(Stdio::null()).stdout(Stdio::null()).stderr(Stdio::null());
    env.apply(&mut cmd);
    match cmd.status().await {
        Ok(status) => status.success(),
        Err(e) => {
            debug!("{lookup} unavailable: {e}");
            false
        }
    }
}

/// Package-manager command that installs the runtime on this OS, if any.
fn provision_argv() -> Option<&'static [&'static str]> {
    if cfg!(target_os = "macos") {
        Some(&["brew", "install", "node"])
    } else if cfg!(windows) {
        Some(&["winget", "install", "-e", "--id", "OpenJS.NodeJS.LTS", "--silent"])
    } else {
        None
    }
}

pub struct Installer {
    env: PreparedEnv,
    opener: Arc<dyn UrlOpener>,
    poll: Duration,
    window: Duration,
}

impl Installer {
    pub fn new(
        env: PreparedEnv,
        opener: Arc<dyn UrlOpener>,
        poll: Duration,
        window: Duration,
    ) -> Self {
        Self { env, opener, poll, window }
    }

    /// Install the tool, provisioning the runtime first when it is absent.
    ///
    /// Output lines are passed to `log` as they arrive.
    pub async fn install<F>(&self, descriptor: &ToolDescriptor, log: F) -> Result<(), LoginError>
    where
        F: Fn(&str) + Send + Sync,
    {
        let runtime = descriptor
            .install_command
            .first()
            .ok_or_else(|| LoginError::Internal("empty install command".to_owned()))?;
        if !is_installed(runtime, &self.env).await {
            self.ensure_runtime(runtime, &log).await?;
        }

        info!(tool = %descriptor.id, "installing {}", descriptor.display_name);
        log(&format!("$ {}", descriptor.install_command.join(" ")));
        let code = self.run_streaming(&descriptor.install_command, &log).await?;
        match code {
            Some(0) => {
                info!(tool = %descriptor.id, "install finished");
                Ok(())
            }
            code => {
                warn!(tool = %descriptor.id, ?code, "install failed");
                Err(LoginError::InstallFailed { code })
            }
        }
    }

    async fn ensure_runtime<F>(&self, runtime: &str, log: &F) -> Result<(), LoginError>
    where
        F: Fn(&str) + Send + Sync,
    {
        log(&format!("{runtime} not found, attempting automatic installation"));
        if let Some(argv) = provision_argv() {
            if is_installed(argv[0], &self.env).await {
                let argv: Vec<String> = argv.iter().map(|s| (*s).to_owned()).collect();
                match self.run_streaming(&argv, log).await {
                    Ok(Some(0)) if is_installed(runtime, &self.env).await => return Ok(()),
                    Ok(code) => warn!(?code, "runtime provisioning did not succeed"),
                    Err(e) => warn!("runtime provisioning failed: {e}"),
                }
            }
        }

        log(&format!("Please install {runtime} from {RUNTIME_DOWNLOAD_URL}"));
        if let Err(e) = self.opener.open(RUNTIME_DOWNLOAD_URL) {
            warn!("{e:#}");
        }

        let deadline = tokio::time::Instant::now() + self.window;
        while tokio::time::Instant::now() < deadline {
            tokio::time::sleep(self.poll).await;
            if is_installed(runtime, &self.env).await {
                log(&format!("{runtime} detected"));
                return Ok(());
            }
        }
        Err(LoginError::PrerequisiteMissing(format!(
            "{runtime} is required; install it from {RUNTIME_DOWNLOAD_URL}"
        )))
    }

    /// Run `argv`, forwarding each output line to `log`. Returns the exit code.
    async fn run_streaming<F>(&self, argv: &[String], log: &F) -> Result<Option<i32>, LoginError>
    where
        F: Fn(&str) + Send + Sync,
    {
        let mut child = process::spawn(argv, &self.env, None)
            .map_err(|e| LoginError::SpawnFailed(format!("{e:#}")))?;
        drop(child.stdin.take());
        let mut rx = process::pump_output(&mut child, 64);

        let mut partial = String::new();
        while let Some((_, chunk)) = rx.recv().await {
            partial.push_str(&chunk);
            while let Some(pos) = partial.find('\n') {
                let line: String = partial.drain(..=pos).collect();
                let line = line.trim_end();
                if !line.is_empty() {
                    log(line);
                }
            }
        }
        if !partial.trim().is_empty() {
            log(partial.trim_end());
        }

        let status = child.wait().await.map_err(|e| LoginError::Internal(e.to_string()))?;
        Ok(status.code())
    }
}

#[cfg(test)]
#[path = "install_tests.rs"]
mod tests;
