// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};

use crate::tool::ToolId;

/// Automates interactive OAuth logins for AI coding CLIs.
#[derive(Debug, Clone, Parser)]
#[command(name = "authpilot", version, about)]
pub struct Config {
    /// Home directory the CLIs store credentials under.
    #[arg(long, global = true, env = "AUTHPILOT_HOME")]
    pub home: Option<PathBuf>,

    /// Log format (json or text).
    #[arg(long, global = true, env = "AUTHPILOT_LOG_FORMAT", default_value = "text")]
    pub log_format: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, env = "AUTHPILOT_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Remote endpoint that receives credential bookkeeping records.
    #[arg(long, global = true, env = "AUTHPILOT_TOKEN_ENDPOINT")]
    pub token_endpoint: Option<String>,

    /// Bearer token sent to the bookkeeping endpoint.
    #[arg(long, global = true, env = "AUTHPILOT_TOKEN_ENDPOINT_TOKEN")]
    pub token_endpoint_token: Option<String>,

    /// Program that runs the scripted-keystroke login driver
    /// (invoked as `<program> drive <tool>`). Defaults to this executable.
    #[arg(long, global = true, env = "AUTHPILOT_AUTOMATION_PROGRAM")]
    pub automation_program: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,

    // -- Duration overrides (skip from CLI; set in Config::test()) --------
    #[clap(skip)]
    pub credential_poll_ms: Option<u64>,
    #[clap(skip)]
    pub url_fallback_ms: Option<u64>,
    #[clap(skip)]
    pub settle_delay_ms: Option<u64>,
    #[clap(skip)]
    pub flush_grace_ms: Option<u64>,
    #[clap(skip)]
    pub kill_grace_ms: Option<u64>,
    #[clap(skip)]
    pub callback_close_grace_ms: Option<u64>,
    #[clap(skip)]
    pub browser_close_delay_ms: Option<u64>,
    #[clap(skip)]
    pub prerequisite_poll_ms: Option<u64>,
    #[clap(skip)]
    pub prerequisite_window_ms: Option<u64>,
    /// Overrides every tool's login timeout when set.
    #[clap(skip)]
    pub login_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Install if needed, log in if needed, then extract credentials.
    Connect { tool: ToolId },
    /// Run the interactive login flow only.
    Login { tool: ToolId },
    /// Install the tool through its package manager.
    Install { tool: ToolId },
    /// Report install and authentication state.
    Status { tool: Option<ToolId> },
    /// Locate and print the credential descriptor (secrets redacted).
    Extract { tool: ToolId },
    /// Copy the tool's credential text to the clipboard.
    Copy { tool: ToolId },
    /// Remove the tool's stored credentials.
    Logout { tool: ToolId },
    /// Serve the local control API for a UI.
    Serve {
        #[arg(long, env = "AUTHPILOT_HOST", default_value = "127.0.0.1")]
        host: String,
        #[arg(long, env = "AUTHPILOT_PORT", default_value = "7420")]
        port: u16,
        /// Bearer token required on every route except health.
        #[arg(long, env = "AUTHPILOT_AUTH_TOKEN")]
        auth_token: Option<String>,
    },
    /// Scripted-keystroke driver for tools that need menu navigation.
    #[command(hide = true)]
    Drive {
        tool: ToolId,
        #[arg(long, default_value = "120")]
        cols: u16,
        #[arg(long, default_value = "40")]
        rows: u16,
    },
}

fn env_duration_ms(var: &str, default: u64) -> Duration {
    let ms = std::env::var(var).ok().and_then(|v| v.parse().ok()).unwrap_or(default);
    Duration::from_millis(ms)
}

macro_rules! duration_field {
    ($method:ident, $field:ident, $env:literal, $default:expr) => {
        pub fn $method(&self) -> Duration {
            match self.$field {
                Some(ms) => Duration::from_millis(ms),
                None => env_duration_ms($env, $default),
            }
        }
    };
}

impl Config {
    /// Validate the configuration after parsing.
    pub fn validate(&self) -> anyhow::Result<()> {
        match self.log_format.as_str() {
            "json" | "text" => {}
            other => anyhow::bail!("invalid log format: {other}"),
        }
        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => anyhow::bail!("invalid log level: {other}"),
        }
        if let Some(ref endpoint) = self.token_endpoint {
            if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
                anyhow::bail!("--token-endpoint must be an http(s) URL");
            }
        }
        for (name, period) in [
            ("AUTHPILOT_CREDENTIAL_POLL_MS", self.credential_poll()),
            ("AUTHPILOT_PREREQUISITE_POLL_MS", self.prerequisite_poll()),
        ] {
            if period.is_zero() {
                anyhow::bail!("{name} must be greater than zero");
            }
        }
        Ok(())
    }

    /// The home directory credentials are read from and written to.
    pub fn home_dir(&self) -> anyhow::Result<PathBuf> {
        if let Some(ref home) = self.home {
            return Ok(home.clone());
        }
        std::env::var_os("HOME")
            .or_else(|| std::env::var_os("USERPROFILE"))
            .map(PathBuf::from)
            .ok_or_else(|| anyhow::anyhow!("cannot determine home directory; pass --home"))
    }

    /// Program invoked as `<program> drive <tool>` for scripted logins.
    pub fn automation_program(&self) -> anyhow::Result<PathBuf> {
        match self.automation_program {
            Some(ref p) => Ok(p.clone()),
            None => Ok(std::env::current_exe()?),
        }
    }

    /// Login timeout override, if any.
    pub fn login_timeout(&self) -> Option<Duration> {
        match self.login_timeout_ms {
            Some(ms) => Some(Duration::from_millis(ms)),
            None => std::env::var("AUTHPILOT_LOGIN_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis),
        }
    }

    // -- Tuning knobs (field override → env var → compiled default) --------

    duration_field!(credential_poll, credential_poll_ms, "AUTHPILOT_CREDENTIAL_POLL_MS", 2_000);
    duration_field!(url_fallback, url_fallback_ms, "AUTHPILOT_URL_FALLBACK_MS", 5_000);
    duration_field!(settle_delay, settle_delay_ms, "AUTHPILOT_SETTLE_DELAY_MS", 1_500);
    duration_field!(flush_grace, flush_grace_ms, "AUTHPILOT_FLUSH_GRACE_MS", 1_000);
    duration_field!(kill_grace, kill_grace_ms, "AUTHPILOT_KILL_GRACE_MS", 2_000);
    duration_field!(
        callback_close_grace,
        callback_close_grace_ms,
        "AUTHPILOT_CALLBACK_CLOSE_GRACE_MS",
        5_000
    );
    duration_field!(
        browser_close_delay,
        browser_close_delay_ms,
        "AUTHPILOT_BROWSER_CLOSE_DELAY_MS",
        1_500
    );
    duration_field!(
        prerequisite_poll,
        prerequisite_poll_ms,
        "AUTHPILOT_PREREQUISITE_POLL_MS",
        5_000
    );
    duration_field!(
        prerequisite_window,
        prerequisite_window_ms,
        "AUTHPILOT_PREREQUISITE_WINDOW_MS",
        300_000
    );

    /// Build a minimal `Config` for tests (short timings, `status` command).
    #[doc(hidden)]
    pub fn test() -> Self {
        Self {
            home: None,
            log_format: "text".into(),
            log_level: "debug".into(),
            token_endpoint: None,
            token_endpoint_token: None,
            automation_program: None,
            command: Command::Status { tool: None },
            credential_poll_ms: Some(50),
            url_fallback_ms: Some(200),
            settle_delay_ms: Some(10),
            flush_grace_ms: Some(10),
            kill_grace_ms: Some(200),
            callback_close_grace_ms: Some(100),
            browser_close_delay_ms: Some(10),
            prerequisite_poll_ms: Some(20),
            prerequisite_window_ms: Some(100),
            login_timeout_ms: None,
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
