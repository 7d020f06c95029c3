// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Stable error codes surfaced across the CLI and the local IPC API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    PrerequisiteMissing,
    InstallFailed,
    SpawnFailed,
    AuthenticationDenied,
    Timeout,
    ProcessExited,
    Cancelled,
    BadRequest,
    Unauthorized,
    Internal,
}

impl ErrorCode {
    pub fn http_status(&self) -> u16 {
        match self {
            Self::PrerequisiteMissing => 424,
            Self::InstallFailed => 502,
            Self::SpawnFailed => 500,
            Self::AuthenticationDenied => 403,
            Self::Timeout => 504,
            Self::ProcessExited => 502,
            Self::Cancelled => 503,
            Self::BadRequest => 400,
            Self::Unauthorized => 401,
            Self::Internal => 500,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PrerequisiteMissing => "PREREQUISITE_MISSING",
            Self::InstallFailed => "INSTALL_FAILED",
            Self::SpawnFailed => "SPAWN_FAILED",
            Self::AuthenticationDenied => "AUTHENTICATION_DENIED",
            Self::Timeout => "TIMEOUT",
            Self::ProcessExited => "PROCESS_EXITED",
            Self::Cancelled => "CANCELLED",
            Self::BadRequest => "BAD_REQUEST",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::Internal => "INTERNAL",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal failure of an install, login or connect request.
///
/// Credential extraction never produces one of these: a login that succeeded
/// but left no readable artifact degrades to an unverified descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginError {
    /// A required external program (runtime, automation driver) is absent.
    PrerequisiteMissing(String),
    /// The package-manager install exited non-zero.
    InstallFailed { code: Option<i32> },
    /// The CLI process could not be started at all.
    SpawnFailed(String),
    /// A denial or error phrase was observed in output or navigation.
    AuthenticationDenied(String),
    /// No completion signal arrived within the attempt's bound.
    Timeout(Duration),
    /// The CLI exited non-zero before any success signal.
    ProcessExited { code: Option<i32> },
    /// The controller shut down while the attempt was running.
    Cancelled,
    Internal(String),
}

impl LoginError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::PrerequisiteMissing(_) => ErrorCode::PrerequisiteMissing,
            Self::InstallFailed { .. } => ErrorCode::InstallFailed,
            Self::SpawnFailed(_) => ErrorCode::SpawnFailed,
            Self::AuthenticationDenied(_) => ErrorCode::AuthenticationDenied,
            Self::Timeout(_) => ErrorCode::Timeout,
            Self::ProcessExited { .. } => ErrorCode::ProcessExited,
            Self::Cancelled => ErrorCode::Cancelled,
            Self::Internal(_) => ErrorCode::Internal,
        }
    }
}

impl fmt::Display for LoginError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PrerequisiteMissing(what) => write!(f, "prerequisite missing: {what}"),
            Self::InstallFailed { code: Some(code) } => {
                write!(f, "install failed with exit code {code}")
            }
            Self::InstallFailed { code: None } => f.write_str("install terminated by signal"),
            Self::SpawnFailed(detail) => write!(f, "failed to start login process: {detail}"),
            Self::AuthenticationDenied(detail) => write!(f, "authentication denied: {detail}"),
            Self::Timeout(after) => write!(f, "login timed out after {}s", after.as_secs()),
            Self::ProcessExited { code: Some(code) } => {
                write!(f, "login process exited with code {code} before authenticating")
            }
            Self::ProcessExited { code: None } => {
                f.write_str("login process was killed before authenticating")
            }
            Self::Cancelled => f.write_str("login cancelled by shutdown"),
            Self::Internal(detail) => write!(f, "internal error: {detail}"),
        }
    }
}

impl std::error::Error for LoginError {}

impl From<anyhow::Error> for LoginError {
    fn from(e: anyhow::Error) -> Self {
        Self::Internal(format!("{e:#}"))
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
