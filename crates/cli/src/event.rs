// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde::{Deserialize, Serialize};

use crate::credential::StorageKind;
use crate::tool::ToolId;

/// Coarse progress tag attached to status events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Checking,
    Installing,
    Installed,
    Authenticating,
    AuthUrl,
    Extracting,
    Connected,
    Failed,
    LoggedOut,
}

/// Notification pushed from the controller to any attached UI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ControllerEvent {
    Status { tool: ToolId, phase: Phase, message: String },
    Log { tool: ToolId, line: String },
    AuthCompleted { tool: ToolId },
    ShowSuccess { tool: ToolId },
    PrerequisiteStatus { tool: ToolId, installed: bool },
    PrerequisitesReady,
    CredentialsStored { tool: ToolId, storage: StorageKind },
}

impl ControllerEvent {
    pub fn status(tool: ToolId, phase: Phase, message: impl Into<String>) -> Self {
        Self::Status { tool, phase, message: message.into() }
    }

    /// Tool the event concerns, if any.
    pub fn tool(&self) -> Option<ToolId> {
        match self {
            Self::Status { tool, .. }
            | Self::Log { tool, .. }
            | Self::AuthCompleted { tool }
            | Self::ShowSuccess { tool }
            | Self::PrerequisiteStatus { tool, .. }
            | Self::CredentialsStored { tool, .. } => Some(*tool),
            Self::PrerequisitesReady => None,
        }
    }
}
