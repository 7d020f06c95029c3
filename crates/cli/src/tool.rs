// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Static table of supported CLI tools.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Identity of a supported CLI tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolId {
    Claude,
    Codex,
    Gemini,
}

impl ToolId {
    pub const ALL: [ToolId; 3] = [ToolId::Claude, ToolId::Codex, ToolId::Gemini];

    fn index(self) -> usize {
        match self {
            Self::Claude => 0,
            Self::Codex => 1,
            Self::Gemini => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Claude => "claude",
            Self::Codex => "codex",
            Self::Gemini => "gemini",
        }
    }
}

impl fmt::Display for ToolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ToolId {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "claude" => Ok(Self::Claude),
            "codex" => Ok(Self::Codex),
            "gemini" => Ok(Self::Gemini),
            other => anyhow::bail!("unknown tool: {other}"),
        }
    }
}

/// How the OAuth URL is presented to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrowserMode {
    /// In-app browser surface whose navigations are inspected.
    Embedded,
    /// System browser; completion comes from output or the callback server.
    External,
}

/// One place a tool may leave its credential material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CredentialSource {
    /// OS secure-credential store entry.
    SecureStore { service: String },
    /// JSON file relative to the home directory.
    JsonFile { path: PathBuf },
    /// TOML file relative to the home directory; only `keys` are read.
    TomlFile { path: PathBuf, keys: Vec<String> },
}

impl CredentialSource {
    /// Absolute file path for file-backed sources.
    pub fn resolve(&self, home: &Path) -> Option<PathBuf> {
        match self {
            Self::SecureStore { .. } => None,
            Self::JsonFile { path } | Self::TomlFile { path, .. } => Some(home.join(path)),
        }
    }
}

/// Immutable description of a supported tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub id: ToolId,
    pub display_name: String,
    pub install_command: Vec<String>,
    pub executable: String,
    pub login_command: Vec<String>,
    /// Native logout argv, run in addition to credential removal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logout_command: Option<Vec<String>>,
    /// Probe order matters: first hit wins.
    pub credentials: Vec<CredentialSource>,
    pub callback_port: u16,
    /// Login must be driven through the scripted-keystroke driver.
    pub requires_automation: bool,
    pub browser: BrowserMode,
    pub login_timeout: Duration,
}

impl ToolDescriptor {
    /// File-backed candidate paths resolved against `home`.
    pub fn credential_paths(&self, home: &Path) -> Vec<PathBuf> {
        self.credentials.iter().filter_map(|s| s.resolve(home)).collect()
    }

    /// Service name of the secure-store entry, if the tool uses one.
    pub fn secure_store_service(&self) -> Option<&str> {
        self.credentials.iter().find_map(|s| match s {
            CredentialSource::SecureStore { service } => Some(service.as_str()),
            _ => None,
        })
    }
}

fn argv(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| (*s).to_owned()).collect()
}

/// The built-in descriptor for `id`.
pub fn builtin(id: ToolId) -> ToolDescriptor {
    match id {
        ToolId::Claude => ToolDescriptor {
            id,
            display_name: "Claude Code".to_owned(),
            install_command: argv(&["npm", "install", "-g", "@anthropic-ai/claude-code"]),
            executable: "claude".to_owned(),
            login_command: argv(&["claude"]),
            logout_command: None,
            credentials: vec![
                CredentialSource::SecureStore { service: "Claude Code-credentials".to_owned() },
                CredentialSource::JsonFile { path: PathBuf::from(".claude/.credentials.json") },
                CredentialSource::JsonFile {
                    path: PathBuf::from(".config/claude/.credentials.json"),
                },
            ],
            callback_port: 54545,
            requires_automation: true,
            browser: BrowserMode::Embedded,
            login_timeout: Duration::from_secs(300),
        },
        ToolId::Codex => ToolDescriptor {
            id,
            display_name: "Codex CLI".to_owned(),
            install_command: argv(&["npm", "install", "-g", "@openai/codex"]),
            executable: "codex".to_owned(),
            login_command: argv(&["codex", "login"]),
            logout_command: Some(argv(&["codex", "logout"])),
            credentials: vec![
                CredentialSource::JsonFile { path: PathBuf::from(".codex/auth.json") },
                CredentialSource::TomlFile {
                    path: PathBuf::from(".codex/config.toml"),
                    keys: argv(&["api_key", "access_token", "token"]),
                },
            ],
            callback_port: 54546,
            requires_automation: false,
            browser: BrowserMode::External,
            login_timeout: Duration::from_secs(300),
        },
        ToolId::Gemini => ToolDescriptor {
            id,
            display_name: "Gemini CLI".to_owned(),
            install_command: argv(&["npm", "install", "-g", "@google/gemini-cli"]),
            executable: "gemini".to_owned(),
            login_command: argv(&["gemini"]),
            logout_command: None,
            credentials: vec![
                CredentialSource::JsonFile { path: PathBuf::from(".gemini/oauth_creds.json") },
                CredentialSource::JsonFile {
                    path: PathBuf::from(".gemini/google_accounts.json"),
                },
            ],
            callback_port: 54547,
            requires_automation: false,
            browser: BrowserMode::Embedded,
            login_timeout: Duration::from_secs(180),
        },
    }
}

/// Lookup table of tool descriptors, loaded once at startup.
#[derive(Debug, Clone)]
pub struct ToolRegistry {
    tools: [ToolDescriptor; 3],
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ToolRegistry {
    pub fn builtin() -> Self {
        Self { tools: ToolId::ALL.map(builtin) }
    }

    /// Replace the descriptor for one tool.
    pub fn with(mut self, descriptor: ToolDescriptor) -> Self {
        let slot = descriptor.id.index();
        self.tools[slot] = descriptor;
        self
    }

    pub fn get(&self, id: ToolId) -> &ToolDescriptor {
        &self.tools[id.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = &ToolDescriptor> {
        self.tools.iter()
    }
}

#[cfg(test)]
#[path = "tool_tests.rs"]
mod tests;
