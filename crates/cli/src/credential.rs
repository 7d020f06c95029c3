// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Locating, normalizing and removing the credential material each CLI
//! leaves behind after login.

pub mod keychain;
pub mod locate;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::env::PreparedEnv;
use crate::strategy::LoginStrategy;
use crate::tool::{ToolDescriptor, ToolId};

pub use keychain::{SecureStore, SystemSecureStore};
pub use locate::Fingerprint;

use locate::Location;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialStatus {
    /// A credential artifact was found and read.
    Authenticated,
    /// Login succeeded but no artifact could be located or parsed.
    AuthenticatedUnverified,
}

impl CredentialStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Authenticated => "authenticated",
            Self::AuthenticatedUnverified => "authenticated_unverified",
        }
    }
}

/// Where the credential lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StorageKind {
    SecureStore { service: String },
    File { path: PathBuf },
    Unknown,
}

impl StorageKind {
    pub fn label(&self) -> String {
        match self {
            Self::SecureStore { service } => format!("secure store ({service})"),
            Self::File { path } => path.display().to_string(),
            Self::Unknown => "unknown location".to_owned(),
        }
    }
}

impl From<Location> for StorageKind {
    fn from(loc: Location) -> Self {
        match loc {
            Location::SecureStore(service) => Self::SecureStore { service },
            Location::File(path) => Self::File { path },
        }
    }
}

/// Normalized result of one extraction. Secret fields never serialize.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CredentialDescriptor {
    pub tool: ToolId,
    pub status: CredentialStatus,
    pub message: String,
    pub storage: StorageKind,
    #[serde(skip)]
    pub payload: Option<Value>,
    #[serde(skip)]
    pub copy_text: Option<String>,
    pub has_secret: bool,
}

impl CredentialDescriptor {
    /// Descriptor for a login that succeeded without a readable artifact.
    pub fn unverified(tool: ToolId) -> Self {
        Self {
            tool,
            status: CredentialStatus::AuthenticatedUnverified,
            message: "Authenticated (credential verification skipped)".to_owned(),
            storage: StorageKind::Unknown,
            payload: None,
            copy_text: None,
            has_secret: false,
        }
    }
}

/// Outcome of a logout request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogoutOutcome {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub removed: Vec<String>,
}

/// Probes one home directory and secure store.
#[derive(Clone)]
pub struct CredentialLocator {
    home: PathBuf,
    store: Arc<dyn SecureStore>,
}

impl CredentialLocator {
    pub fn new(home: impl Into<PathBuf>, store: Arc<dyn SecureStore>) -> Self {
        Self { home: home.into(), store }
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    /// Whether any candidate location is populated.
    pub async fn check_authenticated(&self, descriptor: &ToolDescriptor) -> bool {
        match locate::any_present(descriptor, &self.home, &self.store).await {
            Ok(present) => present,
            Err(e) => {
                warn!(tool = %descriptor.id, "credential probe failed: {e:#}");
                false
            }
        }
    }

    pub async fn fingerprint(&self, descriptor: &ToolDescriptor) -> Fingerprint {
        locate::fingerprint(descriptor, &self.home, &self.store).await
    }

    /// Wait `settle`, then read the first populated candidate.
    ///
    /// Never fails: no readable artifact yields an unverified descriptor.
    pub async fn extract(
        &self,
        descriptor: &ToolDescriptor,
        strategy: &dyn LoginStrategy,
        settle: Duration,
    ) -> CredentialDescriptor {
        if !settle.is_zero() {
            tokio::time::sleep(settle).await;
        }
        let hit = match locate::first_hit(descriptor, &self.home, &self.store).await {
            Ok(hit) => hit,
            Err(e) => {
                warn!(tool = %descriptor.id, "credential probe failed: {e:#}");
                None
            }
        };
        let Some(hit) = hit else {
            warn!(tool = %descriptor.id, "no credential artifact found, verification skipped");
            return CredentialDescriptor::unverified(descriptor.id);
        };

        let copy_text =
            hit.payload.as_ref().and_then(|p| locate::secret_at(p, strategy.secret_pointers()));
        let storage = StorageKind::from(hit.location);
        info!(tool = %descriptor.id, storage = %storage.label(), "credentials located");
        CredentialDescriptor {
            tool: descriptor.id,
            status: CredentialStatus::Authenticated,
            message: format!("Credentials found in {}", storage.label()),
            storage,
            has_secret: copy_text.is_some(),
            payload: hit.payload,
            copy_text,
        }
    }

    /// Remove every credential artifact for the tool, running its native
    /// logout command first when it has one.
    pub async fn logout(&self, descriptor: &ToolDescriptor, env: &PreparedEnv) -> LogoutOutcome {
        let paths = descriptor.credential_paths(&self.home);
        let mut present = Vec::with_capacity(paths.len());
        for path in &paths {
            present.push(tokio::fs::try_exists(path).await.unwrap_or(false));
        }
        if let Some(ref argv) = descriptor.logout_command {
            run_native_logout(argv, env).await;
        }

        let mut removed = Vec::new();
        let mut failures = Vec::new();
        if let Some(service) = descriptor.secure_store_service() {
            match keychain::delete_blocking(&self.store, service).await {
                Ok(true) => removed.push(format!("secure store ({service})")),
                Ok(false) => {}
                Err(e) => failures.push(format!("secure store ({service}): {e:#}")),
            }
        }
        for (path, existed) in paths.iter().zip(present) {
            match tokio::fs::remove_file(path).await {
                Ok(()) => removed.push(path.display().to_string()),
                // The native logout may already have deleted it.
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    if existed {
                        removed.push(path.display().to_string());
                    }
                }
                Err(e) => failures.push(format!("{}: {e}", path.display())),
            }
        }

        if !failures.is_empty() {
            warn!(tool = %descriptor.id, "logout incomplete: {}", failures.join("; "));
            return LogoutOutcome {
                success: false,
                message: format!("Failed to remove: {}", failures.join("; ")),
                removed,
            };
        }
        if removed.is_empty() {
            return LogoutOutcome {
                success: true,
                message: "No credentials found, nothing to remove".to_owned(),
                removed,
            };
        }
        info!(tool = %descriptor.id, count = removed.len(), "credentials removed");
        LogoutOutcome {
            success: true,
            message: format!("Removed {} credential location(s)", removed.len()),
            removed,
        }
    }
}

async fn run_native_logout(argv: &[String], env: &PreparedEnv) {
    let mut cmd = match crate::process::command(argv, env, None) {
        Ok(cmd) => cmd,
        Err(e) => {
            warn!("native logout: {e:#}");
            return;
        }
    };
    cmd.stdin(std::process::Stdio::null());
    match tokio::time::timeout(Duration::from_secs(30), cmd.output()).await {
        Ok(Ok(out)) => debug!(status = ?out.status, "native logout finished"),
        Ok(Err(e)) => debug!("native logout unavailable: {e}"),
        Err(_) => warn!("native logout timed out"),
    }
}

#[cfg(test)]
#[path = "credential_tests.rs"]
mod tests;
