// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Optional metadata-only bookkeeping of captured credentials.

use std::sync::Once;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::credential::{CredentialDescriptor, CredentialStatus, StorageKind};
use crate::tool::ToolId;

static CRYPTO: Once = Once::new();

/// Install the ring rustls provider once per process.
pub fn ensure_crypto_provider() {
    CRYPTO.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

/// What is sent for one extraction. Never carries secret material.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialRecord {
    pub tool: ToolId,
    pub storage: StorageKind,
    pub status: CredentialStatus,
    pub has_secret: bool,
    /// Unix milliseconds.
    pub captured_at: u64,
}

impl CredentialRecord {
    pub fn from_descriptor(descriptor: &CredentialDescriptor) -> Self {
        let captured_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();
        Self {
            tool: descriptor.tool,
            storage: descriptor.storage.clone(),
            status: descriptor.status,
            has_secret: descriptor.has_secret,
            captured_at,
        }
    }
}

/// Posts records to a configured endpoint, fire-and-forget.
#[derive(Clone)]
pub struct Reporter {
    endpoint: String,
    auth_token: Option<String>,
    client: Client,
}

impl Reporter {
    pub fn new(endpoint: String, auth_token: Option<String>) -> Self {
        ensure_crypto_provider();
        let client = Client::builder().timeout(Duration::from_secs(10)).build().unwrap_or_default();
        Self { endpoint, auth_token, client }
    }

    /// POST the record and return once the endpoint accepted it.
    pub async fn send(&self, record: &CredentialRecord) -> anyhow::Result<()> {
        let mut req = self.client.post(&self.endpoint).json(record);
        if let Some(ref token) = self.auth_token {
            req = req.bearer_auth(token);
        }
        req.send().await?.error_for_status()?;
        Ok(())
    }

    /// Spawn a detached send; failures only log.
    pub fn submit(&self, descriptor: &CredentialDescriptor) {
        let record = CredentialRecord::from_descriptor(descriptor);
        let reporter = self.clone();
        tokio::spawn(async move {
            match reporter.send(&record).await {
                Ok(()) => debug!(tool = %record.tool, "credential record reported"),
                Err(e) => warn!(tool = %record.tool, "credential report failed: {e:#}"),
            }
        });
    }
}

#[cfg(test)]
#[path = "report_tests.rs"]
mod tests;
