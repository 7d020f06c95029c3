// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Probing a tool's ordered candidate locations.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use regex::Regex;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::keychain::{read_blocking, SecureStore};
use crate::tool::{CredentialSource, ToolDescriptor};

/// Where a hit came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    SecureStore(String),
    File(PathBuf),
}

/// Raw content found at the first populated candidate.
#[derive(Debug, Clone)]
pub struct Hit {
    pub location: Location,
    /// Parsed structure, when the content is JSON or yielded TOML keys.
    pub payload: Option<Value>,
}

/// Extract `keys` from TOML text with `key = "value"` lines.
///
/// Only top-level string assignments are read; no full TOML parse.
pub fn toml_keys(text: &str, keys: &[String]) -> anyhow::Result<Option<Value>> {
    let mut found = Map::new();
    for key in keys {
        let re = Regex::new(&format!(
            r#"(?m)^\s*{}\s*=\s*(?:"([^"]*)"|'([^']*)')"#,
            regex::escape(key)
        ))?;
        if let Some(caps) = re.captures(text) {
            let value = caps.get(1).or_else(|| caps.get(2)).map(|m| m.as_str()).unwrap_or("");
            if !value.is_empty() {
                found.insert(key.clone(), Value::String(value.to_owned()));
            }
        }
    }
    Ok((!found.is_empty()).then_some(Value::Object(found)))
}

async fn read_file(path: &Path) -> Option<String> {
    match tokio::fs::read_to_string(path).await {
        Ok(text) if !text.trim().is_empty() => Some(text),
        Ok(_) => None,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
        Err(e) => {
            warn!(path = %path.display(), "unreadable credential file: {e}");
            None
        }
    }
}

/// Content of one candidate, or `None` when it holds nothing usable.
async fn probe_source(
    source: &CredentialSource,
    home: &Path,
    store: &Arc<dyn SecureStore>,
) -> anyhow::Result<Option<Hit>> {
    match source {
        CredentialSource::SecureStore { service } => {
            let Some(secret) = read_blocking(store, service).await? else {
                return Ok(None);
            };
            Ok(Some(Hit {
                location: Location::SecureStore(service.clone()),
                payload: serde_json::from_str(&secret).ok(),
            }))
        }
        CredentialSource::JsonFile { .. } => {
            let Some(path) = source.resolve(home) else {
                return Ok(None);
            };
            let Some(text) = read_file(&path).await else {
                return Ok(None);
            };
            let payload = match serde_json::from_str(&text) {
                Ok(v) => Some(v),
                Err(e) => {
                    debug!(path = %path.display(), "credential file is not JSON: {e}");
                    None
                }
            };
            Ok(Some(Hit { location: Location::File(path), payload }))
        }
        CredentialSource::TomlFile { keys, .. } => {
            let Some(path) = source.resolve(home) else {
                return Ok(None);
            };
            let Some(text) = read_file(&path).await else {
                return Ok(None);
            };
            // A config file without credential keys is not a hit.
            Ok(toml_keys(&text, keys)?.map(|payload| Hit {
                location: Location::File(path),
                payload: Some(payload),
            }))
        }
    }
}

/// First populated candidate in probe order.
pub async fn first_hit(
    descriptor: &ToolDescriptor,
    home: &Path,
    store: &Arc<dyn SecureStore>,
) -> anyhow::Result<Option<Hit>> {
    for source in &descriptor.credentials {
        if let Some(hit) = probe_source(source, home, store).await? {
            return Ok(Some(hit));
        }
    }
    Ok(None)
}

/// Whether any candidate is populated, without parsing JSON content.
pub async fn any_present(
    descriptor: &ToolDescriptor,
    home: &Path,
    store: &Arc<dyn SecureStore>,
) -> anyhow::Result<bool> {
    for source in &descriptor.credentials {
        let present = match source {
            CredentialSource::JsonFile { .. } => match source.resolve(home) {
                Some(path) => tokio::fs::metadata(&path).await.is_ok_and(|m| m.len() > 0),
                None => false,
            },
            // Secure store lookups and TOML key scans have no cheaper probe.
            _ => probe_source(source, home, store).await?.is_some(),
        };
        if present {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Content hash per candidate, used to notice credentials being written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint(Vec<Option<u64>>);

impl Fingerprint {
    /// True when some candidate is populated and differs from `baseline`.
    pub fn appeared_since(&self, baseline: &Fingerprint) -> bool {
        self.0.iter().zip(baseline.0.iter()).any(|(now, before)| now.is_some() && now != before)
    }
}

fn hash_str(text: &str) -> u64 {
    let mut h = DefaultHasher::new();
    text.hash(&mut h);
    h.finish()
}

pub async fn fingerprint(
    descriptor: &ToolDescriptor,
    home: &Path,
    store: &Arc<dyn SecureStore>,
) -> Fingerprint {
    let mut entries = Vec::with_capacity(descriptor.credentials.len());
    for source in &descriptor.credentials {
        let entry = match source {
            CredentialSource::SecureStore { service } => {
                read_blocking(store, service).await.ok().flatten().map(|s| hash_str(&s))
            }
            CredentialSource::JsonFile { .. } => match source.resolve(home) {
                Some(path) => read_file(&path).await.map(|s| hash_str(&s)),
                None => None,
            },
            CredentialSource::TomlFile { .. } => {
                probe_source(source, home, store).await.ok().flatten().and_then(|hit| {
                    hit.payload.map(|p| hash_str(&p.to_string()))
                })
            }
        };
        entries.push(entry);
    }
    Fingerprint(entries)
}

/// First non-empty string found at any of `pointers`.
pub fn secret_at(payload: &Value, pointers: &[&str]) -> Option<String> {
    pointers.iter().find_map(|p| {
        payload.pointer(p).and_then(Value::as_str).filter(|s| !s.is_empty()).map(str::to_owned)
    })
}
