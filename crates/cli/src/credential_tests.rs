// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use super::*;
use crate::env::prepare;
use crate::strategy::for_tool;
use crate::test_support::{fake_bin, write_file, MemorySecureStore};
use crate::tool::builtin;

fn locator(home: &Path, store: &Arc<MemorySecureStore>) -> CredentialLocator {
    CredentialLocator::new(home, Arc::clone(store) as Arc<dyn SecureStore>)
}

async fn extract(locator: &CredentialLocator, id: ToolId) -> CredentialDescriptor {
    locator.extract(&builtin(id), for_tool(id).as_ref(), Duration::ZERO).await
}

#[tokio::test]
async fn nothing_present_degrades_to_unverified() -> anyhow::Result<()> {
    let home = tempfile::tempdir()?;
    let store = Arc::new(MemorySecureStore::default());
    for id in ToolId::ALL {
        let desc = extract(&locator(home.path(), &store), id).await;
        assert_eq!(desc.status, CredentialStatus::AuthenticatedUnverified);
        assert_eq!(desc.storage, StorageKind::Unknown);
        assert!(desc.copy_text.is_none());
    }
    Ok(())
}

#[tokio::test]
async fn claude_file_yields_access_token() -> anyhow::Result<()> {
    let home = tempfile::tempdir()?;
    write_file(
        &home.path().join(".claude/.credentials.json"),
        r#"{"claudeAiOauth":{"accessToken":"sk-ant-oat01-abc","refreshToken":"r","expiresAt":1}}"#,
    )?;
    let store = Arc::new(MemorySecureStore::default());
    let desc = extract(&locator(home.path(), &store), ToolId::Claude).await;

    assert_eq!(desc.status, CredentialStatus::Authenticated);
    assert_eq!(desc.copy_text.as_deref(), Some("sk-ant-oat01-abc"));
    assert!(desc.has_secret);
    assert!(matches!(desc.storage, StorageKind::File { ref path } if path.ends_with(".claude/.credentials.json")));
    Ok(())
}

#[tokio::test]
async fn secure_store_is_probed_before_files() -> anyhow::Result<()> {
    let home = tempfile::tempdir()?;
    write_file(&home.path().join(".claude/.credentials.json"), r#"{"accessToken":"from-file"}"#)?;
    let store = Arc::new(MemorySecureStore::default());
    store.insert("Claude Code-credentials", r#"{"claudeAiOauth":{"accessToken":"from-store"}}"#);

    let desc = extract(&locator(home.path(), &store), ToolId::Claude).await;
    assert_eq!(desc.copy_text.as_deref(), Some("from-store"));
    assert_eq!(
        desc.storage,
        StorageKind::SecureStore { service: "Claude Code-credentials".to_owned() }
    );
    Ok(())
}

#[tokio::test]
async fn second_candidate_file_is_used() -> anyhow::Result<()> {
    let home = tempfile::tempdir()?;
    write_file(&home.path().join(".gemini/google_accounts.json"), r#"{"active":"me@example.com"}"#)?;
    let store = Arc::new(MemorySecureStore::default());
    let desc = extract(&locator(home.path(), &store), ToolId::Gemini).await;
    assert_eq!(desc.status, CredentialStatus::Authenticated);
    assert!(desc.copy_text.is_none());
    assert!(!desc.has_secret);
    Ok(())
}

#[tokio::test]
async fn codex_toml_keys_are_read_by_pattern() -> anyhow::Result<()> {
    let home = tempfile::tempdir()?;
    write_file(
        &home.path().join(".codex/config.toml"),
        "model = \"o4-mini\"\n\n[auth]\napi_key = \"sk-proj-123\"\n",
    )?;
    let store = Arc::new(MemorySecureStore::default());
    let desc = extract(&locator(home.path(), &store), ToolId::Codex).await;
    assert_eq!(desc.status, CredentialStatus::Authenticated);
    assert_eq!(desc.copy_text.as_deref(), Some("sk-proj-123"));
    Ok(())
}

#[tokio::test]
async fn codex_config_without_keys_is_not_a_credential() -> anyhow::Result<()> {
    let home = tempfile::tempdir()?;
    write_file(&home.path().join(".codex/config.toml"), "model = \"o4-mini\"\n")?;
    let store = Arc::new(MemorySecureStore::default());
    let loc = locator(home.path(), &store);
    assert!(!loc.check_authenticated(&builtin(ToolId::Codex)).await);
    let desc = extract(&loc, ToolId::Codex).await;
    assert_eq!(desc.status, CredentialStatus::AuthenticatedUnverified);
    Ok(())
}

#[tokio::test]
async fn malformed_json_still_counts_as_present() -> anyhow::Result<()> {
    let home = tempfile::tempdir()?;
    write_file(&home.path().join(".codex/auth.json"), "{not json")?;
    let store = Arc::new(MemorySecureStore::default());
    let desc = extract(&locator(home.path(), &store), ToolId::Codex).await;
    assert_eq!(desc.status, CredentialStatus::Authenticated);
    assert!(desc.payload.is_none());
    Ok(())
}

#[tokio::test]
async fn check_authenticated_tracks_presence() -> anyhow::Result<()> {
    let home = tempfile::tempdir()?;
    let store = Arc::new(MemorySecureStore::default());
    let loc = locator(home.path(), &store);
    let gemini = builtin(ToolId::Gemini);

    assert!(!loc.check_authenticated(&gemini).await);
    write_file(&home.path().join(".gemini/oauth_creds.json"), r#"{"access_token":"ya29"}"#)?;
    assert!(loc.check_authenticated(&gemini).await);
    Ok(())
}

#[tokio::test]
async fn fingerprint_notices_new_and_rewritten_credentials() -> anyhow::Result<()> {
    let home = tempfile::tempdir()?;
    let store = Arc::new(MemorySecureStore::default());
    let loc = locator(home.path(), &store);
    let codex = builtin(ToolId::Codex);
    let path = home.path().join(".codex/auth.json");

    let empty = loc.fingerprint(&codex).await;
    assert!(!loc.fingerprint(&codex).await.appeared_since(&empty));

    write_file(&path, r#"{"tokens":{"access_token":"a"}}"#)?;
    let first = loc.fingerprint(&codex).await;
    assert!(first.appeared_since(&empty));

    assert!(!loc.fingerprint(&codex).await.appeared_since(&first));
    write_file(&path, r#"{"tokens":{"access_token":"b"}}"#)?;
    assert!(loc.fingerprint(&codex).await.appeared_since(&first));
    Ok(())
}

#[tokio::test]
async fn logout_with_nothing_present_succeeds() -> anyhow::Result<()> {
    let home = tempfile::tempdir()?;
    let store = Arc::new(MemorySecureStore::default());
    let env = prepare(Vec::new(), home.path());
    let outcome = locator(home.path(), &store).logout(&builtin(ToolId::Gemini), &env).await;
    assert!(outcome.success);
    assert!(outcome.message.contains("nothing to remove"));
    assert!(outcome.removed.is_empty());
    Ok(())
}

#[tokio::test]
async fn logout_removes_files_and_store_entry() -> anyhow::Result<()> {
    let home = tempfile::tempdir()?;
    let path = home.path().join(".claude/.credentials.json");
    write_file(&path, "{}")?;
    let store = Arc::new(MemorySecureStore::default());
    store.insert("Claude Code-credentials", "secret");
    let env = prepare(Vec::new(), home.path());

    let outcome = locator(home.path(), &store).logout(&builtin(ToolId::Claude), &env).await;

    assert!(outcome.success);
    assert_eq!(outcome.removed.len(), 2);
    assert!(!path.exists());
    assert!(store.get("Claude Code-credentials").is_none());
    Ok(())
}

#[tokio::test]
async fn codex_logout_survives_missing_native_command() -> anyhow::Result<()> {
    let home = tempfile::tempdir()?;
    let path = home.path().join(".codex/auth.json");
    write_file(&path, "{}")?;
    let store = Arc::new(MemorySecureStore::default());
    let mut codex = builtin(ToolId::Codex);
    codex.logout_command = Some(vec!["authpilot-test-no-such-binary".to_owned()]);
    let env = prepare(Vec::new(), home.path());

    let outcome = locator(home.path(), &store).logout(&codex, &env).await;
    assert!(outcome.success);
    assert!(!path.exists());
    Ok(())
}

#[tokio::test]
async fn files_deleted_by_native_logout_count_as_removed() -> anyhow::Result<()> {
    let home = tempfile::tempdir()?;
    let path = home.path().join(".codex/auth.json");
    write_file(&path, r#"{"OPENAI_API_KEY":"sk-test"}"#)?;
    let native = fake_bin(
        &home.path().join("bin"),
        "codex",
        &format!("rm -f '{}'\necho 'Successfully logged out'", path.display()),
    )?;
    let store = Arc::new(MemorySecureStore::default());
    let mut codex = builtin(ToolId::Codex);
    codex.logout_command = Some(vec![native.to_string_lossy().into_owned(), "logout".to_owned()]);
    let env = prepare(vec![("PATH".to_owned(), "/usr/bin:/bin".to_owned())], home.path());

    let outcome = locator(home.path(), &store).logout(&codex, &env).await;

    assert!(outcome.success);
    assert!(!path.exists());
    assert_eq!(outcome.removed, vec![path.display().to_string()]);
    assert!(outcome.message.starts_with("Removed 1"), "{}", outcome.message);
    Ok(())
}

#[test]
fn descriptor_json_never_carries_secrets() -> anyhow::Result<()> {
    let desc = CredentialDescriptor {
        tool: ToolId::Codex,
        status: CredentialStatus::Authenticated,
        message: "ok".into(),
        storage: StorageKind::File { path: "/h/.codex/auth.json".into() },
        payload: Some(serde_json::json!({"api_key": "sk-secret"})),
        copy_text: Some("sk-secret".into()),
        has_secret: true,
    };
    let json = serde_json::to_string(&desc)?;
    assert!(!json.contains("sk-secret"));
    assert!(json.contains("\"status\":\"authenticated\""));
    assert!(json.contains("\"kind\":\"file\""));
    Ok(())
}

#[yare::parameterized(
    double_quoted = { "api_key = \"abc\"", Some("abc") },
    single_quoted = { "  token='t0k'", Some("t0k") },
    empty_value   = { "api_key = \"\"", None },
    commented     = { "# api_key = \"x\"", None },
    other_key     = { "my_api_key = \"x\"", None },
)]
fn toml_key_scan(text: &str, expected: Option<&str>) -> anyhow::Result<()> {
    let keys = vec!["api_key".to_owned(), "token".to_owned()];
    let found = locate::toml_keys(text, &keys)?;
    let value = found.as_ref().and_then(|v| v.as_object()).and_then(|m| m.values().next()).and_then(|v| v.as_str());
    assert_eq!(value, expected);
    Ok(())
}
