// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::HashSet;
use std::path::Path;

use super::*;

#[yare::parameterized(
    claude = { "claude", ToolId::Claude },
    codex  = { "Codex", ToolId::Codex },
    gemini = { "GEMINI", ToolId::Gemini },
)]
fn parse_tool_id(input: &str, expected: ToolId) -> anyhow::Result<()> {
    assert_eq!(input.parse::<ToolId>()?, expected);
    Ok(())
}

#[test]
fn unknown_tool_is_rejected() {
    crate::assert_err_contains!("copilot".parse::<ToolId>(), "unknown tool");
}

#[test]
fn builtin_ports_are_distinct() {
    let registry = ToolRegistry::builtin();
    let ports: HashSet<u16> = registry.iter().map(|d| d.callback_port).collect();
    assert_eq!(ports.len(), 3);
}

#[test]
fn only_claude_requires_automation() {
    let registry = ToolRegistry::builtin();
    let scripted: Vec<ToolId> =
        registry.iter().filter(|d| d.requires_automation).map(|d| d.id).collect();
    assert_eq!(scripted, vec![ToolId::Claude]);
}

#[test]
fn registry_override_replaces_one_tool() {
    let mut codex = builtin(ToolId::Codex);
    codex.callback_port = 0;
    let registry = ToolRegistry::builtin().with(codex);
    assert_eq!(registry.get(ToolId::Codex).callback_port, 0);
    assert_eq!(registry.get(ToolId::Claude).callback_port, 54545);
}

#[test]
fn credential_paths_resolve_against_home() {
    let desc = builtin(ToolId::Claude);
    let paths = desc.credential_paths(Path::new("/home/alice"));
    assert_eq!(paths[0], Path::new("/home/alice/.claude/.credentials.json"));
    assert_eq!(desc.secure_store_service(), Some("Claude Code-credentials"));
}

#[test]
fn codex_has_native_logout_and_toml_fallback() {
    let desc = builtin(ToolId::Codex);
    assert_eq!(desc.logout_command.as_deref(), Some(&["codex".to_owned(), "logout".to_owned()][..]));
    assert!(matches!(desc.credentials.last(), Some(CredentialSource::TomlFile { .. })));
    assert_eq!(desc.secure_store_service(), None);
}

#[test]
fn tool_id_serializes_lowercase() -> anyhow::Result<()> {
    assert_eq!(serde_json::to_string(&ToolId::Gemini)?, "\"gemini\"");
    Ok(())
}
