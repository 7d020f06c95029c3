// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::Path;

use super::*;
use crate::scrape::{OutputScraper, ScrapeEvent};
use crate::tool::builtin;

#[test]
fn each_tool_gets_its_own_strategy() {
    for id in ToolId::ALL {
        assert_eq!(for_tool(id).tool(), id);
    }
}

#[test]
fn claude_login_runs_through_driver() {
    let strategy = for_tool(ToolId::Claude);
    let argv = strategy.login_argv(&builtin(ToolId::Claude), Path::new("/opt/authpilot"));
    assert_eq!(argv, vec!["/opt/authpilot", "drive", "claude"]);
}

#[test]
fn codex_login_runs_native_command() {
    let strategy = for_tool(ToolId::Codex);
    let argv = strategy.login_argv(&builtin(ToolId::Codex), Path::new("/opt/authpilot"));
    assert_eq!(argv, vec!["codex", "login"]);
}

#[yare::parameterized(
    claude = { ToolId::Claude, Some("CODE:abc\n".to_owned()) },
    codex  = { ToolId::Codex, None },
    gemini = { ToolId::Gemini, None },
)]
fn code_delivery_per_tool(id: ToolId, expected: Option<String>) {
    assert_eq!(for_tool(id).code_delivery().stdin_line("abc"), expected);
}

#[yare::parameterized(
    codex_success  = { ToolId::Codex, "Successfully logged in\n", true },
    codex_generic  = { ToolId::Codex, "Login success page rendered\n", false },
    gemini_cached  = { ToolId::Gemini, "Loaded cached credentials.\n", true },
    gemini_banner  = { ToolId::Gemini, "Tips for getting started: authenticate first\n", false },
    claude_login   = { ToolId::Claude, "Login successful. Press Enter to continue\n", true },
)]
fn tightened_success_phrases(id: ToolId, transcript: &str, matched: bool) -> anyhow::Result<()> {
    let strategy = for_tool(id);
    let mut scraper =
        OutputScraper::new(strategy.success_phrases(), strategy.failure_phrases())?;
    let (_, events) = scraper.feed(transcript);
    let success = events.iter().any(|e| matches!(e, ScrapeEvent::Success(_)));
    assert_eq!(success, matched);
    Ok(())
}

#[test]
fn gemini_answers_first_run_prompts() {
    let prompts = for_tool(ToolId::Gemini).prompt_responses();
    assert!(prompts.iter().any(|p| p.pattern.contains("trust")));
    assert!(prompts.iter().all(|p| p.pattern == p.pattern.to_lowercase()));
}
