// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::strategy::{self, LoginStrategy};
use crate::tool::ToolId;

fn scraper_for(tool: ToolId) -> anyhow::Result<OutputScraper> {
    let strategy = strategy::for_tool(tool);
    OutputScraper::new(strategy.success_phrases(), strategy.failure_phrases())
}

fn urls(events: &[ScrapeEvent]) -> Vec<&str> {
    events
        .iter()
        .filter_map(|e| match e {
            ScrapeEvent::AuthUrl(u) => Some(u.as_str()),
            _ => None,
        })
        .collect()
}

#[test]
fn strips_color_and_cursor_sequences() -> anyhow::Result<()> {
    let stripper = AnsiStripper::new()?;
    let raw = "\x1b[1;32m✓\x1b[0m Logged in\x1b[2K\r\n\x1b]0;title\x07done";
    assert_eq!(stripper.strip(raw), "✓ Logged in\ndone");
    Ok(())
}

#[yare::parameterized(
    url     = { "AUTH_URL:https://claude.ai/oauth/authorize?x=1", Some(Marker::AuthUrl("https://claude.ai/oauth/authorize?x=1".into())) },
    success = { "LOGIN_SUCCESS", Some(Marker::LoginSuccess) },
    failed  = { "LOGIN_FAILED: process exited", Some(Marker::LoginFailed("process exited".into())) },
    empty   = { "AUTH_URL:", None },
    prose   = { "login success", None },
)]
fn marker_lines(line: &str, expected: Option<Marker>) {
    assert_eq!(parse_marker(line), expected);
}

#[test]
fn codex_transcript_skips_loopback_listener() -> anyhow::Result<()> {
    let mut scraper = scraper_for(ToolId::Codex)?;
    let (_, events) = scraper.feed(
        "Starting local login server on http://localhost:1455.\n\
         If your browser did not open, navigate to this URL to authenticate:\n\n\
         https://auth.openai.com/oauth/authorize?response_type=code&client_id=app_X\n",
    );
    assert_eq!(urls(&events), vec!["https://auth.openai.com/oauth/authorize?response_type=code&client_id=app_X"]);
    Ok(())
}

#[test]
fn explicit_phrasing_beats_generic_url_on_same_line() -> anyhow::Result<()> {
    let mut scraper = scraper_for(ToolId::Gemini)?;
    let (_, events) =
        scraper.feed("Docs at https://example.com/docs. Please visit https://accounts.google.com/o/oauth2/auth?c=1 to continue\n");
    assert_eq!(urls(&events), vec!["https://accounts.google.com/o/oauth2/auth?c=1"]);
    Ok(())
}

#[test]
fn url_split_across_chunks_waits_for_newline() -> anyhow::Result<()> {
    let mut scraper = scraper_for(ToolId::Claude)?;
    let (_, first) = scraper.feed("Open https://auth.example.com/oauth/auth");
    assert!(urls(&first).is_empty());
    let (_, second) = scraper.feed("orize?state=abc\n");
    assert_eq!(urls(&second), vec!["https://auth.example.com/oauth/authorize?state=abc"]);
    Ok(())
}

#[test]
fn url_fires_once() -> anyhow::Result<()> {
    let mut scraper = scraper_for(ToolId::Claude)?;
    let (_, first) = scraper.feed("visit https://a.example/oauth?1\n");
    let (_, second) = scraper.feed("visit https://b.example/oauth?2\n");
    assert_eq!(urls(&first).len(), 1);
    assert!(urls(&second).is_empty());
    Ok(())
}

#[test]
fn trailing_punctuation_is_trimmed() -> anyhow::Result<()> {
    let mut scraper = scraper_for(ToolId::Codex)?;
    let (_, events) = scraper.feed("Go to https://login.example.com/authorize?a=b.\n");
    assert_eq!(urls(&events), vec!["https://login.example.com/authorize?a=b"]);
    Ok(())
}

#[test]
fn gemini_cached_credentials_is_success() -> anyhow::Result<()> {
    let mut scraper = scraper_for(ToolId::Gemini)?;
    let (_, events) = scraper.feed("\x1b[2mLoaded cached credentials.\x1b[0m\n");
    assert_eq!(events, vec![ScrapeEvent::Success("loaded cached credentials".into())]);
    Ok(())
}

#[test]
fn success_phrase_split_across_chunks() -> anyhow::Result<()> {
    let mut scraper = scraper_for(ToolId::Codex)?;
    let (_, first) = scraper.feed("Successfully log");
    assert!(first.is_empty());
    let (_, second) = scraper.feed("ged in\n");
    assert_eq!(second, vec![ScrapeEvent::Success("successfully logged in".into())]);
    Ok(())
}

#[test]
fn denial_after_url_still_reported() -> anyhow::Result<()> {
    let mut scraper = scraper_for(ToolId::Codex)?;
    let (_, first) = scraper.feed("Open https://auth.example.com/oauth/authorize?s=1 in your browser\n");
    assert_eq!(urls(&first).len(), 1);
    let (_, second) = scraper.feed("Error: access_denied by user\n");
    assert_eq!(second, vec![ScrapeEvent::Failure("access_denied".into())]);
    Ok(())
}

#[test]
fn driver_markers_map_to_events() -> anyhow::Result<()> {
    let mut scraper = OutputScraper::new(&[], &[])?;
    let (_, events) = scraper.feed("AUTH_URL:https://claude.ai/oauth/authorize?code=true\nLOGIN_SUCCESS\n");
    assert_eq!(
        events,
        vec![
            ScrapeEvent::AuthUrl("https://claude.ai/oauth/authorize?code=true".into()),
            ScrapeEvent::Success(LOGIN_SUCCESS_MARKER.into()),
        ]
    );
    Ok(())
}

#[test]
fn driver_failure_marker_carries_reason() -> anyhow::Result<()> {
    let mut scraper = OutputScraper::new(&[], &[])?;
    let (_, events) = scraper.feed("LOGIN_FAILED:OAuth error: invalid code\n");
    assert_eq!(events, vec![ScrapeEvent::Failure("OAuth error: invalid code".into())]);
    Ok(())
}

#[test]
fn finish_flushes_partial_marker() -> anyhow::Result<()> {
    let mut scraper = OutputScraper::new(&[], &[])?;
    let (_, events) = scraper.feed("LOGIN_FAILED:cli exited");
    assert!(events.is_empty());
    assert_eq!(scraper.finish(), vec![ScrapeEvent::Failure("cli exited".into())]);
    Ok(())
}

#[test]
fn plain_word_success_is_not_matched() -> anyhow::Result<()> {
    let mut scraper = scraper_for(ToolId::Claude)?;
    let (_, events) = scraper.feed("Checking success criteria for authentication...\n");
    assert!(events.is_empty());
    Ok(())
}
