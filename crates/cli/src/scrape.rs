// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Best-effort heuristics over unversioned CLI text output.
//!
//! Everything here is pinned to literal transcripts in the tests. Upstream
//! wording changes break these patterns silently, so keep them isolated.

use regex::Regex;
use tracing::debug;

/// Marker prefix the automation driver prints before an authorize URL.
pub const AUTH_URL_MARKER: &str = "AUTH_URL:";
/// Marker the automation driver prints once the CLI reports success.
pub const LOGIN_SUCCESS_MARKER: &str = "LOGIN_SUCCESS";
/// Marker prefix the automation driver prints before a failure reason.
pub const LOGIN_FAILED_MARKER: &str = "LOGIN_FAILED:";

/// Matches CSI, OSC and two-byte escape sequences plus stray C0 controls.
const ANSI_PATTERN: &str = r"\x1b\[[0-?]*[ -/]*[@-~]|\x1b\][^\x07\x1b]*(?:\x07|\x1b\\)|\x1b[@-Z\\-_]|[\x00-\x08\x0b\x0c\x0e-\x1a\x1c-\x1f\x7f]";

/// URL patterns in priority order: explicit phrasing first, generic last.
const URL_PATTERNS: &[&str] = &[
    r"(?i)(?:visit|open|navigate to|go to|browse to|sign in at|log in at)\b[^\n]*?(https?://[^\s<>\x22']+)",
    r"(?i)(https?://[^\s<>\x22']*(?:oauth|authorize|signin|sign_in|login)[^\s<>\x22']*)",
    r"(https?://[^\s<>\x22']+)",
];

/// Something the scraper recognised in the output stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScrapeEvent {
    /// First authorization URL seen in the output.
    AuthUrl(String),
    /// A success phrase or `LOGIN_SUCCESS` marker.
    Success(String),
    /// A failure phrase or `LOGIN_FAILED:` marker.
    Failure(String),
}

/// A structured line printed by the automation driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Marker {
    AuthUrl(String),
    LoginSuccess,
    LoginFailed(String),
}

/// Parse a single line as a driver marker.
pub fn parse_marker(line: &str) -> Option<Marker> {
    let line = line.trim();
    if let Some(url) = line.strip_prefix(AUTH_URL_MARKER) {
        let url = url.trim();
        return (!url.is_empty()).then(|| Marker::AuthUrl(url.to_owned()));
    }
    if let Some(reason) = line.strip_prefix(LOGIN_FAILED_MARKER) {
        return Some(Marker::LoginFailed(reason.trim().to_owned()));
    }
    if line == LOGIN_SUCCESS_MARKER {
        return Some(Marker::LoginSuccess);
    }
    None
}

/// Removes terminal control sequences from raw output.
#[derive(Debug, Clone)]
pub struct AnsiStripper {
    re: Regex,
}

impl AnsiStripper {
    pub fn new() -> anyhow::Result<Self> {
        Ok(Self { re: Regex::new(ANSI_PATTERN)? })
    }

    pub fn strip(&self, text: &str) -> String {
        self.re.replace_all(text, "").replace("\r\n", "\n").replace('\r', "\n")
    }
}

/// True for URLs pointing at a loopback host (a CLI's own redirect listener).
fn is_loopback(url: &str) -> bool {
    match reqwest::Url::parse(url) {
        Ok(parsed) => matches!(
            parsed.host_str(),
            Some("localhost" | "127.0.0.1" | "[::1]" | "::1" | "0.0.0.0")
        ),
        Err(_) => false,
    }
}

fn trim_url(raw: &str) -> &str {
    raw.trim_end_matches(['.', ',', ';', ':', ')', ']', '}', '!', '?'])
}

/// Accumulating scanner for one login attempt's stdout/stderr.
///
/// Each event fires at most once per scraper: the first URL, the first
/// failure, the first success. Failure is checked independently of the URL
/// so a denial after the URL still surfaces.
#[derive(Debug)]
pub struct OutputScraper {
    stripper: AnsiStripper,
    url_patterns: Vec<Regex>,
    success: Vec<String>,
    failure: Vec<String>,
    /// Lowercased, ANSI-stripped text seen so far.
    transcript: String,
    /// Incomplete trailing line awaiting a newline.
    pending: String,
    url_seen: bool,
    success_seen: bool,
    failure_seen: bool,
}

impl OutputScraper {
    pub fn new(success: &[&str], failure: &[&str]) -> anyhow::Result<Self> {
        let url_patterns =
            URL_PATTERNS.iter().map(|p| Regex::new(p)).collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            stripper: AnsiStripper::new()?,
            url_patterns,
            success: success.iter().map(|p| p.to_lowercase()).collect(),
            failure: failure.iter().map(|p| p.to_lowercase()).collect(),
            transcript: String::new(),
            pending: String::new(),
            url_seen: false,
            success_seen: false,
            failure_seen: false,
        })
    }

    /// Feed a raw output chunk. Returns the cleaned text and any new events.
    pub fn feed(&mut self, raw: &str) -> (String, Vec<ScrapeEvent>) {
        let clean = self.stripper.strip(raw);
        self.pending.push_str(&clean);

        let mut events = Vec::new();
        while let Some(pos) = self.pending.find('\n') {
            let line: String = self.pending.drain(..=pos).collect();
            self.scan_line(line.trim_end(), &mut events);
        }
        self.scan_phrases(&clean, &mut events);
        (clean, events)
    }

    /// Flush the trailing partial line once the stream has ended.
    pub fn finish(&mut self) -> Vec<ScrapeEvent> {
        let mut events = Vec::new();
        let line = std::mem::take(&mut self.pending);
        if !line.trim().is_empty() {
            self.scan_line(line.trim_end(), &mut events);
        }
        events
    }

    /// Everything seen so far, ANSI-stripped and lowercased.
    pub fn transcript(&self) -> &str {
        &self.transcript
    }

    fn scan_line(&mut self, line: &str, events: &mut Vec<ScrapeEvent>) {
        if let Some(marker) = parse_marker(line) {
            match marker {
                Marker::AuthUrl(url) => self.emit_url(url, events),
                Marker::LoginSuccess => {
                    if !self.success_seen {
                        self.success_seen = true;
                        events.push(ScrapeEvent::Success(LOGIN_SUCCESS_MARKER.to_owned()));
                    }
                }
                Marker::LoginFailed(reason) => {
                    if !self.failure_seen {
                        self.failure_seen = true;
                        events.push(ScrapeEvent::Failure(reason));
                    }
                }
            }
            return;
        }

        if self.url_seen {
            return;
        }
        let found = self.url_patterns.iter().find_map(|re| {
            re.captures_iter(line)
                .filter_map(|c| c.get(1))
                .map(|m| trim_url(m.as_str()))
                .find(|u| !is_loopback(u))
                .map(str::to_owned)
        });
        if let Some(url) = found {
            self.emit_url(url, events);
        }
    }

    fn emit_url(&mut self, url: String, events: &mut Vec<ScrapeEvent>) {
        if self.url_seen {
            return;
        }
        debug!(url = %url, "auth url detected");
        self.url_seen = true;
        events.push(ScrapeEvent::AuthUrl(url));
    }

    fn scan_phrases(&mut self, clean: &str, events: &mut Vec<ScrapeEvent>) {
        self.transcript.push_str(&clean.to_lowercase());

        if !self.failure_seen {
            if let Some(phrase) = self.failure.iter().find(|p| self.transcript.contains(p.as_str()))
            {
                debug!(phrase = %phrase, "failure phrase matched");
                self.failure_seen = true;
                events.push(ScrapeEvent::Failure(phrase.clone()));
            }
        }
        if !self.success_seen {
            if let Some(phrase) = self.success.iter().find(|p| self.transcript.contains(p.as_str()))
            {
                debug!(phrase = %phrase, "success phrase matched");
                self.success_seen = true;
                events.push(ScrapeEvent::Success(phrase.clone()));
            }
        }
    }
}

#[cfg(test)]
#[path = "scrape_tests.rs"]
mod tests;
