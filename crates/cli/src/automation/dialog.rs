// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Recognizing interactive login dialogs on the rendered screen and
//! deciding what to do about each.

use crate::scrape::{AUTH_URL_MARKER, LOGIN_FAILED_MARKER, LOGIN_SUCCESS_MARKER};

/// An interactive screen the CLI shows on the way to a login.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialog {
    WorkspaceTrust,
    ThemePicker,
    TerminalSetup,
    SecurityNotes,
    LoginMethod,
    /// The CLI started without credentials and asks for `/login`.
    MissingApiKey,
    /// The OAuth URL is shown alongside a code-paste prompt.
    CodePaste,
    LoginSuccess,
    Error,
}

impl Dialog {
    /// Keystrokes sent once when the dialog appears.
    pub fn keys(self) -> Option<&'static [u8]> {
        match self {
            Self::WorkspaceTrust
            | Self::ThemePicker
            | Self::TerminalSetup
            | Self::SecurityNotes
            | Self::LoginMethod
            | Self::LoginSuccess => Some(b"\r"),
            Self::MissingApiKey => Some(b"/login\r"),
            Self::CodePaste | Self::Error => None,
        }
    }
}

/// Signal phrases for a dialog screen, paired with its classification.
/// Signals are `(phrase, case_insensitive)`; case-insensitive phrases are
/// written in lowercase.
type DialogScreen = (Dialog, &'static [(&'static str, bool)]);

const DIALOG_SCREENS: &[DialogScreen] = &[
    (
        Dialog::SecurityNotes,
        &[
            ("Security notes:", false),
            ("Claude can make mistakes", false),
            ("Press Enter to continue", false),
        ],
    ),
    (
        Dialog::LoginSuccess,
        &[("Login successful", false), ("Logged in as", false), ("Press Enter to continue", false)],
    ),
    (
        Dialog::Error,
        &[
            ("OAuth error", false),
            ("Invalid code", false),
            ("Login failed", false),
            ("Press Enter to retry", false),
        ],
    ),
    (
        Dialog::Error,
        &[
            ("Settings Error", false),
            ("Continue without these settings", false),
            ("Exit and fix manually", false),
        ],
    ),
    (Dialog::CodePaste, &[("Paste code here if prompted", false), ("oauth/authorize", false)]),
    (
        Dialog::LoginMethod,
        &[
            ("Select login method:", false),
            ("Claude account with subscription", false),
            ("Anthropic Console account", false),
        ],
    ),
    (
        Dialog::MissingApiKey,
        &[("Missing API key", false), ("Invalid API key", false), ("run /login", true)],
    ),
    (
        Dialog::WorkspaceTrust,
        &[
            ("Accessing workspace:", false),
            ("Do you trust the files in this folder?", false),
            ("Yes, I trust this folder", false),
            ("Yes, proceed", false),
            ("enter to confirm", true),
        ],
    ),
    (
        Dialog::TerminalSetup,
        &[
            ("Use Claude Code's terminal setup?", false),
            ("Yes, use recommended settings", false),
            ("enter to confirm", true),
        ],
    ),
    (
        Dialog::ThemePicker,
        &[("Choose the text style", false), ("Dark mode", false), ("enter to confirm", true)],
    ),
];

/// Minimum number of signals that must match to identify a dialog screen.
const DIALOG_SIGNAL_THRESHOLD: usize = 2;

/// Classify the screen as a dialog; earlier entries win.
pub fn classify(lines: &[String]) -> Option<Dialog> {
    let lowered: Vec<String> = lines.iter().map(|l| l.trim().to_lowercase()).collect();
    for (dialog, signals) in DIALOG_SCREENS {
        let mut hits = 0;
        for &(phrase, ci) in *signals {
            let found = if ci {
                lowered.iter().any(|line| line.contains(phrase))
            } else {
                lines.iter().any(|line| line.trim().contains(phrase))
            };
            if found {
                hits += 1;
                if hits >= DIALOG_SIGNAL_THRESHOLD {
                    return Some(*dialog);
                }
            }
        }
    }
    None
}

/// Extract an OAuth authorization URL from screen lines.
///
/// The URL may be hard-wrapped: continuation lines start at column 0
/// while surrounding UI text is indented.
pub fn extract_auth_url(lines: &[String]) -> Option<String> {
    let suffix = "/oauth/authorize?";
    let start_idx = lines.iter().position(|line| {
        let t = line.trim_start();
        t.starts_with("https://") && t.contains(suffix)
    })?;

    let mut url = lines[start_idx].trim().to_owned();
    for line in &lines[start_idx + 1..] {
        let trimmed = line.trim_end();
        if trimmed.is_empty() || trimmed.starts_with(' ') {
            break;
        }
        url.push_str(trimmed);
    }
    Some(url)
}

/// The most specific line on an error screen.
fn error_reason(lines: &[String]) -> String {
    lines
        .iter()
        .map(|l| l.trim())
        .find(|l| {
            let lower = l.to_lowercase();
            lower.contains("error") || lower.contains("failed") || lower.contains("invalid")
        })
        .unwrap_or("login error")
        .to_owned()
}

/// What the driver does in response to a screen change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Type these bytes into the terminal.
    Keys(&'static [u8]),
    /// Print this line on the driver's stdout.
    Marker(String),
    /// Stop driving and exit with this code.
    Finish(i32),
}

/// Tracks which dialog is on screen so each appearance is answered once.
#[derive(Debug, Default)]
pub struct DialogTracker {
    current: Option<Dialog>,
    announced_url: Option<String>,
    finished: bool,
}

impl DialogTracker {
    /// Actions for the current screen contents.
    pub fn observe(&mut self, lines: &[String]) -> Vec<Action> {
        if self.finished {
            return Vec::new();
        }
        let dialog = classify(lines);
        let mut actions = Vec::new();

        // The URL is only trusted once the paste prompt has rendered below it.
        if dialog == Some(Dialog::CodePaste) {
            if let Some(url) = extract_auth_url(lines) {
                if self.announced_url.as_deref() != Some(url.as_str()) {
                    actions.push(Action::Marker(format!("{AUTH_URL_MARKER}{url}")));
                    self.announced_url = Some(url);
                }
            }
        }

        if dialog == self.current {
            return actions;
        }
        self.current = dialog;
        let Some(dialog) = dialog else {
            return actions;
        };

        match dialog {
            Dialog::LoginSuccess => {
                actions.push(Action::Marker(LOGIN_SUCCESS_MARKER.to_owned()));
                actions.extend(dialog.keys().map(Action::Keys));
                actions.push(Action::Finish(0));
                self.finished = true;
            }
            Dialog::Error => {
                actions.push(Action::Marker(format!(
                    "{LOGIN_FAILED_MARKER}{}",
                    error_reason(lines)
                )));
                actions.push(Action::Finish(1));
                self.finished = true;
            }
            other => actions.extend(other.keys().map(Action::Keys)),
        }
        actions
    }
}

#[cfg(test)]
#[path = "dialog_tests.rs"]
mod tests;
