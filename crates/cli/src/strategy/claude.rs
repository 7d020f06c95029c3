// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::tool::ToolId;

use super::{CodeDelivery, LoginStrategy};

/// Claude Code needs menu navigation, so login runs through the
/// scripted-keystroke driver and completion arrives as driver markers.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClaudeStrategy;

impl LoginStrategy for ClaudeStrategy {
    fn tool(&self) -> ToolId {
        ToolId::Claude
    }

    fn success_phrases(&self) -> &'static [&'static str] {
        &["login successful", "logged in as"]
    }

    fn failure_phrases(&self) -> &'static [&'static str] {
        &["oauth error", "invalid code", "login failed"]
    }

    fn success_url_patterns(&self) -> &'static [&'static str] {
        &["/oauth/code/success", "/oauth/code/callback"]
    }

    fn code_delivery(&self) -> CodeDelivery {
        CodeDelivery::Stdin { prefix: "CODE:" }
    }

    fn secret_pointers(&self) -> &'static [&'static str] {
        &["/claudeAiOauth/accessToken", "/accessToken", "/access_token"]
    }
}
