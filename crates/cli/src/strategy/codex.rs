// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::tool::ToolId;

use super::LoginStrategy;

/// `codex login` runs its own loopback listener and prints the authorize URL.
#[derive(Debug, Clone, Copy, Default)]
pub struct CodexStrategy;

impl LoginStrategy for CodexStrategy {
    fn tool(&self) -> ToolId {
        ToolId::Codex
    }

    fn success_phrases(&self) -> &'static [&'static str] {
        &["successfully logged in", "login successful", "already logged in"]
    }

    fn failure_phrases(&self) -> &'static [&'static str] {
        &["error logging in", "login failed", "access_denied"]
    }

    fn success_url_patterns(&self) -> &'static [&'static str] {
        &["localhost:1455/success", "/auth/callback?code="]
    }

    fn secret_pointers(&self) -> &'static [&'static str] {
        &["/OPENAI_API_KEY", "/tokens/access_token", "/api_key"]
    }
}
