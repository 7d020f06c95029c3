// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::tool::ToolId;

use super::{LoginStrategy, PromptResponse};

/// Gemini CLI asks for an auth method and folder trust on first run.
#[derive(Debug, Clone, Copy, Default)]
pub struct GeminiStrategy;

const PROMPTS: &[PromptResponse] = &[
    PromptResponse { pattern: "do you trust this folder", input: "\r" },
    PromptResponse { pattern: "login with google", input: "\r" },
];

impl LoginStrategy for GeminiStrategy {
    fn tool(&self) -> ToolId {
        ToolId::Gemini
    }

    fn prompt_responses(&self) -> &'static [PromptResponse] {
        PROMPTS
    }

    fn success_phrases(&self) -> &'static [&'static str] {
        &["loaded cached credentials", "authentication succeeded", "logged in with google"]
    }

    fn failure_phrases(&self) -> &'static [&'static str] {
        &["failed to login", "authentication failed", "access_denied"]
    }

    fn success_url_patterns(&self) -> &'static [&'static str] {
        &["auth_success_gemini", "/oauth2callback?code="]
    }

    fn secret_pointers(&self) -> &'static [&'static str] {
        &["/access_token", "/refresh_token"]
    }
}
