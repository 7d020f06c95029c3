// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-tool login behaviour behind one trait, so the orchestrator never
//! branches on tool identity.

mod claude;
mod codex;
mod gemini;

pub use claude::ClaudeStrategy;
pub use codex::CodexStrategy;
pub use gemini::GeminiStrategy;

use std::path::Path;

use crate::tool::{ToolDescriptor, ToolId};

/// Text written to the child when `pattern` first appears in its output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromptResponse {
    /// Case-insensitive substring of the cleaned output.
    pub pattern: &'static str,
    pub input: &'static str,
}

/// What to do with an authorization code captured by the callback server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeDelivery {
    /// The callback itself completes the attempt.
    Resolve,
    /// Write the code to the child's stdin using this prefix, then keep
    /// waiting for the child to confirm.
    Stdin { prefix: &'static str },
}

impl CodeDelivery {
    /// Line to write to stdin for `code`, if this delivery writes one.
    pub fn stdin_line(&self, code: &str) -> Option<String> {
        match self {
            Self::Resolve => None,
            Self::Stdin { prefix } => Some(format!("{prefix}{code}\n")),
        }
    }
}

/// Tool-specific knowledge used by the login orchestrator and extractor.
pub trait LoginStrategy: Send + Sync + 'static {
    fn tool(&self) -> ToolId;

    /// Full argv for the login process.
    fn login_argv(&self, descriptor: &ToolDescriptor, automation_program: &Path) -> Vec<String> {
        if descriptor.requires_automation {
            vec![
                automation_program.to_string_lossy().into_owned(),
                "drive".to_owned(),
                self.tool().as_str().to_owned(),
            ]
        } else {
            descriptor.login_command.clone()
        }
    }

    /// Prompts answered automatically, each once per attempt.
    fn prompt_responses(&self) -> &'static [PromptResponse] {
        &[]
    }

    fn success_phrases(&self) -> &'static [&'static str];

    fn failure_phrases(&self) -> &'static [&'static str];

    /// URL fragments that mark a successful redirect in the embedded browser.
    fn success_url_patterns(&self) -> &'static [&'static str] {
        &[]
    }

    fn code_delivery(&self) -> CodeDelivery {
        CodeDelivery::Resolve
    }

    /// JSON pointers probed in order for a copy-ready secret.
    fn secret_pointers(&self) -> &'static [&'static str];
}

/// The strategy for `id`.
pub fn for_tool(id: ToolId) -> Box<dyn LoginStrategy> {
    match id {
        ToolId::Claude => Box::new(ClaudeStrategy),
        ToolId::Codex => Box::new(CodexStrategy),
        ToolId::Gemini => Box::new(GeminiStrategy),
    }
}

#[cfg(test)]
#[path = "strategy_tests.rs"]
mod tests;
