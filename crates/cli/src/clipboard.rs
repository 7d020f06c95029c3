// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::io::Write;
use std::process::{Command, Stdio};

use anyhow::{bail, Context};

/// Destination for copy-ready credential text.
pub trait Clipboard: Send + Sync {
    fn write(&self, text: &str) -> anyhow::Result<()>;
}

/// Pipes text into the platform clipboard helper.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClipboard;

impl SystemClipboard {
    fn candidates() -> &'static [&'static [&'static str]] {
        if cfg!(target_os = "macos") {
            &[&["pbcopy"]]
        } else if cfg!(windows) {
            &[&["clip"]]
        } else {
            &[&["wl-copy"], &["xclip", "-selection", "clipboard"]]
        }
    }
}

impl Clipboard for SystemClipboard {
    fn write(&self, text: &str) -> anyhow::Result<()> {
        let mut last_err = None;
        for argv in Self::candidates() {
            let mut child = match Command::new(argv[0])
                .args(&argv[1..])
                .stdin(Stdio::piped())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .spawn()
            {
                Ok(child) => child,
                Err(e) => {
                    last_err = Some(format!("{}: {e}", argv[0]));
                    continue;
                }
            };
            if let Some(mut stdin) = child.stdin.take() {
                stdin.write_all(text.as_bytes()).context("write to clipboard helper")?;
            }
            let status = child.wait().context("wait for clipboard helper")?;
            if status.success() {
                return Ok(());
            }
            last_err = Some(format!("{} exited with {status}", argv[0]));
        }
        bail!("no clipboard helper available ({})", last_err.unwrap_or_default())
    }
}
