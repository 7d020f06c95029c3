// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scripted-keystroke driver for CLIs whose login needs menu navigation.
//!
//! The CLI runs on a pseudo-terminal. Its screen is classified after every
//! chunk of output, known dialogs are answered, and progress is reported to
//! the parent as marker lines on stdout. Authorization codes arrive as
//! `CODE:<code>` lines on stdin.

pub mod dialog;
pub mod screen;

use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::env::PreparedEnv;
use crate::pty::PtyChild;
use crate::scrape::LOGIN_FAILED_MARKER;
use crate::tool::ToolDescriptor;

use self::dialog::{Action, DialogTracker};
use self::screen::Screen;

/// Prefix of an authorization-code line on stdin.
pub const CODE_PREFIX: &str = "CODE:";

/// Time the CLI gets to persist its state after the success screen.
const SUCCESS_SETTLE: Duration = Duration::from_millis(500);

/// Terminal size and streams for one driver run.
pub struct DriveIo<R, W> {
    pub cols: u16,
    pub rows: u16,
    pub input: R,
    pub output: W,
}

/// Drive `descriptor`'s login command to completion; returns the exit code.
pub async fn drive<R, W>(
    descriptor: &ToolDescriptor,
    env: &PreparedEnv,
    io: DriveIo<R, W>,
    shutdown: CancellationToken,
) -> anyhow::Result<i32>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let DriveIo { cols, rows, input, mut output } = io;

    let program = descriptor.login_command.first().and_then(|name| env.resolve(name));
    let Some(program) = program else {
        let reason = format!("{} is not installed", descriptor.executable);
        emit(&mut output, &format!("{LOGIN_FAILED_MARKER}{reason}")).await?;
        return Ok(1);
    };

    let mut env = env.clone();
    env.set("TERM", "xterm-256color");
    let child = PtyChild::spawn(&program, &descriptor.login_command, &env, cols, rows)?;
    info!(tool = %descriptor.id, pid = child.pid(), "driving {}", program.display());

    let mut screen = Screen::new(cols, rows);
    let mut tracker = DialogTracker::default();
    let mut lines = input.lines();
    let mut input_open = true;
    let mut buf = vec![0u8; 8192];

    loop {
        tokio::select! {
            n = child.read(&mut buf) => {
                let n = n?;
                if n == 0 {
                    let reason = format!("{} exited before login completed", descriptor.executable);
                    emit(&mut output, &format!("{LOGIN_FAILED_MARKER}{reason}")).await?;
                    return Ok(1);
                }
                screen.feed(&buf[..n]);
                for action in tracker.observe(&screen.lines()) {
                    match action {
                        Action::Keys(keys) => {
                            debug!("sending {:?}", String::from_utf8_lossy(keys));
                            child.write_all(keys).await?;
                        }
                        Action::Marker(line) => emit(&mut output, &line).await?,
                        Action::Finish(code) => {
                            if code == 0 {
                                tokio::time::sleep(SUCCESS_SETTLE).await;
                            }
                            return Ok(code);
                        }
                    }
                }
            }
            line = lines.next_line(), if input_open => {
                match line? {
                    Some(line) => {
                        if let Some(code) = line.trim().strip_prefix(CODE_PREFIX) {
                            debug!("typing authorization code");
                            child.write_all(format!("{}\r", code.trim()).as_bytes()).await?;
                        }
                    }
                    None => input_open = false,
                }
            }
            _ = shutdown.cancelled() => {
                emit(&mut output, &format!("{LOGIN_FAILED_MARKER}interrupted")).await?;
                return Ok(1);
            }
        }
    }
}

async fn emit<W: AsyncWrite + Unpin>(output: &mut W, line: &str) -> anyhow::Result<()> {
    output.write_all(line.as_bytes()).await?;
    output.write_all(b"\n").await?;
    output.flush().await?;
    Ok(())
}

#[cfg(test)]
#[path = "automation_tests.rs"]
mod tests;
