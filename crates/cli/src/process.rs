// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Child process plumbing shared by the installer and the login orchestrator.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use anyhow::Context;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tracing::debug;

use crate::env::PreparedEnv;

/// Which stream a chunk of output came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
}

/// Build a command for `argv` with the prepared environment installed.
///
/// The child leads its own process group so teardown reaches grandchildren.
pub fn command(argv: &[String], env: &PreparedEnv, cwd: Option<&Path>) -> anyhow::Result<Command> {
    let (program, args) = argv.split_first().context("empty command")?;
    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    env.apply(&mut cmd);
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }
    #[cfg(unix)]
    cmd.process_group(0);
    Ok(cmd)
}

/// Spawn `argv` with piped stdio.
pub fn spawn(argv: &[String], env: &PreparedEnv, cwd: Option<&Path>) -> anyhow::Result<Child> {
    let mut cmd = command(argv, env, cwd)?;
    let child = cmd.spawn().with_context(|| format!("spawn {}", argv.join(" ")))?;
    debug!(pid = child.id(), program = %argv[0], "spawned child");
    Ok(child)
}

/// Forward both output streams of `child` as lossy UTF-8 chunks.
///
/// The channel closes once both streams reach EOF.
pub fn pump_output(child: &mut Child, capacity: usize) -> mpsc::Receiver<(Stream, String)> {
    let (tx, rx) = mpsc::channel(capacity);
    if let Some(stdout) = child.stdout.take() {
        tokio::spawn(pump(stdout, Stream::Stdout, tx.clone()));
    }
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(pump(stderr, Stream::Stderr, tx));
    }
    rx
}

async fn pump<R>(mut reader: R, stream: Stream, tx: mpsc::Sender<(Stream, String)>)
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; 8192];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                let chunk = String::from_utf8_lossy(&buf[..n]).into_owned();
                if tx.send((stream, chunk)).await.is_err() {
                    break;
                }
            }
        }
    }
}

/// Stop `child` and its process group: wait `flush` for a natural exit,
/// then SIGTERM, wait `grace`, then SIGKILL.
///
/// Always reaps the child before returning.
pub async fn terminate(child: &mut Child, flush: Duration, grace: Duration) {
    if let Ok(Ok(status)) = tokio::time::timeout(flush, child.wait()).await {
        debug!(?status, "child exited during flush grace");
        return;
    }
    let Some(raw) = child.id() else {
        let _ = child.wait().await;
        return;
    };
    let pgid = Pid::from_raw(-(raw as i32));
    let _ = kill(pgid, Signal::SIGTERM);
    if let Ok(Ok(status)) = tokio::time::timeout(grace, child.wait()).await {
        debug!(?status, "child exited after SIGTERM");
        return;
    }
    let _ = kill(pgid, Signal::SIGKILL);
    let _ = child.kill().await;
    debug!(pid = raw, "child killed");
}

/// SIGKILL the process group led by `pid` without waiting. For drop paths
/// where [`terminate`] cannot be awaited.
pub fn kill_group(pid: u32) {
    if let Err(e) = kill(Pid::from_raw(-(pid as i32)), Signal::SIGKILL) {
        debug!(pid, "kill process group: {e}");
    }
}

/// Whether a process with `pid` exists (signal 0 probe).
pub fn is_process_alive(pid: u32) -> bool {
    kill(Pid::from_raw(pid as i32), None).is_ok()
}

#[cfg(test)]
#[path = "process_tests.rs"]
mod tests;
