// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! A child process on a pseudo-terminal, with a non-blocking master fd.

use std::ffi::CString;
use std::io;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, OwnedFd, RawFd};
use std::os::unix::ffi::OsStrExt;
use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::{bail, Context};
use nix::fcntl::{fcntl, FcntlArg, OFlag};
use nix::errno::Errno;
use nix::pty::{forkpty, ForkptyResult, Winsize};
use nix::sys::signal::{kill, SigHandler, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::{execve, Pid};
use tokio::io::unix::AsyncFd;
use tracing::debug;

use crate::env::PreparedEnv;

/// Time the session gets to exit on SIGHUP before SIGKILL.
const HANGUP_GRACE: Duration = Duration::from_millis(500);

/// How the child ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitStatus {
    pub code: Option<i32>,
    pub signal: Option<i32>,
}

/// The PTY master, owned for the life of its `AsyncFd` registration.
#[derive(Debug)]
struct MasterFd(OwnedFd);

impl AsRawFd for MasterFd {
    fn as_raw_fd(&self) -> RawFd {
        self.0.as_raw_fd()
    }
}

impl AsFd for MasterFd {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.0.as_fd()
    }
}

pub struct PtyChild {
    master: AsyncFd<MasterFd>,
    pid: Pid,
    reap_interval: Duration,
}

impl PtyChild {
    /// Run `program` on a new PTY of `cols` x `rows`.
    ///
    /// `argv[0]` is the name the child sees. The child's environment is
    /// exactly `env`.
    // forkpty, the post-fork child and AsyncFd registration require unsafe
    #[allow(unsafe_code)]
    pub fn spawn(
        program: &Path,
        argv: &[String],
        env: &PreparedEnv,
        cols: u16,
        rows: u16,
    ) -> anyhow::Result<Self> {
        if argv.is_empty() {
            bail!("empty argv");
        }
        // Everything the child needs is allocated before the fork.
        let c_path =
            CString::new(program.as_os_str().as_bytes()).context("invalid program path")?;
        let c_args: Vec<CString> = argv
            .iter()
            .map(|s| CString::new(s.as_bytes()))
            .collect::<Result<_, _>>()
            .context("invalid command argument")?;
        let c_env: Vec<CString> = env
            .iter()
            .map(|(k, v)| CString::new(format!("{k}={v}")))
            .collect::<Result<_, _>>()
            .context("invalid environment variable")?;

        let winsize = Winsize { ws_col: cols, ws_row: rows, ws_xpixel: 0, ws_ypixel: 0 };

        // SAFETY: forkpty is unsafe because the child is in a
        // partially-initialized state after fork. The child only resets a
        // signal disposition and execs.
        let result = unsafe { forkpty(&winsize, None) }.context("forkpty failed")?;

        match result {
            ForkptyResult::Child => {
                // Tokio sets SIGPIPE to SIG_IGN which the child inherits;
                // restore it so piped programs behave normally.
                // SAFETY: changing signal disposition in the post-fork child
                // before exec is the expected place to do so.
                unsafe {
                    let _ = nix::sys::signal::signal(Signal::SIGPIPE, SigHandler::SigDfl);
                }
                let _ = execve(&c_path, &c_args, &c_env);
                // SAFETY: _exit skips atexit handlers and stdio flushing,
                // which belong to the parent's copy of the process.
                unsafe { nix::libc::_exit(127) }
            }
            ForkptyResult::Parent { child, master } => {
                set_nonblocking(&master)?;
                // SAFETY: MasterFd owns the fd, so it stays open and
                // unchanged until the AsyncFd is dropped.
                let afd = unsafe { AsyncFd::register(MasterFd(master)) }
                    .context("register PTY master with the reactor")?;
                Ok(Self { master: afd, pid: child, reap_interval: Duration::from_millis(50) })
            }
        }
    }

    pub fn pid(&self) -> u32 {
        self.pid.as_raw() as u32
    }

    /// Read a chunk of terminal output. `Ok(0)` once the child side closes.
    pub async fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            let mut guard = self.master.readable().await?;
            match guard.try_io(|inner| nix::unistd::read(inner.get_ref(), buf).map_err(io_err)) {
                // Linux reports a hung-up slave as EIO rather than EOF.
                Ok(Err(e)) if e.raw_os_error() == Some(Errno::EIO as i32) => return Ok(0),
                Ok(result) => return result,
                Err(_would_block) => continue,
            }
        }
    }

    /// Write all of `data` as terminal input.
    pub async fn write_all(&self, data: &[u8]) -> io::Result<()> {
        let mut offset = 0;
        while offset < data.len() {
            let mut guard = self.master.writable().await?;
            match guard
                .try_io(|inner| nix::unistd::write(inner.get_ref(), &data[offset..]).map_err(io_err))
            {
                Ok(Ok(n)) => offset += n,
                Ok(Err(e)) => return Err(e),
                Err(_would_block) => continue,
            }
        }
        Ok(())
    }

    /// Reap the child on a blocking thread.
    pub async fn wait(&self) -> anyhow::Result<ExitStatus> {
        let pid = self.pid;
        tokio::task::spawn_blocking(move || wait_for_exit(pid)).await.context("join wait thread")?
    }
}

impl Drop for PtyChild {
    fn drop(&mut self) {
        // The child leads its own session, so its pid is also the group id.
        let group = Pid::from_raw(-self.pid.as_raw());
        let _ = kill(group, Signal::SIGHUP);

        let deadline = Instant::now() + HANGUP_GRACE;
        while Instant::now() < deadline {
            match waitpid(self.pid, Some(WaitPidFlag::WNOHANG)) {
                Ok(status) if exit_status(status).is_some() => return,
                Ok(_) => std::thread::sleep(self.reap_interval),
                Err(_) => return,
            }
        }

        debug!(pid = self.pid.as_raw(), "session ignored SIGHUP, killing");
        let _ = kill(group, Signal::SIGKILL);
        let _ = waitpid(self.pid, None);
    }
}

fn set_nonblocking(fd: impl AsFd) -> io::Result<()> {
    let fd = fd.as_fd();
    let flags = fcntl(fd, FcntlArg::F_GETFL).map_err(io_err)?;
    let flags = OFlag::from_bits_truncate(flags);
    fcntl(fd, FcntlArg::F_SETFL(flags | OFlag::O_NONBLOCK)).map_err(io_err)?;
    Ok(())
}

fn exit_status(status: WaitStatus) -> Option<ExitStatus> {
    match status {
        WaitStatus::Exited(_, code) => Some(ExitStatus { code: Some(code), signal: None }),
        WaitStatus::Signaled(_, sig, _) => Some(ExitStatus { code: None, signal: Some(sig as i32) }),
        _ => None,
    }
}

/// Block until the child exits.
fn wait_for_exit(pid: Pid) -> anyhow::Result<ExitStatus> {
    loop {
        match waitpid(pid, None) {
            Ok(status) => {
                if let Some(exit) = exit_status(status) {
                    return Ok(exit);
                }
            }
            Err(Errno::EINTR) => {}
            Err(e) => bail!("waitpid({pid}) failed: {e}"),
        }
    }
}

fn io_err(e: Errno) -> io::Error {
    io::Error::from_raw_os_error(e as i32)
}

#[cfg(test)]
#[path = "pty_tests.rs"]
mod tests;
