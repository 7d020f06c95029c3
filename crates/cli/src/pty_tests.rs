// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::Path;
use std::time::Duration;

use super::*;
use crate::env::prepare_current;
use crate::process::is_process_alive;

fn sh(script: &str) -> Vec<String> {
    vec!["sh".to_owned(), "-c".to_owned(), script.to_owned()]
}

/// Read until the child closes the terminal or `needle` shows up.
async fn read_until(child: &PtyChild, needle: &str) -> anyhow::Result<String> {
    let mut out = Vec::new();
    let mut buf = [0u8; 1024];
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let n = tokio::time::timeout_at(deadline, child.read(&mut buf)).await??;
        if n == 0 {
            break;
        }
        out.extend_from_slice(&buf[..n]);
        if String::from_utf8_lossy(&out).contains(needle) {
            break;
        }
    }
    Ok(String::from_utf8_lossy(&out).into_owned())
}

#[tokio::test]
async fn output_and_exit_code() -> anyhow::Result<()> {
    let home = tempfile::tempdir()?;
    let env = prepare_current(home.path());
    let child = PtyChild::spawn(Path::new("/bin/sh"), &sh("printf hello; exit 3"), &env, 80, 24)?;

    let out = read_until(&child, "hello").await?;
    assert!(out.contains("hello"), "{out:?}");
    assert_eq!(child.wait().await?, ExitStatus { code: Some(3), signal: None });
    Ok(())
}

#[tokio::test]
async fn input_reaches_the_child() -> anyhow::Result<()> {
    let home = tempfile::tempdir()?;
    let env = prepare_current(home.path());
    let child =
        PtyChild::spawn(Path::new("/bin/sh"), &sh("read line; echo \"got:$line\""), &env, 80, 24)?;

    child.write_all(b"abc\r").await?;
    let out = read_until(&child, "got:abc").await?;
    assert!(out.contains("got:abc"), "{out:?}");
    Ok(())
}

#[tokio::test]
async fn environment_is_exactly_the_prepared_one() -> anyhow::Result<()> {
    let home = tempfile::tempdir()?;
    let mut env = prepare_current(home.path());
    env.set("AUTHPILOT_PTY_MARK", "x1");
    let child = PtyChild::spawn(
        Path::new("/bin/sh"),
        &sh("printf 'mark=%s home=%s end' \"$AUTHPILOT_PTY_MARK\" \"$HOME\""),
        &env,
        80,
        24,
    )?;

    let out = read_until(&child, "end").await?;
    assert!(out.contains("mark=x1"), "{out:?}");
    assert!(out.contains(&format!("home={}", home.path().display())), "{out:?}");
    Ok(())
}

#[tokio::test]
async fn missing_program_exits_127() -> anyhow::Result<()> {
    let home = tempfile::tempdir()?;
    let env = prepare_current(home.path());
    let child = PtyChild::spawn(
        &home.path().join("no-such-program"),
        &["no-such-program".to_owned()],
        &env,
        80,
        24,
    )?;
    assert_eq!(child.wait().await?.code, Some(127));
    Ok(())
}

#[tokio::test]
async fn drop_kills_the_process_group() -> anyhow::Result<()> {
    let home = tempfile::tempdir()?;
    let env = prepare_current(home.path());
    let child = PtyChild::spawn(Path::new("/bin/sh"), &sh("sleep 30"), &env, 80, 24)?;
    let pid = child.pid();
    assert!(is_process_alive(pid));

    drop(child);
    assert!(!is_process_alive(pid));
    Ok(())
}

#[tokio::test]
async fn master_is_registered_non_blocking() -> anyhow::Result<()> {
    let home = tempfile::tempdir()?;
    let env = prepare_current(home.path());
    let child = PtyChild::spawn(Path::new("/bin/sh"), &sh("sleep 30"), &env, 80, 24)?;

    let flags = OFlag::from_bits_truncate(fcntl(child.master.get_ref(), FcntlArg::F_GETFL)?);
    assert!(flags.contains(OFlag::O_NONBLOCK));

    // Nothing written yet: a read must park on readiness rather than block.
    let mut buf = [0u8; 64];
    let pending = tokio::time::timeout(Duration::from_millis(100), child.read(&mut buf)).await;
    assert!(pending.is_err(), "read returned {pending:?}");
    Ok(())
}

#[test]
fn empty_argv_is_rejected() -> anyhow::Result<()> {
    let home = tempfile::tempdir()?;
    let env = prepare_current(home.path());
    assert!(PtyChild::spawn(Path::new("/bin/sh"), &[], &env, 80, 24).is_err());
    Ok(())
}
