// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use super::*;
use crate::env::prepare_current;
use crate::error::ErrorCode;
use crate::test_support::{fake_bin, RecordingOpener};
use crate::tool::{builtin, ToolId};

fn installer(home: &std::path::Path, opener: Arc<RecordingOpener>) -> Installer {
    Installer::new(
        prepare_current(home),
        opener,
        Duration::from_millis(10),
        Duration::from_millis(60),
    )
}

#[tokio::test]
async fn detects_executable_on_path() -> anyhow::Result<()> {
    let home = tempfile::tempdir()?;
    let env = prepare_current(home.path());
    assert!(is_installed("sh", &env).await);
    assert!(!is_installed("authpilot-test-definitely-missing", &env).await);
    Ok(())
}

#[tokio::test]
async fn home_bin_dirs_are_searched() -> anyhow::Result<()> {
    let home = tempfile::tempdir()?;
    fake_bin(&home.path().join(".local/bin"), "authpilot-fake-cli", "exit 0")?;
    let env = prepare_current(home.path());
    assert!(is_installed("authpilot-fake-cli", &env).await);
    Ok(())
}

#[tokio::test]
async fn install_streams_lines_and_succeeds() -> anyhow::Result<()> {
    let home = tempfile::tempdir()?;
    let npm = fake_bin(home.path(), "npm", "echo 'added 1 package'; echo 'warn deprecated' >&2")?;
    let mut desc = builtin(ToolId::Codex);
    desc.install_command = vec![npm.to_string_lossy().into_owned(), "install".into()];

    let lines = Mutex::new(Vec::<String>::new());
    installer(home.path(), Arc::new(RecordingOpener::default()))
        .install(&desc, |line| lines.lock().push(line.to_owned()))
        .await?;

    let lines = lines.into_inner();
    assert!(lines.iter().any(|l| l == "added 1 package"));
    assert!(lines.iter().any(|l| l == "warn deprecated"));
    Ok(())
}

#[tokio::test]
async fn install_failure_carries_exit_code() -> anyhow::Result<()> {
    let home = tempfile::tempdir()?;
    let npm = fake_bin(home.path(), "npm", "echo 'EACCES' >&2; exit 243")?;
    let mut desc = builtin(ToolId::Gemini);
    desc.install_command = vec![npm.to_string_lossy().into_owned()];

    let err = installer(home.path(), Arc::new(RecordingOpener::default()))
        .install(&desc, |_| {})
        .await
        .err()
        .ok_or_else(|| anyhow::anyhow!("expected install failure"))?;
    assert_eq!(err, LoginError::InstallFailed { code: Some(243) });
    assert!(err.to_string().contains("243"));
    Ok(())
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn missing_runtime_opens_download_page_then_fails() -> anyhow::Result<()> {
    let home = tempfile::tempdir()?;
    let mut desc = builtin(ToolId::Claude);
    desc.install_command = vec!["authpilot-test-missing-runtime".into(), "install".into()];
    let opener = Arc::new(RecordingOpener::default());

    let err = installer(home.path(), Arc::clone(&opener))
        .install(&desc, |_| {})
        .await
        .err()
        .ok_or_else(|| anyhow::anyhow!("expected prerequisite failure"))?;

    assert_eq!(err.code(), ErrorCode::PrerequisiteMissing);
    assert_eq!(opener.opened(), vec![RUNTIME_DOWNLOAD_URL.to_owned()]);
    Ok(())
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn runtime_appearing_within_window_unblocks_install() -> anyhow::Result<()> {
    let home = tempfile::tempdir()?;
    let bin = home.path().join(".local/bin");
    let mut desc = builtin(ToolId::Codex);
    desc.install_command = vec!["authpilot-late-runtime".into()];
    let installer = Installer::new(
        prepare_current(home.path()),
        Arc::new(RecordingOpener::default()),
        Duration::from_millis(10),
        Duration::from_secs(5),
    );

    let late = tokio::spawn({
        let bin = bin.clone();
        async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            fake_bin(&bin, "authpilot-late-runtime", "exit 0")
        }
    });
    installer.install(&desc, |_| {}).await?;
    late.await??;
    Ok(())
}
