// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::{Path, PathBuf};

use super::*;

fn snapshot(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
    pairs.iter().map(|(k, v)| ((*k).to_owned(), (*v).to_owned())).collect()
}

#[test]
fn api_keys_and_ci_markers_are_stripped() {
    let env = prepare(
        snapshot(&[
            ("ANTHROPIC_API_KEY", "sk-ant"),
            ("OPENAI_API_KEY", "sk-oai"),
            ("GEMINI_API_KEY", "g"),
            ("CI", "true"),
            ("NO_BROWSER", "1"),
            ("LANG", "en_US.UTF-8"),
        ]),
        Path::new("/home/u"),
    );
    assert_eq!(env.get("ANTHROPIC_API_KEY"), None);
    assert_eq!(env.get("OPENAI_API_KEY"), None);
    assert_eq!(env.get("GEMINI_API_KEY"), None);
    assert_eq!(env.get("CI"), None);
    assert_eq!(env.get("NO_BROWSER"), None);
    assert_eq!(env.get("LANG"), Some("en_US.UTF-8"));
}

#[yare::parameterized(
    none    = { "none", false },
    empty   = { "", false },
    firefox = { "firefox", true },
)]
fn inert_browser_hint_is_dropped(value: &str, kept: bool) {
    let env = prepare(snapshot(&[("BROWSER", value)]), Path::new("/h"));
    assert_eq!(env.get("BROWSER").is_some(), kept);
}

#[test]
fn well_known_dirs_are_prepended_and_deduplicated() {
    let env = prepare(snapshot(&[("PATH", "/usr/bin:/custom/bin:/usr/local/bin")]), Path::new("/h"));
    let dirs = env.path_dirs();

    assert_eq!(dirs[0], PathBuf::from("/usr/local/bin"));
    assert!(dirs.contains(&PathBuf::from("/h/.npm-global/bin")));
    assert!(dirs.contains(&PathBuf::from("/custom/bin")));

    let usr_bin = dirs.iter().filter(|d| d.as_path() == Path::new("/usr/bin")).count();
    let local_bin = dirs.iter().filter(|d| d.as_path() == Path::new("/usr/local/bin")).count();
    assert_eq!(usr_bin, 1);
    assert_eq!(local_bin, 1);
}

#[test]
fn missing_path_still_produces_a_path() {
    let env = prepare(Vec::new(), Path::new("/h"));
    assert!(env.get("PATH").is_some_and(|p| p.contains("/usr/local/bin")));
}

#[test]
fn home_is_exported() {
    let env = prepare(snapshot(&[("HOME", "/real/home")]), Path::new("/sandbox"));
    assert_eq!(env.get("HOME"), Some("/sandbox"));
}

#[test]
fn preparation_is_pure() {
    let input = snapshot(&[("PATH", "/a:/b"), ("OPENAI_API_KEY", "x"), ("TERM", "xterm")]);
    let first = prepare(input.clone(), Path::new("/h"));
    let second = prepare(input, Path::new("/h"));
    assert_eq!(first, second);
}

#[cfg(unix)]
#[test]
fn resolve_searches_prepared_path() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let bin = crate::test_support::fake_bin(&dir.path().join("bin"), "fake-cli", "exit 0")?;
    std::fs::write(dir.path().join("bin/not-executable"), "")?;
    let path = format!("/nonexistent:{}", dir.path().join("bin").display());
    let env = prepare(snapshot(&[("PATH", path.as_str())]), dir.path());

    assert_eq!(env.resolve("fake-cli"), Some(bin.clone()));
    assert_eq!(env.resolve(&bin.to_string_lossy()), Some(bin));
    assert_eq!(env.resolve("not-executable"), None);
    assert_eq!(env.resolve("authpilot-test-no-such-cli"), None);
    Ok(())
}

#[cfg(unix)]
#[test]
#[serial_test::serial]
fn non_unicode_variables_are_skipped() {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    std::env::set_var("AUTHPILOT_TEST_RAW_BYTES", OsStr::from_bytes(b"\xff\xfe"));
    std::env::set_var("AUTHPILOT_TEST_PLAIN", "kept");
    let env = prepare_current(Path::new("/h"));
    std::env::remove_var("AUTHPILOT_TEST_RAW_BYTES");
    std::env::remove_var("AUTHPILOT_TEST_PLAIN");

    assert_eq!(env.get("AUTHPILOT_TEST_RAW_BYTES"), None);
    assert_eq!(env.get("AUTHPILOT_TEST_PLAIN"), Some("kept"));
    assert_eq!(env.get("HOME"), Some("/h"));
}
