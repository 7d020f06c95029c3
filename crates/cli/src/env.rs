// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Sanitized process environment for spawned CLIs.
//!
//! Every child gets the same treatment: well-known binary directories are
//! prepended to `PATH`, and variables that would let a CLI skip interactive
//! OAuth (API keys, CI markers, headless-browser hints) are removed.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Absolute directories prepended to `PATH`, in order.
const SYSTEM_BIN_DIRS: &[&str] =
    &["/usr/local/bin", "/opt/homebrew/bin", "/opt/homebrew/sbin", "/usr/bin", "/bin"];

/// Home-relative directories prepended after [`SYSTEM_BIN_DIRS`].
const HOME_BIN_DIRS: &[&str] =
    &[".npm-global/bin", ".local/bin", ".volta/bin", ".bun/bin", ".cargo/bin"];

/// Variables removed from every child environment.
pub const STRIPPED_VARS: &[&str] = &[
    // Provider credentials that short-circuit OAuth.
    "ANTHROPIC_API_KEY",
    "ANTHROPIC_AUTH_TOKEN",
    "CLAUDE_API_KEY",
    "CLAUDE_CODE_OAUTH_TOKEN",
    "OPENAI_API_KEY",
    "CODEX_API_KEY",
    "GEMINI_API_KEY",
    "GOOGLE_API_KEY",
    "GOOGLE_APPLICATION_CREDENTIALS",
    "GOOGLE_GENAI_USE_VERTEXAI",
    "API_KEY",
    // CI detection flips several CLIs into non-interactive mode.
    "CI",
    "CONTINUOUS_INTEGRATION",
    "GITHUB_ACTIONS",
    "BUILDKITE",
    "GITLAB_CI",
    "JENKINS_URL",
    // Headless browser hints.
    "NO_BROWSER",
];

/// `BROWSER` values that disable opening a browser.
const INERT_BROWSER_VALUES: &[&str] = &["", "none", "false", "0", "true"];

/// An environment mapping ready to be installed on a child process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreparedEnv {
    vars: BTreeMap<String, String>,
}

impl PreparedEnv {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Replace the command's environment with this mapping.
    pub fn apply(&self, cmd: &mut tokio::process::Command) {
        cmd.env_clear();
        cmd.envs(&self.vars);
    }

    /// Split `PATH` into its directories.
    pub fn path_dirs(&self) -> Vec<PathBuf> {
        match self.vars.get("PATH") {
            Some(path) => std::env::split_paths(path).collect(),
            None => Vec::new(),
        }
    }

    /// Set or override one variable.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(key.into(), value.into());
    }

    /// Locate `program` the way `execvp` would, but against this `PATH`.
    ///
    /// A name containing a separator is taken as a path and only checked
    /// for existence.
    pub fn resolve(&self, program: &str) -> Option<PathBuf> {
        if program.contains(std::path::MAIN_SEPARATOR) {
            let path = PathBuf::from(program);
            return is_executable(&path).then_some(path);
        }
        self.path_dirs().into_iter().map(|dir| dir.join(program)).find(|p| is_executable(p))
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata().map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0).unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Build the child environment from a snapshot of the current one.
///
/// `home` is exported as `HOME` so the child writes its credentials where
/// the extractor will look for them.
pub fn prepare<I>(snapshot: I, home: &Path) -> PreparedEnv
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut vars: BTreeMap<String, String> = snapshot
        .into_iter()
        .filter(|(k, _)| !STRIPPED_VARS.contains(&k.as_str()))
        .filter(|(k, v)| !(k == "BROWSER" && INERT_BROWSER_VALUES.contains(&v.trim())))
        .collect();

    let existing = vars.remove("PATH").unwrap_or_default();
    let mut dirs: Vec<PathBuf> = SYSTEM_BIN_DIRS.iter().map(PathBuf::from).collect();
    dirs.extend(HOME_BIN_DIRS.iter().map(|d| home.join(d)));
    dirs.extend(std::env::split_paths(&existing));

    let mut seen = Vec::with_capacity(dirs.len());
    for dir in dirs {
        if dir.as_os_str().is_empty() || seen.contains(&dir) {
            continue;
        }
        seen.push(dir);
    }
    let joined = std::env::join_paths(&seen).unwrap_or_else(|_| OsString::from(existing));
    vars.insert("PATH".to_owned(), joined.to_string_lossy().into_owned());
    vars.insert("HOME".to_owned(), home.to_string_lossy().into_owned());

    PreparedEnv { vars }
}

/// [`prepare`] applied to the live process environment. Variables whose
/// name or value is not valid Unicode are left out.
pub fn prepare_current(home: &Path) -> PreparedEnv {
    let snapshot = std::env::vars_os()
        .filter_map(|(key, value)| Some((key.into_string().ok()?, value.into_string().ok()?)));
    prepare(snapshot, home)
}

#[cfg(test)]
#[path = "env_tests.rs"]
mod tests;
