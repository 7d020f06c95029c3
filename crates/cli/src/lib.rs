// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

pub mod automation;
pub mod browser;
pub mod callback;
pub mod clipboard;
pub mod config;
pub mod controller;
pub mod credential;
pub mod env;
pub mod error;
pub mod event;
pub mod install;
pub mod login;
pub mod process;
pub mod pty;
pub mod report;
pub mod scrape;
pub mod strategy;
pub mod test_support;
pub mod tool;
pub mod transport;
