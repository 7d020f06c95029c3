// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use serde::Serialize;
use tokio::io::BufReader;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use authpilot::automation::{self, DriveIo};
use authpilot::config::{Command, Config};
use authpilot::controller::{ConnectOutcome, LoginOutcome, SessionController};
use authpilot::env::prepare_current;
use authpilot::event::{ControllerEvent, Phase};
use authpilot::report::ensure_crypto_provider;
use authpilot::tool::{builtin, ToolId};
use authpilot::transport;

/// How long an interrupted one-shot command gets to tear down its attempt.
const INTERRUPT_GRACE: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() {
    let config = Config::parse();

    if let Err(e) = config.validate() {
        eprintln!("error: {e}");
        std::process::exit(2);
    }

    init_tracing(&config);
    ensure_crypto_provider();

    match run(config).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            error!("fatal: {e:#}");
            std::process::exit(1);
        }
    }
}

/// Logs go to stderr; stdout carries results and driver markers.
fn init_tracing(config: &Config) {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    match config.log_format.as_str() {
        "json" => {
            fmt::fmt().with_env_filter(filter).with_writer(std::io::stderr).json().init();
        }
        _ => {
            fmt::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
        }
    }
}

/// Cancel `token` on SIGTERM or SIGINT.
fn spawn_signal_handler(token: CancellationToken) {
    tokio::spawn(async move {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()).ok();
        let mut sigint =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt()).ok();

        tokio::select! {
            _ = async {
                if let Some(ref mut s) = sigterm { s.recv().await } else { std::future::pending().await }
            } => {
                info!("received SIGTERM");
                token.cancel();
            }
            _ = async {
                if let Some(ref mut s) = sigint { s.recv().await } else { std::future::pending().await }
            } => {
                info!("received SIGINT");
                token.cancel();
            }
        }
    });
}

async fn run(config: Config) -> anyhow::Result<i32> {
    let shutdown = CancellationToken::new();
    spawn_signal_handler(shutdown.clone());
    let home = config.home_dir()?;

    if let Command::Drive { tool, cols, rows } = config.command {
        let io = DriveIo {
            cols,
            rows,
            input: BufReader::new(tokio::io::stdin()),
            output: tokio::io::stdout(),
        };
        return automation::drive(&builtin(tool), &prepare_current(&home), io, shutdown).await;
    }

    let controller = Arc::new(
        SessionController::builder(config.clone(), home)
            .cancel_token(shutdown.child_token())
            .build()?,
    );

    if let Command::Serve { ref host, port, ref auth_token } = config.command {
        let prereqs = Arc::clone(&controller);
        tokio::spawn(async move {
            prereqs.check_prerequisites().await;
        });
        let served =
            transport::serve(Arc::clone(&controller), host, port, auth_token.clone(), shutdown)
                .await;
        controller.shutdown().await;
        served?;
        return Ok(0);
    }

    spawn_progress_printer(&controller);
    let command = run_once(&controller, &config.command);
    tokio::pin!(command);
    let code = tokio::select! {
        code = &mut command => code?,
        _ = shutdown.cancelled() => {
            // The cancelled attempt tears itself down; dropping it is the fallback.
            if tokio::time::timeout(INTERRUPT_GRACE, &mut command).await.is_err() {
                error!("command did not stop within {}s", INTERRUPT_GRACE.as_secs());
            }
            eprintln!("interrupted");
            130
        }
    };
    controller.shutdown().await;
    Ok(code)
}

/// Echo status and auth-URL events to stderr while a one-shot command runs.
fn spawn_progress_printer(controller: &SessionController) {
    let mut events = controller.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                ControllerEvent::Status { tool, phase: Phase::AuthUrl, message } => {
                    eprintln!("[{tool}] {message}");
                }
                ControllerEvent::Status { tool, phase, message } => {
                    eprintln!("[{tool}] {phase:?}: {message}");
                }
                ControllerEvent::Log { tool, line } => eprintln!("[{tool}] {line}"),
                _ => {}
            }
        }
    });
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[derive(Serialize)]
struct ToolStatus {
    tool: ToolId,
    installed: bool,
    authenticated: bool,
    #[serde(flatten)]
    state: authpilot::controller::ToolConnectionState,
}

async fn run_once(controller: &SessionController, command: &Command) -> anyhow::Result<i32> {
    match *command {
        Command::Connect { tool } => match controller.connect(tool).await {
            Ok(ConnectOutcome::Connected(found)) => {
                print_json(&found)?;
                Ok(0)
            }
            Ok(other) => {
                eprintln!("{tool}: {other:?}");
                Ok(0)
            }
            Err(e) => {
                eprintln!("{tool}: {e} ({})", e.code());
                Ok(1)
            }
        },
        Command::Login { tool } => match controller.login(tool).await {
            Ok(LoginOutcome::SignedIn(signal)) => {
                eprintln!("{tool}: authenticated via {}", signal.as_str());
                Ok(0)
            }
            Ok(other) => {
                eprintln!("{tool}: {other:?}");
                Ok(0)
            }
            Err(e) => {
                eprintln!("{tool}: {e} ({})", e.code());
                Ok(1)
            }
        },
        Command::Install { tool } => match controller.install(tool).await {
            Ok(()) => Ok(0),
            Err(e) => {
                eprintln!("{tool}: {e} ({})", e.code());
                Ok(1)
            }
        },
        Command::Status { tool } => {
            let tools = match tool {
                Some(tool) => vec![tool],
                None => ToolId::ALL.to_vec(),
            };
            let mut report = Vec::with_capacity(tools.len());
            for tool in tools {
                report.push(ToolStatus {
                    tool,
                    installed: controller.check_installed(tool).await,
                    authenticated: controller.check_authenticated(tool).await,
                    state: controller.state(tool),
                });
            }
            print_json(&report)?;
            Ok(0)
        }
        Command::Extract { tool } => {
            print_json(&controller.extract(tool).await)?;
            Ok(0)
        }
        Command::Copy { tool } => {
            let outcome = controller.copy(tool).await;
            print_json(&outcome)?;
            Ok(if outcome.success { 0 } else { 1 })
        }
        Command::Logout { tool } => {
            let outcome = controller.logout(tool).await;
            print_json(&outcome)?;
            Ok(if outcome.success { 0 } else { 1 })
        }
        Command::Serve { .. } | Command::Drive { .. } => {
            anyhow::bail!("{command:?} is not a one-shot command")
        }
    }
}
