//! sidebridge
//!
//! Headless front-end for the worker sidecar. Worker events are printed to
//! stdout as JSON lines (`{"channel": ..., "payload": ...}`); every line
//! read from stdin is forwarded to the worker as a command.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use sidebridge_core::LaunchSpec;
use sidebridge_core::protocol::channels;
use sidebridge_host::SidecarBridge;
use sidebridge_host::events::WorkerLifecycle;

#[derive(Parser, Debug)]
#[command(name = "sidebridge")]
#[command(version, about = "Run a worker sidecar and bridge its output to JSON events")]
struct Args {
    #[command(subcommand)]
    app: App,

    /// Log level filter (e.g. "info", "debug", "warn").
    #[arg(long, env = "SIDEBRIDGE_LOG_LEVEL")]
    log_level: Option<String>,

    /// Output logs as JSON (for structured log aggregation).
    #[arg(long, env = "SIDEBRIDGE_LOG_JSON")]
    log_json: bool,

    /// Program hosting the worker binary.
    #[arg(long, env = "SIDEBRIDGE_RUNTIME")]
    runtime: Option<PathBuf>,

    /// Directory holding the worker binaries.
    #[arg(long, env = "SIDEBRIDGE_BINARIES_DIR")]
    binaries_dir: Option<PathBuf>,

    /// Seconds to wait for graceful worker shutdown before SIGKILL.
    #[arg(long, env = "SIDEBRIDGE_TERMINATE_TIMEOUT")]
    terminate_timeout: Option<u64>,
}

#[derive(Subcommand, Debug)]
enum App {
    /// Chat client worker, logged in as NAME.
    Chat { name: String },
    /// Music player worker.
    Music,
    /// Any program speaking the tagged line protocol.
    Exec {
        program: PathBuf,
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
}

#[derive(Serialize)]
struct Envelope<'a, T: Serialize> {
    channel: &'a str,
    payload: &'a T,
}

#[allow(clippy::print_stdout)]
fn emit<T: Serialize>(channel: &str, payload: &T) {
    match serde_json::to_string(&Envelope { channel, payload }) {
        Ok(line) => println!("{line}"),
        Err(e) => warn!(channel, error = %e, "Failed to serialize event"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();

    let cwd = std::env::current_dir().ok();
    let mut config = sidebridge_core::config::load_config(cwd.as_deref())?;
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }
    config.logging.json |= args.log_json;
    if let Some(runtime) = args.runtime {
        config.worker.runtime = runtime;
    }
    if let Some(dir) = args.binaries_dir {
        config.worker.binaries_dir = dir;
    }
    if let Some(secs) = args.terminate_timeout {
        config.worker.terminate_timeout_secs = secs;
    }

    let log_filter = format!(
        "sidebridge={level},sidebridge_host={level},sidebridge_core={level}",
        level = config.logging.level
    );
    sidebridge_core::tracing_init::init_tracing(&log_filter, config.logging.json);

    info!(version = env!("CARGO_PKG_VERSION"), "Starting sidebridge");

    let bridge = SidecarBridge::new(config.worker);
    let events = bridge.events();
    let _event_sub = events.on_event(|event| emit(event.channel(), event));
    let _log_sub = events.on_worker_log(|line| emit(channels::WORKER_LOG, line));
    let _diag_sub = events.on_diagnostic(|diag| emit(channels::DIAGNOSTIC, diag));
    let (_lifecycle_sub, mut lifecycle_rx) = events.lifecycle_channel();

    match args.app {
        App::Chat { name } => bridge.start_chat(&name).await?,
        App::Music => bridge.start_music().await?,
        App::Exec { program, args } => bridge.start_spec(&LaunchSpec::new(program, args)).await?,
    };

    #[cfg(unix)]
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    #[cfg(unix)]
    let sigterm_future = sigterm.recv();
    #[cfg(not(unix))]
    let sigterm_future = std::future::pending::<Option<()>>();
    tokio::pin!(sigterm_future);

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    let exit_code = loop {
        tokio::select! {
            line = stdin.next_line(), if stdin_open => match line {
                Ok(Some(line)) => {
                    if !line.trim().is_empty() {
                        bridge.send_command(&line);
                    }
                }
                Ok(None) => {
                    info!("stdin closed, no further commands will be sent");
                    stdin_open = false;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to read stdin");
                    stdin_open = false;
                }
            },
            event = lifecycle_rx.recv() => match event {
                Some(event) => {
                    emit(channels::WORKER_LIFECYCLE, &event);
                    if let WorkerLifecycle::Exited(report) = event {
                        let code = report.code.and_then(|c| u8::try_from(c).ok()).unwrap_or(1);
                        break ExitCode::from(code);
                    }
                }
                None => break ExitCode::FAILURE,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down");
                break ExitCode::SUCCESS;
            }
            _ = &mut sigterm_future => {
                info!("Received SIGTERM, shutting down");
                break ExitCode::SUCCESS;
            }
        }
    };

    bridge.shutdown().await;
    Ok(exit_code)
}
