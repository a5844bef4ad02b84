#![forbid(unsafe_code)]

//! `progress-stream` — event-stream progress server binary.
//!
//! Bootstraps configuration, opens the step-counter database, and serves
//! the configured operations over HTTP until ctrl-c or SIGTERM.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use progress_stream::config::GlobalConfig;
use progress_stream::persistence::counter_repo::CounterRepo;
use progress_stream::persistence::db;
use progress_stream::producer::server::{self, AppState};
use progress_stream::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "progress-stream", about = "Event-stream progress server", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file; defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Override the configured HTTP port.
    #[arg(long)]
    port: Option<u16>,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("progress-stream server bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    let mut config = match &args.config {
        Some(path) => GlobalConfig::load_from_path(path)?,
        None => GlobalConfig::default(),
    };
    if let Some(port) = args.port {
        config.http_port = port;
    }
    let config = Arc::new(config);
    info!(operations = config.operations.len(), "configuration loaded");

    // ── Initialize database ─────────────────────────────
    let database = Arc::new(db::connect(&config.db_path).await?);
    info!(path = %config.db_path.display(), "database connected");

    let state = Arc::new(AppState {
        config: Arc::clone(&config),
        store: Arc::new(CounterRepo::new(database)),
    });

    // ── Start transport ─────────────────────────────────
    let ct = CancellationToken::new();
    let server_ct = ct.clone();
    let server_handle = tokio::spawn(async move {
        if let Err(err) = server::serve(state, server_ct).await {
            error!(%err, "http transport failed");
        }
    });

    // ── Wait for shutdown signal ────────────────────────
    let signal = wait_for_shutdown().await;
    info!(signal, "stopping progress server");
    ct.cancel();

    if let Err(err) = server_handle.await {
        error!(%err, "server task did not finish cleanly");
    }
    info!("progress-stream shut down");
    Ok(())
}

/// Resolve on ctrl-c or, on unix, SIGTERM; returns the signal's name.
async fn wait_for_shutdown() -> &'static str {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
            return tokio::select! {
                _ = tokio::signal::ctrl_c() => "ctrl-c",
                _ = sigterm.recv() => "SIGTERM",
            };
        }
        warn!("SIGTERM unavailable; progress server stops on ctrl-c only");
    }

    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(%err, "cannot listen for ctrl-c; stopping progress server");
    }
    "ctrl-c"
}

/// Install the global subscriber; `RUST_LOG` overrides the `info` default.
fn init_tracing(log_format: LogFormat) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt().with_env_filter(filter).with_target(false);

    let installed = match log_format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    installed.map_err(|err| AppError::Config(format!("tracing subscriber already set: {err}")))
}
