#![forbid(unsafe_code)]

//! `progress-watch` — terminal client for `progress-stream`.
//!
//! Follows one progress stream, printing percent, message, and delay
//! changes, then prints the operation's JSON result.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use clap::Parser;

use progress_stream::consumer::observer::CallbackObserver;
use progress_stream::consumer::{perform_with_interval, DEFAULT_POLL_INTERVAL};
use progress_stream::models::step::DelayReason;
use progress_stream::{AppError, GlobalConfig};

#[derive(Debug, Parser)]
#[command(
    name = "progress-watch",
    about = "Follow a progress-stream operation from the terminal",
    version,
    long_about = None
)]
struct Cli {
    /// Base URL of the server.
    #[arg(long, default_value = "http://127.0.0.1:3000")]
    server: String,

    /// Server config file to take `poll_interval_ms` from.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Milliseconds between progress redraws; overrides the config file.
    #[arg(long)]
    poll_interval_ms: Option<u64>,

    /// Name of the configured operation to run.
    operation: String,
}

fn main() {
    let args = Cli::parse();

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(err) => {
            eprintln!("Failed to start runtime: {err}");
            std::process::exit(1);
        }
    };

    let poll_interval = match (args.poll_interval_ms, &args.config) {
        (Some(ms), _) => Duration::from_millis(ms.max(1)),
        (None, Some(path)) => match GlobalConfig::load_from_path(path) {
            Ok(config) => config.poll_interval(),
            Err(err) => {
                eprintln!("Failed to load {}: {err}", path.display());
                std::process::exit(1);
            }
        },
        (None, None) => DEFAULT_POLL_INTERVAL,
    };

    let url = format!(
        "{}/operations/{}",
        args.server.trim_end_matches('/'),
        args.operation
    );

    // Only print when a value actually changes.
    let last_percent = Arc::new(Mutex::new(-1_i64));
    let last_reason = Arc::new(Mutex::new(None::<DelayReason>));
    let observer = Arc::new(CallbackObserver::new(
        move |percent: f64| {
            #[allow(clippy::cast_possible_truncation)]
            let rounded = percent.floor() as i64;
            let mut last = last_percent.lock().unwrap_or_else(PoisonError::into_inner);
            if *last != rounded {
                *last = rounded;
                eprintln!("{rounded:>3}%");
            }
        },
        |message: Option<&str>| {
            if let Some(message) = message {
                eprintln!("  {message}");
            }
        },
        move |reason: Option<DelayReason>| {
            let mut last = last_reason.lock().unwrap_or_else(PoisonError::into_inner);
            if *last != reason {
                *last = reason;
                if let Some(reason) = reason {
                    eprintln!("  (delay: {})", reason.as_str());
                }
            }
        },
    ));

    let outcome = runtime.block_on(perform_with_interval::<serde_json::Value>(
        &url,
        observer,
        poll_interval,
    ));

    match outcome {
        Ok(result) => {
            println!("{}", serde_json::to_string_pretty(&result).unwrap_or_default());
        }
        Err(AppError::Request(payload)) => {
            eprintln!("Operation failed: {payload}");
            std::process::exit(1);
        }
        Err(err) => {
            eprintln!("Failed to follow {url}: {err}");
            std::process::exit(1);
        }
    }
}
