//! HTTP transport exposing configured operations as event streams.
//!
//! `GET /operations/{name}` runs the simulated operation declared under
//! `[operations.<name>]` in the config and streams its progress.
//! `GET /health` answers `ok` for liveness probes.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::{GlobalConfig, OperationConfig};
use crate::persistence::CounterStore;
use crate::{AppError, Result};

use super::{respond_with_progress, ProducerConfig, Step};

/// Shared state handed to every request handler.
pub struct AppState {
    /// Loaded configuration.
    pub config: Arc<GlobalConfig>,
    /// Counter storage shared by all operations.
    pub store: Arc<dyn CounterStore>,
}

/// Result returned by a simulated operation's last step.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OperationSummary {
    /// Name of the operation that ran.
    pub operation: String,
    /// Number of steps executed.
    pub steps: usize,
}

/// Build the router for `state`.
#[must_use]
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/operations/{name}", get(run_operation))
        .with_state(state)
}

/// Bind `127.0.0.1:<http_port>` and serve until `ct` is cancelled.
///
/// # Errors
///
/// Returns `AppError::Config` if the server fails to bind.
pub async fn serve(state: Arc<AppState>, ct: CancellationToken) -> Result<()> {
    let bind = SocketAddr::from(([127, 0, 0, 1], state.config.http_port));
    let listener = TcpListener::bind(bind)
        .await
        .map_err(|err| AppError::Config(format!("failed to bind on {bind}: {err}")))?;
    serve_on(listener, state, ct).await
}

/// Serve on an already-bound listener until `ct` is cancelled.
///
/// # Errors
///
/// Returns `AppError::Io` if the server loop fails.
pub async fn serve_on(listener: TcpListener, state: Arc<AppState>, ct: CancellationToken) -> Result<()> {
    let addr = listener.local_addr()?;
    info!(%addr, "progress server listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { ct.cancelled().await })
        .await
        .map_err(|err| AppError::Io(format!("server error: {err}")))?;

    info!("progress server stopped");
    Ok(())
}

async fn health() -> &'static str {
    "ok"
}

async fn run_operation(State(state): State<Arc<AppState>>, Path(name): Path<String>) -> Response {
    let Some(operation) = state.config.operations.get(&name) else {
        warn!(operation = %name, "unknown operation requested");
        return (StatusCode::NOT_FOUND, format!("unknown operation: {name}")).into_response();
    };

    info!(operation = %name, "starting operation");
    let steps = simulated_steps(&name, operation);
    let (response, _driver) =
        respond_with_progress(ProducerConfig::new(Arc::clone(&state.store)), steps);
    response
}

/// Turn a configured operation into executable steps.
///
/// Each step sleeps for its `duration_ms` and then fails if `fail` is set.
/// The last step yields an [`OperationSummary`].
#[must_use]
pub fn simulated_steps(name: &str, operation: &OperationConfig) -> Vec<Step<OperationSummary>> {
    let total = operation.steps.len();
    operation
        .steps
        .iter()
        .enumerate()
        .map(|(index, step)| {
            let id = step.id.clone();
            let duration = Duration::from_millis(step.duration_ms);
            let fail = step.fail;
            let summary = (index + 1 == total).then(|| OperationSummary {
                operation: name.to_owned(),
                steps: total,
            });

            Step::new(
                step.id.clone(),
                step.message.clone(),
                step.guessed_time_ms,
                move || async move {
                    tokio::time::sleep(duration).await;
                    if fail {
                        return Err(AppError::Step(format!("step '{id}' failed")));
                    }
                    Ok(summary)
                },
            )
        })
        .collect()
}
