//! Client-side driver that follows a progress stream to its result.
//!
//! [`perform_with_progress`] opens the stream, feeds `step` events into a
//! [`ProgressTracker`](crate::tracker::ProgressTracker), polls the tracker
//! on a fixed interval for the observer, and settles once on `return`,
//! `requestError`, or a transport failure.

pub mod connection;
pub mod observer;
pub mod session;

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::deferred::{deferred, Deferred};
use crate::{AppError, Result};

use self::connection::{connect, Incoming, StreamConnection};
use self::observer::ProgressObserver;
use self::session::ConsumerSession;

/// Default interval between tracker polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Follow the progress stream at `url` until it settles.
///
/// # Errors
///
/// Returns `AppError::Request` with the server's payload on `requestError`,
/// `AppError::Transport` on connection failures or a stream that ends
/// without a terminal event, and `AppError::Serialization` if the result
/// cannot be decoded as `T`.
pub async fn perform_with_progress<T>(url: &str, observer: Arc<dyn ProgressObserver>) -> Result<T>
where
    T: DeserializeOwned + Send + 'static,
{
    perform_with_interval(url, observer, DEFAULT_POLL_INTERVAL).await
}

/// [`perform_with_progress`] with a custom polling interval.
///
/// # Errors
///
/// See [`perform_with_progress`].
pub async fn perform_with_interval<T>(
    url: &str,
    observer: Arc<dyn ProgressObserver>,
    poll_interval: Duration,
) -> Result<T>
where
    T: DeserializeOwned + Send + 'static,
{
    info!(url, "following progress stream");
    let source = connect(url)?;
    perform_with_connection(source, observer, poll_interval).await
}

/// Follow an already-opened connection until it settles.
///
/// The returned future owns the session: dropping it before settlement
/// stops polling and closes the connection.
///
/// # Errors
///
/// See [`perform_with_progress`].
pub async fn perform_with_connection<T, C>(
    connection: C,
    observer: Arc<dyn ProgressObserver>,
    poll_interval: Duration,
) -> Result<T>
where
    T: DeserializeOwned + Send + 'static,
    C: StreamConnection + 'static,
{
    let (outcome, settlement) = deferred();
    let session = ConsumerSession::start(connection, observer, poll_interval);

    listen(session, &outcome)
        .instrument(info_span!("progress_listener"))
        .await;

    settlement.await
}

/// Read events until the session reaches a terminal state, settling
/// `outcome` on the way out.
async fn listen<T, C>(mut session: ConsumerSession<C>, outcome: &Deferred<T>)
where
    T: DeserializeOwned,
    C: StreamConnection,
{
    while !session.state().is_terminal() {
        let Some(next) = session.connection_mut().next_event().await else {
            session.fail();
            outcome.reject(AppError::Transport(
                "stream ended without a terminal event".into(),
            ));
            break;
        };

        match next {
            Ok(Incoming::Open) => {
                debug!("stream opened");
                session.mark_open();
            }
            Ok(Incoming::Step(step)) => {
                debug!(message = %step.message, percent = step.percent, "step announced");
                session.apply_step(step);
            }
            Ok(Incoming::Return(raw)) => {
                let decoded = serde_json::from_str::<T>(&raw);
                match decoded {
                    Ok(value) => {
                        session.complete();
                        info!("operation completed");
                        outcome.resolve(value);
                    }
                    Err(err) => {
                        session.fail();
                        warn!(%err, "undecodable return payload");
                        outcome.reject(err.into());
                    }
                }
            }
            Ok(Incoming::RequestError(payload)) => {
                session.fail();
                warn!(%payload, "operation failed on the server");
                outcome.reject(AppError::Request(payload));
            }
            Ok(Incoming::Unknown(kind)) => {
                debug!(event = %kind, "ignoring unknown event");
            }
            Err(err) => {
                session.fail();
                warn!(%err, "progress stream failed");
                outcome.reject(err);
            }
        }
    }
}
