//! Server-side driver that runs declared steps and streams their progress.
//!
//! [`respond_with_progress`] turns an ordered list of [`Step`]s into an
//! event-stream HTTP response. Before each step a `step` event announces
//! its weight and historical duration; after the last step a `return`
//! event carries its result. Any failure becomes a single `requestError`
//! event. Step timings are written back to the [`CounterStore`] once the
//! whole operation succeeds, so later invocations estimate better.

pub mod events;
pub mod plan;
pub mod server;

use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use axum::body::Body;
use axum::http::header::{CACHE_CONTROL, CONNECTION, CONTENT_TYPE};
use axum::http::HeaderValue;
use axum::response::Response;
use serde::Serialize;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, info_span, Instrument};
use uuid::Uuid;

use crate::persistence::{CounterStore, Counters};
use crate::{AppError, Result};

use self::events::{event_channel, EventKind, EventReceiver, EventWriter};
use self::plan::{count_key, counter_keys, plan_steps, total_time_key, StepSpec};

/// Boxed future returned by a step action.
pub type StepFuture<T> = Pin<Box<dyn Future<Output = Result<Option<T>>> + Send>>;

type StepAction<T> = Box<dyn FnOnce() -> StepFuture<T> + Send>;

/// One unit of server work with a declared time weight.
pub struct Step<T> {
    spec: StepSpec,
    action: StepAction<T>,
}

impl<T> std::fmt::Debug for Step<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Step")
            .field("spec", &self.spec)
            .finish_non_exhaustive()
    }
}

impl<T> Step<T> {
    /// Declare a step.
    ///
    /// `guessed_time_ms` weighs the step until it has run at least once.
    /// `action` runs exactly once; only the last step's value is returned
    /// to the client.
    #[must_use]
    pub fn new<F, Fut>(
        id: impl Into<String>,
        message: impl Into<String>,
        guessed_time_ms: u64,
        action: F,
    ) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<Option<T>>> + Send + 'static,
    {
        Self {
            spec: StepSpec {
                id: id.into(),
                message: message.into(),
                guessed_time_ms,
            },
            action: Box::new(move || Box::pin(action())),
        }
    }

    /// Identity and timing inputs of this step.
    #[must_use]
    pub fn spec(&self) -> &StepSpec {
        &self.spec
    }
}

/// Default transmittable form of a producer error.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ErrorPayload {
    /// Display form of the error.
    pub message: String,
}

/// Serialize `err` as an [`ErrorPayload`].
#[must_use]
pub fn error_payload(err: &AppError) -> ErrorPayload {
    ErrorPayload {
        message: err.to_string(),
    }
}

/// Converts a producer error into the `requestError` payload.
///
/// Must not panic; a misbehaving serializer is a configuration defect.
pub type ErrorSerializer<E> = Arc<dyn Fn(&AppError) -> E + Send + Sync>;

/// Collaborators of the producer.
pub struct ProducerConfig<E> {
    /// Historical counter storage.
    pub store: Arc<dyn CounterStore>,
    /// Error-to-payload conversion for `requestError` events.
    pub serialize_error: ErrorSerializer<E>,
}

impl ProducerConfig<ErrorPayload> {
    /// Config using [`error_payload`] for errors.
    #[must_use]
    pub fn new(store: Arc<dyn CounterStore>) -> Self {
        Self {
            store,
            serialize_error: Arc::new(error_payload),
        }
    }
}

impl<E> ProducerConfig<E> {
    /// Config with a caller-supplied error serializer.
    #[must_use]
    pub fn with_serializer(store: Arc<dyn CounterStore>, serialize_error: ErrorSerializer<E>) -> Self {
        Self {
            store,
            serialize_error,
        }
    }
}

impl<E> Clone for ProducerConfig<E> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            serialize_error: Arc::clone(&self.serialize_error),
        }
    }
}

/// Return the streaming response for `steps` and a handle on their driver.
///
/// The steps start when the response body is first polled. If the body is
/// dropped unread, no step runs and the handle resolves to
/// `AppError::Transport`. Otherwise the handle resolves to the operation
/// outcome once the stream has been closed; a failure has already been
/// sent as `requestError` and logged.
pub fn respond_with_progress<T, E>(
    config: ProducerConfig<E>,
    steps: Vec<Step<T>>,
) -> (Response, JoinHandle<Result<()>>)
where
    T: Serialize + Send + 'static,
    E: Serialize + 'static,
{
    let (mut writer, events) = event_channel();
    let (start_tx, start_rx) = oneshot::channel::<()>();
    let invocation_id = Uuid::new_v4();
    let span = info_span!("operation", %invocation_id, steps = steps.len());

    let driver = tokio::spawn(
        async move {
            if start_rx.await.is_err() {
                debug!("response dropped before streaming; steps skipped");
                return Err(AppError::Transport(
                    "response body was never read".into(),
                ));
            }
            let outcome = run_with_progress(
                config.store.as_ref(),
                config.serialize_error.as_ref(),
                steps,
                &mut writer,
            )
            .await;
            match &outcome {
                Ok(()) => info!("operation completed"),
                Err(err) => error!(%err, "operation failed"),
            }
            outcome
        }
        .instrument(span),
    );

    (stream_response(events, Some(start_tx)), driver)
}

/// Wrap an event receiver in a response with event-stream headers.
#[must_use]
pub fn event_stream_response(events: EventReceiver) -> Response {
    stream_response(events, None)
}

/// Response draining `events`; `start` fires on the body's first poll.
fn stream_response(events: EventReceiver, start: Option<oneshot::Sender<()>>) -> Response {
    let body = futures::stream::unfold((events, start), |(mut events, mut start)| async move {
        if let Some(start) = start.take() {
            // The driver may have been aborted already.
            let _ = start.send(());
        }
        events
            .recv()
            .await
            .map(|frame| (Ok::<_, Infallible>(frame), (events, start)))
    });

    let mut response = Response::new(Body::from_stream(body));
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
    response
}

/// Run `steps` in order, writing progress frames into `writer`.
///
/// On failure a `requestError` frame carrying `serialize_error(&err)` is
/// written and the error is returned. The stream closes when the caller
/// drops `writer`; nothing more is written after a terminal frame.
///
/// # Errors
///
/// Returns the first error raised by a step action, the counter read, the
/// counter increment, or event serialization.
pub async fn run_with_progress<T, E>(
    store: &dyn CounterStore,
    serialize_error: &(dyn Fn(&AppError) -> E + Send + Sync),
    steps: Vec<Step<T>>,
    writer: &mut EventWriter,
) -> Result<()>
where
    T: Serialize + Send,
    E: Serialize,
{
    let outcome = drive_steps(store, steps, writer).await;

    if let Err(err) = &outcome {
        let payload = serialize_error(err);
        if let Err(send_err) = writer.send(EventKind::RequestError, &payload) {
            error!(%send_err, "failed to encode requestError payload");
        }
    }

    outcome
}

async fn drive_steps<T>(
    store: &dyn CounterStore,
    steps: Vec<Step<T>>,
    writer: &mut EventWriter,
) -> Result<()>
where
    T: Serialize + Send,
{
    if steps.is_empty() {
        return Err(AppError::Config(
            "an operation needs at least one step".into(),
        ));
    }

    let keys = counter_keys(steps.iter().map(|step| step.spec.id.as_str()));
    let history = store.get_counters(&keys).await?;
    let planned = plan_steps(steps.iter().map(Step::spec), &history);

    let last = steps.len() - 1;
    let mut increments = Counters::new();

    for (index, (step, data)) in steps.into_iter().zip(planned).enumerate() {
        let Step { spec, action } = step;
        debug!(
            step_id = %spec.id,
            percent = data.percent,
            average_ms = data.average_completion_time_in_ms,
            "step starting"
        );
        writer.send(EventKind::Step, &data)?;

        let started = Instant::now();
        let result = action()
            .instrument(info_span!("step", step_id = %spec.id))
            .await?;
        let elapsed_ms = i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX);
        debug!(step_id = %spec.id, elapsed_ms, "step finished");

        *increments.entry(total_time_key(&spec.id)).or_insert(0) += elapsed_ms;
        *increments.entry(count_key(&spec.id)).or_insert(0) += 1;

        if index == last {
            writer.send(EventKind::Return, &result)?;
        }
    }

    store.increment_counters(increments).await?;
    Ok(())
}
