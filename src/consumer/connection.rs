//! Stream connection abstraction and event decoding.

use std::future::Future;
use std::pin::Pin;

use futures::StreamExt;
use reqwest_eventsource::{Event, EventSource};
use tracing::debug;

use crate::models::step::StepData;
use crate::{AppError, Result};

/// A decoded event received from the progress stream.
#[derive(Debug, Clone, PartialEq)]
pub enum Incoming {
    /// The connection has been established.
    Open,
    /// A step started.
    Step(StepData),
    /// The operation finished; raw JSON of the result.
    Return(String),
    /// The operation failed with a structured payload.
    RequestError(serde_json::Value),
    /// An event type this client does not know; ignored.
    Unknown(String),
}

/// Decode a message by its event label.
///
/// `return` payloads stay raw so the caller can decode the result type.
///
/// # Errors
///
/// Returns `AppError::Serialization` if a `step` or `requestError`
/// payload is not valid JSON of the expected shape.
pub fn decode_message(event: &str, data: &str) -> Result<Incoming> {
    match event {
        "step" => Ok(Incoming::Step(serde_json::from_str(data)?)),
        "return" => Ok(Incoming::Return(data.to_owned())),
        "requestError" => Ok(Incoming::RequestError(serde_json::from_str(data)?)),
        other => Ok(Incoming::Unknown(other.to_owned())),
    }
}

/// Owned handle on one progress stream.
///
/// The consumer reads events until a terminal one arrives and then closes
/// the handle explicitly.
pub trait StreamConnection: Send {
    /// Next event, or `None` once the connection is closed.
    fn next_event(&mut self) -> Pin<Box<dyn Future<Output = Option<Result<Incoming>>> + Send + '_>>;

    /// Close the connection. Must tolerate repeated calls.
    fn close(&mut self);
}

/// Open an event source for `url`.
///
/// # Errors
///
/// Returns `AppError::Transport` if the request cannot be prepared.
pub fn connect(url: &str) -> Result<EventSource> {
    let request = reqwest::Client::new().get(url);
    EventSource::new(request).map_err(|err| AppError::Transport(err.to_string()))
}

impl StreamConnection for EventSource {
    fn next_event(&mut self) -> Pin<Box<dyn Future<Output = Option<Result<Incoming>>> + Send + '_>> {
        Box::pin(async move {
            let event = self.next().await?;
            Some(match event {
                Ok(Event::Open) => Ok(Incoming::Open),
                Ok(Event::Message(message)) => {
                    debug!(event = %message.event, id = %message.id, "stream message");
                    decode_message(&message.event, &message.data)
                }
                Err(err) => Err(AppError::from(err)),
            })
        })
    }

    fn close(&mut self) {
        EventSource::close(self);
    }
}
