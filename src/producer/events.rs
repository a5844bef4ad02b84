//! Event-stream framing and the per-connection event writer.
//!
//! Every frame is three newline-terminated lines followed by a blank
//! line:
//!
//! ```text
//! id: 1
//! event: step
//! data: {"percent":25.0,"averageCompletionTimeInMs":1000,"message":"Loading"}
//!
//! ```

use axum::body::Bytes;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::Result;

/// Label of an emitted event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// A step is about to run.
    Step,
    /// The operation finished; carries the last step's result.
    Return,
    /// The operation failed; carries the serialized error.
    RequestError,
}

impl EventKind {
    /// Wire label of the event.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Step => "step",
            Self::Return => "return",
            Self::RequestError => "requestError",
        }
    }

    /// Whether the stream ends after this event.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Return | Self::RequestError)
    }
}

/// Format one frame from an already-encoded JSON payload.
#[must_use]
pub fn encode_frame(id: u64, kind: EventKind, json: &str) -> String {
    format!("id: {id}\nevent: {}\ndata: {json}\n\n", kind.as_str())
}

/// Receiving side of an event channel, drained into the response body.
pub type EventReceiver = mpsc::UnboundedReceiver<Bytes>;

/// Writes numbered frames into an event channel.
///
/// Ids start at 1 and increase by one per frame. Once a terminal event has
/// been written every further write is dropped.
#[derive(Debug)]
pub struct EventWriter {
    tx: mpsc::UnboundedSender<Bytes>,
    last_id: u64,
    finished: bool,
}

/// Create a connected writer / receiver pair.
#[must_use]
pub fn event_channel() -> (EventWriter, EventReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        EventWriter {
            tx,
            last_id: 0,
            finished: false,
        },
        rx,
    )
}

impl EventWriter {
    /// Serialize `data` and write it as a frame of kind `kind`.
    ///
    /// A disconnected receiver is not an error: the client abandoned the
    /// stream and the operation keeps running to completion.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Serialization` if `data` cannot be encoded.
    pub fn send<S: Serialize + ?Sized>(&mut self, kind: EventKind, data: &S) -> Result<()> {
        if self.finished {
            warn!(event = kind.as_str(), "stream already terminated; dropping event");
            return Ok(());
        }

        let json = serde_json::to_string(data)?;
        self.last_id += 1;
        let frame = encode_frame(self.last_id, kind, &json);

        if self.tx.send(Bytes::from(frame)).is_err() {
            debug!(event = kind.as_str(), id = self.last_id, "client disconnected; event discarded");
        }

        if kind.is_terminal() {
            self.finished = true;
        }
        Ok(())
    }

    /// Id of the most recently written frame (0 before the first).
    #[must_use]
    pub fn last_id(&self) -> u64 {
        self.last_id
    }

    /// Whether a terminal event has been written.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished
    }
}
