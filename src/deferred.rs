//! Settle-once value cell bridging push-driven events to an awaitable result.
//!
//! [`deferred`] returns a pair: the [`Deferred`] side is handed to whatever
//! reacts to incoming events and calls [`resolve`](Deferred::resolve) or
//! [`reject`](Deferred::reject) exactly once; the [`Settlement`] side is a
//! future the caller awaits. Later settlement attempts are ignored and
//! report `false`, so the first outcome always wins.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Mutex, PoisonError};
use std::task::{Context, Poll};

use tokio::sync::oneshot;
use tracing::debug;

use crate::{AppError, Result};

/// Writable half of a settle-once cell.
#[derive(Debug)]
pub struct Deferred<T> {
    sender: Mutex<Option<oneshot::Sender<Result<T>>>>,
}

/// Awaitable half of a settle-once cell.
///
/// Resolves to the first outcome passed to the paired [`Deferred`]. If the
/// [`Deferred`] is dropped unsettled the settlement yields
/// [`AppError::Unsettled`].
#[derive(Debug)]
pub struct Settlement<T> {
    receiver: oneshot::Receiver<Result<T>>,
}

/// Create a connected [`Deferred`] / [`Settlement`] pair.
#[must_use]
pub fn deferred<T>() -> (Deferred<T>, Settlement<T>) {
    let (tx, rx) = oneshot::channel();
    (
        Deferred {
            sender: Mutex::new(Some(tx)),
        },
        Settlement { receiver: rx },
    )
}

impl<T> Deferred<T> {
    /// Settle successfully with `value`.
    ///
    /// Returns `false` if the cell was already settled.
    pub fn resolve(&self, value: T) -> bool {
        self.settle(Ok(value))
    }

    /// Settle with a failure.
    ///
    /// Returns `false` if the cell was already settled.
    pub fn reject(&self, err: AppError) -> bool {
        self.settle(Err(err))
    }

    /// Whether a resolve or reject has already happened.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    fn settle(&self, outcome: Result<T>) -> bool {
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        let Some(tx) = sender else {
            debug!("deferred already settled; ignoring");
            return false;
        };

        if tx.send(outcome).is_err() {
            debug!("settlement receiver already dropped");
        }
        true
    }
}

impl<T> Future for Settlement<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver).poll(cx).map(|received| {
            received.unwrap_or_else(|_| {
                Err(AppError::Unsettled(
                    "deferred dropped before settlement".into(),
                ))
            })
        })
    }
}
