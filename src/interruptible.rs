//! Cancellable units of concurrent work.
//!
//! - [`InterruptibleTask`] wraps one future with a cancellation token and the
//!   flag saying whether barge-in may cancel it
//! - [`InterruptibleEvent`] tags a payload with the same flag
//! - [`interruptible_stream`] runs a chunk producer over a bounded channel
//!   that closes as soon as its token is cancelled

use std::future::Future;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::ActionError;

/// A future that gives up as soon as its token is cancelled.
///
/// Cancelling drops the wrapped future, which aborts whatever I/O it had in
/// flight. Work already applied on the far side of that I/O is not undone.
pub struct InterruptibleTask<F> {
    future: F,
    token: CancellationToken,
    is_interruptible: bool,
}

impl<F: Future> InterruptibleTask<F> {
    pub fn new(future: F, is_interruptible: bool, token: CancellationToken) -> Self {
        InterruptibleTask {
            future,
            token,
            is_interruptible,
        }
    }

    pub fn is_interruptible(&self) -> bool {
        self.is_interruptible
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Run to completion, or until the token fires.
    pub async fn run(self) -> Result<F::Output, ActionError> {
        let InterruptibleTask { future, token, .. } = self;
        tokio::select! {
            biased;
            _ = token.cancelled() => Err(ActionError::CancelledByInterruption),
            output = future => Ok(output),
        }
    }
}

/// A payload that may be dropped when the human starts speaking.
#[derive(Debug, Clone)]
pub struct InterruptibleEvent<T> {
    pub payload: T,
    pub is_interruptible: bool,
    token: CancellationToken,
}

impl<T> InterruptibleEvent<T> {
    pub fn new(payload: T, is_interruptible: bool) -> Self {
        Self::with_token(payload, is_interruptible, CancellationToken::new())
    }

    pub fn with_token(payload: T, is_interruptible: bool, token: CancellationToken) -> Self {
        InterruptibleEvent {
            payload,
            is_interruptible,
            token,
        }
    }

    /// Mark the event interrupted. Returns `false` if it is not interruptible.
    pub fn interrupt(&self) -> bool {
        if !self.is_interruptible {
            return false;
        }
        self.token.cancel();
        true
    }

    pub fn is_interrupted(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Producer half of an [`interruptible_stream`].
pub struct ChunkSender<T> {
    tx: mpsc::Sender<InterruptibleEvent<T>>,
    token: CancellationToken,
}

impl<T> ChunkSender<T> {
    /// Send one chunk. Returns `false` once the stream is cancelled or the
    /// consumer is gone, at which point the producer should stop.
    pub async fn send(&self, chunk: T, is_interruptible: bool) -> bool {
        if self.token.is_cancelled() {
            return false;
        }
        let event = InterruptibleEvent::with_token(chunk, is_interruptible, self.token.child_token());
        self.tx.send(event).await.is_ok()
    }
}

/// Spawn `producer` feeding a bounded channel of interruptible chunks.
///
/// Each call starts a fresh producer. Cancelling `token` drops the producer
/// future, which closes the channel; the consumer then sees the end of the
/// stream after draining what was already buffered.
pub fn interruptible_stream<T, F, Fut>(
    capacity: usize,
    token: CancellationToken,
    producer: F,
) -> (mpsc::Receiver<InterruptibleEvent<T>>, JoinHandle<()>)
where
    T: Send + 'static,
    F: FnOnce(ChunkSender<T>) -> Fut,
    Fut: Future<Output = ()> + Send + 'static,
{
    let (tx, rx) = mpsc::channel(capacity);
    let sender = ChunkSender {
        tx,
        token: token.clone(),
    };
    let production = producer(sender);

    let handle = tokio::spawn(async move {
        tokio::select! {
            biased;
            _ = token.cancelled() => log::debug!("interruptible stream cancelled"),
            _ = production => {}
        }
    });

    (rx, handle)
}
