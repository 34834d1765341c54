//! Bounded blocking FIFO.
//!
//! Every channel buffers its messages in one of these. The queue is a
//! bounded [`tokio::sync::mpsc`] channel whose two ends live together, so
//! link threads can use it without an async runtime of their own. Adds and
//! takes either fail immediately or block, as the caller chooses per call
//! with [`Wait`]. A blocking wait races the operation against
//! [`CancellationToken::cancelled`]; a cancelled wait returns
//! [`QueueError::Cancelled`] and leaves the queue as it was.
//!
//! Blocking calls must not be made from inside an async runtime.

use std::future::Future;

use tokio::runtime::Builder;
use tokio::sync::mpsc::error::{TryRecvError, TrySendError};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use crate::error::QueueError;

/// Capacity used when a channel is built without an explicit one.
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// Whether a queue operation may block.
#[derive(Debug, Clone, Copy)]
pub enum Wait<'a> {
    /// Fail with `Full` / `Empty` instead of waiting.
    Immediate,
    /// Wait until the operation can complete or the token is cancelled.
    Blocking(&'a CancellationToken),
}

type Result<T> = std::result::Result<T, QueueError>;

/// A thread-safe FIFO with a fixed capacity.
#[derive(Debug)]
pub struct BoundedQueue<T> {
    tx: mpsc::Sender<T>,
    rx: Mutex<mpsc::Receiver<T>>,
    capacity: usize,
}

impl<T> BoundedQueue<T> {
    /// Create a queue holding at most `capacity` items (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        Self {
            tx,
            rx: Mutex::new(rx),
            capacity,
        }
    }

    /// Append `item` at the tail.
    pub fn push(&self, item: T, wait: Wait<'_>) -> Result<()> {
        let item = match self.tx.try_send(item) {
            Ok(()) => return Ok(()),
            // The receiver lives in `self`, so a closed channel cannot happen here.
            Err(TrySendError::Full(item) | TrySendError::Closed(item)) => item,
        };
        let Wait::Blocking(cancel) = wait else {
            return Err(QueueError::Full);
        };

        block_on(async {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(QueueError::Cancelled),
                permit = self.tx.reserve() => match permit {
                    Ok(permit) => {
                        permit.send(item);
                        Ok(())
                    }
                    Err(_) => Err(QueueError::Full),
                },
            }
        })?
    }

    /// Remove and return the head.
    ///
    /// While another thread is blocked taking from this queue, an immediate
    /// take reports `Empty`.
    pub fn pop(&self, wait: Wait<'_>) -> Result<T> {
        if let Ok(mut rx) = self.rx.try_lock() {
            match rx.try_recv() {
                Ok(item) => return Ok(item),
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => {}
            }
        }
        let Wait::Blocking(cancel) = wait else {
            return Err(QueueError::Empty);
        };

        block_on(async {
            let mut rx = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(QueueError::Cancelled),
                rx = self.rx.lock() => rx,
            };
            tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(QueueError::Cancelled),
                item = rx.recv() => item.ok_or(QueueError::Empty),
            }
        })?
    }

    pub fn len(&self) -> usize {
        self.capacity - self.tx.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<T> Default for BoundedQueue<T> {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

/// Drive `future` to completion on a throwaway current-thread runtime.
fn block_on<F: Future>(future: F) -> Result<F::Output> {
    let runtime = Builder::new_current_thread()
        .build()
        .map_err(|err| QueueError::Runtime(err.kind()))?;
    Ok(runtime.block_on(future))
}
