//! Directional channels and pairing.
//!
//! A channel is one direction of one channel number on one link. It buffers
//! [`LinkMessage`]s in a bounded FIFO and, once paired, knows the key of the
//! opposite-direction channel with the same number and the protocol bound to
//! it. Pairing is set once for both channels together and never changes.

use std::fmt;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use robolink_frame::{ChannelNumber, LinkMessage};
use serde::Serialize;
use tracing::trace;

use crate::collection::ArrivalSignal;
use crate::error::{LinkError, Result};
use crate::protocol::ProtocolKey;
use crate::queue::{BoundedQueue, Wait};

/// Direction of travel relative to this side of the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Messages received from the far side.
    Input,
    /// Messages to be written to the far side.
    Output,
}

impl Direction {
    pub fn opposite(self) -> Self {
        match self {
            Self::Input => Self::Output,
            Self::Output => Self::Input,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Input => f.write_str("input"),
            Self::Output => f.write_str("output"),
        }
    }
}

/// Identifies a channel within one link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelKey {
    pub number: ChannelNumber,
    pub direction: Direction,
}

impl ChannelKey {
    pub fn new(number: ChannelNumber, direction: Direction) -> Self {
        Self { number, direction }
    }

    /// The key of the channel this one pairs with.
    pub fn opposite(self) -> Self {
        Self::new(self.number, self.direction.opposite())
    }
}

impl fmt::Display for ChannelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.direction, self.number)
    }
}

/// The far half of a pairing, as seen from one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pairing {
    pub channel: ChannelKey,
    pub protocol: ProtocolKey,
}

/// A numbered, directional message buffer.
pub struct Channel {
    key: ChannelKey,
    protocol: ProtocolKey,
    queue: BoundedQueue<LinkMessage>,
    opposite: OnceLock<Pairing>,
    signal: OnceLock<Arc<ArrivalSignal>>,
}

impl Channel {
    pub(crate) fn new(
        number: ChannelNumber,
        direction: Direction,
        protocol: ProtocolKey,
        capacity: usize,
    ) -> Self {
        Self {
            key: ChannelKey::new(number, direction),
            protocol,
            queue: BoundedQueue::new(capacity),
            opposite: OnceLock::new(),
            signal: OnceLock::new(),
        }
    }

    pub fn key(&self) -> ChannelKey {
        self.key
    }

    pub fn number(&self) -> ChannelNumber {
        self.key.number
    }

    pub fn direction(&self) -> Direction {
        self.key.direction
    }

    /// The protocol that manufactured this channel.
    pub fn protocol(&self) -> ProtocolKey {
        self.protocol
    }

    /// Enqueue a message addressed to this channel's number.
    ///
    /// A message for another number is rejected and the queue is left
    /// unchanged. On success the owning collection is signalled.
    pub fn add_message(&self, message: LinkMessage, wait: Wait<'_>) -> Result<()> {
        if message.channel() != self.key.number {
            return Err(LinkError::ChannelMismatch {
                channel: self.key.number,
                message: message.channel(),
            });
        }
        let len = message.len();
        self.queue
            .push(message, wait)
            .map_err(|err| LinkError::from_queue(err, self.key))?;
        trace!(channel = %self.key, bytes = len, "queued");
        if let Some(signal) = self.signal.get() {
            signal.notify(self.key);
        }
        Ok(())
    }

    /// Dequeue the oldest message.
    pub fn get_message(&self, wait: Wait<'_>) -> Result<LinkMessage> {
        self.queue
            .pop(wait)
            .map_err(|err| LinkError::from_queue(err, self.key))
    }

    pub fn has_messages(&self) -> bool {
        !self.queue.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }

    /// The paired channel and its protocol, once paired.
    pub fn opposite(&self) -> Option<Pairing> {
        self.opposite.get().copied()
    }

    pub fn is_paired(&self) -> bool {
        self.opposite.get().is_some()
    }

    /// Route arrival notices to `signal`. Returns false if already attached.
    pub(crate) fn attach(&self, signal: Arc<ArrivalSignal>) -> bool {
        self.signal.set(signal).is_ok()
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("key", &self.key)
            .field("protocol", &self.protocol)
            .field("len", &self.queue.len())
            .field("capacity", &self.queue.capacity())
            .field("opposite", &self.opposite.get())
            .finish()
    }
}

static PAIRING: Mutex<()> = Mutex::new(());

/// Pair an input channel with an output channel of the same number.
///
/// Both channels learn each other's key and protocol in one step. If either
/// channel is already paired nothing changes.
pub fn pair_channels(a: &Channel, b: &Channel) -> Result<()> {
    if a.direction() == b.direction() {
        return Err(LinkError::DirectionMismatch(a.direction()));
    }
    if a.number() != b.number() {
        return Err(LinkError::ChannelMismatch {
            channel: a.number(),
            message: b.number(),
        });
    }

    let _guard = PAIRING.lock().unwrap_or_else(PoisonError::into_inner);
    for channel in [a, b] {
        if channel.is_paired() {
            return Err(LinkError::AlreadyPaired(channel.key()));
        }
    }
    a.opposite
        .set(Pairing {
            channel: b.key(),
            protocol: b.protocol(),
        })
        .map_err(|_| LinkError::AlreadyPaired(a.key()))?;
    b.opposite
        .set(Pairing {
            channel: a.key(),
            protocol: a.protocol(),
        })
        .map_err(|_| LinkError::AlreadyPaired(b.key()))?;
    Ok(())
}
