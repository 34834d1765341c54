use robolink_frame::{BufferError, ChannelNumber, FrameError};
use robolink_transport::TransportError;

use crate::channel::{ChannelKey, Direction};
use crate::protocol::{ProtocolKey, Role};

/// Errors raised by a [`BoundedQueue`](crate::BoundedQueue).
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    /// The queue is at capacity and the caller asked not to wait.
    #[error("queue full")]
    Full,

    /// The queue is empty and the caller asked not to wait.
    #[error("queue empty")]
    Empty,

    /// The wait was cancelled; the queue is unchanged.
    #[error("wait cancelled")]
    Cancelled,

    /// No runtime could be started to drive a blocking wait.
    #[error("cannot start queue waiter: {0}")]
    Runtime(std::io::ErrorKind),
}

/// Errors raised by the [`SystemContext`](crate::SystemContext).
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ContextError {
    /// `init_state` was called a second time.
    #[error("robot state already initialized")]
    AlreadyInitialized,

    /// The robot state was used before `init_state`.
    #[error("robot state not initialized")]
    NotInitialized,
}

/// Errors raised while decoding a protocol message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// The payload has no discriminant byte.
    #[error("empty payload")]
    Empty,

    /// The discriminant byte names no message kind of this protocol.
    #[error("unknown message kind {0}")]
    UnknownKind(u8),

    /// The payload is longer than the kind's fixed layout.
    #[error("{extra} trailing byte(s) after {kind}")]
    TrailingBytes { kind: &'static str, extra: usize },

    /// The payload is shorter than the kind's fixed layout.
    #[error(transparent)]
    Buffer(#[from] BufferError),
}

/// Errors that can occur on a link, its channels or its protocols.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    /// A channel number outside the legal range.
    #[error("invalid channel number {0}")]
    InvalidChannelNumber(u8),

    /// A message was offered to a channel with a different number.
    #[error("message for channel {message} offered to channel {channel}")]
    ChannelMismatch {
        channel: ChannelNumber,
        message: ChannelNumber,
    },

    /// Non-blocking add on a full channel.
    #[error("channel {0} queue full")]
    QueueFull(ChannelKey),

    /// Non-blocking take on an empty channel.
    #[error("channel {0} queue empty")]
    QueueEmpty(ChannelKey),

    /// A blocking channel operation was cancelled.
    #[error("wait on channel {0} cancelled")]
    Cancelled(ChannelKey),

    /// A message or protocol does not match the role it was used with.
    #[error("{protocol}: role {actual} used where {expected} was required")]
    RoleMismatch {
        protocol: &'static str,
        expected: Role,
        actual: Role,
    },

    /// The discriminant byte names no message kind of the protocol.
    #[error("{protocol}: unknown message kind {indicator} on channel {channel}")]
    UnknownMessageKind {
        protocol: &'static str,
        indicator: u8,
        channel: ChannelNumber,
    },

    /// A received frame names a channel no input channel is attached to.
    #[error("no input channel for frame on channel {0}")]
    UnroutableChannel(u8),

    /// One of the channels is already paired.
    #[error("channel {0} is already paired")]
    AlreadyPaired(ChannelKey),

    /// The protocol already manufactured its channel.
    #[error("protocol {0} already bound to a channel")]
    AlreadyBound(ProtocolKey),

    /// The protocol has no usable opposite channel.
    #[error("channel {0} has no paired opposite")]
    NotPaired(ChannelKey),

    /// Pairing requires one input and one output channel.
    #[error("cannot pair two {0} channels")]
    DirectionMismatch(Direction),

    /// A collection already holds a channel with that number.
    #[error("channel {0} already attached")]
    DuplicateChannel(ChannelKey),

    /// The protocol has not been bound to a channel or a link yet.
    #[error("protocol {0} is not bound to a link")]
    Unbound(ProtocolKey),

    /// The payload does not decode as a message of the protocol.
    #[error("{protocol}: cannot decode message: {source}")]
    Decode {
        protocol: &'static str,
        source: DecodeError,
    },

    /// Framing error.
    #[error("frame error: {0}")]
    Frame(FrameError),

    /// Field buffer error while encoding.
    #[error("buffer error: {0}")]
    Buffer(#[from] BufferError),

    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// System context error.
    #[error("context error: {0}")]
    Context(#[from] ContextError),

    /// A link thread could not be started.
    #[error("failed to spawn link thread: {0}")]
    Spawn(std::io::Error),

    /// No runtime could be started to drive a blocking wait.
    #[error("cannot start waiter runtime: {0}")]
    Runtime(std::io::Error),

    /// A link thread panicked.
    #[error("link thread '{0}' panicked")]
    ThreadPanicked(&'static str),
}

impl From<FrameError> for LinkError {
    fn from(err: FrameError) -> Self {
        match err {
            FrameError::InvalidChannelNumber(number) => Self::InvalidChannelNumber(number),
            FrameError::Buffer(err) => Self::Buffer(err),
            other => Self::Frame(other),
        }
    }
}

impl LinkError {
    /// Map a queue failure on `channel` to the link-level error.
    pub(crate) fn from_queue(err: QueueError, channel: ChannelKey) -> Self {
        match err {
            QueueError::Full => Self::QueueFull(channel),
            QueueError::Empty => Self::QueueEmpty(channel),
            QueueError::Cancelled => Self::Cancelled(channel),
            QueueError::Runtime(kind) => Self::Runtime(kind.into()),
        }
    }
}

pub type Result<T> = std::result::Result<T, LinkError>;
