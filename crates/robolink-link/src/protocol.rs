//! Protocols: typed messages bound to one channel and one role.
//!
//! A [`Protocol`] is one endpoint of one channel number on one link. It
//! manufactures its channel, encodes outbound messages into link messages
//! and dispatches inbound ones to its [`ProtocolHandler`] by role. Each
//! protocol's vocabulary is a single enum implementing [`ProtocolMessage`],
//! keyed by its leading discriminant byte.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use bytes::Bytes;
use robolink_frame::{BufferError, ChannelNumber, FillableBuffer, LinkMessage};
use serde::Serialize;
use tracing::{debug, trace};

use crate::channel::{Channel, Direction};
use crate::collection::LinkChannels;
use crate::error::{DecodeError, LinkError, Result};
use crate::queue::Wait;

/// Which end of a link a protocol speaks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The controlling process.
    Master,
    /// The robot or its simulator.
    Slave,
}

impl Role {
    pub fn opposite(self) -> Self {
        match self {
            Self::Master => Self::Slave,
            Self::Slave => Self::Master,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Master => f.write_str("master"),
            Self::Slave => f.write_str("slave"),
        }
    }
}

static NEXT_PROTOCOL_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique protocol instance id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProtocolId(u64);

impl ProtocolId {
    fn next() -> Self {
        Self(NEXT_PROTOCOL_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

/// Identifies a protocol instance: unique id, protocol name, channel number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProtocolKey {
    id: ProtocolId,
    name: &'static str,
    number: ChannelNumber,
}

impl ProtocolKey {
    /// Allocate a key for a new protocol instance.
    pub fn new(name: &'static str, number: ChannelNumber) -> Self {
        Self {
            id: ProtocolId::next(),
            name,
            number,
        }
    }

    pub fn id(&self) -> ProtocolId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn number(&self) -> ChannelNumber {
        self.number
    }
}

impl fmt::Display for ProtocolKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}@{}", self.name, self.id.0, self.number)
    }
}

/// A protocol's message vocabulary.
///
/// Every kind encodes as its discriminant byte followed by fixed-width
/// fields; `deconstruct` and `reconstruct` walk the fields in the same order.
pub trait ProtocolMessage: Sized + fmt::Debug {
    /// The discriminant byte.
    fn indicator(&self) -> u8;

    /// Fixed encoded size of this kind, discriminant included.
    fn encoded_len(&self) -> usize;

    /// Kind name for diagnostics.
    fn name(&self) -> &'static str;

    /// The role allowed to send this kind.
    fn sender(&self) -> Role;

    /// Append the discriminant and fields to `buf`.
    fn deconstruct(&self, buf: &mut FillableBuffer) -> std::result::Result<(), BufferError>;

    /// Read one message, discriminant first.
    fn reconstruct(buf: &mut FillableBuffer) -> std::result::Result<Self, DecodeError>;

    fn encode(&self) -> std::result::Result<Bytes, BufferError> {
        let mut buf = FillableBuffer::new(self.encoded_len());
        self.deconstruct(&mut buf)?;
        Ok(buf.freeze())
    }

    /// Read one message that must fill `payload` exactly.
    fn decode(payload: &[u8]) -> std::result::Result<Self, DecodeError> {
        let mut buf = FillableBuffer::from_bytes(payload);
        buf.peek_byte().map_err(|_| DecodeError::Empty)?;
        let message = Self::reconstruct(&mut buf)?;
        match buf.remaining() {
            0 => Ok(message),
            extra => Err(DecodeError::TrailingBytes {
                kind: message.name(),
                extra,
            }),
        }
    }
}

/// Role-specific behavior of a protocol.
pub trait ProtocolHandler: Send + Sync + Sized + 'static {
    type Message: ProtocolMessage + Send;

    /// Protocol name used in keys, logs and errors.
    const NAME: &'static str;

    /// Channel the protocol uses unless told otherwise.
    const DEFAULT_CHANNEL: ChannelNumber;

    /// Handle a message received by a master-role protocol.
    fn receive_master_message(&self, protocol: &Protocol<Self>, message: Self::Message)
        -> Result<()>;

    /// Handle a message received by a slave-role protocol.
    fn receive_slave_message(&self, protocol: &Protocol<Self>, message: Self::Message)
        -> Result<()>;
}

/// Encode `message` into a link message for channel `number`.
pub fn encode_message<M: ProtocolMessage>(
    number: ChannelNumber,
    message: &M,
) -> Result<LinkMessage> {
    Ok(LinkMessage::new(number, message.encode()?))
}

/// One endpoint of a channel number, with a fixed role.
pub struct Protocol<H: ProtocolHandler> {
    handler: H,
    role: Role,
    key: ProtocolKey,
    channel: OnceLock<Arc<Channel>>,
    registry: OnceLock<Arc<LinkChannels>>,
}

impl<H: ProtocolHandler> Protocol<H> {
    /// Create a protocol on the handler's default channel.
    pub fn new(handler: H, role: Role) -> Self {
        Self::on(handler, role, H::DEFAULT_CHANNEL)
    }

    /// Create a protocol on an explicit channel number.
    pub fn with_number(handler: H, role: Role, number: u8) -> Result<Self> {
        Ok(Self::on(handler, role, ChannelNumber::new(number)?))
    }

    fn on(handler: H, role: Role, number: ChannelNumber) -> Self {
        Self {
            handler,
            role,
            key: ProtocolKey::new(H::NAME, number),
            channel: OnceLock::new(),
            registry: OnceLock::new(),
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn number(&self) -> ChannelNumber {
        self.key.number
    }

    pub fn key(&self) -> ProtocolKey {
        self.key
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// The channel this protocol manufactured, if any.
    pub fn channel(&self) -> Option<&Arc<Channel>> {
        self.channel.get()
    }

    /// Manufacture and bind this protocol's input channel.
    pub fn input_channel(&self, capacity: usize) -> Result<Arc<Channel>> {
        self.bind(Direction::Input, capacity)
    }

    /// Manufacture and bind this protocol's output channel.
    pub fn output_channel(&self, capacity: usize) -> Result<Arc<Channel>> {
        self.bind(Direction::Output, capacity)
    }

    fn bind(&self, direction: Direction, capacity: usize) -> Result<Arc<Channel>> {
        if self.channel.get().is_some() {
            return Err(LinkError::AlreadyBound(self.key));
        }
        let channel = Arc::new(Channel::new(self.key.number, direction, self.key, capacity));
        self.channel
            .set(Arc::clone(&channel))
            .map_err(|_| LinkError::AlreadyBound(self.key))?;
        Ok(channel)
    }

    /// Give the protocol the link's channels so it can resolve its opposite.
    pub fn attach_registry(&self, registry: Arc<LinkChannels>) -> Result<()> {
        self.registry
            .set(registry)
            .map_err(|_| LinkError::AlreadyBound(self.key))
    }

    fn bound_channel(&self) -> Result<&Arc<Channel>> {
        self.channel.get().ok_or(LinkError::Unbound(self.key))
    }

    /// The paired channel of the opposite direction.
    pub fn opposite_channel(&self) -> Result<Arc<Channel>> {
        let channel = self.bound_channel()?;
        let pairing = channel.opposite().ok_or(LinkError::NotPaired(channel.key()))?;
        let registry = self.registry.get().ok_or(LinkError::Unbound(self.key))?;
        registry
            .resolve(pairing.channel)
            .ok_or(LinkError::NotPaired(channel.key()))
    }

    /// The protocol bound to the paired channel.
    pub fn opposite_protocol(&self) -> Option<ProtocolKey> {
        self.channel
            .get()
            .and_then(|channel| channel.opposite())
            .map(|pairing| pairing.protocol)
    }

    fn outbound_channel(&self) -> Result<Arc<Channel>> {
        let channel = self.bound_channel()?;
        match channel.direction() {
            Direction::Output => Ok(Arc::clone(channel)),
            Direction::Input => self.opposite_channel(),
        }
    }

    fn role_mismatch(&self, expected: Role, actual: Role) -> LinkError {
        LinkError::RoleMismatch {
            protocol: H::NAME,
            expected,
            actual,
        }
    }

    /// The error for a kind the local role must not receive.
    pub fn misdirected(&self, message: &H::Message) -> LinkError {
        self.role_mismatch(self.role.opposite(), message.sender())
    }

    /// Send a message on behalf of `expected` role.
    ///
    /// Fails with `RoleMismatch` if this protocol, or the message kind,
    /// belongs to another role.
    pub fn send_role_message(
        &self,
        expected: Role,
        message: &H::Message,
        wait: Wait<'_>,
    ) -> Result<()> {
        if self.role != expected {
            return Err(self.role_mismatch(expected, self.role));
        }
        if message.sender() != expected {
            return Err(self.role_mismatch(expected, message.sender()));
        }
        let channel = self.outbound_channel()?;
        let link_message = encode_message(self.key.number, message)?;
        trace!(protocol = %self.key, kind = message.name(), "send");
        channel.add_message(link_message, wait)
    }

    /// Decode a received link message as this protocol's vocabulary.
    pub fn decode(&self, message: &LinkMessage) -> Result<H::Message> {
        let Some(indicator) = message.peek_byte() else {
            return Err(LinkError::Decode {
                protocol: H::NAME,
                source: DecodeError::Empty,
            });
        };
        trace!(protocol = %self.key, indicator, bytes = message.len(), "decoding");
        <H::Message as ProtocolMessage>::decode(message.payload()).map_err(|err| match err {
            DecodeError::UnknownKind(_) => LinkError::UnknownMessageKind {
                protocol: H::NAME,
                indicator,
                channel: message.channel(),
            },
            source => LinkError::Decode {
                protocol: H::NAME,
                source,
            },
        })
    }

    /// Dispatch a received message to the role-specific handler.
    pub fn receive_message(&self, message: &LinkMessage) -> Result<()> {
        if message.channel() != self.key.number {
            return Err(LinkError::ChannelMismatch {
                channel: self.key.number,
                message: message.channel(),
            });
        }
        let decoded = self.decode(message)?;
        if decoded.sender() == self.role {
            return Err(self.misdirected(&decoded));
        }
        debug!(protocol = %self.key, role = %self.role, kind = decoded.name(), "received");
        match self.role {
            Role::Master => self.handler.receive_master_message(self, decoded),
            Role::Slave => self.handler.receive_slave_message(self, decoded),
        }
    }

    /// Take the next message from this protocol's input channel and dispatch it.
    pub fn receive_next(&self, wait: Wait<'_>) -> Result<()> {
        let channel = self.bound_channel()?;
        if channel.direction() != Direction::Input {
            return Err(LinkError::DirectionMismatch(channel.direction()));
        }
        let message = channel.get_message(wait)?;
        self.receive_message(&message)
    }
}

impl<H: ProtocolHandler> fmt::Debug for Protocol<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Protocol")
            .field("key", &self.key)
            .field("role", &self.role)
            .field("channel", &self.channel.get().map(|channel| channel.key()))
            .finish()
    }
}

/// Object-safe view of a protocol, as the link drives it.
pub trait Endpoint: Send + Sync {
    fn key(&self) -> ProtocolKey;

    fn role(&self) -> Role;

    /// Manufacture the channel for `direction`.
    fn bind_channel(&self, direction: Direction, capacity: usize) -> Result<Arc<Channel>>;

    fn attach_registry(&self, registry: Arc<LinkChannels>) -> Result<()>;

    fn receive_message(&self, message: &LinkMessage) -> Result<()>;
}

impl<H: ProtocolHandler> Endpoint for Protocol<H> {
    fn key(&self) -> ProtocolKey {
        self.key
    }

    fn role(&self) -> Role {
        self.role
    }

    fn bind_channel(&self, direction: Direction, capacity: usize) -> Result<Arc<Channel>> {
        self.bind(direction, capacity)
    }

    fn attach_registry(&self, registry: Arc<LinkChannels>) -> Result<()> {
        Protocol::attach_registry(self, registry)
    }

    fn receive_message(&self, message: &LinkMessage) -> Result<()> {
        Protocol::receive_message(self, message)
    }
}
