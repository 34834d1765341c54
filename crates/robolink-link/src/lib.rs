//! Channels, protocols and links for master/slave robot communication.
//!
//! A [`Link`] joins one side of a master/slave pair to a byte stream. For
//! every channel number in use it holds an input and an output
//! [`Channel`], paired, each bound to a [`Protocol`] of the link's
//! [`Role`]. Outbound messages are encoded by their protocol and queued on
//! the output channel; inbound frames are queued on the input channel and
//! dispatched to the input protocol, which decodes by discriminant and
//! handles the message for its role.
//!
//! Shared robot state, the local clock and notice publishing live in an
//! explicit [`SystemContext`].

pub mod channel;
pub mod collection;
pub mod context;
pub mod error;
pub mod link;
pub mod notify;
pub mod protocol;
pub mod protocols;
pub mod queue;

pub use channel::{pair_channels, Channel, ChannelKey, Direction, Pairing};
pub use collection::{ArrivalSignal, ChannelCollection, LinkChannels};
pub use context::{
    LocalClock, RobotState, RobotStateSnapshot, SystemContext, ESTOP_LINK_FAILURE, ESTOP_NONE,
    ESTOP_SOFTWARE,
};
pub use error::{ContextError, DecodeError, LinkError, QueueError, Result};
pub use link::{Link, LinkConfig, LinkHandle, LinkStats, LinkStatsSnapshot, ProtocolPair};
pub use notify::{
    DistributionList, Notice, NoticeReceiver, NoticeSource, Notifier, Publication,
    DEFAULT_NOTICE_CAPACITY,
};
pub use protocol::{
    encode_message, Endpoint, Protocol, ProtocolHandler, ProtocolId, ProtocolKey,
    ProtocolMessage, Role,
};
pub use protocols::{ControlMessage, DriverMessage, RobotControl, RobotDriver};
pub use queue::{BoundedQueue, Wait, DEFAULT_QUEUE_CAPACITY};
