//! Wire-level building blocks of a robot link.
//!
//! - [`ChannelNumber`]: validated logical stream id, `[CHANNEL_NUMBER_MIN, CHANNEL_NUMBER_MAX]`
//! - [`FillableBuffer`]: fixed-capacity buffer of 1- and 4-byte big-endian fields
//! - [`LinkMessage`]: channel-tagged payload, the unit queued and transported
//! - link framing: `[channel: u8][length: u8][payload]`, see [`encode_frame`]
//!
//! Everything here must stay byte-exact with the firmware on the far side.

pub mod assembler;
pub mod buffer;
pub mod channel;
pub mod codec;
pub mod error;
pub mod message;

pub use assembler::FrameAssembler;
pub use buffer::{FillableBuffer, BYTES1, BYTES4};
pub use channel::{
    channel_name, ChannelNumber, CHANNEL_NUMBER_MAX, CHANNEL_NUMBER_MIN, ROBOT_CONTROL,
    ROBOT_DRIVER,
};
pub use codec::{
    decode_frame, encode_frame, encode_link_message, Frame, FrameConfig, HEADER_SIZE,
    MAX_PAYLOAD,
};
pub use error::{BufferError, FrameError, Result};
pub use message::LinkMessage;
