use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};
use crate::message::LinkMessage;

/// Frame header: channel (1) + length (1) = 2 bytes.
pub const HEADER_SIZE: usize = 2;

/// Largest payload the one-byte length field can describe.
pub const MAX_PAYLOAD: usize = u8::MAX as usize;

/// A framed link message. The channel is raw so that frames for
/// channels this side does not know can still be skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// The channel this message belongs to.
    pub channel: u8,
    /// The message payload.
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame.
    pub fn new(channel: u8, payload: impl Into<Bytes>) -> Self {
        Self {
            channel,
            payload: payload.into(),
        }
    }

    /// The total wire size of this frame (header + payload).
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }
}

/// Encode a frame into the wire format.
///
/// Wire format:
/// ```text
/// ┌──────────────┬─────────────┬─────────────────┐
/// │ Channel (1B) │ Length (1B) │ Payload         │
/// │              │             │ (Length bytes)  │
/// └──────────────┴─────────────┴─────────────────┘
/// ```
pub fn encode_frame(channel: u8, payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    if payload.len() > MAX_PAYLOAD {
        return Err(FrameError::PayloadTooLarge {
            size: payload.len(),
            max: MAX_PAYLOAD,
        });
    }
    dst.reserve(HEADER_SIZE + payload.len());
    dst.put_u8(channel);
    dst.put_u8(payload.len() as u8);
    dst.put_slice(payload);
    Ok(())
}

/// Encode a link message into the wire format.
pub fn encode_link_message(message: &LinkMessage, dst: &mut BytesMut) -> Result<()> {
    encode_frame(message.channel().get(), message.payload(), dst)
}

/// Decode a frame from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet.
/// On success, consumes the frame bytes from the buffer. A complete frame
/// whose payload exceeds `max_payload` is consumed too, then reported, so
/// the next call starts on a frame boundary.
pub fn decode_frame(src: &mut BytesMut, max_payload: usize) -> Result<Option<Frame>> {
    if src.len() < HEADER_SIZE {
        return Ok(None);
    }

    let channel = src[0];
    let payload_len = usize::from(src[1]);

    let total = HEADER_SIZE + payload_len;
    if src.len() < total {
        return Ok(None);
    }

    src.advance(HEADER_SIZE);
    let payload = src.split_to(payload_len).freeze();

    if payload_len > max_payload {
        return Err(FrameError::PayloadTooLarge {
            size: payload_len,
            max: max_payload,
        });
    }

    Ok(Some(Frame { channel, payload }))
}

/// Configuration for the frame codec.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum payload size in bytes. Default: [`MAX_PAYLOAD`].
    pub max_payload_size: usize,
    /// Read timeout for blocking operations.
    pub read_timeout: Option<std::time::Duration>,
    /// Write timeout for blocking operations.
    pub write_timeout: Option<std::time::Duration>,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: MAX_PAYLOAD,
            read_timeout: Some(std::time::Duration::from_millis(10)),
            write_timeout: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::ChannelNumber;

    #[test]
    fn drive_message_on_channel_ten() {
        let mut buf = BytesMut::new();
        encode_frame(10, &[0, 5, 3], &mut buf).unwrap();
        assert_eq!(buf.as_ref(), &[10, 3, 0, 5, 3]);

        let frame = decode_frame(&mut buf, MAX_PAYLOAD).unwrap().unwrap();
        assert_eq!(frame.channel, 10);
        assert_eq!(frame.payload.as_ref(), &[0, 5, 3]);
        assert_eq!(frame.wire_size(), 5);
        assert!(buf.is_empty());
    }

    #[test]
    fn link_message_encodes_its_channel() {
        let msg = LinkMessage::new(ChannelNumber::new(2).unwrap(), vec![1u8, 9]);
        let mut buf = BytesMut::new();
        encode_link_message(&msg, &mut buf).unwrap();
        assert_eq!(buf.as_ref(), &[2, 2, 1, 9]);
    }

    #[test]
    fn incomplete_header_waits() {
        let mut buf = BytesMut::from(&[1u8][..]);
        assert!(decode_frame(&mut buf, MAX_PAYLOAD).unwrap().is_none());
        assert_eq!(buf.len(), 1);
    }

    #[test]
    fn incomplete_payload_waits() {
        let mut buf = BytesMut::new();
        encode_frame(1, b"hello", &mut buf).unwrap();
        buf.truncate(HEADER_SIZE + 2);

        assert!(decode_frame(&mut buf, MAX_PAYLOAD).unwrap().is_none());
        assert_eq!(buf.len(), HEADER_SIZE + 2, "nothing consumed");
    }

    #[test]
    fn oversized_payload_is_rejected_on_encode() {
        let mut buf = BytesMut::new();
        let payload = vec![0u8; MAX_PAYLOAD + 1];
        let err = encode_frame(1, &payload, &mut buf).unwrap_err();
        assert!(matches!(err, FrameError::PayloadTooLarge { size: 256, max: 255 }));
        assert!(buf.is_empty());
    }

    #[test]
    fn oversized_payload_is_skipped_on_decode() {
        let mut buf = BytesMut::new();
        encode_frame(3, &[7; 8], &mut buf).unwrap();
        encode_frame(4, &[1], &mut buf).unwrap();

        let err = decode_frame(&mut buf, 4).unwrap_err();
        assert!(matches!(err, FrameError::PayloadTooLarge { size: 8, max: 4 }));

        let next = decode_frame(&mut buf, 4).unwrap().unwrap();
        assert_eq!(next.channel, 4);
        assert_eq!(next.payload.as_ref(), &[1]);
    }

    #[test]
    fn multiple_frames() {
        let mut buf = BytesMut::new();
        encode_frame(1, b"first", &mut buf).unwrap();
        encode_frame(2, b"second", &mut buf).unwrap();

        let f1 = decode_frame(&mut buf, MAX_PAYLOAD).unwrap().unwrap();
        assert_eq!(f1, Frame::new(1, &b"first"[..]));

        let f2 = decode_frame(&mut buf, MAX_PAYLOAD).unwrap().unwrap();
        assert_eq!(f2, Frame::new(2, &b"second"[..]));

        assert!(buf.is_empty());
    }

    #[test]
    fn empty_payload() {
        let mut buf = BytesMut::new();
        encode_frame(5, &[], &mut buf).unwrap();
        assert_eq!(buf.as_ref(), &[5, 0]);

        let frame = decode_frame(&mut buf, MAX_PAYLOAD).unwrap().unwrap();
        assert_eq!(frame.channel, 5);
        assert!(frame.payload.is_empty());
    }

    #[test]
    fn unknown_channels_still_decode() {
        let mut buf = BytesMut::from(&[200u8, 1, 42][..]);
        let frame = decode_frame(&mut buf, MAX_PAYLOAD).unwrap().unwrap();
        assert_eq!(frame.channel, 200);
    }
}
