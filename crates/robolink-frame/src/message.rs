use bytes::Bytes;

use crate::buffer::FillableBuffer;
use crate::channel::ChannelNumber;

/// The wire envelope: a channel number plus the encoded protocol message.
///
/// Link messages are created per send/receive event and never reused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkMessage {
    channel: ChannelNumber,
    payload: Bytes,
}

impl LinkMessage {
    /// Create a link message for `channel`.
    pub fn new(channel: ChannelNumber, payload: impl Into<Bytes>) -> Self {
        Self {
            channel,
            payload: payload.into(),
        }
    }

    /// The channel this message is addressed to.
    pub fn channel(&self) -> ChannelNumber {
        self.channel
    }

    /// The encoded protocol message.
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// The discriminant byte, without decoding anything.
    pub fn peek_byte(&self) -> Option<u8> {
        self.payload.first().copied()
    }

    /// A read buffer positioned at the discriminant.
    pub fn reader(&self) -> FillableBuffer {
        FillableBuffer::from_bytes(&self.payload)
    }

    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// Returns true if the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peek_and_reader_see_the_same_discriminant() {
        let msg = LinkMessage::new(ChannelNumber::new(10).unwrap(), vec![0u8, 5, 3]);
        assert_eq!(msg.peek_byte(), Some(0));

        let mut reader = msg.reader();
        assert_eq!(reader.peek_byte().unwrap(), 0);
        assert_eq!(reader.reconstruct_bytes1().unwrap(), 0);
        assert_eq!(reader.reconstruct_bytes1().unwrap(), 5);
        assert_eq!(msg.len(), 3);
    }

    #[test]
    fn empty_payload_has_no_discriminant() {
        let msg = LinkMessage::new(ChannelNumber::new(1).unwrap(), Bytes::new());
        assert!(msg.is_empty());
        assert_eq!(msg.peek_byte(), None);
    }
}
