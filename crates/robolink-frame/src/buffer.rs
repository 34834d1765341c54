//! Fixed-capacity field buffer.
//!
//! Protocol messages are sequences of 1- and 4-byte unsigned fields.
//! Writing ("deconstructing") a message appends its fields in declared
//! order; reading ("reconstructing") consumes them in the same order.
//! Multi-byte fields are big-endian, matching the firmware.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::BufferError;

/// Width of a one-byte field.
pub const BYTES1: usize = 1;

/// Width of a four-byte field.
pub const BYTES4: usize = 4;

type Result<T> = std::result::Result<T, BufferError>;

/// A byte buffer with a fixed capacity, an append side and a read cursor.
#[derive(Debug, Clone)]
pub struct FillableBuffer {
    data: BytesMut,
    capacity: usize,
    cursor: usize,
}

impl FillableBuffer {
    /// Create an empty buffer that can hold exactly `capacity` bytes.
    pub fn new(capacity: usize) -> Self {
        Self {
            data: BytesMut::with_capacity(capacity),
            capacity,
            cursor: 0,
        }
    }

    /// Wrap received bytes for reading. The buffer is full; the cursor is at 0.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            data: BytesMut::from(bytes),
            capacity: bytes.len(),
            cursor: 0,
        }
    }

    /// Append `value` truncated to `width` bytes.
    pub fn deconstruct(&mut self, width: usize, value: u32) -> Result<()> {
        if width != BYTES1 && width != BYTES4 {
            return Err(BufferError::UnsupportedWidth(width));
        }
        let remaining = self.capacity - self.data.len();
        if width > remaining {
            return Err(BufferError::CapacityExceeded {
                needed: width,
                remaining,
            });
        }
        if width == BYTES1 {
            self.data.put_u8(value as u8);
        } else {
            self.data.put_u32(value);
        }
        Ok(())
    }

    /// Append a one-byte field.
    pub fn deconstruct_bytes1(&mut self, value: u8) -> Result<()> {
        self.deconstruct(BYTES1, u32::from(value))
    }

    /// Append a four-byte field.
    pub fn deconstruct_bytes4(&mut self, value: u32) -> Result<()> {
        self.deconstruct(BYTES4, value)
    }

    /// Consume the next `width` bytes as an unsigned integer.
    pub fn reconstruct(&mut self, width: usize) -> Result<u32> {
        if width != BYTES1 && width != BYTES4 {
            return Err(BufferError::UnsupportedWidth(width));
        }
        let remaining = self.remaining();
        if width > remaining {
            return Err(BufferError::BufferUnderrun {
                needed: width,
                remaining,
            });
        }
        let field = &self.data[self.cursor..self.cursor + width];
        let value = field
            .iter()
            .fold(0u32, |acc, &byte| (acc << 8) | u32::from(byte));
        self.cursor += width;
        Ok(value)
    }

    /// Consume a one-byte field.
    pub fn reconstruct_bytes1(&mut self) -> Result<u8> {
        self.reconstruct(BYTES1).map(|value| value as u8)
    }

    /// Consume a four-byte field.
    pub fn reconstruct_bytes4(&mut self) -> Result<u32> {
        self.reconstruct(BYTES4)
    }

    /// The next unread byte, without advancing the cursor.
    pub fn peek_byte(&self) -> Result<u8> {
        self.data
            .get(self.cursor)
            .copied()
            .ok_or(BufferError::BufferUnderrun {
                needed: BYTES1,
                remaining: 0,
            })
    }

    /// Unread bytes.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.cursor
    }

    /// Bytes written so far.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Fixed capacity chosen at construction.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns true if no more fields fit.
    pub fn is_full(&self) -> bool {
        self.data.len() == self.capacity
    }

    /// Convert the written bytes into an immutable payload.
    pub fn freeze(self) -> Bytes {
        self.data.freeze()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fields_come_back_in_order() {
        let mut buf = FillableBuffer::new(7);
        buf.deconstruct_bytes1(7).unwrap();
        buf.deconstruct_bytes4(0x0102_0304).unwrap();
        buf.deconstruct_bytes1(2).unwrap();
        buf.deconstruct_bytes1(0).unwrap();
        assert!(buf.is_full());

        let mut read = FillableBuffer::from_bytes(&buf.freeze());
        assert_eq!(read.reconstruct_bytes1().unwrap(), 7);
        assert_eq!(read.reconstruct_bytes4().unwrap(), 0x0102_0304);
        assert_eq!(read.reconstruct_bytes1().unwrap(), 2);
        assert_eq!(read.reconstruct_bytes1().unwrap(), 0);
        assert_eq!(read.remaining(), 0);
    }

    #[test]
    fn four_byte_fields_are_big_endian() {
        let mut buf = FillableBuffer::new(4);
        buf.deconstruct_bytes4(0xDEAD_BEEF).unwrap();
        assert_eq!(buf.freeze().as_ref(), &[0xDE, 0xAD, 0xBE, 0xEF]);
    }

    #[test]
    fn boundary_values_survive() {
        for value in [0u32, 1, 0x7F, 0xFF] {
            let mut buf = FillableBuffer::new(1);
            buf.deconstruct(BYTES1, value).unwrap();
            let mut read = FillableBuffer::from_bytes(&buf.freeze());
            assert_eq!(read.reconstruct(BYTES1).unwrap(), value);
        }
        for value in [0u32, 0xFF, 0xFFFF, u32::MAX] {
            let mut buf = FillableBuffer::new(4);
            buf.deconstruct(BYTES4, value).unwrap();
            let mut read = FillableBuffer::from_bytes(&buf.freeze());
            assert_eq!(read.reconstruct(BYTES4).unwrap(), value);
        }
    }

    #[test]
    fn one_byte_field_truncates() {
        let mut buf = FillableBuffer::new(1);
        buf.deconstruct(BYTES1, 0x1234).unwrap();
        assert_eq!(buf.freeze().as_ref(), &[0x34]);
    }

    #[test]
    fn overflow_is_capacity_exceeded() {
        let mut buf = FillableBuffer::new(3);
        buf.deconstruct_bytes1(1).unwrap();
        let err = buf.deconstruct_bytes4(2).unwrap_err();
        assert_eq!(
            err,
            BufferError::CapacityExceeded {
                needed: 4,
                remaining: 2
            }
        );
        assert_eq!(buf.len(), 1, "failed append must not write");
    }

    #[test]
    fn short_read_is_underrun() {
        let mut read = FillableBuffer::from_bytes(&[1, 2]);
        let err = read.reconstruct_bytes4().unwrap_err();
        assert_eq!(
            err,
            BufferError::BufferUnderrun {
                needed: 4,
                remaining: 2
            }
        );
        assert_eq!(read.remaining(), 2, "failed read must not advance");
    }

    #[test]
    fn peek_does_not_consume() {
        let mut read = FillableBuffer::from_bytes(&[6, 9]);
        assert_eq!(read.peek_byte().unwrap(), 6);
        assert_eq!(read.peek_byte().unwrap(), 6);
        assert_eq!(read.reconstruct_bytes1().unwrap(), 6);
        assert_eq!(read.peek_byte().unwrap(), 9);
        read.reconstruct_bytes1().unwrap();
        assert!(read.peek_byte().is_err());
    }

    #[test]
    fn other_widths_are_rejected() {
        let mut buf = FillableBuffer::new(8);
        assert_eq!(
            buf.deconstruct(2, 1).unwrap_err(),
            BufferError::UnsupportedWidth(2)
        );
        assert_eq!(
            buf.reconstruct(3).unwrap_err(),
            BufferError::UnsupportedWidth(3)
        );
    }
}
