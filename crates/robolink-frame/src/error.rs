use crate::channel::{CHANNEL_NUMBER_MAX, CHANNEL_NUMBER_MIN};

/// Errors raised while filling or draining a [`FillableBuffer`](crate::FillableBuffer).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BufferError {
    /// Appending the field would overflow the buffer's fixed capacity.
    #[error("buffer capacity exceeded (need {needed} bytes, {remaining} left)")]
    CapacityExceeded { needed: usize, remaining: usize },

    /// Fewer unread bytes remain than the field needs.
    #[error("buffer underrun (need {needed} bytes, {remaining} left)")]
    BufferUnderrun { needed: usize, remaining: usize },

    /// Only 1- and 4-byte fields exist on the wire.
    #[error("unsupported field width {0} (expected 1 or 4)")]
    UnsupportedWidth(usize),
}

/// Errors that can occur during link framing.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The channel number is outside the legal range.
    #[error(
        "invalid channel number {0} (legal range {min}..={max})",
        min = CHANNEL_NUMBER_MIN,
        max = CHANNEL_NUMBER_MAX
    )]
    InvalidChannelNumber(u8),

    /// The payload exceeds the configured maximum size.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// A field buffer error.
    #[error("field buffer error: {0}")]
    Buffer(#[from] BufferError),
}

pub type Result<T> = std::result::Result<T, FrameError>;
