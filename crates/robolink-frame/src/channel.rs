//! Channel numbers.
//!
//! A link multiplexes several logical streams over one physical medium. The
//! legal range is fixed for the whole system and shared with the firmware.

use std::fmt;

use crate::error::{FrameError, Result};

/// Lowest legal channel number.
pub const CHANNEL_NUMBER_MIN: u8 = 0;

/// Highest legal channel number.
pub const CHANNEL_NUMBER_MAX: u8 = 15;

/// Robot control: mode, estop, reset, state, liveness.
pub const ROBOT_CONTROL: ChannelNumber = ChannelNumber(1);

/// Robot driver: drive, stop, move, steer.
pub const ROBOT_DRIVER: ChannelNumber = ChannelNumber(2);

/// A channel number known to be inside `[CHANNEL_NUMBER_MIN, CHANNEL_NUMBER_MAX]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChannelNumber(u8);

impl ChannelNumber {
    /// Validate a raw channel number.
    pub fn new(number: u8) -> Result<Self> {
        if Self::is_legal(number) {
            Ok(Self(number))
        } else {
            Err(FrameError::InvalidChannelNumber(number))
        }
    }

    /// Returns true if `number` is inside the legal range.
    pub fn is_legal(number: u8) -> bool {
        (CHANNEL_NUMBER_MIN..=CHANNEL_NUMBER_MAX).contains(&number)
    }

    /// The raw value carried on the wire.
    pub const fn get(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for ChannelNumber {
    type Error = FrameError;

    fn try_from(number: u8) -> Result<Self> {
        Self::new(number)
    }
}

impl From<ChannelNumber> for u8 {
    fn from(number: ChannelNumber) -> Self {
        number.0
    }
}

impl fmt::Display for ChannelNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Returns a human-readable name for a channel number.
pub fn channel_name(number: ChannelNumber) -> &'static str {
    match number {
        ROBOT_CONTROL => "ROBOT_CONTROL",
        ROBOT_DRIVER => "ROBOT_DRIVER",
        _ => "USER",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_bounds_are_legal() {
        assert_eq!(ChannelNumber::new(CHANNEL_NUMBER_MIN).unwrap().get(), 0);
        assert_eq!(ChannelNumber::new(CHANNEL_NUMBER_MAX).unwrap().get(), 15);
    }

    #[test]
    fn out_of_range_is_rejected() {
        let err = ChannelNumber::new(CHANNEL_NUMBER_MAX + 1).unwrap_err();
        assert!(matches!(err, FrameError::InvalidChannelNumber(16)));
        assert!(ChannelNumber::try_from(255).is_err());
    }

    #[test]
    fn well_known_channels_have_names() {
        assert_eq!(channel_name(ROBOT_CONTROL), "ROBOT_CONTROL");
        assert_eq!(channel_name(ROBOT_DRIVER), "ROBOT_DRIVER");
        assert_eq!(channel_name(ChannelNumber::new(10).unwrap()), "USER");
    }
}
