//! Robot driver protocol: motion commands from master to robot.

use std::sync::Arc;

use robolink_frame::{BufferError, ChannelNumber, FillableBuffer, BYTES1, ROBOT_DRIVER};
use serde::Serialize;

use crate::context::SystemContext;
use crate::error::{DecodeError, Result};
use crate::notify::{Notice, NoticeSource};
use crate::protocol::{Protocol, ProtocolHandler, ProtocolMessage, Role};
use crate::queue::Wait;

pub const MS_DRIVE: u8 = 0;
pub const MS_STOP: u8 = 1;
pub const MS_MOVE: u8 = 2;
pub const MS_STEER: u8 = 4;
pub const MS_SET_BUMP_MODE: u8 = 5;
pub const MS_SET_RANGING_MODE: u8 = 6;

/// Robot driver vocabulary. All fields are one byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DriverMessage {
    Drive { speed: u8, acceleration: u8 },
    Stop { acceleration: u8 },
    Move { distance: u8, speed: u8, acceleration: u8 },
    Steer { angle: u8, rate: u8 },
    SetBumpMode { on: bool },
    SetRangingMode { on: bool },
}

impl DriverMessage {
    fn fields(&self) -> Vec<u8> {
        match *self {
            Self::Drive { speed, acceleration } => vec![speed, acceleration],
            Self::Stop { acceleration } => vec![acceleration],
            Self::Move {
                distance,
                speed,
                acceleration,
            } => vec![distance, speed, acceleration],
            Self::Steer { angle, rate } => vec![angle, rate],
            Self::SetBumpMode { on } | Self::SetRangingMode { on } => vec![u8::from(on)],
        }
    }
}

impl ProtocolMessage for DriverMessage {
    fn indicator(&self) -> u8 {
        match self {
            Self::Drive { .. } => MS_DRIVE,
            Self::Stop { .. } => MS_STOP,
            Self::Move { .. } => MS_MOVE,
            Self::Steer { .. } => MS_STEER,
            Self::SetBumpMode { .. } => MS_SET_BUMP_MODE,
            Self::SetRangingMode { .. } => MS_SET_RANGING_MODE,
        }
    }

    fn encoded_len(&self) -> usize {
        BYTES1 + self.fields().len() * BYTES1
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Drive { .. } => "Drive",
            Self::Stop { .. } => "Stop",
            Self::Move { .. } => "Move",
            Self::Steer { .. } => "Steer",
            Self::SetBumpMode { .. } => "SetBumpMode",
            Self::SetRangingMode { .. } => "SetRangingMode",
        }
    }

    fn sender(&self) -> Role {
        Role::Master
    }

    fn deconstruct(&self, buf: &mut FillableBuffer) -> std::result::Result<(), BufferError> {
        buf.deconstruct_bytes1(self.indicator())?;
        for field in self.fields() {
            buf.deconstruct_bytes1(field)?;
        }
        Ok(())
    }

    fn reconstruct(buf: &mut FillableBuffer) -> std::result::Result<Self, DecodeError> {
        let message = match buf.reconstruct_bytes1()? {
            MS_DRIVE => Self::Drive {
                speed: buf.reconstruct_bytes1()?,
                acceleration: buf.reconstruct_bytes1()?,
            },
            MS_STOP => Self::Stop {
                acceleration: buf.reconstruct_bytes1()?,
            },
            MS_MOVE => Self::Move {
                distance: buf.reconstruct_bytes1()?,
                speed: buf.reconstruct_bytes1()?,
                acceleration: buf.reconstruct_bytes1()?,
            },
            MS_STEER => Self::Steer {
                angle: buf.reconstruct_bytes1()?,
                rate: buf.reconstruct_bytes1()?,
            },
            MS_SET_BUMP_MODE => Self::SetBumpMode {
                on: buf.reconstruct_bytes1()? != 0,
            },
            MS_SET_RANGING_MODE => Self::SetRangingMode {
                on: buf.reconstruct_bytes1()? != 0,
            },
            other => return Err(DecodeError::UnknownKind(other)),
        };
        Ok(message)
    }
}

/// Handler for the robot driver protocol. The slave side publishes each
/// received command as a [`Notice::DriveCommand`].
#[derive(Debug, Clone)]
pub struct RobotDriver {
    context: Arc<SystemContext>,
}

impl RobotDriver {
    pub fn new(context: Arc<SystemContext>) -> Self {
        Self { context }
    }
}

impl ProtocolHandler for RobotDriver {
    type Message = DriverMessage;
    const NAME: &'static str = "robot-driver";
    const DEFAULT_CHANNEL: ChannelNumber = ROBOT_DRIVER;

    fn receive_master_message(
        &self,
        protocol: &Protocol<Self>,
        message: DriverMessage,
    ) -> Result<()> {
        Err(protocol.misdirected(&message))
    }

    fn receive_slave_message(
        &self,
        protocol: &Protocol<Self>,
        message: DriverMessage,
    ) -> Result<()> {
        self.context.publish(
            Notice::DriveCommand { command: message },
            NoticeSource::Protocol(protocol.key()),
        );
        Ok(())
    }
}

impl Protocol<RobotDriver> {
    pub fn send_drive(&self, speed: u8, acceleration: u8, wait: Wait<'_>) -> Result<()> {
        self.send_role_message(
            Role::Master,
            &DriverMessage::Drive {
                speed,
                acceleration,
            },
            wait,
        )
    }

    pub fn send_stop(&self, acceleration: u8, wait: Wait<'_>) -> Result<()> {
        self.send_role_message(Role::Master, &DriverMessage::Stop { acceleration }, wait)
    }

    pub fn send_move(
        &self,
        distance: u8,
        speed: u8,
        acceleration: u8,
        wait: Wait<'_>,
    ) -> Result<()> {
        self.send_role_message(
            Role::Master,
            &DriverMessage::Move {
                distance,
                speed,
                acceleration,
            },
            wait,
        )
    }

    pub fn send_steer(&self, angle: u8, rate: u8, wait: Wait<'_>) -> Result<()> {
        self.send_role_message(Role::Master, &DriverMessage::Steer { angle, rate }, wait)
    }

    pub fn send_set_bump_mode(&self, on: bool, wait: Wait<'_>) -> Result<()> {
        self.send_role_message(Role::Master, &DriverMessage::SetBumpMode { on }, wait)
    }

    pub fn send_set_ranging_mode(&self, on: bool, wait: Wait<'_>) -> Result<()> {
        self.send_role_message(Role::Master, &DriverMessage::SetRangingMode { on }, wait)
    }
}
