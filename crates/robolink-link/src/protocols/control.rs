//! Robot control protocol.
//!
//! Mode changes, emergency stop, reset, state reports and liveness. The
//! master drives; the slave (the robot, or the simulated robot here)
//! acknowledges estops, reports its state on request and answers liveness
//! checks.
//!
//! Every kind is the discriminant plus one argument byte, except
//! `HereIsMyState`: discriminant, time (4 bytes), mode, estop.

use std::sync::Arc;

use robolink_frame::{BufferError, ChannelNumber, FillableBuffer, BYTES1, BYTES4, ROBOT_CONTROL};
use serde::Serialize;

use crate::context::{SystemContext, ESTOP_SOFTWARE};
use crate::error::{DecodeError, Result};
use crate::notify::{Notice, NoticeSource};
use crate::protocol::{Protocol, ProtocolHandler, ProtocolMessage, Role};
use crate::queue::Wait;

pub const MS_SET_MODE: u8 = 0;
pub const MS_DO_ESTOP: u8 = 1;
pub const MS_CLEAR_ESTOP: u8 = 2;
pub const MS_DO_RESET: u8 = 3;
pub const MS_DO_DUMP_STATE: u8 = 4;
pub const MS_IM_ALIVE: u8 = 5;
pub const SM_DID_ESTOP: u8 = 6;
pub const SM_HERE_IS_MY_STATE: u8 = 7;
pub const SM_IM_ALIVE: u8 = 8;

const SHORT_LEN: usize = BYTES1 + BYTES1;
const STATE_LEN: usize = BYTES1 + BYTES4 + BYTES1 + BYTES1;

/// Robot control vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ControlMessage {
    SetMode { mode: u8 },
    DoEstop,
    ClearEstop { indicator: u8 },
    DoReset,
    DoDumpState,
    MasterIsAlive,
    DidEstop,
    HereIsMyState { time: u32, mode: u8, estop: u8 },
    SlaveIsAlive,
}

impl ProtocolMessage for ControlMessage {
    fn indicator(&self) -> u8 {
        match self {
            Self::SetMode { .. } => MS_SET_MODE,
            Self::DoEstop => MS_DO_ESTOP,
            Self::ClearEstop { .. } => MS_CLEAR_ESTOP,
            Self::DoReset => MS_DO_RESET,
            Self::DoDumpState => MS_DO_DUMP_STATE,
            Self::MasterIsAlive => MS_IM_ALIVE,
            Self::DidEstop => SM_DID_ESTOP,
            Self::HereIsMyState { .. } => SM_HERE_IS_MY_STATE,
            Self::SlaveIsAlive => SM_IM_ALIVE,
        }
    }

    fn encoded_len(&self) -> usize {
        match self {
            Self::HereIsMyState { .. } => STATE_LEN,
            _ => SHORT_LEN,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::SetMode { .. } => "SetMode",
            Self::DoEstop => "DoEstop",
            Self::ClearEstop { .. } => "ClearEstop",
            Self::DoReset => "DoReset",
            Self::DoDumpState => "DoDumpState",
            Self::MasterIsAlive => "MasterIsAlive",
            Self::DidEstop => "DidEstop",
            Self::HereIsMyState { .. } => "HereIsMyState",
            Self::SlaveIsAlive => "SlaveIsAlive",
        }
    }

    fn sender(&self) -> Role {
        match self {
            Self::DidEstop | Self::HereIsMyState { .. } | Self::SlaveIsAlive => Role::Slave,
            _ => Role::Master,
        }
    }

    fn deconstruct(&self, buf: &mut FillableBuffer) -> std::result::Result<(), BufferError> {
        buf.deconstruct_bytes1(self.indicator())?;
        match *self {
            Self::SetMode { mode } => buf.deconstruct_bytes1(mode),
            Self::ClearEstop { indicator } => buf.deconstruct_bytes1(indicator),
            Self::HereIsMyState { time, mode, estop } => {
                buf.deconstruct_bytes4(time)?;
                buf.deconstruct_bytes1(mode)?;
                buf.deconstruct_bytes1(estop)
            }
            Self::DoEstop
            | Self::DoReset
            | Self::DoDumpState
            | Self::MasterIsAlive
            | Self::DidEstop
            | Self::SlaveIsAlive => buf.deconstruct_bytes1(0),
        }
    }

    fn reconstruct(buf: &mut FillableBuffer) -> std::result::Result<Self, DecodeError> {
        let indicator = buf.reconstruct_bytes1()?;
        let message = match indicator {
            MS_SET_MODE => Self::SetMode {
                mode: buf.reconstruct_bytes1()?,
            },
            MS_CLEAR_ESTOP => Self::ClearEstop {
                indicator: buf.reconstruct_bytes1()?,
            },
            SM_HERE_IS_MY_STATE => Self::HereIsMyState {
                time: buf.reconstruct_bytes4()?,
                mode: buf.reconstruct_bytes1()?,
                estop: buf.reconstruct_bytes1()?,
            },
            MS_DO_ESTOP | MS_DO_RESET | MS_DO_DUMP_STATE | MS_IM_ALIVE | SM_DID_ESTOP
            | SM_IM_ALIVE => {
                buf.reconstruct_bytes1()?;
                match indicator {
                    MS_DO_ESTOP => Self::DoEstop,
                    MS_DO_RESET => Self::DoReset,
                    MS_DO_DUMP_STATE => Self::DoDumpState,
                    MS_IM_ALIVE => Self::MasterIsAlive,
                    SM_DID_ESTOP => Self::DidEstop,
                    _ => Self::SlaveIsAlive,
                }
            }
            other => return Err(DecodeError::UnknownKind(other)),
        };
        Ok(message)
    }
}

/// Handler for the robot control protocol.
///
/// As master it records state reports and publishes estop and liveness
/// notices. As slave it simulates the robot against the context's state.
#[derive(Debug, Clone)]
pub struct RobotControl {
    context: Arc<SystemContext>,
}

impl RobotControl {
    pub fn new(context: Arc<SystemContext>) -> Self {
        Self { context }
    }

    pub fn context(&self) -> &Arc<SystemContext> {
        &self.context
    }
}

impl ProtocolHandler for RobotControl {
    type Message = ControlMessage;
    const NAME: &'static str = "robot-control";
    const DEFAULT_CHANNEL: ChannelNumber = ROBOT_CONTROL;

    fn receive_master_message(
        &self,
        protocol: &Protocol<Self>,
        message: ControlMessage,
    ) -> Result<()> {
        let source = NoticeSource::Protocol(protocol.key());
        match message {
            ControlMessage::DidEstop => {
                self.context.publish(Notice::EstopOccurred, source);
            }
            ControlMessage::SlaveIsAlive => {
                self.context
                    .publish(Notice::IsAlive { peer: Role::Slave }, source);
            }
            ControlMessage::HereIsMyState { time, mode, estop } => {
                let state = self.context.state()?;
                state.update_state(time, mode, estop);
                self.context.publish(
                    Notice::RobotStateUpdated {
                        state: state.snapshot(),
                    },
                    source,
                );
            }
            ControlMessage::SetMode { .. }
            | ControlMessage::DoEstop
            | ControlMessage::ClearEstop { .. }
            | ControlMessage::DoReset
            | ControlMessage::DoDumpState
            | ControlMessage::MasterIsAlive => return Err(protocol.misdirected(&message)),
        }
        Ok(())
    }

    fn receive_slave_message(
        &self,
        protocol: &Protocol<Self>,
        message: ControlMessage,
    ) -> Result<()> {
        let source = NoticeSource::Protocol(protocol.key());
        self.context
            .publish(Notice::ControlCommand { command: message }, source.clone());
        let state = self.context.state()?;
        match message {
            ControlMessage::SetMode { mode } => state.set_mode(mode),
            ControlMessage::DoEstop => {
                state.set_estop(ESTOP_SOFTWARE);
                self.context.publish(Notice::EstopOccurred, source);
                protocol.send_did_estop(Wait::Immediate)?;
            }
            ControlMessage::ClearEstop { .. } => state.clear_estop(),
            ControlMessage::DoReset => state.reset(),
            ControlMessage::DoDumpState => protocol.send_here_is_my_state(Wait::Immediate)?,
            ControlMessage::MasterIsAlive => {
                self.context
                    .publish(Notice::IsAlive { peer: Role::Master }, source);
                protocol.send_im_alive(Wait::Immediate)?;
            }
            ControlMessage::DidEstop
            | ControlMessage::HereIsMyState { .. }
            | ControlMessage::SlaveIsAlive => return Err(protocol.misdirected(&message)),
        }
        Ok(())
    }
}

impl Protocol<RobotControl> {
    pub fn send_set_mode(&self, mode: u8, wait: Wait<'_>) -> Result<()> {
        self.send_role_message(Role::Master, &ControlMessage::SetMode { mode }, wait)
    }

    pub fn send_do_estop(&self, wait: Wait<'_>) -> Result<()> {
        self.send_role_message(Role::Master, &ControlMessage::DoEstop, wait)
    }

    pub fn send_clear_estop(&self, indicator: u8, wait: Wait<'_>) -> Result<()> {
        self.send_role_message(Role::Master, &ControlMessage::ClearEstop { indicator }, wait)
    }

    pub fn send_do_reset(&self, wait: Wait<'_>) -> Result<()> {
        self.send_role_message(Role::Master, &ControlMessage::DoReset, wait)
    }

    pub fn send_do_dump_state(&self, wait: Wait<'_>) -> Result<()> {
        self.send_role_message(Role::Master, &ControlMessage::DoDumpState, wait)
    }

    /// Liveness message for this protocol's role.
    pub fn send_im_alive(&self, wait: Wait<'_>) -> Result<()> {
        let message = match self.role() {
            Role::Master => ControlMessage::MasterIsAlive,
            Role::Slave => ControlMessage::SlaveIsAlive,
        };
        self.send_role_message(self.role(), &message, wait)
    }

    pub fn send_did_estop(&self, wait: Wait<'_>) -> Result<()> {
        self.send_role_message(Role::Slave, &ControlMessage::DidEstop, wait)
    }

    /// Report the local robot state, stamped with the local clock.
    pub fn send_here_is_my_state(&self, wait: Wait<'_>) -> Result<()> {
        let context = self.handler().context();
        let snapshot = context.state()?.snapshot();
        let message = ControlMessage::HereIsMyState {
            time: context.clock().now_ms(),
            mode: snapshot.mode,
            estop: snapshot.estop,
        };
        self.send_role_message(Role::Slave, &message, wait)
    }
}

#[cfg(test)]
mod tests {
    use robolink_frame::LinkMessage;

    use super::*;
    use crate::channel::pair_channels;
    use crate::collection::LinkChannels;
    use crate::context::ESTOP_NONE;
    use crate::error::LinkError;
    use crate::notify::{DistributionList, NoticeReceiver};

    struct Side {
        input: Protocol<RobotControl>,
        output: Protocol<RobotControl>,
        context: Arc<SystemContext>,
        notices: NoticeReceiver,
    }

    impl Side {
        fn new(role: Role) -> Self {
            let list = Arc::new(DistributionList::new());
            let notices = list.subscribe();
            let context = Arc::new(SystemContext::new(list));
            context.init_state().unwrap();

            let input = Protocol::new(RobotControl::new(Arc::clone(&context)), role);
            let output = Protocol::new(RobotControl::new(Arc::clone(&context)), role);
            let registry = Arc::new(LinkChannels::new("bench"));
            let in_ch = input.input_channel(8).unwrap();
            let out_ch = output.output_channel(8).unwrap();
            pair_channels(&in_ch, &out_ch).unwrap();
            registry.inputs.attach(in_ch).unwrap();
            registry.outputs.attach(out_ch).unwrap();
            input.attach_registry(Arc::clone(&registry)).unwrap();
            output.attach_registry(registry).unwrap();
            Self {
                input,
                output,
                context,
                notices,
            }
        }

        fn notices(&mut self) -> Vec<Notice> {
            self.notices.drain().into_iter().map(|p| p.notice).collect()
        }

        fn sent(&self) -> Vec<ControlMessage> {
            let channel = self.output.channel().unwrap();
            std::iter::from_fn(|| channel.get_message(Wait::Immediate).ok())
                .map(|msg| ControlMessage::decode(msg.payload()).unwrap())
                .collect()
        }

        fn deliver(&self, message: ControlMessage) -> Result<()> {
            let wire = LinkMessage::new(ROBOT_CONTROL, message.encode().unwrap());
            self.input.receive_message(&wire)
        }
    }

    #[test]
    fn every_kind_survives_the_wire() {
        let kinds = [
            ControlMessage::SetMode { mode: 0 },
            ControlMessage::SetMode { mode: u8::MAX },
            ControlMessage::DoEstop,
            ControlMessage::ClearEstop { indicator: 0 },
            ControlMessage::ClearEstop { indicator: u8::MAX },
            ControlMessage::DoReset,
            ControlMessage::DoDumpState,
            ControlMessage::MasterIsAlive,
            ControlMessage::DidEstop,
            ControlMessage::HereIsMyState {
                time: 0,
                mode: 0,
                estop: 0,
            },
            ControlMessage::HereIsMyState {
                time: u32::MAX,
                mode: u8::MAX,
                estop: u8::MAX,
            },
            ControlMessage::SlaveIsAlive,
        ];
        for kind in kinds {
            let bytes = kind.encode().unwrap();
            assert_eq!(bytes.len(), kind.encoded_len(), "{kind:?}");
            assert_eq!(bytes[0], kind.indicator());
            assert_eq!(ControlMessage::decode(&bytes).unwrap(), kind);
        }
    }

    #[test]
    fn state_report_layout() {
        let bytes = ControlMessage::HereIsMyState {
            time: 0x0102_0304,
            mode: 5,
            estop: 1,
        }
        .encode()
        .unwrap();
        assert_eq!(bytes.as_ref(), &[7, 1, 2, 3, 4, 5, 1]);
    }

    #[test]
    fn master_records_state_reports() {
        let mut master = Side::new(Role::Master);
        master
            .deliver(ControlMessage::HereIsMyState {
                time: 99,
                mode: 3,
                estop: 0,
            })
            .unwrap();

        let state = master.context.state().unwrap();
        assert_eq!(state.update_count(), 1);
        assert_eq!(state.snapshot().mode, 3);
        assert!(matches!(
            master.notices().as_slice(),
            [Notice::RobotStateUpdated { state }] if state.time == 99
        ));
    }

    #[test]
    fn master_publishes_estop_and_liveness() {
        let mut master = Side::new(Role::Master);
        master.deliver(ControlMessage::DidEstop).unwrap();
        master.deliver(ControlMessage::SlaveIsAlive).unwrap();
        assert_eq!(
            master.notices(),
            vec![Notice::EstopOccurred, Notice::IsAlive { peer: Role::Slave }]
        );
    }

    #[test]
    fn master_rejects_master_kinds() {
        let mut master = Side::new(Role::Master);
        let err = master.deliver(ControlMessage::DoReset).unwrap_err();
        assert!(matches!(err, LinkError::RoleMismatch { .. }));
        assert!(master.notices().is_empty());
    }

    #[test]
    fn slave_estop_latches_and_acknowledges() {
        let mut slave = Side::new(Role::Slave);
        slave.deliver(ControlMessage::DoEstop).unwrap();

        assert_eq!(slave.context.state().unwrap().snapshot().estop, ESTOP_SOFTWARE);
        assert_eq!(slave.sent(), vec![ControlMessage::DidEstop]);
        assert_eq!(
            slave.notices(),
            vec![
                Notice::ControlCommand {
                    command: ControlMessage::DoEstop
                },
                Notice::EstopOccurred
            ]
        );

        slave.deliver(ControlMessage::ClearEstop { indicator: 1 }).unwrap();
        assert_eq!(slave.context.state().unwrap().snapshot().estop, ESTOP_NONE);
    }

    #[test]
    fn slave_dumps_its_state() {
        let slave = Side::new(Role::Slave);
        slave.deliver(ControlMessage::SetMode { mode: 4 }).unwrap();
        slave.deliver(ControlMessage::DoDumpState).unwrap();

        match slave.sent().as_slice() {
            [ControlMessage::HereIsMyState { mode, estop, .. }] => {
                assert_eq!(*mode, 4);
                assert_eq!(*estop, ESTOP_NONE);
            }
            other => panic!("unexpected replies: {other:?}"),
        }
    }

    #[test]
    fn slave_answers_liveness() {
        let mut slave = Side::new(Role::Slave);
        slave.deliver(ControlMessage::MasterIsAlive).unwrap();
        assert_eq!(slave.sent(), vec![ControlMessage::SlaveIsAlive]);
        assert!(slave
            .notices()
            .contains(&Notice::IsAlive { peer: Role::Master }));
    }

    #[test]
    fn slave_reset_clears_mode() {
        let slave = Side::new(Role::Slave);
        slave.deliver(ControlMessage::SetMode { mode: 9 }).unwrap();
        slave.deliver(ControlMessage::DoReset).unwrap();
        assert_eq!(slave.context.state().unwrap().snapshot().mode, 0);
    }

    #[test]
    fn typed_senders_respect_role() {
        let master = Side::new(Role::Master);
        master.output.send_set_mode(2, Wait::Immediate).unwrap();
        master.output.send_im_alive(Wait::Immediate).unwrap();
        assert!(matches!(
            master.output.send_did_estop(Wait::Immediate),
            Err(LinkError::RoleMismatch { .. })
        ));
        assert_eq!(
            master.sent(),
            vec![
                ControlMessage::SetMode { mode: 2 },
                ControlMessage::MasterIsAlive
            ]
        );
    }

    #[test]
    fn unknown_indicator() {
        assert_eq!(
            ControlMessage::decode(&[42, 0]).unwrap_err(),
            DecodeError::UnknownKind(42)
        );
    }

    #[test]
    fn trailing_bytes_are_not_ignored() {
        assert_eq!(
            ControlMessage::decode(&[MS_SET_MODE, 4, 9, 9, 9]).unwrap_err(),
            DecodeError::TrailingBytes {
                kind: "SetMode",
                extra: 3
            }
        );
        assert_eq!(
            ControlMessage::decode(&[MS_DO_ESTOP, 0, 0]).unwrap_err(),
            DecodeError::TrailingBytes {
                kind: "DoEstop",
                extra: 1
            }
        );
    }
}
