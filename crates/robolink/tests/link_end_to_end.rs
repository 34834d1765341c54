#![cfg(unix)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use robolink::link::{
    DistributionList, DriverMessage, Link, LinkConfig, LinkError, LinkHandle, Notice,
    NoticeReceiver, ProtocolPair, Publication, RobotControl, RobotDriver, Role, SystemContext,
    Wait, ESTOP_LINK_FAILURE, ESTOP_NONE, ESTOP_SOFTWARE,
};
use robolink::transport::{LinkStream, TransportError};

const WAIT: Duration = Duration::from_secs(3);

struct Side {
    context: Arc<SystemContext>,
    notices: NoticeReceiver,
    control: ProtocolPair<RobotControl>,
    driver: ProtocolPair<RobotDriver>,
    handle: LinkHandle,
}

fn side(role: Role, stream: LinkStream, driver_channel: u8) -> Side {
    let list = Arc::new(DistributionList::new());
    let notices = list.subscribe();
    let context = Arc::new(SystemContext::new(list));
    context.init_state().unwrap();

    let config = LinkConfig::default().with_name(role.to_string());
    let mut link = Link::new(role, config, Arc::clone(&context));
    let control = link
        .add_protocol_pair(RobotControl::new(Arc::clone(&context)))
        .unwrap();
    let driver = link
        .add_protocol_pair_on(RobotDriver::new(Arc::clone(&context)), driver_channel)
        .unwrap();
    let port = stream
        .into_port(Some(Duration::from_millis(5)), None)
        .unwrap();
    let handle = link.start(port).unwrap();

    Side {
        context,
        notices,
        control,
        driver,
        handle,
    }
}

fn connected(driver_channel: u8) -> (Side, Side) {
    let (master_end, slave_end) = LinkStream::pair().unwrap();
    (
        side(Role::Master, master_end, driver_channel),
        side(Role::Slave, slave_end, driver_channel),
    )
}

fn wait_for(notices: &mut NoticeReceiver, want: impl Fn(&Notice) -> bool) -> Publication {
    let deadline = Instant::now() + WAIT;
    loop {
        match notices.try_next() {
            Some(publication) if want(&publication.notice) => return publication,
            Some(_) => {}
            None => {
                assert!(Instant::now() < deadline, "expected notice was not published");
                std::thread::sleep(Duration::from_millis(5));
            }
        }
    }
}

fn eventually(check: impl Fn() -> bool) {
    let deadline = Instant::now() + WAIT;
    while !check() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        std::thread::sleep(Duration::from_millis(5));
    }
}

fn stop(side: Side) {
    side.handle.shutdown();
    let _ = side.handle.join();
}

#[test]
fn drive_command_reaches_robot_on_custom_channel() {
    let (master, mut slave) = connected(10);
    let token = master.handle.cancellation_token();

    master
        .driver
        .output
        .send_drive(5, 3, Wait::Blocking(&token))
        .unwrap();

    let publication = wait_for(&mut slave.notices, |n| matches!(n, Notice::DriveCommand { .. }));
    assert_eq!(
        publication.notice,
        Notice::DriveCommand {
            command: DriverMessage::Drive {
                speed: 5,
                acceleration: 3
            }
        }
    );
    assert_eq!(slave.handle.stats().snapshot().rejected, 0);

    stop(master);
    stop(slave);
}

#[test]
fn dump_state_updates_master_state() {
    let (mut master, slave) = connected(2);
    slave.context.state().unwrap().set_mode(4);
    let token = master.handle.cancellation_token();

    master
        .control
        .output
        .send_do_dump_state(Wait::Blocking(&token))
        .unwrap();

    let publication = wait_for(&mut master.notices, |n| {
        matches!(n, Notice::RobotStateUpdated { .. })
    });
    let Notice::RobotStateUpdated { state } = publication.notice else {
        unreachable!()
    };
    assert_eq!(state.mode, 4);
    assert_eq!(state.estop, ESTOP_NONE);

    let master_state = master.context.state().unwrap();
    assert_eq!(master_state.update_count(), 1);
    assert_eq!(master_state.snapshot(), state);

    stop(master);
    stop(slave);
}

#[test]
fn estop_round_trip_and_clear() {
    let (mut master, slave) = connected(2);
    let token = master.handle.cancellation_token();

    master
        .control
        .output
        .send_do_estop(Wait::Blocking(&token))
        .unwrap();
    wait_for(&mut master.notices, |n| matches!(n, Notice::EstopOccurred));
    assert_eq!(
        slave.context.state().unwrap().snapshot().estop,
        ESTOP_SOFTWARE
    );

    master
        .control
        .output
        .send_clear_estop(0, Wait::Blocking(&token))
        .unwrap();
    let slave_state = slave.context.state().unwrap();
    eventually(|| !slave_state.snapshot().is_estopped());

    stop(master);
    stop(slave);
}

#[test]
fn liveness_is_answered() {
    let (mut master, mut slave) = connected(2);
    let token = master.handle.cancellation_token();

    master
        .control
        .output
        .send_im_alive(Wait::Blocking(&token))
        .unwrap();

    wait_for(&mut slave.notices, |n| {
        *n == Notice::IsAlive { peer: Role::Master }
    });
    wait_for(&mut master.notices, |n| {
        *n == Notice::IsAlive { peer: Role::Slave }
    });

    stop(master);
    stop(slave);
}

#[test]
fn robot_cannot_send_master_commands() {
    let (master, slave) = connected(2);
    let token = slave.handle.cancellation_token();

    let err = slave
        .driver
        .output
        .send_stop(1, Wait::Blocking(&token))
        .unwrap_err();
    assert!(matches!(
        err,
        LinkError::RoleMismatch {
            expected: Role::Master,
            actual: Role::Slave,
            ..
        }
    ));

    stop(master);
    stop(slave);
}

#[test]
fn master_hang_up_estops_the_robot() {
    let (master, mut slave) = connected(2);

    master.handle.shutdown();
    master.handle.join().unwrap();

    let failure = wait_for(&mut slave.notices, |n| matches!(n, Notice::LinkFailure { .. }));
    assert_eq!(
        failure.notice,
        Notice::LinkFailure {
            link: "slave".into(),
            reason: "transport error: transport closed by peer".into(),
        }
    );
    wait_for(&mut slave.notices, |n| matches!(n, Notice::EstopOccurred));
    assert_eq!(
        slave.context.state().unwrap().snapshot().estop,
        ESTOP_LINK_FAILURE
    );

    let result = slave.handle.join();
    assert!(matches!(
        result,
        Err(LinkError::Transport(TransportError::Closed))
    ));
}
