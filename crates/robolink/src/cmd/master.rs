use std::sync::Arc;
use std::time::Duration;

use robolink_frame::FrameConfig;
use robolink_link::{
    DistributionList, Link, LinkConfig, Notice, NoticeReceiver, ProtocolPair, Publication,
    RobotControl, RobotDriver, Role, SystemContext, Wait,
};
use robolink_transport::UnixDomainSocket;
use tokio::runtime::Builder;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::cmd::{MasterArgs, MasterCommand};
use crate::exit::{
    io_error, link_error, transport_error, CliError, CliResult, SUCCESS, TIMEOUT,
    TRANSPORT_ERROR, USAGE,
};
use crate::output::{print_notice, OutputFormat};

pub fn run(args: MasterArgs, format: OutputFormat) -> CliResult<i32> {
    let wait_timeout = parse_duration(&args.wait_timeout)?;
    let expected = expected_reply(args.command);
    if args.wait && expected.is_none() {
        return Err(CliError::new(
            USAGE,
            "--wait needs a command the robot replies to (estop, dump-state, alive)",
        ));
    }

    let notices = Arc::new(DistributionList::new());
    let mut rx = notices.subscribe();
    let context = Arc::new(SystemContext::new(notices));
    context
        .init_state()
        .map_err(|err| link_error("context setup failed", err.into()))?;

    let frame = FrameConfig::default();
    let (read_timeout, write_timeout) = (frame.read_timeout, frame.write_timeout);
    let config = LinkConfig::default()
        .with_name("master")
        .with_frame_config(frame);
    let mut link = Link::new(Role::Master, config, Arc::clone(&context));
    let control = link
        .add_protocol_pair(RobotControl::new(Arc::clone(&context)))
        .map_err(|err| link_error("link setup failed", err))?;
    let driver = link
        .add_protocol_pair_on(RobotDriver::new(Arc::clone(&context)), args.driver_channel)
        .map_err(|err| link_error("link setup failed", err))?;

    let port = UnixDomainSocket::connect(&args.path)
        .and_then(|stream| stream.into_port(read_timeout, write_timeout))
        .map_err(|err| transport_error("connect failed", err))?;
    let handle = link
        .start(port)
        .map_err(|err| link_error("link start failed", err))?;
    let token = handle.cancellation_token();

    let sent = send_command(args.command, &control, &driver, &token)
        .map_err(|err| link_error("send failed", err));
    info!(command = ?args.command, ok = sent.is_ok(), "command queued");

    let reply = match (&sent, expected) {
        (Ok(()), Some(matches)) if args.wait => Some(wait_for_reply(&mut rx, matches, wait_timeout)),
        _ => None,
    };

    handle.shutdown();
    let joined = handle.join();
    sent?;
    if let Some(reply) = reply {
        let publication = reply?;
        print_notice(&publication, format);
    }
    joined.map_err(|err| link_error("link failed", err))?;
    debug!("master done");

    Ok(SUCCESS)
}

fn send_command(
    command: MasterCommand,
    control: &ProtocolPair<RobotControl>,
    driver: &ProtocolPair<RobotDriver>,
    token: &CancellationToken,
) -> robolink_link::Result<()> {
    let wait = Wait::Blocking(token);
    let control = &control.output;
    let driver = &driver.output;
    match command {
        MasterCommand::SetMode { mode } => control.send_set_mode(mode, wait),
        MasterCommand::Estop => control.send_do_estop(wait),
        MasterCommand::ClearEstop { indicator } => control.send_clear_estop(indicator, wait),
        MasterCommand::Reset => control.send_do_reset(wait),
        MasterCommand::DumpState => control.send_do_dump_state(wait),
        MasterCommand::Alive => control.send_im_alive(wait),
        MasterCommand::Drive {
            speed,
            acceleration,
        } => driver.send_drive(speed, acceleration, wait),
        MasterCommand::Stop { acceleration } => driver.send_stop(acceleration, wait),
        MasterCommand::Move {
            distance,
            speed,
            acceleration,
        } => driver.send_move(distance, speed, acceleration, wait),
        MasterCommand::Steer { angle, rate } => driver.send_steer(angle, rate, wait),
        MasterCommand::Bump { state } => driver.send_set_bump_mode(state.is_on(), wait),
        MasterCommand::Ranging { state } => driver.send_set_ranging_mode(state.is_on(), wait),
    }
}

type ReplyMatcher = fn(&Notice) -> bool;

/// The notice the master publishes when the robot answers `command`.
fn expected_reply(command: MasterCommand) -> Option<ReplyMatcher> {
    let matcher: ReplyMatcher = match command {
        MasterCommand::Estop => |notice| matches!(notice, Notice::EstopOccurred),
        MasterCommand::DumpState => |notice| matches!(notice, Notice::RobotStateUpdated { .. }),
        MasterCommand::Alive => |notice| matches!(notice, Notice::IsAlive { .. }),
        _ => return None,
    };
    Some(matcher)
}

fn wait_for_reply(
    rx: &mut NoticeReceiver,
    matches: ReplyMatcher,
    timeout: Duration,
) -> CliResult<Publication> {
    let runtime = Builder::new_current_thread()
        .enable_time()
        .build()
        .map_err(|err| io_error("runtime setup failed", err))?;
    runtime
        .block_on(tokio::time::timeout(timeout, next_reply(rx, matches)))
        .unwrap_or_else(|_| {
            Err(CliError::new(
                TIMEOUT,
                format!("no reply within {}ms", timeout.as_millis()),
            ))
        })
}

async fn next_reply(rx: &mut NoticeReceiver, matches: ReplyMatcher) -> CliResult<Publication> {
    while let Some(publication) = rx.next().await {
        if let Notice::LinkFailure { reason, .. } = &publication.notice {
            return Err(CliError::new(
                TRANSPORT_ERROR,
                format!("link failed: {reason}"),
            ));
        }
        if matches(&publication.notice) {
            return Ok(publication);
        }
        debug!(notice = publication.notice.name(), "ignoring notice");
    }
    Err(CliError::new(TRANSPORT_ERROR, "notice stream closed"))
}

pub(crate) fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    if millis {
        Ok(Duration::from_millis(value))
    } else {
        Ok(Duration::from_secs(value))
    }
}
