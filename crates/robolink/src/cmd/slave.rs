use std::sync::Arc;

use robolink_frame::FrameConfig;
use robolink_link::{
    DistributionList, Link, LinkConfig, LinkError, NoticeReceiver, RobotControl, RobotDriver,
    Role, SystemContext,
};
use robolink_transport::{TransportError, UnixDomainSocket};
use tokio::runtime::Builder;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::cmd::SlaveArgs;
use crate::exit::{
    io_error, link_error, transport_error, CliError, CliResult, INTERNAL, SUCCESS, USAGE,
};
use crate::output::{print_notice, print_stats, OutputFormat};

pub fn run(args: SlaveArgs, format: OutputFormat) -> CliResult<i32> {
    if args.queue_capacity == 0 {
        return Err(CliError::new(USAGE, "--queue-capacity must be at least 1"));
    }

    let listener =
        UnixDomainSocket::bind(&args.path).map_err(|err| transport_error("bind failed", err))?;
    info!(path = %listener.path().display(), "waiting for master");
    let stream = listener
        .accept()
        .map_err(|err| transport_error("accept failed", err))?;

    let notices = Arc::new(DistributionList::new());
    let mut rx = notices.subscribe();
    let context = Arc::new(SystemContext::new(notices));
    context
        .init_state()
        .map_err(|err| link_error("context setup failed", err.into()))?;

    let frame = FrameConfig::default();
    let port = stream
        .into_port(frame.read_timeout, frame.write_timeout)
        .map_err(|err| transport_error("socket setup failed", err))?;
    let config = LinkConfig::default()
        .with_name("slave")
        .with_queue_capacity(args.queue_capacity)
        .with_frame_config(frame);
    let mut link = Link::new(Role::Slave, config, Arc::clone(&context));
    link.add_protocol_pair(RobotControl::new(Arc::clone(&context)))
        .map_err(|err| link_error("link setup failed", err))?;
    link.add_protocol_pair_on(RobotDriver::new(Arc::clone(&context)), args.driver_channel)
        .map_err(|err| link_error("link setup failed", err))?;

    let handle = link
        .start(port)
        .map_err(|err| link_error("link start failed", err))?;
    let token = handle.cancellation_token();
    install_ctrlc_handler(token.clone())?;

    let printed = print_until_finished(&mut rx, args.count, format, &token)?;
    info!(printed, "notice stream done");

    handle.shutdown();
    let name = handle.name().to_string();
    let stats = Arc::clone(handle.stats());
    let joined = handle.join();
    print_stats(&name, &stats.snapshot(), format);

    match joined {
        Ok(()) => Ok(SUCCESS),
        Err(LinkError::Transport(TransportError::Closed)) => {
            info!("master hung up");
            Ok(SUCCESS)
        }
        Err(err) => Err(link_error("link failed", err)),
    }
}

/// Print notices until `count` is reached or the link is cancelled.
fn print_until_finished(
    rx: &mut NoticeReceiver,
    count: Option<usize>,
    format: OutputFormat,
    token: &CancellationToken,
) -> CliResult<usize> {
    let runtime = Builder::new_current_thread()
        .build()
        .map_err(|err| io_error("runtime setup failed", err))?;
    let limit_reached = |printed: usize| count.is_some_and(|count| printed >= count);
    let mut printed = 0usize;

    while !limit_reached(printed) {
        let next = runtime.block_on(async {
            tokio::select! {
                biased;
                publication = rx.next() => publication,
                _ = token.cancelled() => None,
            }
        });
        let Some(publication) = next else {
            break;
        };
        print_notice(&publication, format);
        printed = printed.saturating_add(1);
    }

    // The link may have published its failure just before exiting.
    while !limit_reached(printed) {
        let Some(publication) = rx.try_next() else {
            break;
        };
        print_notice(&publication, format);
        printed = printed.saturating_add(1);
    }
    Ok(printed)
}

fn install_ctrlc_handler(token: CancellationToken) -> CliResult<()> {
    ctrlc::set_handler(move || {
        token.cancel();
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}

#[cfg(test)]
mod tests {
    use robolink_link::{Notice, NoticeSource, Notifier, Publication};

    use super::*;

    fn announce(list: &DistributionList, notice: Notice) {
        list.publish(Publication {
            notice,
            source: NoticeSource::Link("slave".into()),
        });
    }

    #[test]
    fn stops_at_count() {
        let list = DistributionList::new();
        let mut rx = list.subscribe();
        for _ in 0..3 {
            announce(&list, Notice::EstopOccurred);
        }
        let token = CancellationToken::new();
        let printed = print_until_finished(&mut rx, Some(2), OutputFormat::Pretty, &token).unwrap();
        assert_eq!(printed, 2);
        assert!(rx.try_next().is_some());
    }

    #[test]
    fn drains_after_link_exit() {
        let list = DistributionList::new();
        let mut rx = list.subscribe();
        announce(
            &list,
            Notice::LinkFailure {
                link: "slave".into(),
                reason: "transport closed by peer".into(),
            },
        );
        announce(&list, Notice::EstopOccurred);
        let token = CancellationToken::new();
        token.cancel();
        let printed = print_until_finished(&mut rx, None, OutputFormat::Pretty, &token).unwrap();
        assert_eq!(printed, 2);
    }

    #[test]
    fn cancellation_ends_an_idle_stream() {
        let list = DistributionList::new();
        let mut rx = list.subscribe();
        let token = CancellationToken::new();
        let canceller = {
            let token = token.clone();
            std::thread::spawn(move || {
                std::thread::sleep(std::time::Duration::from_millis(20));
                token.cancel();
            })
        };
        let printed = print_until_finished(&mut rx, None, OutputFormat::Pretty, &token).unwrap();
        assert_eq!(printed, 0);
        canceller.join().unwrap();
    }
}
