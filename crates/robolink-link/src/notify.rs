//! Notices published by protocols and links.

use std::fmt;

use serde::Serialize;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tracing::{trace, warn};

use crate::context::RobotStateSnapshot;
use crate::protocol::{ProtocolKey, Role};
use crate::protocols::control::ControlMessage;
use crate::protocols::driver::DriverMessage;

/// A high-level event worth telling the rest of the system about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "notice", rename_all = "snake_case")]
pub enum Notice {
    /// The robot is (or must be) emergency-stopped.
    EstopOccurred,
    /// The peer with `peer` role reported it is alive.
    IsAlive { peer: Role },
    /// The shared robot state was replaced by a received report.
    RobotStateUpdated { state: RobotStateSnapshot },
    /// A control command arrived at the robot.
    ControlCommand { command: ControlMessage },
    /// A driver command arrived at the robot.
    DriveCommand { command: DriverMessage },
    /// A link lost its transport.
    LinkFailure { link: String, reason: String },
}

impl Notice {
    /// Short name for logs and tables.
    pub fn name(&self) -> &'static str {
        match self {
            Self::EstopOccurred => "estop_occurred",
            Self::IsAlive { .. } => "is_alive",
            Self::RobotStateUpdated { .. } => "robot_state_updated",
            Self::ControlCommand { .. } => "control_command",
            Self::DriveCommand { .. } => "drive_command",
            Self::LinkFailure { .. } => "link_failure",
        }
    }
}

/// Who published a notice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoticeSource {
    Protocol(ProtocolKey),
    Link(String),
}

impl fmt::Display for NoticeSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Protocol(key) => write!(f, "{key}"),
            Self::Link(name) => write!(f, "link {name}"),
        }
    }
}

/// A notice plus its source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Publication {
    pub notice: Notice,
    pub source: NoticeSource,
}

/// Sink for published notices.
pub trait Notifier: Send + Sync {
    fn publish(&self, publication: Publication);
}

/// Publications buffered per subscriber before the oldest are dropped.
pub const DEFAULT_NOTICE_CAPACITY: usize = 256;

/// Fans every publication out to all live subscribers.
///
/// Publishing never blocks. A subscriber that falls more than the capacity
/// behind loses the oldest publications and is told how many it missed.
#[derive(Debug, Clone)]
pub struct DistributionList {
    sender: broadcast::Sender<Publication>,
}

impl DistributionList {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_NOTICE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Register a new subscriber. It sees publications made from now on.
    pub fn subscribe(&self) -> NoticeReceiver {
        NoticeReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for DistributionList {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifier for DistributionList {
    fn publish(&self, publication: Publication) {
        match self.sender.send(publication) {
            Ok(receivers) => trace!(receivers, "notice published"),
            Err(broadcast::error::SendError(publication)) => {
                trace!(notice = publication.notice.name(), "notice dropped, no subscribers");
            }
        }
    }
}

/// One subscriber's view of a [`DistributionList`].
#[derive(Debug)]
pub struct NoticeReceiver {
    receiver: broadcast::Receiver<Publication>,
}

impl NoticeReceiver {
    /// Next publication already made, without waiting.
    pub fn try_next(&mut self) -> Option<Publication> {
        loop {
            match self.receiver.try_recv() {
                Ok(publication) => return Some(publication),
                Err(TryRecvError::Lagged(missed)) => {
                    warn!(missed, "notice subscriber lagged");
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => return None,
            }
        }
    }

    /// Wait for the next publication. `None` once the list is gone.
    pub async fn next(&mut self) -> Option<Publication> {
        loop {
            match self.receiver.recv().await {
                Ok(publication) => return Some(publication),
                Err(RecvError::Lagged(missed)) => {
                    warn!(missed, "notice subscriber lagged");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Every publication already made, in order.
    pub fn drain(&mut self) -> Vec<Publication> {
        std::iter::from_fn(|| self.try_next()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn publication(notice: Notice) -> Publication {
        Publication {
            notice,
            source: NoticeSource::Link("bench".into()),
        }
    }

    #[test]
    fn every_subscriber_gets_every_notice() {
        let list = DistributionList::new();
        let a = list.subscribe();
        let b = list.subscribe();

        list.publish(publication(Notice::EstopOccurred));
        list.publish(publication(Notice::IsAlive { peer: Role::Slave }));

        for mut rx in [a, b] {
            let got: Vec<_> = rx.drain().into_iter().map(|p| p.notice).collect();
            assert_eq!(
                got,
                vec![Notice::EstopOccurred, Notice::IsAlive { peer: Role::Slave }]
            );
        }
    }

    #[test]
    fn dropped_subscribers_stop_counting() {
        let list = DistributionList::new();
        let mut keep = list.subscribe();
        drop(list.subscribe());
        assert_eq!(list.subscriber_count(), 1);

        list.publish(publication(Notice::EstopOccurred));
        assert_eq!(keep.try_next().unwrap().notice, Notice::EstopOccurred);
    }

    #[test]
    fn publishing_without_subscribers_is_fine() {
        let list = DistributionList::new();
        list.publish(publication(Notice::EstopOccurred));
        let mut late = list.subscribe();
        assert!(late.try_next().is_none());
    }

    #[test]
    fn a_slow_subscriber_loses_the_oldest_and_keeps_going() {
        let list = DistributionList::with_capacity(2);
        let mut slow = list.subscribe();
        for peer in [Role::Master, Role::Slave, Role::Master] {
            list.publish(publication(Notice::IsAlive { peer }));
        }
        let got: Vec<_> = slow.drain().into_iter().map(|p| p.notice).collect();
        assert_eq!(
            got,
            vec![
                Notice::IsAlive { peer: Role::Slave },
                Notice::IsAlive { peer: Role::Master }
            ]
        );
    }

    #[test]
    fn waiting_subscriber_wakes_on_publish() {
        let list = DistributionList::new();
        let mut rx = list.subscribe();
        let publisher = {
            let list = list.clone();
            std::thread::spawn(move || {
                std::thread::sleep(std::time::Duration::from_millis(20));
                list.publish(publication(Notice::EstopOccurred));
            })
        };
        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        let got = runtime.block_on(rx.next()).unwrap();
        assert_eq!(got.notice, Notice::EstopOccurred);
        publisher.join().unwrap();
    }

    #[test]
    fn closed_list_ends_the_wait() {
        let list = DistributionList::new();
        let mut rx = list.subscribe();
        drop(list);
        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        assert!(runtime.block_on(rx.next()).is_none());
    }

    #[test]
    fn notices_serialize_with_a_tag() {
        let json = serde_json::to_string(&Notice::IsAlive { peer: Role::Master }).unwrap();
        assert_eq!(json, r#"{"notice":"is_alive","peer":"master"}"#);
        assert_eq!(NoticeSource::Link("bench".into()).to_string(), "link bench");
    }
}
