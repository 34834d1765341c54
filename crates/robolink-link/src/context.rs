//! Explicit system context shared by protocols and links.
//!
//! Holds the robot state, the local clock and the notifier. There is no
//! global instance; whoever builds the links builds one context and hands
//! an `Arc` of it to every protocol handler and link.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, error, warn};

use crate::error::ContextError;
use crate::notify::{Notice, NoticeSource, Notifier, Publication};

/// No emergency stop is latched.
pub const ESTOP_NONE: u8 = 0;
/// Emergency stop requested by the master.
pub const ESTOP_SOFTWARE: u8 = 1;
/// Emergency stop caused by losing the link.
pub const ESTOP_LINK_FAILURE: u8 = 2;

/// Milliseconds since the context was created.
#[derive(Debug, Clone, Copy)]
pub struct LocalClock {
    origin: Instant,
}

impl LocalClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    /// Current time in the 32-bit wire representation (wraps after ~49 days).
    pub fn now_ms(&self) -> u32 {
        self.origin.elapsed().as_millis() as u32
    }
}

impl Default for LocalClock {
    fn default() -> Self {
        Self::new()
    }
}

/// The fields a state report carries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RobotStateSnapshot {
    pub time: u32,
    pub mode: u8,
    pub estop: u8,
}

impl RobotStateSnapshot {
    pub fn is_estopped(&self) -> bool {
        self.estop != ESTOP_NONE
    }
}

/// Shared robot state.
#[derive(Debug, Default)]
pub struct RobotState {
    current: Mutex<RobotStateSnapshot>,
    updates: AtomicU64,
}

impl RobotState {
    fn lock(&self) -> MutexGuard<'_, RobotStateSnapshot> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the state with a received report.
    pub fn update_state(&self, time: u32, mode: u8, estop: u8) {
        *self.lock() = RobotStateSnapshot { time, mode, estop };
        self.updates.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_mode(&self, mode: u8) {
        self.lock().mode = mode;
    }

    pub fn set_estop(&self, source: u8) {
        self.lock().estop = source;
    }

    pub fn clear_estop(&self) {
        self.lock().estop = ESTOP_NONE;
    }

    /// Back to power-on state. The update counter is kept.
    pub fn reset(&self) {
        *self.lock() = RobotStateSnapshot::default();
    }

    pub fn snapshot(&self) -> RobotStateSnapshot {
        *self.lock()
    }

    /// Number of `update_state` calls so far.
    pub fn update_count(&self) -> u64 {
        self.updates.load(Ordering::Relaxed)
    }
}

/// Robot state, clock and notifier for one process.
pub struct SystemContext {
    state: OnceLock<RobotState>,
    clock: LocalClock,
    notifier: Arc<dyn Notifier>,
}

impl SystemContext {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self {
            state: OnceLock::new(),
            clock: LocalClock::new(),
            notifier,
        }
    }

    /// Create the robot state. A second call fails.
    pub fn init_state(&self) -> Result<&RobotState, ContextError> {
        let mut created = false;
        let state = self.state.get_or_init(|| {
            created = true;
            RobotState::default()
        });
        if created {
            Ok(state)
        } else {
            Err(ContextError::AlreadyInitialized)
        }
    }

    pub fn state(&self) -> Result<&RobotState, ContextError> {
        self.state.get().ok_or(ContextError::NotInitialized)
    }

    pub fn clock(&self) -> &LocalClock {
        &self.clock
    }

    pub fn publish(&self, notice: Notice, source: NoticeSource) {
        debug!(notice = notice.name(), source = %source, "publish");
        self.notifier.publish(Publication { notice, source });
    }

    /// Escalate the loss of a link's transport.
    ///
    /// Publishes `LinkFailure` followed by `EstopOccurred`, and latches the
    /// link-failure estop if the robot state exists.
    pub fn acknowledge_link_failure(&self, link: &str, reason: &dyn fmt::Display) {
        error!(link, error = %reason, "link failure");
        let source = NoticeSource::Link(link.to_string());
        self.publish(
            Notice::LinkFailure {
                link: link.to_string(),
                reason: reason.to_string(),
            },
            source.clone(),
        );
        match self.state() {
            Ok(state) => state.set_estop(ESTOP_LINK_FAILURE),
            Err(_) => warn!(link, "no robot state to estop"),
        }
        self.publish(Notice::EstopOccurred, source);
    }
}

impl fmt::Debug for SystemContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SystemContext")
            .field("state", &self.state.get().map(RobotState::snapshot))
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}
