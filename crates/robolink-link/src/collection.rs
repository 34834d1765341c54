//! Channel collections.
//!
//! Each side of a link (inputs, outputs) keeps its channels in a
//! [`ChannelCollection`]. A collection owns the [`ArrivalSignal`] its
//! channels raise when a message is queued, which lets one thread service
//! every channel of a side without polling each queue.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use robolink_frame::ChannelNumber;
use tokio::sync::Notify;
use tracing::debug;

use crate::channel::{Channel, ChannelKey, Direction};
use crate::error::{LinkError, Result};

/// Channels with newly queued messages, plus a wake-up for the one task
/// that services them.
#[derive(Debug, Default)]
pub struct ArrivalSignal {
    pending: Mutex<BTreeSet<ChannelNumber>>,
    ready: Notify,
}

impl ArrivalSignal {
    /// Record that `channel` has a new message.
    pub fn notify(&self, channel: ChannelKey) {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(channel.number);
        self.ready.notify_one();
    }

    /// Take every channel signalled so far, without waiting.
    pub fn take_now(&self) -> BTreeSet<ChannelNumber> {
        std::mem::take(&mut *self.pending.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Wait until at least one channel is signalled, then take them all.
    ///
    /// A notification raised while nobody waits is kept, so an arrival
    /// between `take_now` and the wait is not lost.
    pub async fn arrived(&self) -> BTreeSet<ChannelNumber> {
        loop {
            let pending = self.take_now();
            if !pending.is_empty() {
                return pending;
            }
            self.ready.notified().await;
        }
    }
}

/// One side's channels of a link.
#[derive(Debug)]
pub struct ChannelCollection {
    link_name: String,
    direction: Direction,
    channels: RwLock<BTreeMap<ChannelNumber, Arc<Channel>>>,
    signal: Arc<ArrivalSignal>,
}

impl ChannelCollection {
    pub fn new(link_name: impl Into<String>, direction: Direction) -> Self {
        Self {
            link_name: link_name.into(),
            direction,
            channels: RwLock::new(BTreeMap::new()),
            signal: Arc::new(ArrivalSignal::default()),
        }
    }

    /// Name of the link this collection belongs to.
    pub fn link_name(&self) -> &str {
        &self.link_name
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn signal(&self) -> &Arc<ArrivalSignal> {
        &self.signal
    }

    /// Add a channel and route its arrival notices to this collection.
    pub fn attach(&self, channel: Arc<Channel>) -> Result<()> {
        if channel.direction() != self.direction {
            return Err(LinkError::DirectionMismatch(channel.direction()));
        }
        let mut channels = self
            .channels
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if channels.contains_key(&channel.number()) {
            return Err(LinkError::DuplicateChannel(channel.key()));
        }
        if !channel.attach(Arc::clone(&self.signal)) {
            return Err(LinkError::DuplicateChannel(channel.key()));
        }
        debug!(link = %self.link_name, channel = %channel.key(), "channel attached");
        channels.insert(channel.number(), channel);
        Ok(())
    }

    pub fn get(&self, number: ChannelNumber) -> Option<Arc<Channel>> {
        self.channels
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&number)
            .cloned()
    }

    pub fn contains(&self, number: ChannelNumber) -> bool {
        self.channels
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&number)
    }

    /// Snapshot of the attached channels, in channel-number order.
    pub fn channels(&self) -> Vec<Arc<Channel>> {
        self.channels
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.channels
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Both collections of a link. Protocols resolve channel keys through it.
#[derive(Debug)]
pub struct LinkChannels {
    pub inputs: ChannelCollection,
    pub outputs: ChannelCollection,
}

impl LinkChannels {
    pub fn new(link_name: &str) -> Self {
        Self {
            inputs: ChannelCollection::new(link_name, Direction::Input),
            outputs: ChannelCollection::new(link_name, Direction::Output),
        }
    }

    pub fn link_name(&self) -> &str {
        self.inputs.link_name()
    }

    pub fn side(&self, direction: Direction) -> &ChannelCollection {
        match direction {
            Direction::Input => &self.inputs,
            Direction::Output => &self.outputs,
        }
    }

    /// Look up a channel by key.
    pub fn resolve(&self, key: ChannelKey) -> Option<Arc<Channel>> {
        self.side(key.direction).get(key.number)
    }
}
