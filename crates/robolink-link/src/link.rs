//! The link: protocols, their paired channels and the byte stream between.
//!
//! A [`Link`] is built for one role. Protocol pairs are added while it is
//! being set up; each pair gets an input and an output channel with the
//! same number, paired together. Once running, the link moves bytes:
//!
//! - inbound: transport bytes → frames → input channel of the frame's number
//! - outbound: output channels (FIFO per channel) → frames → transport
//! - dispatch: input channels → the input protocol of that number
//!
//! [`Link::start`] runs inbound/outbound pumping on an I/O thread and
//! dispatch on a second thread. The single-step methods drive the same
//! machinery from the caller's own loop.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use bytes::BytesMut;
use robolink_frame::{
    encode_link_message, ChannelNumber, Frame, FrameAssembler, FrameConfig, LinkMessage,
};
use robolink_transport::LinkPort;
use serde::Serialize;
use tokio::runtime::Builder;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::channel::{pair_channels, Channel, ChannelKey, Direction};
use crate::collection::LinkChannels;
use crate::context::SystemContext;
use crate::error::{LinkError, Result};
use crate::protocol::{Endpoint, Protocol, ProtocolHandler, Role};
use crate::queue::{Wait, DEFAULT_QUEUE_CAPACITY};

/// Link configuration.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Name used in logs and notices.
    pub name: String,
    /// Capacity of every channel queue.
    pub queue_capacity: usize,
    /// Framing limits and transport timeouts.
    pub frame: FrameConfig,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            name: "link".to_string(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            frame: FrameConfig::default(),
        }
    }
}

impl LinkConfig {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn with_frame_config(mut self, frame: FrameConfig) -> Self {
        self.frame = frame;
        self
    }
}

/// Running counters of a link.
#[derive(Debug, Default)]
pub struct LinkStats {
    frames_in: AtomicU64,
    frames_out: AtomicU64,
    unroutable: AtomicU64,
    malformed: AtomicU64,
    rejected: AtomicU64,
}

/// Point-in-time copy of [`LinkStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LinkStatsSnapshot {
    pub frames_in: u64,
    pub frames_out: u64,
    pub unroutable: u64,
    pub malformed: u64,
    pub rejected: u64,
}

impl LinkStats {
    pub fn snapshot(&self) -> LinkStatsSnapshot {
        LinkStatsSnapshot {
            frames_in: self.frames_in.load(Ordering::Relaxed),
            frames_out: self.frames_out.load(Ordering::Relaxed),
            unroutable: self.unroutable.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
        }
    }

    fn bump(counter: &AtomicU64, by: u64) {
        counter.fetch_add(by, Ordering::Relaxed);
    }
}

/// The two protocols created for one channel number.
#[derive(Debug)]
pub struct ProtocolPair<H: ProtocolHandler> {
    /// Receives from the far side; replies go out through the paired output.
    pub input: Arc<Protocol<H>>,
    /// Sends to the far side.
    pub output: Arc<Protocol<H>>,
}

/// State shared by the link's threads.
struct Shared {
    name: String,
    role: Role,
    channels: Arc<LinkChannels>,
    endpoints: BTreeMap<ChannelNumber, Arc<dyn Endpoint>>,
    stats: Arc<LinkStats>,
    context: Arc<SystemContext>,
    cancel: CancellationToken,
}

impl Shared {
    fn pump_inbound<P: LinkPort + ?Sized>(
        &self,
        assembler: &mut FrameAssembler,
        port: &mut P,
    ) -> Result<usize> {
        let bytes = port.read_available()?;
        if !bytes.is_empty() {
            trace!(link = %self.name, bytes = bytes.len(), "inbound bytes");
            assembler.push(&bytes);
        }

        let mut routed = 0;
        loop {
            match assembler.next_frame() {
                Ok(Some(frame)) => {
                    if self.route(frame)? {
                        routed += 1;
                    }
                }
                Ok(None) => break,
                Err(err) => {
                    LinkStats::bump(&self.stats.malformed, 1);
                    warn!(link = %self.name, error = %err, "dropping malformed frame");
                }
            }
        }
        Ok(routed)
    }

    /// Queue a frame on its input channel. Returns false if it was skipped.
    fn route(&self, frame: Frame) -> Result<bool> {
        let channel = ChannelNumber::new(frame.channel)
            .ok()
            .and_then(|number| self.channels.inputs.get(number));
        let Some(channel) = channel else {
            LinkStats::bump(&self.stats.unroutable, 1);
            warn!(
                link = %self.name,
                error = %LinkError::UnroutableChannel(frame.channel),
                bytes = frame.payload.len(),
                "skipping frame"
            );
            return Ok(false);
        };
        debug!(link = %self.name, channel = %channel.key(), bytes = frame.payload.len(), "routing frame");
        channel.add_message(
            LinkMessage::new(channel.number(), frame.payload),
            Wait::Blocking(&self.cancel),
        )?;
        LinkStats::bump(&self.stats.frames_in, 1);
        Ok(true)
    }

    fn pump_outbound<P: LinkPort + ?Sized>(&self, port: &mut P) -> Result<usize> {
        let mut wire = BytesMut::new();
        let mut frames = 0;
        for number in self.channels.outputs.signal().take_now() {
            let Some(channel) = self.channels.outputs.get(number) else {
                continue;
            };
            while let Some(message) = take(&channel)? {
                match encode_link_message(&message, &mut wire) {
                    Ok(()) => frames += 1,
                    Err(err) => {
                        LinkStats::bump(&self.stats.rejected, 1);
                        warn!(link = %self.name, channel = %channel.key(), error = %err, "dropping unencodable message");
                    }
                }
            }
        }
        if !wire.is_empty() {
            port.write_bytes(&wire)?;
            trace!(link = %self.name, frames, bytes = wire.len(), "outbound bytes");
            LinkStats::bump(&self.stats.frames_out, frames as u64);
        }
        Ok(frames)
    }

    /// Drain the given input channels into their protocols.
    fn dispatch(&self, numbers: impl IntoIterator<Item = ChannelNumber>) -> usize {
        let mut delivered = 0;
        for number in numbers {
            let (Some(channel), Some(endpoint)) =
                (self.channels.inputs.get(number), self.endpoints.get(&number))
            else {
                continue;
            };
            while let Ok(message) = channel.get_message(Wait::Immediate) {
                match endpoint.receive_message(&message) {
                    Ok(()) => delivered += 1,
                    Err(err) => {
                        LinkStats::bump(&self.stats.rejected, 1);
                        warn!(
                            link = %self.name,
                            protocol = %endpoint.key(),
                            error = %err,
                            "message rejected"
                        );
                    }
                }
            }
        }
        delivered
    }

    /// Drain every input channel, whether signalled or not.
    fn dispatch_all(&self) -> usize {
        let inputs = &self.channels.inputs;
        inputs.signal().take_now();
        let numbers: Vec<_> = inputs.channels().iter().map(|c| c.number()).collect();
        self.dispatch(numbers)
    }
}

fn take(channel: &Channel) -> Result<Option<LinkMessage>> {
    match channel.get_message(Wait::Immediate) {
        Ok(message) => Ok(Some(message)),
        Err(LinkError::QueueEmpty(_)) => Ok(None),
        Err(err) => Err(err),
    }
}

/// A link under construction, or driven step by step by its owner.
pub struct Link {
    shared: Shared,
    assembler: FrameAssembler,
    queue_capacity: usize,
}

impl Link {
    pub fn new(role: Role, config: LinkConfig, context: Arc<SystemContext>) -> Self {
        let channels = Arc::new(LinkChannels::new(&config.name));
        Self {
            shared: Shared {
                name: config.name,
                role,
                channels,
                endpoints: BTreeMap::new(),
                stats: Arc::new(LinkStats::default()),
                context,
                cancel: CancellationToken::new(),
            },
            assembler: FrameAssembler::with_config(config.frame),
            queue_capacity: config.queue_capacity,
        }
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn role(&self) -> Role {
        self.shared.role
    }

    pub fn channels(&self) -> &Arc<LinkChannels> {
        &self.shared.channels
    }

    pub fn stats(&self) -> &Arc<LinkStats> {
        &self.shared.stats
    }

    pub fn context(&self) -> &Arc<SystemContext> {
        &self.shared.context
    }

    /// Token that stops the link's threads and blocked channel waits.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.shared.cancel.clone()
    }

    /// Register an input and an output protocol for one channel number.
    ///
    /// Both must have the link's role and the same number. Their channels
    /// are manufactured, attached to the collections and paired.
    pub fn add_protocol<I, O>(&mut self, input: Arc<I>, output: Arc<O>) -> Result<()>
    where
        I: Endpoint + 'static,
        O: Endpoint + 'static,
    {
        let number = input.key().number();
        if output.key().number() != number {
            return Err(LinkError::ChannelMismatch {
                channel: number,
                message: output.key().number(),
            });
        }
        for (key, role) in [(input.key(), input.role()), (output.key(), output.role())] {
            if role != self.shared.role {
                return Err(LinkError::RoleMismatch {
                    protocol: key.name(),
                    expected: self.shared.role,
                    actual: role,
                });
            }
        }
        let channels = &self.shared.channels;
        for direction in [Direction::Input, Direction::Output] {
            if channels.side(direction).contains(number) {
                return Err(LinkError::DuplicateChannel(ChannelKey::new(number, direction)));
            }
        }

        let input_channel = input.bind_channel(Direction::Input, self.queue_capacity)?;
        let output_channel = output.bind_channel(Direction::Output, self.queue_capacity)?;
        pair_channels(&input_channel, &output_channel)?;
        channels.inputs.attach(input_channel)?;
        channels.outputs.attach(output_channel)?;
        input.attach_registry(Arc::clone(channels))?;
        output.attach_registry(Arc::clone(channels))?;

        info!(
            link = %self.shared.name,
            role = %self.shared.role,
            input = %input.key(),
            output = %output.key(),
            "protocol added"
        );
        self.shared.endpoints.insert(number, input);
        Ok(())
    }

    /// Create and register a protocol pair on the handler's default channel.
    pub fn add_protocol_pair<H>(&mut self, handler: H) -> Result<ProtocolPair<H>>
    where
        H: ProtocolHandler + Clone,
    {
        self.add_protocol_pair_on(handler, H::DEFAULT_CHANNEL.get())
    }

    /// Create and register a protocol pair on channel `number`.
    pub fn add_protocol_pair_on<H>(&mut self, handler: H, number: u8) -> Result<ProtocolPair<H>>
    where
        H: ProtocolHandler + Clone,
    {
        let role = self.shared.role;
        let input = Arc::new(Protocol::with_number(handler.clone(), role, number)?);
        let output = Arc::new(Protocol::with_number(handler, role, number)?);
        self.add_protocol(Arc::clone(&input), Arc::clone(&output))?;
        Ok(ProtocolPair { input, output })
    }

    /// Read once from `port` and route every complete frame.
    ///
    /// Frames for unknown channels and oversized frames are skipped and
    /// counted. Returns the number of frames queued.
    pub fn pump_inbound<P: LinkPort + ?Sized>(&mut self, port: &mut P) -> Result<usize> {
        self.shared.pump_inbound(&mut self.assembler, port)
    }

    /// Write every queued outbound message to `port`. Returns the frame count.
    pub fn pump_outbound<P: LinkPort + ?Sized>(&self, port: &mut P) -> Result<usize> {
        self.shared.pump_outbound(port)
    }

    /// Deliver every queued inbound message to its protocol.
    ///
    /// Rejected messages are logged and counted; the rest still go through.
    /// Returns the number delivered.
    pub fn dispatch_pending(&self) -> usize {
        self.shared.dispatch_all()
    }

    /// Run the link on `port` until cancelled or the transport fails.
    pub fn start<P: LinkPort + 'static>(self, port: P) -> Result<LinkHandle> {
        let Link {
            shared, assembler, ..
        } = self;
        let shared = Arc::new(shared);
        info!(
            link = %shared.name,
            role = %shared.role,
            transport = port.transport_name(),
            "link starting"
        );

        let dispatch = thread::Builder::new()
            .name(format!("{}-dispatch", shared.name))
            .spawn({
                let shared = Arc::clone(&shared);
                move || dispatch_loop(&shared)
            })
            .map_err(LinkError::Spawn)?;

        let io = thread::Builder::new()
            .name(format!("{}-io", shared.name))
            .spawn({
                let shared = Arc::clone(&shared);
                move || io_loop(&shared, assembler, port)
            })
            .map_err(|err| {
                shared.cancel.cancel();
                LinkError::Spawn(err)
            })?;

        Ok(LinkHandle {
            shared,
            io,
            dispatch,
        })
    }
}

fn dispatch_loop(shared: &Shared) -> Result<()> {
    let runtime = match Builder::new_current_thread().build() {
        Ok(runtime) => runtime,
        Err(err) => {
            shared.cancel.cancel();
            return Err(LinkError::Runtime(err));
        }
    };
    let signal = shared.channels.inputs.signal();
    loop {
        let ready = runtime.block_on(async {
            tokio::select! {
                biased;
                _ = shared.cancel.cancelled() => None,
                ready = signal.arrived() => Some(ready),
            }
        });
        match ready {
            Some(ready) => {
                shared.dispatch(ready);
            }
            None => break,
        }
    }
    // Messages the I/O thread queued before it saw the cancellation.
    let drained = shared.dispatch_all();
    debug!(link = %shared.name, drained, "dispatch stopped");
    Ok(())
}

fn io_loop<P: LinkPort>(
    shared: &Shared,
    mut assembler: FrameAssembler,
    mut port: P,
) -> Result<()> {
    loop {
        if shared.cancel.is_cancelled() {
            if let Err(err) = shared.pump_outbound(&mut port) {
                debug!(link = %shared.name, error = %err, "final flush failed");
            }
            info!(link = %shared.name, "link stopped");
            return Ok(());
        }
        let step = shared
            .pump_outbound(&mut port)
            .and_then(|_| shared.pump_inbound(&mut assembler, &mut port));
        match step {
            Ok(_) => {}
            Err(LinkError::Cancelled(_)) => {}
            Err(err) => {
                shared.context.acknowledge_link_failure(&shared.name, &err);
                shared.cancel.cancel();
                return Err(err);
            }
        }
    }
}

/// A running link.
pub struct LinkHandle {
    shared: Arc<Shared>,
    io: JoinHandle<Result<()>>,
    dispatch: JoinHandle<Result<()>>,
}

impl LinkHandle {
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn stats(&self) -> &Arc<LinkStats> {
        &self.shared.stats
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.shared.cancel.clone()
    }

    /// Ask both threads to stop. Queued outbound messages are flushed once.
    pub fn shutdown(&self) {
        self.shared.cancel.cancel();
    }

    /// Returns true once the I/O thread has exited.
    pub fn is_finished(&self) -> bool {
        self.io.is_finished()
    }

    /// Wait for both threads. Returns the transport error that ended the
    /// link, if any.
    pub fn join(self) -> Result<()> {
        let io = self.io.join();
        let dispatch = self.dispatch.join();
        let io = io.map_err(|_| LinkError::ThreadPanicked("io"))?;
        let dispatch = dispatch.map_err(|_| LinkError::ThreadPanicked("dispatch"))?;
        io.and(dispatch)
    }
}
