//! `PeriodicSender`: sends fixed-size packets at a fixed interval.

use std::any::Any;
use std::time::Duration;

use tracing::debug;

use crate::error::SimResult;
use crate::event::EventHandle;
use crate::node::id::Address;
use crate::node::packet::Packet;
use crate::node::traits::{AppContext, Application};

const SEND_TIMER: u64 = 0;

/// Sends `packet_size`-byte packets to `peer` every `interval`, starting
/// as soon as it is started.
///
/// Keeps the handle of its next send so that stopping cancels it. Any
/// packet coming back (for example from an [`EchoServer`]) is recorded
/// with its round-trip time.
///
/// [`EchoServer`]: super::EchoServer
#[derive(Debug, Clone)]
pub struct PeriodicSender {
    pub peer: Address,
    pub packet_size: u32,
    pub interval: Duration,
    /// Stop sending after this many packets. `None` sends until stopped.
    pub max_packets: Option<u64>,
    sent: u64,
    send_event: Option<EventHandle>,
    replies: Vec<(u64, Duration)>,
}

impl PeriodicSender {
    pub fn new(peer: Address, packet_size: u32, interval: Duration) -> Self {
        PeriodicSender {
            peer,
            packet_size,
            interval,
            max_packets: None,
            sent: 0,
            send_event: None,
            replies: Vec::new(),
        }
    }

    pub fn with_max_packets(mut self, max_packets: u64) -> Self {
        self.max_packets = Some(max_packets);
        self
    }

    /// Packets handed to the network so far.
    pub fn sent(&self) -> u64 {
        self.sent
    }

    /// `(seq, round-trip time)` for every reply, in arrival order.
    pub fn replies(&self) -> &[(u64, Duration)] {
        &self.replies
    }

    /// The handle of the next scheduled send, if one is outstanding.
    pub fn pending_send(&self) -> Option<EventHandle> {
        self.send_event
    }

    fn exhausted(&self) -> bool {
        self.max_packets.map_or(false, |max| self.sent >= max)
    }

    fn schedule_send(&mut self, ctx: &mut AppContext<'_, '_>, delay: Duration) -> SimResult<()> {
        self.send_event = if self.exhausted() {
            None
        } else {
            Some(ctx.set_timer(delay, SEND_TIMER)?)
        };
        Ok(())
    }
}

impl Application for PeriodicSender {
    fn start(&mut self, ctx: &mut AppContext<'_, '_>) -> SimResult<()> {
        self.schedule_send(ctx, Duration::ZERO)
    }

    fn stop(&mut self, ctx: &mut AppContext<'_, '_>) -> SimResult<()> {
        if let Some(handle) = self.send_event.take() {
            if ctx.cancel(handle) {
                debug!(app = %ctx.info().id, sent = self.sent, "cancelled pending send");
            }
        }
        Ok(())
    }

    fn receive(&mut self, ctx: &mut AppContext<'_, '_>, _from: Address, packet: Packet) -> SimResult<()> {
        let rtt = ctx.now().duration_since(packet.sent_at).unwrap_or(Duration::ZERO);
        self.replies.push((packet.seq, rtt));
        Ok(())
    }

    fn on_timer(&mut self, ctx: &mut AppContext<'_, '_>, timer: u64) -> SimResult<()> {
        if timer != SEND_TIMER {
            return Ok(());
        }
        let packet = Packet::new(self.sent, self.packet_size, ctx.now());
        self.sent += 1;
        ctx.send(self.peer, packet)?;
        self.schedule_send(ctx, self.interval)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
