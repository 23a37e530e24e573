//! `PacketSink`: counts everything it receives.

use std::any::Any;

use crate::error::SimResult;
use crate::node::id::Address;
use crate::node::packet::Packet;
use crate::node::traits::{AppContext, Application};
use crate::time::VirtualTime;

#[derive(Debug, Clone, Default)]
pub struct PacketSink {
    packets: u64,
    bytes: u64,
    first_rx: Option<VirtualTime>,
    last_rx: Option<VirtualTime>,
    /// `(arrival, from, seq)` for every packet, in arrival order.
    received: Vec<(VirtualTime, Address, u64)>,
}

impl PacketSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn packets(&self) -> u64 {
        self.packets
    }

    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    pub fn first_rx(&self) -> Option<VirtualTime> {
        self.first_rx
    }

    pub fn last_rx(&self) -> Option<VirtualTime> {
        self.last_rx
    }

    pub fn received(&self) -> &[(VirtualTime, Address, u64)] {
        &self.received
    }

    /// Received bits per second between the first and last arrival.
    ///
    /// `None` until two packets have arrived at distinct times.
    pub fn throughput_bps(&self) -> Option<f64> {
        let span = self.last_rx?.duration_since(self.first_rx?)?;
        if span.is_zero() {
            return None;
        }
        Some(self.bytes as f64 * 8.0 / span.as_secs_f64())
    }
}

impl Application for PacketSink {
    fn start(&mut self, _ctx: &mut AppContext<'_, '_>) -> SimResult<()> {
        Ok(())
    }

    fn receive(&mut self, ctx: &mut AppContext<'_, '_>, from: Address, packet: Packet) -> SimResult<()> {
        let now = ctx.now();
        self.packets += 1;
        self.bytes += u64::from(packet.size);
        self.first_rx.get_or_insert(now);
        self.last_rx = Some(now);
        self.received.push((now, from, packet.seq));
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
