//! `EchoServer`: sends every received packet back to its sender.

use std::any::Any;

use crate::error::SimResult;
use crate::node::id::Address;
use crate::node::packet::Packet;
use crate::node::traits::{AppContext, Application};

/// Replies to each packet with an identical packet, keeping its sequence
/// number and original send time so the sender can compute round trips.
#[derive(Debug, Clone, Default)]
pub struct EchoServer {
    pub echo_count: u64,
}

impl EchoServer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Application for EchoServer {
    fn start(&mut self, _ctx: &mut AppContext<'_, '_>) -> SimResult<()> {
        Ok(())
    }

    fn receive(&mut self, ctx: &mut AppContext<'_, '_>, from: Address, packet: Packet) -> SimResult<()> {
        self.echo_count += 1;
        ctx.send(from, packet)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
