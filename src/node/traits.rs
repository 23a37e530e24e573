//! `Application` trait and the context applications run in.

use std::any::Any;
use std::time::Duration;

use crate::error::SimResult;
use crate::event::EventHandle;
use crate::simulation::SimulationContext;
use crate::time::VirtualTime;

use super::id::{Address, AppId, NodeId};
use super::network::Network;
use super::packet::Packet;

// ── AppInfo ───────────────────────────────────────────────────────────

/// Where an application is installed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppInfo {
    pub id: AppId,
    pub address: Address,
}

impl AppInfo {
    pub fn node(&self) -> NodeId {
        self.address.node
    }
}

// ── Application ───────────────────────────────────────────────────────

/// Behaviour installed on a node.
///
/// The network calls `start` at the application's start time and `stop`
/// at its stop time. Between the two, packets addressed to the
/// application arrive through `receive` and its own timers through
/// `on_timer`. Outside that window both are dropped.
///
/// An error returned from any hook aborts the run.
///
/// # Example
///
/// ```rust
/// use evsim::node::{AppContext, Application, Address, Packet};
/// use evsim::SimResult;
///
/// #[derive(Default)]
/// struct Counter { seen: u64 }
///
/// impl Application for Counter {
///     fn start(&mut self, _ctx: &mut AppContext<'_, '_>) -> SimResult<()> {
///         Ok(())
///     }
///     fn receive(&mut self, _ctx: &mut AppContext<'_, '_>, _from: Address, _packet: Packet) -> SimResult<()> {
///         self.seen += 1;
///         Ok(())
///     }
///     fn as_any(&self) -> &dyn std::any::Any { self }
///     fn as_any_mut(&mut self) -> &mut dyn std::any::Any { self }
/// }
/// ```
pub trait Application {
    fn start(&mut self, ctx: &mut AppContext<'_, '_>) -> SimResult<()>;

    /// Release pending work. Cancel outstanding send events here.
    fn stop(&mut self, _ctx: &mut AppContext<'_, '_>) -> SimResult<()> {
        Ok(())
    }

    fn receive(
        &mut self,
        _ctx: &mut AppContext<'_, '_>,
        _from: Address,
        _packet: Packet,
    ) -> SimResult<()> {
        Ok(())
    }

    /// A timer set through [`AppContext::set_timer`] fired.
    fn on_timer(&mut self, _ctx: &mut AppContext<'_, '_>, _timer: u64) -> SimResult<()> {
        Ok(())
    }

    /// Downcast support for `Network::app::<T>()`.
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

// ── AppContext ────────────────────────────────────────────────────────

/// The simulation context as seen by one application.
pub struct AppContext<'c, 'a> {
    sim: &'c mut SimulationContext<'a, Network>,
    info: AppInfo,
}

impl<'c, 'a> AppContext<'c, 'a> {
    pub(crate) fn new(sim: &'c mut SimulationContext<'a, Network>, info: AppInfo) -> Self {
        AppContext { sim, info }
    }

    pub fn now(&self) -> VirtualTime {
        self.sim.now()
    }

    pub fn info(&self) -> AppInfo {
        self.info
    }

    /// This application's own address.
    pub fn address(&self) -> Address {
        self.info.address
    }

    /// Send `packet` from this application to `to`.
    pub fn send(&mut self, to: Address, packet: Packet) -> SimResult<()> {
        Network::send(self.sim, self.info.address, to, packet)
    }

    /// Fire `on_timer(timer)` on this application after `delay`.
    pub fn set_timer(&mut self, delay: Duration, timer: u64) -> SimResult<EventHandle> {
        Network::set_timer(self.sim, self.info.id, delay, timer)
    }

    pub fn cancel(&mut self, handle: EventHandle) -> bool {
        self.sim.cancel(handle)
    }

    pub fn is_pending(&self, handle: EventHandle) -> bool {
        self.sim.is_pending(handle)
    }

    /// The underlying simulation context.
    pub fn sim(&mut self) -> &mut SimulationContext<'a, Network> {
        self.sim
    }
}
