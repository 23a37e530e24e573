//! `Network`: the world type for application-level simulations.
//!
//! Owns nodes, the directed links between them and every installed
//! application. All activity goes through the kernel: application start
//! and stop, packet delivery and timers are ordinary events attributed to
//! the node they happen on.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::error::{SimError, SimResult};
use crate::event::EventHandle;
use crate::simulation::{Simulation, SimulationContext};
use crate::time::VirtualTime;
use crate::trace::hash_combine;

use super::channel::{Channel, ChannelConfig, ChannelDecision};
use super::id::{Address, AppId, NodeId};
use super::packet::Packet;
use super::traits::{AppContext, AppInfo, Application};

// ── Network Stats ─────────────────────────────────────────────────────

/// Packet counters over the whole network.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkStats {
    pub packets_sent: u64,
    pub bytes_sent: u64,
    pub packets_delivered: u64,
    pub bytes_delivered: u64,
    /// Dropped by a channel's loss model.
    pub packets_lost: u64,
    /// No link between sender and receiver node.
    pub packets_unroutable: u64,
    /// Arrived at an address no application is bound to.
    pub packets_unbound: u64,
    /// Arrived at an application that was not running.
    pub packets_dropped_inactive: u64,
}

// ── App slot ──────────────────────────────────────────────────────────

struct AppSlot {
    info: AppInfo,
    running: bool,
    /// `None` only while one of the app's hooks is executing.
    app: Option<Box<dyn Application>>,
}

// ── Network ───────────────────────────────────────────────────────────

/// Nodes, links and applications.
///
/// Use as the world of a [`Simulation`]:
///
/// ```rust
/// use std::time::Duration;
/// use evsim::node::{ChannelConfig, Network, PacketSink, PeriodicSender, Address};
/// use evsim::{Simulation, VirtualTime};
///
/// let mut net = Network::new(1);
/// let a = net.add_node();
/// let b = net.add_node();
/// net.connect(a, b, ChannelConfig::point_to_point(Duration::from_millis(2), 5_000_000)).unwrap();
///
/// let mut sim = Simulation::new(net);
/// let sink = Network::install(&mut sim, b, Box::new(PacketSink::new()), 9, VirtualTime::ZERO, None).unwrap();
/// let sender = PeriodicSender::new(Address::new(b, 9), 512, Duration::from_millis(100)).with_max_packets(3);
/// Network::install(&mut sim, a, Box::new(sender), 49153, VirtualTime::from_secs(1), None).unwrap();
///
/// sim.run().unwrap();
/// assert_eq!(sim.world().app::<PacketSink>(sink).unwrap().packets(), 3);
/// ```
pub struct Network {
    seed: u64,
    nodes: BTreeSet<NodeId>,
    links: BTreeMap<(NodeId, NodeId), Channel>,
    apps: BTreeMap<AppId, AppSlot>,
    bindings: BTreeMap<Address, AppId>,
    next_node: u64,
    next_app: u64,
    stats: NetworkStats,
}

impl Network {
    /// Create an empty network. `seed` drives every link's loss and
    /// jitter draws.
    pub fn new(seed: u64) -> Self {
        Network {
            seed,
            nodes: BTreeSet::new(),
            links: BTreeMap::new(),
            apps: BTreeMap::new(),
            bindings: BTreeMap::new(),
            next_node: 0,
            next_app: 0,
            stats: NetworkStats::default(),
        }
    }

    // ── Topology ──────────────────────────────────────────────

    /// Add a node; ids are handed out sequentially from 0.
    pub fn add_node(&mut self) -> NodeId {
        let id = NodeId::new(self.next_node);
        self.next_node += 1;
        self.nodes.insert(id);
        id
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn contains_node(&self, node: NodeId) -> bool {
        self.nodes.contains(&node)
    }

    /// Connect `a` and `b` in both directions with the same
    /// characteristics. Reconnecting replaces the existing channels.
    pub fn connect(&mut self, a: NodeId, b: NodeId, config: ChannelConfig) -> SimResult<()> {
        self.connect_one_way(a, b, config.clone())?;
        self.connect_one_way(b, a, config)
    }

    /// Connect `from` to `to` only.
    pub fn connect_one_way(
        &mut self,
        from: NodeId,
        to: NodeId,
        config: ChannelConfig,
    ) -> SimResult<()> {
        self.require_node(from)?;
        self.require_node(to)?;
        let seed = hash_combine(hash_combine(self.seed, from.raw()), to.raw());
        self.links.insert((from, to), Channel::new(config, seed));
        Ok(())
    }

    pub fn link(&self, from: NodeId, to: NodeId) -> Option<&Channel> {
        self.links.get(&(from, to))
    }

    fn require_node(&self, node: NodeId) -> SimResult<()> {
        if self.nodes.contains(&node) {
            Ok(())
        } else {
            Err(SimError::UnknownNode(node))
        }
    }

    // ── Applications ──────────────────────────────────────────

    /// Bind `app` to `node:port` without scheduling anything.
    ///
    /// The application stays inactive until [`Network::start_app`] runs.
    pub fn bind(&mut self, node: NodeId, port: u16, app: Box<dyn Application>) -> SimResult<AppId> {
        self.require_node(node)?;
        let address = Address::new(node, port);
        if self.bindings.contains_key(&address) {
            return Err(SimError::AddressInUse(address));
        }
        let id = AppId::new(self.next_app);
        self.next_app += 1;
        self.bindings.insert(address, id);
        self.apps.insert(
            id,
            AppSlot {
                info: AppInfo { id, address },
                running: false,
                app: Some(app),
            },
        );
        Ok(id)
    }

    /// Bind `app` to `node:port` and schedule its start and optional stop
    /// at absolute times. Both events are attributed to `node`.
    pub fn install(
        sim: &mut Simulation<Network>,
        node: NodeId,
        app: Box<dyn Application>,
        port: u16,
        start: VirtualTime,
        stop: Option<VirtualTime>,
    ) -> SimResult<AppId> {
        let id = sim.world_mut().bind(node, port, app)?;
        sim.schedule_at_with_context(node, start, move |ctx| Network::start_app(ctx, id))?;
        if let Some(stop) = stop {
            sim.schedule_at_with_context(node, stop, move |ctx| Network::stop_app(ctx, id))?;
        }
        Ok(id)
    }

    /// Start an application now. No-op if it is already running.
    pub fn start_app(ctx: &mut SimulationContext<'_, Network>, id: AppId) {
        let Some(slot) = ctx.world_mut().apps.get_mut(&id) else {
            ctx.abort(SimError::UnknownApp(id));
            return;
        };
        if slot.running {
            return;
        }
        slot.running = true;
        let address = slot.info.address;
        debug!(app = %id, %address, now = %ctx.now(), "starting application");
        Network::invoke(ctx, id, |app, actx| app.start(actx));
    }

    /// Stop an application now. No-op if it is not running.
    pub fn stop_app(ctx: &mut SimulationContext<'_, Network>, id: AppId) {
        let Some(slot) = ctx.world_mut().apps.get_mut(&id) else {
            ctx.abort(SimError::UnknownApp(id));
            return;
        };
        if !slot.running {
            return;
        }
        slot.running = false;
        let address = slot.info.address;
        debug!(app = %id, %address, now = %ctx.now(), "stopping application");
        Network::invoke(ctx, id, |app, actx| app.stop(actx));
    }

    pub fn is_running(&self, id: AppId) -> bool {
        self.apps.get(&id).map_or(false, |slot| slot.running)
    }

    pub fn app_info(&self, id: AppId) -> Option<AppInfo> {
        self.apps.get(&id).map(|slot| slot.info)
    }

    /// The application bound to `address`, if any.
    pub fn app_at(&self, address: Address) -> Option<AppId> {
        self.bindings.get(&address).copied()
    }

    /// All installed applications in id order.
    pub fn apps(&self) -> Vec<AppInfo> {
        self.apps.values().map(|slot| slot.info).collect()
    }

    /// Downcast an application for inspection.
    pub fn app<T: Application + 'static>(&self, id: AppId) -> Option<&T> {
        self.apps.get(&id)?.app.as_ref()?.as_any().downcast_ref::<T>()
    }

    pub fn app_mut<T: Application + 'static>(&mut self, id: AppId) -> Option<&mut T> {
        self.apps
            .get_mut(&id)?
            .app
            .as_mut()?
            .as_any_mut()
            .downcast_mut::<T>()
    }

    pub fn stats(&self) -> &NetworkStats {
        &self.stats
    }

    // ── Packets and timers ────────────────────────────────────

    /// Hand `packet` to the link from `from.node` to `to.node`.
    ///
    /// Same-node packets are delivered at the current time. Packets with
    /// no link are counted as unroutable and dropped.
    pub fn send(
        ctx: &mut SimulationContext<'_, Network>,
        from: Address,
        to: Address,
        packet: Packet,
    ) -> SimResult<()> {
        let now = ctx.now();
        let net = ctx.world_mut();
        net.require_node(to.node)?;
        net.stats.packets_sent += 1;
        net.stats.bytes_sent += u64::from(packet.size);

        let decision = if from.node == to.node {
            ChannelDecision::Deliver {
                latency: Duration::ZERO,
            }
        } else {
            match net.links.get_mut(&(from.node, to.node)) {
                Some(channel) => channel.transmit(now, packet.size),
                None => {
                    net.stats.packets_unroutable += 1;
                    debug!(%from, %to, seq = packet.seq, "no route, dropping packet");
                    return Ok(());
                }
            }
        };

        match decision {
            ChannelDecision::Lost => {
                net.stats.packets_lost += 1;
                trace!(%from, %to, seq = packet.seq, "packet lost");
                Ok(())
            }
            ChannelDecision::Deliver { latency } => {
                trace!(%from, %to, seq = packet.seq, ?latency, "packet in flight");
                ctx.schedule_with_context(to.node, latency, move |ctx| {
                    Network::deliver(ctx, from, to, packet)
                })?;
                Ok(())
            }
        }
    }

    /// Fire `on_timer(timer)` on `id` after `delay`, in the current
    /// context.
    pub fn set_timer(
        ctx: &mut SimulationContext<'_, Network>,
        id: AppId,
        delay: Duration,
        timer: u64,
    ) -> SimResult<EventHandle> {
        ctx.schedule(delay, move |ctx| {
            if ctx.world().is_running(id) {
                Network::invoke(ctx, id, |app, actx| app.on_timer(actx, timer));
            } else {
                trace!(app = %id, timer, "timer for inactive application ignored");
            }
        })
    }

    fn deliver(ctx: &mut SimulationContext<'_, Network>, from: Address, to: Address, packet: Packet) {
        let net = ctx.world_mut();
        let Some(id) = net.bindings.get(&to).copied() else {
            net.stats.packets_unbound += 1;
            warn!(%from, %to, seq = packet.seq, "packet for unbound address dropped");
            return;
        };
        if !net.is_running(id) {
            net.stats.packets_dropped_inactive += 1;
            trace!(app = %id, seq = packet.seq, "packet for inactive application dropped");
            return;
        }
        net.stats.packets_delivered += 1;
        net.stats.bytes_delivered += u64::from(packet.size);
        Network::invoke(ctx, id, move |app, actx| app.receive(actx, from, packet));
    }

    /// Run one application hook with the app temporarily taken out of its
    /// slot. A returned error aborts the run.
    fn invoke<F>(ctx: &mut SimulationContext<'_, Network>, id: AppId, hook: F)
    where
        F: FnOnce(&mut dyn Application, &mut AppContext<'_, '_>) -> SimResult<()>,
    {
        let Some(slot) = ctx.world_mut().apps.get_mut(&id) else {
            ctx.abort(SimError::UnknownApp(id));
            return;
        };
        let info = slot.info;
        let Some(mut app) = slot.app.take() else {
            return;
        };

        let result = {
            let mut actx = AppContext::new(ctx, info);
            hook(app.as_mut(), &mut actx)
        };

        if let Some(slot) = ctx.world_mut().apps.get_mut(&id) {
            slot.app = Some(app);
        }
        if let Err(err) = result {
            ctx.abort(err);
        }
    }
}

impl std::fmt::Debug for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Network")
            .field("seed", &self.seed)
            .field("nodes", &self.nodes.len())
            .field("links", &self.links.len())
            .field("apps", &self.apps.len())
            .field("stats", &self.stats)
            .finish()
    }
}
