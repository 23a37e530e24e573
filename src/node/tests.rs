//! Tests for `Network` and the built-in applications.

use std::any::Any;
use std::time::Duration;

use tracing_test::traced_test;

use crate::error::{SimError, SimResult};
use crate::node::{
    Address, AppContext, AppId, AppInfo, Application, ChannelConfig, EchoServer, Network, NodeId,
    PacketSink, PeriodicSender,
};
use crate::simulation::Simulation;
use crate::time::VirtualTime;

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

/// Two connected nodes over a 2 ms, 8 Mbit/s link.
fn pair(seed: u64) -> (Simulation<Network>, NodeId, NodeId) {
    let mut net = Network::new(seed);
    let a = net.add_node();
    let b = net.add_node();
    net.connect(a, b, ChannelConfig::point_to_point(ms(2), 8_000_000))
        .unwrap();
    (Simulation::new(net), a, b)
}

// ── Built-in applications ─────────────────────────────────────────────

#[test]
fn test_echo_round_trip() {
    let (mut sim, a, b) = pair(1);
    let server = Network::install(&mut sim, b, Box::new(EchoServer::new()), 9, VirtualTime::ZERO, None)
        .unwrap();
    let client = PeriodicSender::new(Address::new(b, 9), 1000, Duration::from_secs(1)).with_max_packets(2);
    let client = Network::install(&mut sim, a, Box::new(client), 49153, VirtualTime::from_secs(1), None)
        .unwrap();

    sim.run().unwrap();

    // 1000 bytes at 8 Mbit/s = 1 ms on the wire, plus 2 ms propagation.
    let sender = sim.world().app::<PeriodicSender>(client).unwrap();
    assert_eq!(sender.sent(), 2);
    assert_eq!(sender.replies(), &[(0, ms(6)), (1, ms(6))]);
    assert_eq!(sim.world().app::<EchoServer>(server).unwrap().echo_count, 2);
    assert_eq!(sim.now(), VirtualTime::from_nanos(2_006_000_000));

    let stats = sim.world().stats();
    assert_eq!(stats.packets_sent, 4);
    assert_eq!(stats.packets_delivered, 4);
    assert_eq!(stats.bytes_delivered, 4000);
}

#[test]
fn test_stop_cancels_pending_send() {
    let mut net = Network::new(0);
    let a = net.add_node();
    let b = net.add_node();
    net.connect(a, b, ChannelConfig::ideal()).unwrap();
    let mut sim = Simulation::new(net);

    let sink = Network::install(&mut sim, b, Box::new(PacketSink::new()), 9, VirtualTime::ZERO, None)
        .unwrap();
    let sender = PeriodicSender::new(Address::new(b, 9), 100, ms(100));
    let sender = Network::install(
        &mut sim,
        a,
        Box::new(sender),
        1000,
        VirtualTime::ZERO,
        Some(VirtualTime::from_secs(1)),
    )
    .unwrap();

    sim.run().unwrap();

    let s = sim.world().app::<PeriodicSender>(sender).unwrap();
    assert_eq!(s.sent(), 10);
    assert!(s.pending_send().is_none());
    assert!(!sim.world().is_running(sender));
    assert!(sim.is_finished());
    assert_eq!(sim.stats().events_cancelled, 1);

    let k = sim.world().app::<PacketSink>(sink).unwrap();
    assert_eq!(k.packets(), 10);
    assert_eq!(k.bytes(), 1000);
    assert_eq!(k.first_rx(), Some(VirtualTime::ZERO));
    assert_eq!(k.last_rx(), Some(VirtualTime::from_millis(900)));
}

#[test]
fn test_sink_throughput() {
    let mut net = Network::new(0);
    let a = net.add_node();
    let b = net.add_node();
    net.connect(a, b, ChannelConfig::ideal()).unwrap();
    let mut sim = Simulation::new(net);

    let sink = Network::install(&mut sim, b, Box::new(PacketSink::new()), 9, VirtualTime::ZERO, None)
        .unwrap();
    let sender = PeriodicSender::new(Address::new(b, 9), 125, ms(10)).with_max_packets(3);
    Network::install(&mut sim, a, Box::new(sender), 1000, VirtualTime::ZERO, None).unwrap();
    sim.run().unwrap();

    // 375 bytes over 20 ms.
    let bps = sim.world().app::<PacketSink>(sink).unwrap().throughput_bps().unwrap();
    assert!((bps - 150_000.0).abs() < 1e-6, "{}", bps);
    assert!(PacketSink::new().throughput_bps().is_none());
}

// ── Delivery rules ────────────────────────────────────────────────────

#[test]
fn test_packets_to_stopped_app_are_dropped() {
    let mut net = Network::new(0);
    let a = net.add_node();
    let b = net.add_node();
    net.connect(a, b, ChannelConfig::ideal()).unwrap();
    let mut sim = Simulation::new(net);

    let sink = Network::install(
        &mut sim,
        b,
        Box::new(PacketSink::new()),
        9,
        VirtualTime::ZERO,
        Some(VirtualTime::from_millis(500)),
    )
    .unwrap();
    let sender = PeriodicSender::new(Address::new(b, 9), 100, ms(100)).with_max_packets(10);
    Network::install(&mut sim, a, Box::new(sender), 1000, VirtualTime::ZERO, None).unwrap();

    sim.run().unwrap();

    assert_eq!(sim.world().app::<PacketSink>(sink).unwrap().packets(), 5);
    let stats = sim.world().stats();
    assert_eq!(stats.packets_delivered, 5);
    assert_eq!(stats.packets_dropped_inactive, 5);
}

#[test]
fn test_unlinked_nodes_are_unroutable() {
    let mut net = Network::new(0);
    let a = net.add_node();
    let b = net.add_node();
    let mut sim = Simulation::new(net);

    let sink = Network::install(&mut sim, b, Box::new(PacketSink::new()), 9, VirtualTime::ZERO, None)
        .unwrap();
    let sender = PeriodicSender::new(Address::new(b, 9), 100, ms(100)).with_max_packets(3);
    Network::install(&mut sim, a, Box::new(sender), 1000, VirtualTime::ZERO, None).unwrap();
    sim.run().unwrap();

    assert_eq!(sim.world().stats().packets_unroutable, 3);
    assert_eq!(sim.world().app::<PacketSink>(sink).unwrap().packets(), 0);
}

#[test]
#[traced_test]
fn test_unbound_port_is_dropped_with_warning() {
    let (mut sim, a, b) = pair(0);
    Network::install(&mut sim, b, Box::new(PacketSink::new()), 9, VirtualTime::ZERO, None).unwrap();
    let sender = PeriodicSender::new(Address::new(b, 10), 100, ms(100)).with_max_packets(3);
    Network::install(&mut sim, a, Box::new(sender), 1000, VirtualTime::ZERO, None).unwrap();
    sim.run().unwrap();

    assert_eq!(sim.world().stats().packets_unbound, 3);
    assert!(logs_contain("packet for unbound address dropped"));
}

#[test]
fn test_same_node_delivery_is_immediate() {
    let mut net = Network::new(0);
    let a = net.add_node();
    let mut sim = Simulation::new(net);

    let sink = Network::install(&mut sim, a, Box::new(PacketSink::new()), 9, VirtualTime::ZERO, None)
        .unwrap();
    let sender = PeriodicSender::new(Address::new(a, 9), 100, ms(100)).with_max_packets(1);
    Network::install(&mut sim, a, Box::new(sender), 1000, VirtualTime::from_secs(2), None).unwrap();
    sim.run().unwrap();

    let k = sim.world().app::<PacketSink>(sink).unwrap();
    assert_eq!(k.received(), &[(VirtualTime::from_secs(2), Address::new(a, 1000), 0)]);
}

#[test]
fn test_delivery_is_attributed_to_destination_node() {
    let (mut sim, a, b) = pair(0);
    sim.enable_trace();
    Network::install(&mut sim, b, Box::new(PacketSink::new()), 9, VirtualTime::ZERO, None).unwrap();
    let sender = PeriodicSender::new(Address::new(b, 9), 1000, ms(100)).with_max_packets(1);
    Network::install(&mut sim, a, Box::new(sender), 1000, VirtualTime::ZERO, None).unwrap();
    sim.run().unwrap();

    let last = *sim.trace().unwrap().records().last().unwrap();
    assert_eq!(last.context, Some(b));
    assert_eq!(last.time, VirtualTime::from_millis(3));
}

// ── Inspection ────────────────────────────────────────────────────────

#[test]
fn test_topology_and_binding_lookup() {
    let (mut sim, a, b) = pair(0);
    let net = sim.world_mut();
    assert_eq!(net.node_count(), 2);
    assert!(net.contains_node(a));
    assert!(!net.contains_node(NodeId::new(2)));

    let sink = net.bind(b, 9, Box::new(PacketSink::new())).unwrap();
    assert_eq!(net.app_at(Address::new(b, 9)), Some(sink));
    assert_eq!(net.app_at(Address::new(b, 10)), None);
    assert_eq!(
        net.app_info(sink),
        Some(AppInfo {
            id: sink,
            address: Address::new(b, 9)
        })
    );
    assert_eq!(net.app_info(sink).map(|info| info.node()), Some(b));
    assert_eq!(net.app_info(AppId::new(5)), None);
    assert!(net.app::<EchoServer>(sink).is_none());
}

#[test]
fn test_app_mut_reconfigures_before_run() {
    let (mut sim, a, b) = pair(0);
    let sink = Network::install(&mut sim, b, Box::new(PacketSink::new()), 9, VirtualTime::ZERO, None)
        .unwrap();
    let sender = PeriodicSender::new(Address::new(b, 9), 100, ms(10));
    let sender = Network::install(&mut sim, a, Box::new(sender), 49153, VirtualTime::ZERO, None)
        .unwrap();

    sim.world_mut()
        .app_mut::<PeriodicSender>(sender)
        .unwrap()
        .max_packets = Some(3);
    assert!(sim.world_mut().app_mut::<PacketSink>(sender).is_none());

    sim.run().unwrap();
    assert_eq!(sim.world().app::<PeriodicSender>(sender).unwrap().sent(), 3);
    assert_eq!(sim.world().app::<PacketSink>(sink).unwrap().packets(), 3);
}

// ── Errors ────────────────────────────────────────────────────────────

#[test]
fn test_binding_conflicts() {
    let mut net = Network::new(0);
    let a = net.add_node();
    net.bind(a, 9, Box::new(PacketSink::new())).unwrap();
    let err = net.bind(a, 9, Box::new(EchoServer::new())).unwrap_err();
    assert_eq!(err, SimError::AddressInUse(Address::new(a, 9)));

    // Another port on the same node is fine.
    net.bind(a, 10, Box::new(EchoServer::new())).unwrap();
    assert_eq!(net.apps().len(), 2);
}

#[test]
fn test_unknown_nodes_are_rejected() {
    let mut net = Network::new(0);
    let a = net.add_node();
    let ghost = NodeId::new(7);
    assert_eq!(
        net.connect(a, ghost, ChannelConfig::ideal()).unwrap_err(),
        SimError::UnknownNode(ghost)
    );
    assert!(net.bind(ghost, 9, Box::new(PacketSink::new())).is_err());
}

#[test]
fn test_send_to_unknown_node_aborts_run() {
    let mut net = Network::new(0);
    let a = net.add_node();
    let mut sim = Simulation::new(net);
    let sender = PeriodicSender::new(Address::new(NodeId::new(5), 9), 100, ms(100));
    Network::install(&mut sim, a, Box::new(sender), 1000, VirtualTime::ZERO, None).unwrap();

    let err = sim.run().unwrap_err();
    assert_eq!(err, SimError::UnknownNode(NodeId::new(5)));
}

struct Failing;

impl Application for Failing {
    fn start(&mut self, _ctx: &mut AppContext<'_, '_>) -> SimResult<()> {
        Err(SimError::UnknownApp(AppId::new(99)))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[test]
fn test_hook_error_aborts_run() {
    let mut net = Network::new(0);
    let a = net.add_node();
    let mut sim = Simulation::new(net);
    let id = Network::install(&mut sim, a, Box::new(Failing), 1, VirtualTime::from_secs(1), None)
        .unwrap();

    assert_eq!(sim.run().unwrap_err(), SimError::UnknownApp(AppId::new(99)));
    // The app is back in its slot after the failed hook.
    assert!(sim.world().app::<Failing>(id).is_some());
}

// ── Timers ────────────────────────────────────────────────────────────

#[derive(Default)]
struct Sleeper {
    fired: Vec<(VirtualTime, u64)>,
}

impl Application for Sleeper {
    fn start(&mut self, ctx: &mut AppContext<'_, '_>) -> SimResult<()> {
        ctx.set_timer(Duration::from_secs(1), 1)?;
        ctx.set_timer(Duration::from_secs(3), 2)?;
        Ok(())
    }

    fn on_timer(&mut self, ctx: &mut AppContext<'_, '_>, timer: u64) -> SimResult<()> {
        self.fired.push((ctx.now(), timer));
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[test]
fn test_timers_after_stop_are_ignored() {
    let mut net = Network::new(0);
    let a = net.add_node();
    let mut sim = Simulation::new(net);
    let id = Network::install(
        &mut sim,
        a,
        Box::new(Sleeper::default()),
        1,
        VirtualTime::ZERO,
        Some(VirtualTime::from_secs(2)),
    )
    .unwrap();
    sim.run().unwrap();

    let sleeper = sim.world().app::<Sleeper>(id).unwrap();
    assert_eq!(sleeper.fired, vec![(VirtualTime::from_secs(1), 1)]);
    assert_eq!(sim.now(), VirtualTime::from_secs(3));
}

// ── Reproducibility ───────────────────────────────────────────────────

fn lossy_run(seed: u64) -> (Vec<(VirtualTime, Address, u64)>, u64, u64) {
    let mut net = Network::new(seed);
    let a = net.add_node();
    let b = net.add_node();
    let link = ChannelConfig::point_to_point(ms(2), 5_000_000)
        .with_loss(0.2)
        .with_jitter(ms(1));
    net.connect(a, b, link).unwrap();

    let mut sim = Simulation::new(net);
    sim.enable_trace();
    let sink = Network::install(&mut sim, b, Box::new(PacketSink::new()), 9, VirtualTime::ZERO, None)
        .unwrap();
    let sender = PeriodicSender::new(Address::new(b, 9), 512, ms(10)).with_max_packets(200);
    Network::install(&mut sim, a, Box::new(sender), 1000, VirtualTime::ZERO, None).unwrap();
    sim.schedule_stop(Duration::from_secs(10)).unwrap();
    sim.run().unwrap();

    let received = sim.world().app::<PacketSink>(sink).unwrap().received().to_vec();
    let lost = sim.world().stats().packets_lost;
    let hash = sim.trace().unwrap().trace_hash();
    (received, lost, hash)
}

#[test]
fn test_lossy_network_reproducible() {
    let first = lossy_run(42);
    let second = lossy_run(42);
    assert_eq!(first, second);

    let (received, lost, _) = &first;
    assert_eq!(received.len() as u64 + lost, 200);
    assert!(*lost > 0);
}

#[test]
fn test_seed_changes_outcome() {
    let (a, _, hash_a) = lossy_run(1);
    let (b, _, hash_b) = lossy_run(2);
    assert_ne!(a, b);
    assert_ne!(hash_a, hash_b);
}
