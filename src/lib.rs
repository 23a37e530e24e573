//! # evsim: deterministic discrete-event simulation kernel
//!
//! A single virtual timeline on which every simulated entity's work is
//! interleaved. Callers schedule closures at future virtual times, run
//! the simulation until the queue drains or a stop event fires, and tear
//! it down. No threads, no wall-clock time: equal inputs give equal
//! dispatch sequences.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────┐
//! │  node::Network (world S)   │ ← apps, links, packets
//! │  ┌──────────────────────┐  │
//! │  │   Simulation<S>      │  │ ← state machine + run loop
//! │  │  ┌────────────────┐  │  │
//! │  │  │  EventQueue    │  │  │ ← min-heap, lazy cancel
//! │  │  └────────────────┘  │  │
//! │  │  ┌────────────────┐  │  │
//! │  │  │  Event         │  │  │ ← (time, id, context, callback)
//! │  │  └────────────────┘  │  │
//! │  │  ┌────────────────┐  │  │
//! │  │  │  VirtualTime   │  │  │ ← nanosecond clock
//! │  │  └────────────────┘  │  │
//! │  └──────────────────────┘  │
//! └────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust
//! use std::time::Duration;
//! use evsim::{NodeId, Simulation, VirtualTime};
//!
//! let mut sim = Simulation::new(Vec::new());
//! sim.schedule_with_context(NodeId::new(0), Duration::from_secs(2), |ctx| {
//!     let now = ctx.now();
//!     ctx.world_mut().push(("A", now));
//! }).unwrap();
//! sim.schedule_with_context(NodeId::new(1), Duration::from_secs(2), |ctx| {
//!     let now = ctx.now();
//!     ctx.world_mut().push(("B", now));
//! }).unwrap();
//! sim.schedule_stop(Duration::from_secs(10)).unwrap();
//!
//! sim.run().unwrap();
//! assert_eq!(sim.now(), VirtualTime::from_secs(10));
//! assert_eq!(sim.world().len(), 2);
//! sim.destroy();
//! ```

pub mod config;
pub mod error;
pub mod event;
pub mod node;
pub mod queue;
pub mod simulation;
pub mod time;
pub mod trace;

// Re-exports for convenience.
pub use config::{ConfigError, SimulationConfig};
pub use error::{SimError, SimResult};
pub use event::{Callback, Event, EventHandle, EventId};
pub use node::{Address, AppId, Network, NodeId};
pub use queue::EventQueue;
pub use simulation::{SimState, Simulation, SimulationContext, SimulationStats};
pub use time::VirtualTime;
pub use trace::{traces_match, DispatchRecord, DispatchTrace};
