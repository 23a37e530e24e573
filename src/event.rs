//! Events, event ids and cancellation handles.
//!
//! An `Event` is a deferred callback pinned to a virtual time. The queue
//! orders events by `(scheduled_at, id)`; because ids are handed out in
//! scheduling order, events at the same instant fire FIFO.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::node::NodeId;
use crate::simulation::SimulationContext;
use crate::time::VirtualTime;

// ── Event ID ──────────────────────────────────────────────────────────

/// A strictly increasing event identifier, doubling as the insertion
/// sequence number used for tie-breaking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EventId(u64);

impl EventId {
    #[inline]
    pub fn new(raw: u64) -> Self {
        EventId(raw)
    }

    #[inline]
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E#{}", self.0)
    }
}

// ── Event ID Generator ───────────────────────────────────────────────

/// Deterministic, strictly increasing event-id generator.
///
/// Each `EventQueue` owns exactly one of these, so two simulations fed
/// the same scheduling calls mint the same ids.
#[derive(Debug, Clone, Default)]
pub struct EventIdGen {
    next: u64,
}

impl EventIdGen {
    pub fn new() -> Self {
        EventIdGen { next: 0 }
    }

    /// Mint the next event id.
    pub fn next_id(&mut self) -> EventId {
        let id = EventId(self.next);
        self.next += 1;
        id
    }

    /// Peek at the next id without consuming it.
    pub fn peek(&self) -> EventId {
        EventId(self.next)
    }
}

// ── Event Handle ──────────────────────────────────────────────────────

/// A non-owning reference to a scheduled event.
///
/// Handles are plain values: holding one never keeps the event alive, and
/// using one after the event fired or was cancelled is harmless. A handle
/// remembers the queue that issued it, so it never matches an event of
/// another simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventHandle {
    queue: u64,
    id: EventId,
    scheduled_at: VirtualTime,
}

impl EventHandle {
    pub(crate) fn new(queue: u64, id: EventId, scheduled_at: VirtualTime) -> Self {
        EventHandle {
            queue,
            id,
            scheduled_at,
        }
    }

    /// Identity of the issuing queue.
    #[inline]
    pub(crate) fn queue(&self) -> u64 {
        self.queue
    }

    #[inline]
    pub fn id(&self) -> EventId {
        self.id
    }

    /// The time the referenced event was scheduled for.
    #[inline]
    pub fn scheduled_at(&self) -> VirtualTime {
        self.scheduled_at
    }
}

impl fmt::Display for EventHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.id, self.scheduled_at)
    }
}

// ── Event ─────────────────────────────────────────────────────────────

/// The deferred work carried by an event.
pub type Callback<S> = Box<dyn FnOnce(&mut SimulationContext<'_, S>)>;

/// A single scheduled event.
pub struct Event<S> {
    pub id: EventId,
    pub scheduled_at: VirtualTime,
    /// The simulated entity this event is attributed to, if any.
    pub context: Option<NodeId>,
    callback: Callback<S>,
}

impl<S> Event<S> {
    pub fn new(
        id: EventId,
        scheduled_at: VirtualTime,
        context: Option<NodeId>,
        callback: Callback<S>,
    ) -> Self {
        Event {
            id,
            scheduled_at,
            context,
            callback,
        }
    }

    /// Consume the event and run its callback.
    pub(crate) fn fire(self, ctx: &mut SimulationContext<'_, S>) {
        (self.callback)(ctx);
    }
}

impl<S> fmt::Debug for Event<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("id", &self.id)
            .field("scheduled_at", &self.scheduled_at)
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}

impl<S> PartialEq for Event<S> {
    fn eq(&self, other: &Self) -> bool {
        self.scheduled_at == other.scheduled_at && self.id == other.id
    }
}

impl<S> Eq for Event<S> {}

/// Ordering: smallest `(scheduled_at, id)` first.
///
/// `BinaryHeap` is a max-heap, so the natural ordering is reversed here.
impl<S> Ord for Event<S> {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .scheduled_at
            .cmp(&self.scheduled_at)
            .then_with(|| other.id.cmp(&self.id))
    }
}

impl<S> PartialOrd for Event<S> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
