//! Deterministic event queue.
//!
//! A `BinaryHeap` with reversed `Ord` on `Event` acts as a min-heap keyed
//! by `(scheduled_at, event_id)`. Cancellation is lazy: a cancelled event
//! leaves the pending set immediately and its heap entry is discarded when
//! it reaches the top.
//!
//! Every queue draws a process-unique identity at construction and stamps
//! it into the handles it issues. Handles from any other queue are
//! ignored. The identity never takes part in ordering.

use std::collections::{BinaryHeap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::trace;

use crate::event::{Callback, Event, EventHandle, EventId, EventIdGen};
use crate::node::NodeId;
use crate::time::VirtualTime;

/// Below this many heap entries tombstones are never compacted.
const COMPACT_MIN_ENTRIES: usize = 64;

static NEXT_QUEUE: AtomicU64 = AtomicU64::new(0);

/// Pending events in dispatch order.
pub struct EventQueue<S> {
    /// Min-heap (via reversed Ord on Event). May hold cancelled entries.
    heap: BinaryHeap<Event<S>>,

    /// Ids of events that are scheduled and not yet fired or cancelled.
    pending: HashSet<EventId>,

    id_gen: EventIdGen,

    /// Stamped into every issued handle.
    origin: u64,
}

impl<S> EventQueue<S> {
    pub fn new() -> Self {
        EventQueue {
            heap: BinaryHeap::new(),
            pending: HashSet::new(),
            id_gen: EventIdGen::new(),
            origin: NEXT_QUEUE.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// Insert a new event and return its handle.
    ///
    /// Does not check `at` against any clock; that is the simulation's
    /// job.
    pub fn insert(
        &mut self,
        at: VirtualTime,
        context: Option<NodeId>,
        callback: Callback<S>,
    ) -> EventHandle {
        let id = self.id_gen.next_id();
        self.pending.insert(id);
        self.heap.push(Event::new(id, at, context, callback));
        EventHandle::new(self.origin, id, at)
    }

    /// Remove and return the earliest live event.
    ///
    /// Cancelled entries found on the way are dropped.
    pub fn pop_min(&mut self) -> Option<Event<S>> {
        while let Some(event) = self.heap.pop() {
            if self.pending.remove(&event.id) {
                return Some(event);
            }
            trace!(event = %event.id, "discarding cancelled event");
        }
        None
    }

    /// Time of the earliest live event.
    pub fn peek_time(&mut self) -> Option<VirtualTime> {
        loop {
            let top = self.heap.peek()?;
            if self.pending.contains(&top.id) {
                return Some(top.scheduled_at);
            }
            self.heap.pop();
        }
    }

    /// Cancel the referenced event.
    ///
    /// Returns `true` if the event was pending. Handles of fired,
    /// cancelled or foreign events are ignored.
    pub fn cancel(&mut self, handle: EventHandle) -> bool {
        if !self.owns(handle) {
            return false;
        }
        let removed = self.pending.remove(&handle.id());
        if removed {
            self.maybe_compact();
        }
        removed
    }

    /// Whether the referenced event is still waiting to fire.
    pub fn is_pending(&self, handle: EventHandle) -> bool {
        self.owns(handle) && self.pending.contains(&handle.id())
    }

    fn owns(&self, handle: EventHandle) -> bool {
        handle.queue() == self.origin
    }

    /// Number of live (not cancelled) events.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Heap entries including cancelled tombstones.
    pub fn stored_len(&self) -> usize {
        self.heap.len()
    }

    /// The id the next inserted event will receive.
    pub fn next_event_id(&self) -> EventId {
        self.id_gen.peek()
    }

    /// Drop every queued event without running it.
    ///
    /// Returns the number of live events discarded.
    pub fn clear(&mut self) -> usize {
        let discarded = self.pending.len();
        self.heap.clear();
        self.pending.clear();
        discarded
    }

    /// Rebuild the heap once tombstones outnumber live entries.
    fn maybe_compact(&mut self) {
        let stored = self.heap.len();
        if stored < COMPACT_MIN_ENTRIES || stored <= 2 * self.pending.len() {
            return;
        }
        let pending = &self.pending;
        self.heap.retain(|e| pending.contains(&e.id));
        trace!(before = stored, after = self.heap.len(), "compacted event queue");
    }
}

impl<S> Default for EventQueue<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> fmt::Debug for EventQueue<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventQueue")
            .field("pending", &self.pending.len())
            .field("stored", &self.heap.len())
            .field("next_id", &self.id_gen.peek())
            .finish()
    }
}
