//! Simulation execution loop.
//!
//! Drives the event queue: pops events, advances virtual time, invokes
//! their callbacks. The loop is synchronous and single-threaded; every
//! simulated entity is interleaved on one timeline.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, trace};

use crate::error::{SimError, SimResult};
use crate::event::{Callback, Event, EventHandle};
use crate::node::NodeId;
use crate::queue::EventQueue;
use crate::time::VirtualTime;
use crate::trace::{DispatchRecord, DispatchTrace};

// ── State machine ─────────────────────────────────────────────────────

/// Lifecycle of a [`Simulation`].
///
/// `Idle -> Running -> Stopped -> Destroyed`. A stopped simulation may be
/// run again; `Destroyed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SimState {
    Idle,
    Running,
    Stopped,
    Destroyed,
}

impl fmt::Display for SimState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SimState::Idle => "idle",
            SimState::Running => "running",
            SimState::Stopped => "stopped",
            SimState::Destroyed => "destroyed",
        };
        f.write_str(s)
    }
}

/// Counters collected over the lifetime of a simulation.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SimulationStats {
    pub events_scheduled: u64,
    pub events_dispatched: u64,
    pub events_cancelled: u64,
    /// Events still queued when the simulation was destroyed.
    pub events_discarded: u64,
    /// Stop requests honoured (stop events fired or `stop()` calls).
    pub stops: u64,
}

// ── Run control ───────────────────────────────────────────────────────

/// State shared between the runner and callback contexts.
#[derive(Debug, Default)]
struct Control {
    stop_requested: bool,
    fault: Option<SimError>,
    stats: SimulationStats,
}

impl Control {
    fn schedule<S>(
        &mut self,
        queue: &mut EventQueue<S>,
        now: VirtualTime,
        at: VirtualTime,
        context: Option<NodeId>,
        callback: Callback<S>,
    ) -> SimResult<EventHandle> {
        if at < now {
            return Err(SimError::NegativeDelay { requested: at, now });
        }
        let handle = queue.insert(at, context, callback);
        self.stats.events_scheduled += 1;
        trace!(event = %handle.id(), at = %at, context = ?context, "scheduled event");
        Ok(handle)
    }

    fn cancel<S>(&mut self, queue: &mut EventQueue<S>, handle: EventHandle) -> bool {
        let cancelled = queue.cancel(handle);
        if cancelled {
            self.stats.events_cancelled += 1;
            debug!(event = %handle.id(), at = %handle.scheduled_at(), "cancelled event");
        }
        cancelled
    }

    fn request_stop(&mut self, now: VirtualTime) {
        if !self.stop_requested {
            self.stop_requested = true;
            self.stats.stops += 1;
            debug!(now = %now, "stop requested");
        }
    }

    fn record_fault(&mut self, err: &SimError, now: VirtualTime) {
        if self.fault.is_none() {
            error!(now = %now, error = %err, "simulation fault, aborting run");
            self.fault = Some(err.clone());
        }
    }
}

fn stop_callback<S>() -> Callback<S> {
    Box::new(|ctx: &mut SimulationContext<'_, S>| ctx.stop())
}

fn delay_left(pending: bool, handle: EventHandle, now: VirtualTime) -> Option<Duration> {
    if pending {
        handle.scheduled_at().duration_since(now)
    } else {
        None
    }
}

// ── Simulation Context ────────────────────────────────────────────────

/// Mutable context passed to every callback.
///
/// Gives the callback the current time, the context of the event being
/// dispatched, the world, and the scheduling API. Kernel errors raised
/// through the context are returned to the caller *and* recorded as the
/// run's fault, so the run aborts once the callback returns.
pub struct SimulationContext<'a, S> {
    queue: &'a mut EventQueue<S>,
    control: &'a mut Control,
    now: VirtualTime,
    context: Option<NodeId>,
    world: &'a mut S,
}

impl<'a, S> SimulationContext<'a, S> {
    /// Current virtual time.
    #[inline]
    pub fn now(&self) -> VirtualTime {
        self.now
    }

    /// The entity the current event is attributed to.
    #[inline]
    pub fn context(&self) -> Option<NodeId> {
        self.context
    }

    pub fn world(&self) -> &S {
        self.world
    }

    pub fn world_mut(&mut self) -> &mut S {
        self.world
    }

    /// Number of live events in the queue.
    pub fn pending_count(&self) -> usize {
        self.queue.len()
    }

    /// Schedule `callback` after `delay`, inheriting the current context.
    pub fn schedule<F>(&mut self, delay: Duration, callback: F) -> SimResult<EventHandle>
    where
        F: FnOnce(&mut SimulationContext<'_, S>) + 'static,
    {
        let context = self.context;
        self.schedule_boxed(context, delay, Box::new(callback))
    }

    /// Schedule `callback` after `delay`, attributed to `context`.
    pub fn schedule_with_context<F>(
        &mut self,
        context: NodeId,
        delay: Duration,
        callback: F,
    ) -> SimResult<EventHandle>
    where
        F: FnOnce(&mut SimulationContext<'_, S>) + 'static,
    {
        self.schedule_boxed(Some(context), delay, Box::new(callback))
    }

    /// Schedule `callback` at the current time, after every event already
    /// queued for this instant.
    pub fn schedule_now<F>(&mut self, callback: F) -> SimResult<EventHandle>
    where
        F: FnOnce(&mut SimulationContext<'_, S>) + 'static,
    {
        self.schedule(Duration::ZERO, callback)
    }

    /// Schedule `callback` at an absolute time, inheriting the current
    /// context. Fails with [`SimError::NegativeDelay`] if `at` is in the
    /// past.
    pub fn schedule_at<F>(&mut self, at: VirtualTime, callback: F) -> SimResult<EventHandle>
    where
        F: FnOnce(&mut SimulationContext<'_, S>) + 'static,
    {
        let result = self
            .control
            .schedule(self.queue, self.now, at, self.context, Box::new(callback));
        self.guard(result)
    }

    /// Schedule a stop event `delay` from now.
    pub fn schedule_stop(&mut self, delay: Duration) -> SimResult<EventHandle> {
        self.schedule_boxed(None, delay, stop_callback())
    }

    /// Stop the run once the current callback returns.
    pub fn stop(&mut self) {
        self.control.request_stop(self.now);
    }

    /// Abort the run with `err` once the current callback returns.
    ///
    /// Only the first fault of a run is kept.
    pub fn abort(&mut self, err: SimError) {
        self.control.record_fault(&err, self.now);
    }

    /// Cancel a pending event. No-op for fired or cancelled handles.
    pub fn cancel(&mut self, handle: EventHandle) -> bool {
        self.control.cancel(self.queue, handle)
    }

    pub fn is_pending(&self, handle: EventHandle) -> bool {
        self.queue.is_pending(handle)
    }

    /// Time remaining until a pending event fires.
    pub fn delay_left(&self, handle: EventHandle) -> Option<Duration> {
        delay_left(self.queue.is_pending(handle), handle, self.now)
    }

    fn schedule_boxed(
        &mut self,
        context: Option<NodeId>,
        delay: Duration,
        callback: Callback<S>,
    ) -> SimResult<EventHandle> {
        let result = self.now.checked_add(delay).and_then(|at| {
            self.control
                .schedule(self.queue, self.now, at, context, callback)
        });
        self.guard(result)
    }

    fn guard<T>(&mut self, result: SimResult<T>) -> SimResult<T> {
        if let Err(err) = &result {
            self.control.record_fault(err, self.now);
        }
        result
    }
}

// ── Simulation ────────────────────────────────────────────────────────

/// Top-level simulation driver.
///
/// Owns the event queue, the virtual clock and the world `S` that
/// callbacks mutate. Seed events with the `schedule*` methods, then call
/// [`run`](Self::run) to drain the queue or [`step`](Self::step) to
/// dispatch one event at a time.
pub struct Simulation<S> {
    queue: EventQueue<S>,
    control: Control,
    now: VirtualTime,
    state: SimState,
    trace: Option<DispatchTrace>,
    world: S,
}

impl<S> Simulation<S> {
    /// Create a simulation at time zero around `world`.
    pub fn new(world: S) -> Self {
        Simulation {
            queue: EventQueue::new(),
            control: Control::default(),
            now: VirtualTime::ZERO,
            state: SimState::Idle,
            trace: None,
            world,
        }
    }

    /// Current virtual time: the time of the most recently dispatched
    /// event, or zero before the first dispatch.
    pub fn now(&self) -> VirtualTime {
        self.now
    }

    pub fn state(&self) -> SimState {
        self.state
    }

    pub fn stats(&self) -> &SimulationStats {
        &self.control.stats
    }

    /// The fault that aborted the last run, if any.
    pub fn fault(&self) -> Option<&SimError> {
        self.control.fault.as_ref()
    }

    /// Total events dispatched so far.
    pub fn events_processed(&self) -> u64 {
        self.control.stats.events_dispatched
    }

    /// Number of live events in the queue.
    pub fn pending_count(&self) -> usize {
        self.queue.len()
    }

    /// Returns `true` if there are no more events to dispatch.
    pub fn is_finished(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn world(&self) -> &S {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut S {
        &mut self.world
    }

    pub fn into_world(self) -> S {
        self.world
    }

    /// Start recording every dispatch into a [`DispatchTrace`].
    pub fn enable_trace(&mut self) {
        if self.trace.is_none() {
            self.trace = Some(DispatchTrace::new());
        }
    }

    pub fn trace(&self) -> Option<&DispatchTrace> {
        self.trace.as_ref()
    }

    // ── Scheduling ────────────────────────────────────────────

    /// Schedule `callback` to run `delay` after the current time.
    pub fn schedule<F>(&mut self, delay: Duration, callback: F) -> SimResult<EventHandle>
    where
        F: FnOnce(&mut SimulationContext<'_, S>) + 'static,
    {
        self.schedule_boxed("schedule", None, delay, Box::new(callback))
    }

    /// Schedule `callback` attributed to `context`.
    pub fn schedule_with_context<F>(
        &mut self,
        context: NodeId,
        delay: Duration,
        callback: F,
    ) -> SimResult<EventHandle>
    where
        F: FnOnce(&mut SimulationContext<'_, S>) + 'static,
    {
        self.schedule_boxed("schedule", Some(context), delay, Box::new(callback))
    }

    /// Schedule `callback` at the current time.
    pub fn schedule_now<F>(&mut self, callback: F) -> SimResult<EventHandle>
    where
        F: FnOnce(&mut SimulationContext<'_, S>) + 'static,
    {
        self.schedule(Duration::ZERO, callback)
    }

    /// Schedule `callback` at an absolute time.
    pub fn schedule_at<F>(&mut self, at: VirtualTime, callback: F) -> SimResult<EventHandle>
    where
        F: FnOnce(&mut SimulationContext<'_, S>) + 'static,
    {
        self.schedule_at_boxed(None, at, Box::new(callback))
    }

    /// Schedule `callback` at an absolute time, attributed to `context`.
    pub fn schedule_at_with_context<F>(
        &mut self,
        context: NodeId,
        at: VirtualTime,
        callback: F,
    ) -> SimResult<EventHandle>
    where
        F: FnOnce(&mut SimulationContext<'_, S>) + 'static,
    {
        self.schedule_at_boxed(Some(context), at, Box::new(callback))
    }

    /// Schedule a stop event `delay` from now.
    ///
    /// Events queued for the same instant before the stop still fire;
    /// anything later stays queued until the next run or `destroy()`.
    pub fn schedule_stop(&mut self, delay: Duration) -> SimResult<EventHandle> {
        self.schedule_boxed("schedule_stop", None, delay, stop_callback())
    }

    /// Schedule a stop event at an absolute time.
    pub fn schedule_stop_at(&mut self, at: VirtualTime) -> SimResult<EventHandle> {
        self.schedule_at_boxed(None, at, stop_callback())
    }

    /// Cancel a pending event. No-op for fired, cancelled or unknown
    /// handles.
    pub fn cancel(&mut self, handle: EventHandle) -> bool {
        self.control.cancel(&mut self.queue, handle)
    }

    /// Whether the referenced event is still waiting to fire.
    pub fn is_pending(&self, handle: EventHandle) -> bool {
        self.queue.is_pending(handle)
    }

    /// Whether the referenced event has fired or been cancelled.
    pub fn is_expired(&self, handle: EventHandle) -> bool {
        !self.queue.is_pending(handle)
    }

    /// Time remaining until a pending event fires.
    pub fn delay_left(&self, handle: EventHandle) -> Option<Duration> {
        delay_left(self.queue.is_pending(handle), handle, self.now)
    }

    fn schedule_boxed(
        &mut self,
        operation: &'static str,
        context: Option<NodeId>,
        delay: Duration,
        callback: Callback<S>,
    ) -> SimResult<EventHandle> {
        self.ensure_alive(operation)?;
        let at = self.now.checked_add(delay)?;
        self.control
            .schedule(&mut self.queue, self.now, at, context, callback)
    }

    fn schedule_at_boxed(
        &mut self,
        context: Option<NodeId>,
        at: VirtualTime,
        callback: Callback<S>,
    ) -> SimResult<EventHandle> {
        self.ensure_alive("schedule")?;
        self.control
            .schedule(&mut self.queue, self.now, at, context, callback)
    }

    // ── Execution ─────────────────────────────────────────────

    /// Run until the queue is empty or a stop event fires.
    ///
    /// Returns the number of events dispatched in this call.
    pub fn run(&mut self) -> SimResult<u64> {
        self.run_inner("run", None)
    }

    /// Run until the queue is empty, a stop event fires, or the next
    /// event lies beyond `limit`.
    pub fn run_until(&mut self, limit: VirtualTime) -> SimResult<u64> {
        self.run_inner("run_until", Some(limit))
    }

    /// Dispatch exactly one event.
    ///
    /// Returns `None` when the queue is empty.
    pub fn step(&mut self) -> SimResult<Option<DispatchRecord>> {
        self.begin("step")?;
        let record = match self.queue.pop_min() {
            Some(event) => Some(self.dispatch(event)),
            None => None,
        };
        self.state = SimState::Stopped;
        match &self.control.fault {
            Some(fault) => Err(fault.clone()),
            None => Ok(record),
        }
    }

    /// Discard every queued event without running it and enter the
    /// terminal `Destroyed` state.
    ///
    /// Returns the number of events discarded; `0` on repeated calls.
    pub fn destroy(&mut self) -> usize {
        if self.state == SimState::Destroyed {
            return 0;
        }
        let discarded = self.queue.clear();
        self.control.stats.events_discarded += discarded as u64;
        self.state = SimState::Destroyed;
        info!(now = %self.now, discarded, "simulation destroyed");
        discarded
    }

    fn ensure_alive(&self, operation: &'static str) -> SimResult<()> {
        if self.state == SimState::Destroyed {
            return Err(SimError::InvalidState {
                operation,
                state: self.state,
            });
        }
        Ok(())
    }

    fn begin(&mut self, operation: &'static str) -> SimResult<()> {
        self.ensure_alive(operation)?;
        if let Some(fault) = &self.control.fault {
            return Err(fault.clone());
        }
        self.control.stop_requested = false;
        self.state = SimState::Running;
        Ok(())
    }

    fn run_inner(&mut self, operation: &'static str, limit: Option<VirtualTime>) -> SimResult<u64> {
        self.begin(operation)?;
        info!(now = %self.now, pending = self.queue.len(), "simulation running");

        let mut dispatched = 0u64;
        while !self.control.stop_requested {
            if let Some(limit) = limit {
                match self.queue.peek_time() {
                    Some(next) if next <= limit => {}
                    _ => break,
                }
            }
            let Some(event) = self.queue.pop_min() else {
                break;
            };
            self.dispatch(event);
            dispatched += 1;

            if let Some(fault) = &self.control.fault {
                self.state = SimState::Stopped;
                return Err(fault.clone());
            }
        }

        self.state = SimState::Stopped;
        info!(
            now = %self.now,
            dispatched,
            pending = self.queue.len(),
            stop_requested = self.control.stop_requested,
            "simulation stopped"
        );
        Ok(dispatched)
    }

    fn dispatch(&mut self, event: Event<S>) -> DispatchRecord {
        debug_assert!(
            event.scheduled_at >= self.now,
            "time went backward: now={}, event={}",
            self.now,
            event.scheduled_at
        );
        self.now = event.scheduled_at;

        let record = DispatchRecord {
            index: self.control.stats.events_dispatched,
            event_id: event.id,
            time: self.now,
            context: event.context,
        };
        self.control.stats.events_dispatched += 1;
        if let Some(trace) = &mut self.trace {
            trace.record(record);
        }
        trace!(event = %event.id, now = %self.now, context = ?event.context, "dispatching event");

        let mut ctx = SimulationContext {
            queue: &mut self.queue,
            control: &mut self.control,
            now: self.now,
            context: event.context,
            world: &mut self.world,
        };
        event.fire(&mut ctx);
        record
    }
}

impl<S: Default> Default for Simulation<S> {
    fn default() -> Self {
        Self::new(S::default())
    }
}

impl<S: fmt::Debug> fmt::Debug for Simulation<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Simulation")
            .field("now", &self.now)
            .field("state", &self.state)
            .field("queue", &self.queue)
            .field("stats", &self.control.stats)
            .field("world", &self.world)
            .finish()
    }
}
