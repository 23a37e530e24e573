//! Structured error types for the simulation kernel.
//!
//! All fallible public APIs return `Result<T, SimError>`. Kernel errors
//! (`NegativeDelay`, `InvalidState`, `Overflow`) are programming errors in
//! the calling scenario and terminate the run they occur in; the remaining
//! variants come from the application layer.

use std::time::Duration;

use thiserror::Error;

use crate::node::{Address, AppId, NodeId};
use crate::simulation::SimState;
use crate::time::VirtualTime;

/// The top-level error type for the simulation kernel.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SimError {
    // ── Kernel errors ─────────────────────────────────────

    /// Attempted to schedule an event before the current virtual time.
    #[error("cannot schedule event at {requested} when current time is {now}")]
    NegativeDelay {
        requested: VirtualTime,
        now: VirtualTime,
    },

    /// Scheduling or running after the simulation was destroyed.
    #[error("cannot {operation} a simulation that is {state}")]
    InvalidState {
        operation: &'static str,
        state: SimState,
    },

    /// Virtual time arithmetic left the representable range.
    #[error("virtual time overflow: {base} + {delay:?}")]
    Overflow { base: VirtualTime, delay: Duration },

    // ── Application layer errors ──────────────────────────

    /// A node id was referenced but never added to the network.
    #[error("node {0} not found")]
    UnknownNode(NodeId),

    /// An application id was referenced but is not installed.
    #[error("application {0} not found")]
    UnknownApp(AppId),

    /// Two applications tried to bind the same address.
    #[error("address {0} is already bound")]
    AddressInUse(Address),
}

impl SimError {
    /// Returns `true` for errors that abort the run they occur in.
    pub fn is_kernel_fault(&self) -> bool {
        matches!(
            self,
            SimError::NegativeDelay { .. } | SimError::InvalidState { .. } | SimError::Overflow { .. }
        )
    }
}

/// Convenience alias for `Result<T, SimError>`.
pub type SimResult<T> = Result<T, SimError>;
