//! Dispatch trace for replay verification.
//!
//! Records every dispatched event into an append-only log. Two runs fed
//! the same scheduling calls must produce equal traces; `trace_hash`
//! condenses a trace into one value for cheap comparison.

use serde::{Deserialize, Serialize};

use crate::event::EventId;
use crate::node::NodeId;
use crate::time::VirtualTime;

// ── Hash utility ──────────────────────────────────────────────────────

/// Combine two u64 hashes deterministically.
pub fn hash_combine(a: u64, b: u64) -> u64 {
    let mut h = a;
    h = h.wrapping_mul(0x517cc1b727220a95);
    h = h.wrapping_add(b);
    h ^= h >> 32;
    h
}

// ── Dispatch record ───────────────────────────────────────────────────

/// One dispatched event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchRecord {
    /// Position in dispatch order, starting at 0.
    pub index: u64,
    pub event_id: EventId,
    pub time: VirtualTime,
    pub context: Option<NodeId>,
}

impl std::fmt::Display for DispatchRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.context {
            Some(node) => write!(f, "[#{} {} {}] {}", self.index, self.time, node, self.event_id),
            None => write!(f, "[#{} {} -] {}", self.index, self.time, self.event_id),
        }
    }
}

// ── Dispatch trace ────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchTrace {
    records: Vec<DispatchRecord>,
}

impl DispatchTrace {
    pub fn new() -> Self {
        DispatchTrace {
            records: Vec::new(),
        }
    }

    pub fn record(&mut self, record: DispatchRecord) {
        self.records.push(record);
    }

    pub fn records(&self) -> &[DispatchRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Deterministic hash over dispatch order, times and contexts.
    pub fn trace_hash(&self) -> u64 {
        let mut h: u64 = 0;
        for r in &self.records {
            h = hash_combine(h, r.event_id.raw());
            h = hash_combine(h, r.time.as_nanos());
            h = hash_combine(h, r.context.map_or(0, |n| n.raw().wrapping_add(1)));
        }
        h
    }
}

/// Compare two traces for identical dispatch order, times and contexts.
pub fn traces_match(a: &DispatchTrace, b: &DispatchTrace) -> bool {
    a.records == b.records
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(contexts: &[Option<u64>]) -> DispatchTrace {
        let mut t = DispatchTrace::new();
        for (i, c) in contexts.iter().enumerate() {
            t.record(DispatchRecord {
                index: i as u64,
                event_id: EventId::new(i as u64),
                time: VirtualTime::from_millis(i as u64 * 5),
                context: c.map(NodeId::new),
            });
        }
        t
    }

    #[test]
    fn test_hash_determinism() {
        assert_eq!(hash_combine(42, 99), hash_combine(42, 99));
        assert_ne!(hash_combine(42, 99), hash_combine(42, 100));
    }

    #[test]
    fn test_trace_hash_determinism() {
        let a = sample(&[None, Some(0), Some(1)]);
        let b = sample(&[None, Some(0), Some(1)]);
        assert_eq!(a.trace_hash(), b.trace_hash());
        assert!(traces_match(&a, &b));
    }

    #[test]
    fn test_trace_hash_sees_context() {
        // Node 0 must not hash like "no context".
        let a = sample(&[None, None]);
        let b = sample(&[None, Some(0)]);
        assert_ne!(a.trace_hash(), b.trace_hash());
        assert!(!traces_match(&a, &b));
    }

    #[test]
    fn test_trace_survives_toml() {
        let trace = sample(&[Some(0), Some(2), Some(1)]);
        let text = toml::to_string(&trace).unwrap();
        let back: DispatchTrace = toml::from_str(&text).unwrap();
        assert!(traces_match(&trace, &back));
        assert_eq!(back.trace_hash(), trace.trace_hash());
    }

    #[test]
    fn test_record_display() {
        let t = sample(&[Some(3)]);
        assert_eq!(t.records()[0].to_string(), "[#0 T=0.000000000s N3] E#0");
    }
}
