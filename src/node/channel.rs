//! Point-to-point channel model.
//!
//! Each directed link owns a `Channel` that decides, per packet, whether
//! the packet is lost and how long it takes to arrive. Randomness comes
//! from a seeded `ChaCha8Rng`, so equal seeds give equal decisions.

use std::time::Duration;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::time::VirtualTime;

// ── Channel Config ────────────────────────────────────────────────────

/// Link characteristics.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelConfig {
    /// Propagation delay applied to every packet.
    pub delay: Duration,
    /// Upper bound of uniform random jitter added on top of `delay`.
    pub jitter: Duration,
    /// Probability in `[0, 1]` that a packet is lost.
    pub loss_rate: f64,
    /// Link rate in bits per second. `None` means infinitely fast.
    pub data_rate: Option<u64>,
}

impl ChannelConfig {
    /// No delay, no loss, infinite rate.
    pub fn ideal() -> Self {
        ChannelConfig {
            delay: Duration::ZERO,
            jitter: Duration::ZERO,
            loss_rate: 0.0,
            data_rate: None,
        }
    }

    /// A lossless link with the given delay and rate.
    pub fn point_to_point(delay: Duration, data_rate: u64) -> Self {
        ChannelConfig {
            delay,
            data_rate: Some(data_rate),
            ..Self::ideal()
        }
    }

    /// Set the loss probability, clamped to `[0, 1]`.
    pub fn with_loss(mut self, loss_rate: f64) -> Self {
        self.loss_rate = if loss_rate.is_nan() {
            0.0
        } else {
            loss_rate.clamp(0.0, 1.0)
        };
        self
    }

    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    /// Time to put `size` bytes on the wire, rounded up to whole
    /// nanoseconds.
    pub fn transmission_time(&self, size: u32) -> Duration {
        match self.data_rate {
            Some(rate) if rate > 0 => {
                let bits = u128::from(size) * 8;
                let rate = u128::from(rate);
                let nanos = (bits * 1_000_000_000 + rate - 1) / rate;
                Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
            }
            _ => Duration::ZERO,
        }
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self::ideal()
    }
}

// ── Channel Decision ──────────────────────────────────────────────────

/// Outcome of one transmission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelDecision {
    /// The packet arrives `latency` after it was sent.
    Deliver { latency: Duration },
    Lost,
}

// ── Channel ───────────────────────────────────────────────────────────

/// One direction of a link.
///
/// Packets are serialized back to back: a packet sent while the previous
/// one is still on the wire waits for it.
#[derive(Debug, Clone)]
pub struct Channel {
    config: ChannelConfig,
    rng: ChaCha8Rng,
    busy_until: VirtualTime,
}

impl Channel {
    pub fn new(config: ChannelConfig, seed: u64) -> Self {
        Channel {
            config,
            rng: ChaCha8Rng::seed_from_u64(seed),
            busy_until: VirtualTime::ZERO,
        }
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    /// Decide the fate of a `size`-byte packet sent at `now`.
    pub fn transmit(&mut self, now: VirtualTime, size: u32) -> ChannelDecision {
        let tx = self.config.transmission_time(size);
        let queued = self.busy_until.duration_since(now).unwrap_or(Duration::ZERO);
        let on_wire = queued.saturating_add(tx);
        self.busy_until = now.checked_add(on_wire).unwrap_or(VirtualTime::MAX);

        // A lost packet still occupies the sender's link.
        if self.draw_loss() {
            return ChannelDecision::Lost;
        }

        let latency = on_wire
            .saturating_add(self.config.delay)
            .saturating_add(self.draw_jitter());
        ChannelDecision::Deliver { latency }
    }

    fn draw_loss(&mut self) -> bool {
        let p = self.config.loss_rate;
        if p >= 1.0 {
            true
        } else if p > 0.0 {
            self.rng.gen_bool(p)
        } else {
            false
        }
    }

    fn draw_jitter(&mut self) -> Duration {
        let max = u64::try_from(self.config.jitter.as_nanos()).unwrap_or(u64::MAX);
        if max == 0 {
            return Duration::ZERO;
        }
        Duration::from_nanos(self.rng.gen_range(0..=max))
    }
}
