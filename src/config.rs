//! Run configuration loaded from TOML.
//!
//! ```toml
//! stop_time = 10.0
//! record_trace = true
//!
//! [channel]
//! delay = 0.002
//! jitter = 0.0
//! loss_rate = 0.01
//! data_rate = 5000000
//! seed = 42
//! ```
//!
//! Times are seconds as floats; every field is optional.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::SimResult;
use crate::event::EventHandle;
use crate::node::ChannelConfig;
use crate::simulation::Simulation;
use crate::time::VirtualTime;

// ── Errors ────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("invalid value for `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

// ── Config structs ────────────────────────────────────────────────────

/// Top-level run configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulationConfig {
    /// Stop the run at this absolute time, in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_time: Option<f64>,
    /// Record a dispatch trace.
    pub record_trace: bool,
    pub channel: ChannelSection,
}

/// The `[channel]` table: characteristics of every link plus the RNG
/// seed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChannelSection {
    pub delay: f64,
    pub jitter: f64,
    pub loss_rate: f64,
    /// Bits per second; absent means infinitely fast.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_rate: Option<u64>,
    pub seed: u64,
}

impl Default for ChannelSection {
    fn default() -> Self {
        ChannelSection {
            delay: 0.0,
            jitter: 0.0,
            loss_rate: 0.0,
            data_rate: None,
            seed: 0,
        }
    }
}

impl SimulationConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: SimulationConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(stop) = self.stop_time {
            seconds("stop_time", stop)?;
        }
        seconds("channel.delay", self.channel.delay)?;
        seconds("channel.jitter", self.channel.jitter)?;

        let loss = self.channel.loss_rate;
        if !(0.0..=1.0).contains(&loss) {
            return Err(ConfigError::Invalid {
                field: "channel.loss_rate",
                reason: format!("{} is outside [0, 1]", loss),
            });
        }
        if self.channel.data_rate == Some(0) {
            return Err(ConfigError::Invalid {
                field: "channel.data_rate",
                reason: "must be positive".to_string(),
            });
        }
        Ok(())
    }

    /// The configured stop as an absolute virtual time.
    pub fn stop_at(&self) -> Option<VirtualTime> {
        self.stop_time.and_then(VirtualTime::try_from_secs_f64)
    }

    /// Schedule the configured stop and enable trace recording.
    ///
    /// Returns the stop event's handle when a stop time is set. Fails with
    /// `NegativeDelay` if the simulation is already past the stop time.
    pub fn apply<S>(&self, sim: &mut Simulation<S>) -> SimResult<Option<EventHandle>> {
        if self.record_trace {
            sim.enable_trace();
        }
        self.stop_at()
            .map(|at| sim.schedule_stop_at(at))
            .transpose()
    }

    /// Link characteristics for the application layer.
    pub fn channel_config(&self) -> ChannelConfig {
        let c = &self.channel;
        ChannelConfig {
            delay: Duration::try_from_secs_f64(c.delay).unwrap_or(Duration::ZERO),
            jitter: Duration::try_from_secs_f64(c.jitter).unwrap_or(Duration::ZERO),
            loss_rate: c.loss_rate,
            data_rate: c.data_rate,
        }
    }

    pub fn seed(&self) -> u64 {
        self.channel.seed
    }
}

fn seconds(field: &'static str, value: f64) -> Result<Duration, ConfigError> {
    if !value.is_finite() || value < 0.0 {
        return Err(ConfigError::Invalid {
            field,
            reason: format!("{} is not a non-negative number of seconds", value),
        });
    }
    Duration::try_from_secs_f64(value).map_err(|e| ConfigError::Invalid {
        field,
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SimError;

    const SAMPLE: &str = r#"
        stop_time = 10.0
        record_trace = true

        [channel]
        delay = 0.002
        loss_rate = 0.25
        data_rate = 5000000
        seed = 42
    "#;

    #[test]
    fn test_parse_sample() {
        let config = SimulationConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.stop_time, Some(10.0));
        assert!(config.record_trace);
        assert_eq!(config.seed(), 42);

        let channel = config.channel_config();
        assert_eq!(channel.delay, Duration::from_millis(2));
        assert_eq!(channel.jitter, Duration::ZERO);
        assert_eq!(channel.loss_rate, 0.25);
        assert_eq!(channel.data_rate, Some(5_000_000));
    }

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = SimulationConfig::from_toml_str("").unwrap();
        assert_eq!(config, SimulationConfig::default());
        assert_eq!(config.stop_at(), None);
        assert_eq!(config.channel_config(), ChannelConfig::ideal());
    }

    #[test]
    fn test_rejects_bad_values() {
        let cases = [
            ("stop_time = -1.0", "stop_time"),
            ("[channel]\nloss_rate = 1.5", "channel.loss_rate"),
            ("[channel]\ndelay = -0.5", "channel.delay"),
            ("[channel]\ndata_rate = 0", "channel.data_rate"),
        ];
        for (doc, expected) in cases {
            match SimulationConfig::from_toml_str(doc) {
                Err(ConfigError::Invalid { field, .. }) => assert_eq!(field, expected, "{}", doc),
                other => panic!("expected invalid {} for {:?}, got {:?}", expected, doc, other),
            }
        }
    }

    #[test]
    fn test_rejects_unknown_and_malformed() {
        assert!(matches!(
            SimulationConfig::from_toml_str("stop = 3"),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            SimulationConfig::from_toml_str("stop_time = \"soon\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_load_missing_file() {
        let err = SimulationConfig::load("/nonexistent/evsim.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn test_toml_round_trip() {
        let config = SimulationConfig::from_toml_str(SAMPLE).unwrap();
        let text = config.to_toml_string().unwrap();
        assert_eq!(SimulationConfig::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn test_apply_schedules_stop_and_trace() {
        let config = SimulationConfig::from_toml_str(SAMPLE).unwrap();
        let mut sim = Simulation::new(0u32);
        let stop = config.apply(&mut sim).unwrap().unwrap();
        assert_eq!(stop.scheduled_at(), VirtualTime::from_secs(10));

        sim.schedule(Duration::from_secs(4), |ctx| *ctx.world_mut() += 1)
            .unwrap();
        sim.schedule(Duration::from_secs(12), |ctx| *ctx.world_mut() += 10)
            .unwrap();
        sim.run().unwrap();

        assert_eq!(*sim.world(), 1);
        assert_eq!(sim.now(), VirtualTime::from_secs(10));
        assert_eq!(sim.trace().unwrap().len(), 2);
    }

    #[test]
    fn test_apply_after_start_keeps_absolute_stop() {
        let config = SimulationConfig::from_toml_str("stop_time = 10.0").unwrap();
        let mut sim = Simulation::new(0u32);
        sim.schedule(Duration::from_secs(3), |_| {}).unwrap();
        sim.run().unwrap();
        assert_eq!(sim.now(), VirtualTime::from_secs(3));

        let stop = config.apply(&mut sim).unwrap().unwrap();
        assert_eq!(stop.scheduled_at(), VirtualTime::from_secs(10));
        sim.schedule(Duration::from_secs(20), |ctx| *ctx.world_mut() += 1)
            .unwrap();
        sim.run().unwrap();
        assert_eq!(sim.now(), VirtualTime::from_secs(10));
        assert_eq!(*sim.world(), 0);
    }

    #[test]
    fn test_apply_past_stop_time_is_rejected() {
        let config = SimulationConfig::from_toml_str("stop_time = 1.0").unwrap();
        let mut sim = Simulation::new(0u32);
        sim.schedule(Duration::from_secs(2), |_| {}).unwrap();
        sim.run().unwrap();
        assert!(matches!(
            config.apply(&mut sim),
            Err(SimError::NegativeDelay { .. })
        ));
    }
}
