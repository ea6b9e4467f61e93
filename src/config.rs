//! Runtime configuration, loaded from TOML.
//!
//! Every section has defaults, so a partial file (or none at all) is valid.
//! The cycle cadence is not configured here; it is fixed at build time by
//! the `hootl` feature.

use crate::error::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Body rate magnitude, rad/s, at or above which the spacecraft is
    /// considered tumbling.
    pub max_stable_rate: f32,
    /// Cycles spent in startup before the first health evaluation.
    pub startup_wait_cycles: u32,
    /// Longest a detumble may take before the supervisor gives up.
    pub detumble_timeout_s: f64,
    /// Bounded wait for detumble completion requested from initialization hold.
    pub init_hold_detumble_wait_s: f64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            max_stable_rate: 0.2,
            startup_wait_cycles: 50,
            detumble_timeout_s: 1_800.0,
            init_hold_detumble_wait_s: 120.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Capacity of each device message queue.
    pub queue_depth: usize,
    /// Cycles without a message after which a device reports `Unknown`.
    pub stale_cycles: u32,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            queue_depth: 16,
            stale_cycles: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownlinkConfig {
    /// A frame is produced every this many cycles.
    pub period_cycles: u32,
    /// Frames buffered for the radio before new ones are dropped.
    pub queue_depth: usize,
}

impl Default for DownlinkConfig {
    fn default() -> Self {
        Self {
            period_cycles: 10,
            queue_depth: 8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UplinkConfig {
    pub queue_depth: usize,
    /// Packets applied per cycle at most; the rest wait for later cycles.
    pub max_packets_per_cycle: usize,
}

impl Default for UplinkConfig {
    fn default() -> Self {
        Self {
            queue_depth: 8,
            max_packets_per_cycle: 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Image file backing the non-volatile store.
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("satcore-store.img"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FlightConfig {
    pub supervisor: SupervisorConfig,
    pub devices: DeviceConfig,
    pub downlink: DownlinkConfig,
    pub uplink: UplinkConfig,
    pub store: StoreConfig,
}

impl FlightConfig {
    pub fn from_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));

        let positive = |v: f64| v.is_finite() && v > 0.0;
        if !positive(f64::from(self.supervisor.max_stable_rate)) {
            return invalid("supervisor.max_stable_rate must be positive");
        }
        if !positive(self.supervisor.detumble_timeout_s)
            || !positive(self.supervisor.init_hold_detumble_wait_s)
        {
            return invalid("supervisor timeouts must be positive");
        }
        if self.downlink.period_cycles == 0 {
            return invalid("downlink.period_cycles must be at least 1");
        }
        if self.devices.queue_depth == 0
            || self.downlink.queue_depth == 0
            || self.uplink.queue_depth == 0
        {
            return invalid("queue depths must be at least 1");
        }
        Ok(())
    }
}
