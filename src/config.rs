use serde::{Deserialize, Serialize};
use std::{fs::File, io::BufReader, path::Path, time::Duration};

use crate::error::ConfigError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Fraction of the cycle's compute limit at which remaining units are skipped.
    #[serde(default = "default_emergency_threshold")]
    pub emergency_threshold: f64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            emergency_threshold: default_emergency_threshold(),
        }
    }
}

impl SchedulerConfig {
    pub fn with_emergency_threshold(emergency_threshold: f64) -> Self {
        Self {
            emergency_threshold,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let threshold = self.emergency_threshold;
        // NaN fails both comparisons
        if !(threshold > 0.0 && threshold <= 1.0) {
            return Err(ConfigError::InvalidThreshold(threshold));
        }
        Ok(())
    }
}

/// Settings for the wall-clock simulation driven by the `tickcore` binary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    #[serde(default = "default_cycles")]
    pub cycles: u64,

    #[serde(default = "default_cpu_limit_ms")]
    pub cpu_limit_ms: f64,

    #[serde(default = "default_bucket")]
    pub bucket: f64,

    #[serde(default = "default_tick_interval", with = "duration_ms")]
    pub tick_interval: Duration,

    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            cycles: default_cycles(),
            cpu_limit_ms: default_cpu_limit_ms(),
            bucket: default_bucket(),
            tick_interval: default_tick_interval(),
            scheduler: SchedulerConfig::default(),
        }
    }
}

impl SimulationConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config: Self = from_file(path)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_interval.is_zero() {
            return Err(ConfigError::InvalidTickInterval);
        }
        self.scheduler.validate()
    }
}

pub fn from_file<T: for<'de> Deserialize<'de>, P: AsRef<Path>>(path: P) -> Result<T, ConfigError> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let config = serde_json::from_reader(reader)?;
    Ok(config)
}

pub fn from_str<T: for<'de> Deserialize<'de>>(s: &str) -> Result<T, ConfigError> {
    let config = serde_json::from_str(s)?;
    Ok(config)
}

fn default_emergency_threshold() -> f64 {
    0.9
}
fn default_cycles() -> u64 {
    10
}
fn default_cpu_limit_ms() -> f64 {
    20.0
}
fn default_bucket() -> f64 {
    10_000.0
}
fn default_tick_interval() -> Duration {
    Duration::from_millis(100)
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
