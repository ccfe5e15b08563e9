//! Engine configuration.
//!
//! All tuning knobs live here: ledger capacities, optimizer thresholds and
//! bounds, monitor retention. Everything defaults to the documented
//! constants and is checked by [`EngineConfig::validate`] before an engine
//! is built; a config that fails validation never reaches the simulation.
//!
//! Behind the `config-loader` feature, configs load from JSON. The JSON
//! layer works in plain `f64`/`u64` and resolves resource names through
//! [`ResourceType::from_name`], so unknown resource strings are rejected at
//! the boundary instead of leaking inward.

use crate::error::FlowError;
use crate::fixed::Fixed64;
use crate::resource::{PerResource, ResourceType};
use crate::sim::SimTime;

// ---------------------------------------------------------------------------
// Optimizer configuration
// ---------------------------------------------------------------------------

/// Thresholds and bounds for the per-tick optimizer pass.
///
/// Utilization (`current / capacity`) is compared against three thresholds.
/// Interval adjustments are bounded by `[interval_floor, interval_ceiling]`
/// so repeated passes cannot oscillate a task out of its useful range.
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizerConfig {
    /// Below this utilization, a resource is underfull.
    pub low: Fixed64,
    /// Above this utilization, a resource is overfull.
    pub high: Fixed64,
    /// Below this utilization, a resource is critically scarce and
    /// production is actively boosted.
    pub critical: Fixed64,
    /// Shortest interval the optimizer may assign.
    pub interval_floor: SimTime,
    /// Longest interval the optimizer may assign.
    pub interval_ceiling: SimTime,
    /// Fraction by which an interval moves per adjustment.
    pub adjust_step: Fixed64,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            low: Fixed64::from_num(0.2),
            high: Fixed64::from_num(0.8),
            critical: Fixed64::from_num(0.1),
            interval_floor: 1,
            interval_ceiling: 600_000,
            adjust_step: Fixed64::from_num(0.25),
        }
    }
}

impl OptimizerConfig {
    pub fn validate(&self) -> Result<(), FlowError> {
        let one = Fixed64::from_num(1);
        for (name, value) in [
            ("low", self.low),
            ("high", self.high),
            ("critical", self.critical),
        ] {
            if value <= Fixed64::ZERO || value >= one {
                return Err(FlowError::Configuration(format!(
                    "threshold {name} must be strictly between 0 and 1, got {value}"
                )));
            }
        }
        if self.critical > self.low {
            return Err(FlowError::Configuration(format!(
                "critical threshold {} must not exceed low threshold {}",
                self.critical, self.low
            )));
        }
        if self.low >= self.high {
            return Err(FlowError::Configuration(format!(
                "low threshold {} must be below high threshold {}",
                self.low, self.high
            )));
        }
        if self.interval_floor == 0 {
            return Err(FlowError::Configuration(
                "interval_floor must be at least 1".into(),
            ));
        }
        if self.interval_floor > self.interval_ceiling {
            return Err(FlowError::Configuration(format!(
                "interval_floor {} exceeds interval_ceiling {}",
                self.interval_floor, self.interval_ceiling
            )));
        }
        if self.adjust_step <= Fixed64::ZERO || self.adjust_step >= one {
            return Err(FlowError::Configuration(format!(
                "adjust_step must be strictly between 0 and 1, got {}",
                self.adjust_step
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Monitor configuration
// ---------------------------------------------------------------------------

/// Retention settings for the performance monitor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorConfig {
    /// Snapshots retained in the FIFO history.
    pub history_capacity: usize,
    /// Window size in ticks for rolling production/consumption rates.
    pub rate_window: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            history_capacity: 256,
            rate_window: 60,
        }
    }
}

impl MonitorConfig {
    pub fn validate(&self) -> Result<(), FlowError> {
        if self.history_capacity == 0 {
            return Err(FlowError::Configuration(
                "history_capacity must be at least 1".into(),
            ));
        }
        if self.rate_window == 0 {
            return Err(FlowError::Configuration(
                "rate_window must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Engine configuration
// ---------------------------------------------------------------------------

/// Full engine configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Initial ledger capacity per resource type.
    pub capacities: PerResource<Fixed64>,
    pub optimizer: OptimizerConfig,
    pub monitor: MonitorConfig,
    /// Ring-buffer capacity per event topic.
    pub event_capacity: usize,
    /// Applied-change history entries retained for diagnostics. 0 disables.
    pub change_history: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            capacities: PerResource::splat(Fixed64::from_num(1000)),
            optimizer: OptimizerConfig::default(),
            monitor: MonitorConfig::default(),
            event_capacity: 1024,
            change_history: 0,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), FlowError> {
        for resource in ResourceType::ALL {
            if self.capacities[resource] < Fixed64::ZERO {
                return Err(FlowError::Configuration(format!(
                    "{resource} capacity must not be negative, got {}",
                    self.capacities[resource]
                )));
            }
        }
        self.optimizer.validate()?;
        self.monitor.validate()?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// JSON loading (config-loader feature)
// ---------------------------------------------------------------------------

#[cfg(feature = "config-loader")]
pub use loader::ConfigLoadError;

#[cfg(feature = "config-loader")]
mod loader {
    use std::collections::HashMap;
    use std::path::Path;

    use super::{EngineConfig, MonitorConfig, OptimizerConfig};
    use crate::error::FlowError;
    use crate::fixed::Fixed64;
    use crate::resource::ResourceType;

    /// Errors that can occur while loading a configuration file.
    #[derive(Debug, thiserror::Error)]
    pub enum ConfigLoadError {
        #[error("io error: {0}")]
        Io(#[from] std::io::Error),
        #[error("JSON parse error: {0}")]
        Parse(#[from] serde_json::Error),
        #[error("invalid configuration: {0}")]
        Invalid(#[from] FlowError),
    }

    /// JSON mirror of [`EngineConfig`]. Absent fields keep their defaults.
    #[derive(Debug, Default, serde::Deserialize)]
    struct EngineConfigData {
        #[serde(default)]
        capacities: HashMap<String, f64>,
        #[serde(default)]
        optimizer: OptimizerData,
        #[serde(default)]
        monitor: MonitorData,
        event_capacity: Option<usize>,
        change_history: Option<usize>,
    }

    #[derive(Debug, Default, serde::Deserialize)]
    struct OptimizerData {
        low: Option<f64>,
        high: Option<f64>,
        critical: Option<f64>,
        interval_floor: Option<u64>,
        interval_ceiling: Option<u64>,
        adjust_step: Option<f64>,
    }

    #[derive(Debug, Default, serde::Deserialize)]
    struct MonitorData {
        history_capacity: Option<usize>,
        rate_window: Option<usize>,
    }

    fn build(data: EngineConfigData) -> Result<EngineConfig, ConfigLoadError> {
        let mut config = EngineConfig::default();

        for (name, value) in &data.capacities {
            let resource = ResourceType::from_name(name)?;
            config.capacities[resource] = Fixed64::from_num(*value);
        }

        let opt = &data.optimizer;
        let defaults = OptimizerConfig::default();
        config.optimizer = OptimizerConfig {
            low: opt.low.map(Fixed64::from_num).unwrap_or(defaults.low),
            high: opt.high.map(Fixed64::from_num).unwrap_or(defaults.high),
            critical: opt
                .critical
                .map(Fixed64::from_num)
                .unwrap_or(defaults.critical),
            interval_floor: opt.interval_floor.unwrap_or(defaults.interval_floor),
            interval_ceiling: opt.interval_ceiling.unwrap_or(defaults.interval_ceiling),
            adjust_step: opt
                .adjust_step
                .map(Fixed64::from_num)
                .unwrap_or(defaults.adjust_step),
        };

        let mon = &data.monitor;
        let defaults = MonitorConfig::default();
        config.monitor = MonitorConfig {
            history_capacity: mon.history_capacity.unwrap_or(defaults.history_capacity),
            rate_window: mon.rate_window.unwrap_or(defaults.rate_window),
        };

        if let Some(capacity) = data.event_capacity {
            config.event_capacity = capacity;
        }
        if let Some(history) = data.change_history {
            config.change_history = history;
        }

        config.validate()?;
        Ok(config)
    }

    impl EngineConfig {
        /// Load a configuration from a JSON string.
        pub fn from_json_str(json: &str) -> Result<Self, ConfigLoadError> {
            let data: EngineConfigData = serde_json::from_str(json)?;
            build(data)
        }

        /// Load a configuration from a JSON file.
        pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigLoadError> {
            let json = std::fs::read_to_string(path)?;
            Self::from_json_str(&json)
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixed::f64_to_fixed64 as fx;

    // -----------------------------------------------------------------------
    // Test 1: defaults_match_documented_constants
    // -----------------------------------------------------------------------
    #[test]
    fn defaults_match_documented_constants() {
        let config = EngineConfig::default();
        assert_eq!(config.optimizer.low, fx(0.2));
        assert_eq!(config.optimizer.high, fx(0.8));
        assert_eq!(config.optimizer.critical, fx(0.1));
        assert_eq!(config.optimizer.adjust_step, fx(0.25));
        assert_eq!(config.monitor.history_capacity, 256);
        assert_eq!(config.monitor.rate_window, 60);
        config.validate().unwrap();
    }

    // -----------------------------------------------------------------------
    // Test 2: threshold_ordering_enforced
    // -----------------------------------------------------------------------
    #[test]
    fn threshold_ordering_enforced() {
        let mut config = EngineConfig::default();
        config.optimizer.critical = fx(0.3); // above low
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.optimizer.low = fx(0.8); // not below high
        assert!(config.validate().is_err());
    }

    // -----------------------------------------------------------------------
    // Test 3: thresholds_must_sit_inside_unit_interval
    // -----------------------------------------------------------------------
    #[test]
    fn thresholds_must_sit_inside_unit_interval() {
        let mut config = EngineConfig::default();
        config.optimizer.critical = fx(0.0);
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.optimizer.high = fx(1.0);
        assert!(config.validate().is_err());
    }

    // -----------------------------------------------------------------------
    // Test 4: interval_bounds_enforced
    // -----------------------------------------------------------------------
    #[test]
    fn interval_bounds_enforced() {
        let mut config = EngineConfig::default();
        config.optimizer.interval_floor = 0;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.optimizer.interval_floor = 100;
        config.optimizer.interval_ceiling = 50;
        assert!(config.validate().is_err());
    }

    // -----------------------------------------------------------------------
    // Test 5: step_and_retention_bounds
    // -----------------------------------------------------------------------
    #[test]
    fn step_and_retention_bounds() {
        let mut config = EngineConfig::default();
        config.optimizer.adjust_step = fx(1.0);
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.monitor.history_capacity = 0;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.monitor.rate_window = 0;
        assert!(config.validate().is_err());
    }

    // -----------------------------------------------------------------------
    // Test 6: negative_capacity_rejected
    // -----------------------------------------------------------------------
    #[test]
    fn negative_capacity_rejected() {
        let mut config = EngineConfig::default();
        config.capacities[ResourceType::Gas] = fx(-1.0);
        assert!(matches!(
            config.validate(),
            Err(FlowError::Configuration(_))
        ));
    }
}
