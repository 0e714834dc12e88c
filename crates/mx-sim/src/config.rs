//! Simulation settings.
//!
//! Read from the `[simulation]` section of the beamline configuration file:
//!
//! ```toml
//! [simulation]
//! mode = "realistic"
//! motor_speed_deg_per_sec = 45.0
//! ramp_rate_k_per_sec = 2.0
//! ```

use crate::common::{ErrorConfig, MockMode};
use mx_core::{MxError, MxResult};
use serde::{Deserialize, Serialize};
use serde_valid::Validate;

/// Configuration for the simulated control system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct SimConfig {
    /// Timing mode
    pub mode: MockMode,
    /// Motor record speed in user units per second
    #[validate(exclusive_minimum = 0.0)]
    pub motor_speed_deg_per_sec: f64,
    /// Cryostream ramp rate in kelvin per second
    #[validate(exclusive_minimum = 0.0)]
    pub ramp_rate_k_per_sec: f64,
    /// Random failure rate applied in chaos mode
    #[validate(minimum = 0.0)]
    #[validate(maximum = 1.0)]
    pub failure_rate: f64,
    /// RNG seed for reproducible chaos runs
    pub seed: Option<u64>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            mode: MockMode::Instant,
            motor_speed_deg_per_sec: 30.0,
            ramp_rate_k_per_sec: 5.0,
            failure_rate: 0.05,
            seed: None,
        }
    }
}

impl SimConfig {
    /// Default settings in the given mode.
    pub fn with_mode(mode: MockMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    /// Schema validation, reported as a configuration error.
    pub fn check(&self) -> MxResult<()> {
        self.validate()
            .map_err(|errors| MxError::Configuration(format!("simulation: {}", errors)))
    }

    /// Fault injection implied by the mode.
    pub fn error_config(&self) -> ErrorConfig {
        match self.mode {
            MockMode::Chaos => ErrorConfig::random_failures_seeded(self.failure_rate, self.seed),
            MockMode::Instant | MockMode::Realistic => ErrorConfig::none(),
        }
    }
}
