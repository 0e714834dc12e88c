//! Timing configuration for realistic mode.
//!
//! Defines hardware-like delays for the simulated records.

use std::time::Duration;

/// Timing configuration for realistic mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimingConfig {
    /// Interval between readback updates while a record is active
    pub update_interval_ms: u64,
    /// Settling time after motion ends, before done-move is raised
    pub settling_time_ms: u64,
    /// Channel access round-trip delay for `get`/`put`
    pub communication_delay_ms: u64,
}

impl TimingConfig {
    /// Timing for motor records
    pub fn motor() -> Self {
        Self {
            update_interval_ms: 20,
            settling_time_ms: 50,
            communication_delay_ms: 2,
        }
    }

    /// Timing for the cryostream ramp record
    pub fn cryostream() -> Self {
        Self {
            update_interval_ms: 100,
            settling_time_ms: 0,
            communication_delay_ms: 2,
        }
    }

    /// Update interval as a duration, never zero.
    pub fn update_interval(&self) -> Duration {
        Duration::from_millis(self.update_interval_ms.max(1))
    }

    /// Settling time as a duration.
    pub fn settling_time(&self) -> Duration {
        Duration::from_millis(self.settling_time_ms)
    }

    /// Round-trip delay as a duration.
    pub fn communication_delay(&self) -> Duration {
        Duration::from_millis(self.communication_delay_ms)
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            update_interval_ms: 0,
            settling_time_ms: 0,
            communication_delay_ms: 0,
        }
    }
}
