//! Operational modes for the simulated control system.
//!
//! - **Instant**: records complete within the write that triggered them
//! - **Realistic**: records move at configured speeds on background tasks
//! - **Chaos**: realistic timing plus random injected faults

use serde::{Deserialize, Serialize};

/// Operational modes for the simulated control system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MockMode {
    /// Zero delays, deterministic - for unit tests
    #[default]
    Instant,
    /// Hardware-like timing - for integration tests and the CLI
    Realistic,
    /// Hardware-like timing with random failures - for resilience testing
    Chaos,
}

impl MockMode {
    /// Whether records run on background tasks with simulated durations.
    pub fn is_timed(&self) -> bool {
        !matches!(self, MockMode::Instant)
    }
}
