//! Fault injection for the simulated control system.
//!
//! Every `get`, `put` and `monitor` passes through [`ErrorConfig::check_operation`]
//! before touching the PV database. Faults surface as the same errors a real
//! client would report: [`DeviceError`]s for communication and hardware
//! faults and [`MxError::PvDisconnected`] for a dropped channel.

use super::rng::MockRng;
use mx_core::{DeviceError, DeviceErrorKind, MxError, MxResult};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Fault injection configuration
#[derive(Clone, Debug)]
pub struct ErrorConfig {
    /// Per-operation failure rate (0.0 to 1.0), `"*"` for all operations
    failure_rates: Arc<HashMap<&'static str, f64>>,
    /// Specific failure scenarios
    scenarios: Arc<Vec<ErrorScenario>>,
    /// RNG for failure decisions
    rng: Arc<MockRng>,
    /// State tracking for scenarios
    state: Arc<Mutex<ErrorState>>,
}

/// A scripted fault.
#[derive(Debug, Clone)]
pub enum ErrorScenario {
    /// Fail `operation` after N successful calls
    FailAfterN {
        /// `"get"`, `"put"` or `"monitor"`
        operation: &'static str,
        /// Calls that succeed before failures start
        count: u32,
    },
    /// Every call to `operation` times out
    Timeout {
        /// `"get"`, `"put"` or `"monitor"`
        operation: &'static str,
    },
    /// Lose communication on the first call, and stay lost
    CommunicationLoss,
    /// Latch a hardware fault on the first call
    HardwareFault {
        /// Fault code reported in the message
        code: u32,
    },
    /// One PV's channel is disconnected
    Disconnected {
        /// Full PV address
        pv: String,
    },
}

#[derive(Default, Debug)]
struct ErrorState {
    /// Operation counters for FailAfterN scenarios
    operation_counts: HashMap<&'static str, u32>,
    /// Whether communication is lost
    communication_lost: bool,
    /// Hardware fault code (0 = no fault)
    hardware_fault_code: u32,
}

impl ErrorConfig {
    /// No injected faults (default)
    pub fn none() -> Self {
        Self::build(HashMap::new(), Vec::new(), None)
    }

    /// Uniform random failures with an optional seed
    pub fn random_failures_seeded(rate: f64, seed: Option<u64>) -> Self {
        let mut rates = HashMap::new();
        rates.insert("*", rate);
        Self::build(rates, Vec::new(), seed)
    }

    /// A single scenario
    pub fn scenario(scenario: ErrorScenario) -> Self {
        Self::scenarios(vec![scenario])
    }

    /// Several scenarios
    pub fn scenarios(scenarios: Vec<ErrorScenario>) -> Self {
        Self::build(HashMap::new(), scenarios, None)
    }

    /// Custom failure rates per operation
    pub fn with_rates(rates: HashMap<&'static str, f64>) -> Self {
        Self::build(rates, Vec::new(), None)
    }

    fn build(
        rates: HashMap<&'static str, f64>,
        scenarios: Vec<ErrorScenario>,
        seed: Option<u64>,
    ) -> Self {
        Self {
            failure_rates: Arc::new(rates),
            scenarios: Arc::new(scenarios),
            rng: Arc::new(MockRng::new(seed)),
            state: Arc::new(Mutex::new(ErrorState::default())),
        }
    }

    /// Check whether `operation` on `pv` should fail.
    pub fn check_operation(&self, pv: &str, operation: &'static str) -> MxResult<()> {
        let mut state = self.state.lock();

        if state.communication_lost {
            return Err(communication_lost(pv));
        }

        if state.hardware_fault_code != 0 {
            return Err(hardware_fault(pv, state.hardware_fault_code));
        }

        for scenario in self.scenarios.iter() {
            match scenario {
                ErrorScenario::FailAfterN {
                    operation: op,
                    count,
                } if *op == operation => {
                    let current = state.operation_counts.entry(operation).or_insert(0);
                    *current += 1;
                    if *current > *count {
                        return Err(DeviceError::new(
                            pv,
                            DeviceErrorKind::Hardware,
                            format!("Injected failure after {} operations", count),
                        )
                        .into());
                    }
                }
                ErrorScenario::Timeout { operation: op } if *op == operation => {
                    return Err(DeviceError::new(
                        pv,
                        DeviceErrorKind::Timeout,
                        format!("Operation '{}' timed out", operation),
                    )
                    .into());
                }
                ErrorScenario::CommunicationLoss => {
                    state.communication_lost = true;
                    return Err(communication_lost(pv));
                }
                ErrorScenario::HardwareFault { code } => {
                    state.hardware_fault_code = *code;
                    return Err(hardware_fault(pv, *code));
                }
                ErrorScenario::Disconnected { pv: lost } if lost == pv => {
                    return Err(MxError::PvDisconnected(pv.to_string()));
                }
                _ => {}
            }
        }

        let rate = self
            .failure_rates
            .get(operation)
            .or_else(|| self.failure_rates.get("*"))
            .copied()
            .unwrap_or(0.0);

        if self.rng.should_fail(rate) {
            return Err(DeviceError::new(
                pv,
                DeviceErrorKind::Communication,
                format!("Random failure on operation '{}'", operation),
            )
            .into());
        }

        Ok(())
    }

    /// Reset error state (clear counters, faults)
    pub fn reset(&self) {
        *self.state.lock() = ErrorState::default();
    }
}

impl Default for ErrorConfig {
    fn default() -> Self {
        Self::none()
    }
}

fn communication_lost(pv: &str) -> MxError {
    DeviceError::new(pv, DeviceErrorKind::Communication, "Communication lost").into()
}

fn hardware_fault(pv: &str, code: u32) -> MxError {
    DeviceError::new(pv, DeviceErrorKind::Hardware, format!("Hardware fault: {}", code)).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kind(err: MxError) -> DeviceErrorKind {
        match err {
            MxError::Device(e) => e.kind,
            other => panic!("expected device error, got {other:?}"),
        }
    }

    #[test]
    fn test_no_errors() {
        let config = ErrorConfig::none();
        for _ in 0..100 {
            assert!(config.check_operation("BL:TEMP", "get").is_ok());
        }
    }

    #[test]
    fn test_random_failures() {
        let config = ErrorConfig::random_failures_seeded(0.5, Some(42));
        let failures = (0..1000)
            .filter(|_| config.check_operation("BL:TEMP", "get").is_err())
            .count();
        assert!(failures > 400 && failures < 600, "Got {} failures", failures);
    }

    #[test]
    fn test_fail_after_n() {
        let config = ErrorConfig::scenario(ErrorScenario::FailAfterN {
            operation: "put",
            count: 3,
        });

        for _ in 0..3 {
            assert!(config.check_operation("BL:RTEMP", "put").is_ok());
        }
        assert!(config.check_operation("BL:RTEMP", "get").is_ok());
        let err = config.check_operation("BL:RTEMP", "put").unwrap_err();
        assert_eq!(kind(err), DeviceErrorKind::Hardware);
    }

    #[test]
    fn test_timeout_scenario() {
        let config = ErrorConfig::scenario(ErrorScenario::Timeout { operation: "put" });

        let err = config.check_operation("BL:RTEMP", "put").unwrap_err();
        assert!(err.to_string().contains("timed out"));
        assert_eq!(kind(err), DeviceErrorKind::Timeout);
        assert!(config.check_operation("BL:RTEMP", "get").is_ok());
    }

    #[test]
    fn test_communication_loss_latches() {
        let config = ErrorConfig::scenario(ErrorScenario::CommunicationLoss);

        let err = config.check_operation("BL:TEMP", "get").unwrap_err();
        assert_eq!(kind(err), DeviceErrorKind::Communication);
        assert!(config.check_operation("BL:RTEMP", "put").is_err());
    }

    #[test]
    fn test_hardware_fault() {
        let config = ErrorConfig::scenario(ErrorScenario::HardwareFault { code: 0x42 });

        let err = config.check_operation("BL:TEMP", "get").unwrap_err();
        assert!(err.to_string().contains("66"));
    }

    #[test]
    fn test_disconnected_pv_only() {
        let config = ErrorConfig::scenario(ErrorScenario::Disconnected {
            pv: "BL:TEMP".to_string(),
        });

        assert!(matches!(
            config.check_operation("BL:TEMP", "monitor"),
            Err(MxError::PvDisconnected(pv)) if pv == "BL:TEMP"
        ));
        assert!(config.check_operation("BL:RTEMP", "get").is_ok());
    }

    #[test]
    fn test_reset() {
        let config = ErrorConfig::scenario(ErrorScenario::FailAfterN {
            operation: "get",
            count: 1,
        });

        assert!(config.check_operation("BL:TEMP", "get").is_ok());
        assert!(config.check_operation("BL:TEMP", "get").is_err());
        config.reset();
        assert!(config.check_operation("BL:TEMP", "get").is_ok());
    }

    #[test]
    fn test_custom_rates() {
        let mut rates = HashMap::new();
        rates.insert("put", 1.0);
        rates.insert("get", 0.0);
        let config = ErrorConfig::with_rates(rates);

        for _ in 0..10 {
            assert!(config.check_operation("BL:RTEMP", "put").is_err());
            assert!(config.check_operation("BL:RTEMP", "get").is_ok());
        }
    }
}
