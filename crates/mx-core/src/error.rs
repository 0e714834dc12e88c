//! Error types for beamline device access.
//!
//! `MxError` is the single error type returned by signals, motors and the
//! composite device operations. It is built with `thiserror` so that
//! figment extraction errors and backend [`DeviceError`]s convert with `?`.
//!
//! ## Error Categories
//!
//! 1. **Configuration** - `Config`, `Configuration`
//!    - Raised while loading the beamline configuration
//!    - Permanent: fix the file or environment and restart
//!
//! 2. **Control-system access** - `PvNotFound`, `PvReadOnly`, `PvDisconnected`,
//!    `TypeMismatch`, `MonitorClosed`, `Device`
//!    - Raised by the `PvClient` backend or by typed signal conversion
//!    - `PvDisconnected` is usually transient; the rest indicate a naming or
//!      programming error
//!
//! 3. **Operation state** - `MotorAlreadyMoving`, `SoftLimit`, `Timeout`,
//!    `InvalidPuckPosition`, `UnknownAxis`, `InvalidValue`
//!    - Raised by composite operations before or during motion

use std::time::Duration;
use thiserror::Error;

// =============================================================================
// Device Errors
// =============================================================================

/// Category of a structured device fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceErrorKind {
    /// Lost or refused connection to the control system
    Communication,
    /// The device reported a hardware fault
    Hardware,
    /// The device did not answer in time
    Timeout,
    /// A value was rejected by the device
    InvalidParameter,
}

impl std::fmt::Display for DeviceErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            DeviceErrorKind::Communication => "communication",
            DeviceErrorKind::Hardware => "hardware",
            DeviceErrorKind::Timeout => "timeout",
            DeviceErrorKind::InvalidParameter => "invalid_parameter",
        };
        write!(f, "{}", label)
    }
}

/// Structured fault raised by a control-system backend for one PV.
#[derive(Error, Debug, Clone)]
#[error("PV '{pv}' {kind} error: {message}")]
pub struct DeviceError {
    /// PV address the fault belongs to
    pub pv: String,
    /// Fault category
    pub kind: DeviceErrorKind,
    /// Human-readable detail
    pub message: String,
}

impl DeviceError {
    /// Create a new device error.
    pub fn new(pv: impl Into<String>, kind: DeviceErrorKind, message: impl Into<String>) -> Self {
        Self {
            pv: pv.into(),
            kind,
            message: message.into(),
        }
    }
}

/// Convenience alias for results using [`MxError`].
pub type MxResult<T> = std::result::Result<T, MxError>;

/// Primary error type for beamline device access.
#[derive(Error, Debug)]
pub enum MxError {
    /// Configuration could not be extracted from file or environment.
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    /// Configuration parsed but failed semantic validation.
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// No PV with this address exists in the control system.
    #[error("PV not found: {0}")]
    PvNotFound(String),

    /// Attempted to write a read-only PV.
    #[error("PV '{0}' is read-only")]
    PvReadOnly(String),

    /// The PV exists but is not currently connected.
    #[error("PV '{0}' is disconnected")]
    PvDisconnected(String),

    /// The PV value could not be converted to the requested type.
    #[error("PV '{pv}' holds a {found} value, expected {expected}")]
    TypeMismatch {
        /// PV address
        pv: String,
        /// Requested Rust type
        expected: &'static str,
        /// Kind of value the PV held
        found: &'static str,
    },

    /// A wait did not complete in time.
    #[error("Timed out after {after:?} waiting for {what}")]
    Timeout {
        /// What was being waited for
        what: String,
        /// Elapsed limit
        after: Duration,
    },

    /// A move was requested while the motor was already in motion.
    #[error("Motor '{0}' already moving")]
    MotorAlreadyMoving(String),

    /// Target lies outside the motor's soft travel limits.
    #[error("Target {target} for motor '{motor}' outside soft limits [{low}, {high}]")]
    SoftLimit {
        /// Motor prefix
        motor: String,
        /// Requested position
        target: f64,
        /// Low travel limit
        low: f64,
        /// High travel limit
        high: f64,
    },

    /// A puck position string could not be parsed.
    #[error("Invalid puck position '{0}' (expected sector 1-8 followed by A, B or C)")]
    InvalidPuckPosition(String),

    /// No goniometer axis with this name or alias.
    #[error("Unknown axis '{0}'")]
    UnknownAxis(String),

    /// A value was rejected before reaching the control system.
    #[error("Invalid value: {0}")]
    InvalidValue(String),

    /// The monitor for a PV stopped delivering values.
    #[error("Monitor for PV '{0}' closed")]
    MonitorClosed(String),

    /// Structured fault from the control-system backend.
    #[error("{0}")]
    Device(#[from] DeviceError),
}

impl From<figment::Error> for MxError {
    fn from(err: figment::Error) -> Self {
        MxError::Config(Box::new(err))
    }
}
