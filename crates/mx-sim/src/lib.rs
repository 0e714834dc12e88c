//! Simulated control system for mx-beamline
//!
//! This crate stands in for the IOCs behind a beamline so device code can run
//! without hardware. All timed behaviour uses `tokio::time`, never blocking
//! sleeps.
//!
//! # Records
//!
//! - Motor record: `.VAL` drives `.RBV`, toggling `.DMOV`/`.MOVN` around the
//!   move; `.STOP`, `.HOMF`, `.HOMR` are honoured
//! - Soft link: forwards writes from one PV to another
//! - Ramp record: drives a temperature readback towards its set point
//!
//! # Performance Characteristics
//!
//! - Instant mode: records complete inside the triggering `put`
//! - Realistic mode: 30 deg/s motors with 20 ms updates and 50 ms settling,
//!   5 K/s ramps with 100 ms updates, 2 ms channel round trip
//! - Chaos mode: realistic timing plus seeded random faults

pub mod common;
pub mod config;
mod control_system;
mod records;

// Re-export common types
pub use common::{ErrorConfig, ErrorScenario, MockMode, MockRng, TimingConfig};
pub use config::SimConfig;
pub use control_system::SimControlSystem;
