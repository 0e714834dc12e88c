//! `mx-core`
//!
//! Core building blocks for beamline device declarations: process variable
//! values, the control-system client seam, typed signals, the EPICS motor
//! record, capability traits and configuration.
//!
//! ## Layers
//!
//! - **PvClient**: access to the control system (`get`, `put`, `monitor`),
//!   supplied by the deployment or by the simulated control system
//! - **Signal / SignalRO / Motor**: typed control points bound to PV addresses
//! - **Devices** (in `mx-devices`): named aggregates of control points with a
//!   few composite operations
//!
//! ## Example
//!
//! ```rust,ignore
//! use mx_core::{Motor, Movable};
//!
//! let motor = Motor::new(client, "omega", "XF:17IDB-ES:AMX{Gon:1-Ax:O}Mtr");
//! motor.move_and_wait(90.0, None).await?;
//! ```

pub mod capabilities;
pub mod client;
pub mod config;
pub mod error;
pub mod motor;
pub mod pv;
pub mod signal;

#[cfg(test)]
mod testing;

// Re-export commonly used types
pub use capabilities::{ComponentInfo, Device, DeviceCategory, Movable, Readable};
pub use client::{PvClient, PvMonitor};
pub use config::BeamlineConfig;
pub use error::{DeviceError, DeviceErrorKind, MxError, MxResult};
pub use motor::{HomeDirection, Motor};
pub use pv::{pv_name, PvType, PvValue};
pub use signal::{Signal, SignalMetadata, SignalRO, Subscription};
