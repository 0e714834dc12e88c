//! `mx-devices`
//!
//! Device declarations for a macromolecular crystallography endstation.
//! Each device owns a fixed set of control points, addressed by PV name,
//! and a handful of composite operations:
//!
//! - [`CryoStream`]: drive the sample temperature to a set point
//! - [`GoniometerStack`]: six motor axes with MD2-style aliases
//! - [`WorkPositions`] / [`MountPositions`]: stored robot positions
//! - [`Dewar`]: 8 sectors x 3 pucks, rotate and wait, puck status
//! - [`RobotArm`]: full-speed check
//!
//! [`Beamline`] binds them all from a [`mx_core::BeamlineConfig`] and can
//! attach them to the simulated control system in `mx-sim`.
//!
//! ## Example
//!
//! ```rust,ignore
//! use mx_devices::{Beamline, RotationMode};
//!
//! let beamline = Beamline::new(client, &config);
//! beamline.dewar.rotate(45.0, RotationMode::Relative).await?;
//! let status = beamline.dewar.get_puck_status("7A").await?;
//! ```

pub mod beamline;
pub mod cryostream;
pub mod dewar;
pub mod goniometer;
pub mod robot;

pub use beamline::Beamline;
pub use cryostream::{CryoStream, CryoStreamCmd};
pub use dewar::{Dewar, Puck, PuckPosition, RotationMode, Sector};
pub use goniometer::{GoniometerStack, MountPositions, WorkPositions, AXIS_ALIASES};
pub use robot::{RobotArm, FULL_SPEED};
