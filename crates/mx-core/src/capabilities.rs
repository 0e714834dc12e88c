//! Device Capabilities
//!
//! Fine-grained capability traits implemented by beamline devices, plus the
//! [`Device`] trait every device declaration implements to expose its PV
//! address map.
//!
//! - A motor implements `Movable`
//! - A cryostream implements `Movable + Readable`
//! - A readback signal implements `Readable`
//!
//! Each capability trait:
//! - Is async (uses #[async_trait])
//! - Is thread-safe (requires Send + Sync)
//! - Uses anyhow::Result for errors

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

// =============================================================================
// Device Category
// =============================================================================

/// Device category for classification and listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceCategory {
    /// Sample temperature control (cryostream)
    TemperatureController,
    /// Goniometer axes
    Goniometer,
    /// Sample storage (dewar, sectors, pucks)
    SampleStorage,
    /// Sample-mounting robot
    Robot,
    /// Stored position sets
    Positions,
    /// Devices that don't fit other categories
    #[default]
    Other,
}

impl DeviceCategory {
    /// Human-readable label
    pub fn label(&self) -> &'static str {
        match self {
            Self::TemperatureController => "Temperature Controllers",
            Self::Goniometer => "Goniometers",
            Self::SampleStorage => "Sample Storage",
            Self::Robot => "Robots",
            Self::Positions => "Position Sets",
            Self::Other => "Other",
        }
    }
}

// =============================================================================
// Device
// =============================================================================

/// One control point in a device's address map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComponentInfo {
    /// Dotted path from the device root, e.g. `sectors.sector_7.A.status`
    pub path: String,
    /// Full PV address
    pub pv: String,
    /// Value type carried by the PV (`f64`, `i64`, `bool`, `u8`, `string`)
    pub dtype: &'static str,
    /// Whether the control point is read-only
    pub read_only: bool,
}

impl ComponentInfo {
    /// Create an entry.
    pub fn new(
        path: impl Into<String>,
        pv: impl Into<String>,
        dtype: &'static str,
        read_only: bool,
    ) -> Self {
        Self {
            path: path.into(),
            pv: pv.into(),
            dtype,
            read_only,
        }
    }

    /// Same entry nested under `parent`.
    pub fn nested(mut self, parent: &str) -> Self {
        self.path = format!("{}.{}", parent, self.path);
        self
    }
}

/// A hardware-mirroring declaration that owns a fixed set of control points.
pub trait Device: Send + Sync {
    /// Device name.
    fn name(&self) -> &str;

    /// Device category.
    fn category(&self) -> DeviceCategory {
        DeviceCategory::Other
    }

    /// Every control point owned by this device, nested devices included,
    /// in declaration order.
    fn components(&self) -> Vec<ComponentInfo>;
}

// =============================================================================
// Capability Traits
// =============================================================================

/// Capability: Motion Control
///
/// Devices that can move to positions (motors, temperature positioners).
///
/// # Contract
/// - Positions are in device-native units (mm, deg, K)
/// - `move_abs` and `move_rel` initiate motion and may return before completion
/// - `wait_settled` suspends until motion completes
/// - `position` returns the current readback
#[async_trait]
pub trait Movable: Send + Sync {
    /// Move to absolute position
    async fn move_abs(&self, position: f64) -> Result<()>;

    /// Move relative to current position
    async fn move_rel(&self, distance: f64) -> Result<()>;

    /// Get current position
    async fn position(&self) -> Result<f64>;

    /// Wait for motion to settle
    async fn wait_settled(&self) -> Result<()>;

    /// Stop motion immediately
    ///
    /// # Default Implementation
    /// Returns an error indicating stop is not supported.
    async fn stop(&self) -> Result<()> {
        anyhow::bail!("Stop not supported by this device")
    }
}

/// Capability: Scalar Readout
#[async_trait]
pub trait Readable: Send + Sync {
    /// Read current value
    async fn read(&self) -> Result<f64>;
}
