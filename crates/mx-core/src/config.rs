//! Beamline configuration.
//!
//! Device prefixes and operation tuning are loaded with `figment` from an
//! optional TOML file, overridden by `MX_`-prefixed environment variables
//! (nested keys separated by `__`, e.g. `MX_DEWAR__PREFIX`). Every section
//! has defaults, so an empty file is a valid configuration.
//!
//! # Example Configuration
//!
//! ```toml
//! [cryostream]
//! prefix = "XF:17IDB-ES:AMX{CS:1}"
//! atol = 0.1
//!
//! [goniometer]
//! prefix = "XF:17IDB-ES:AMX{Gon:1"
//!
//! [dewar]
//! prefix = "XF:17IDB-ES:AMX"
//! rotation_timeout_ms = 60000
//! ```

use crate::error::{MxError, MxResult};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use serde_valid::Validate;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// Environment variable prefix for overrides.
pub const ENV_PREFIX: &str = "MX_";

/// Cryostream section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct CryoStreamConfig {
    /// PV prefix for `TEMP`, `RTEMP`, `RAMP.PROC`
    #[validate(min_length = 1)]
    pub prefix: String,
    /// Absolute tolerance in K for "temperature reached"
    #[validate(minimum = 0.0)]
    pub atol: f64,
    /// Relative tolerance for "temperature reached"
    #[validate(minimum = 0.0)]
    pub rtol: f64,
}

impl Default for CryoStreamConfig {
    fn default() -> Self {
        Self {
            prefix: "XF:17IDB-ES:AMX{CS:1}".to_string(),
            atol: 1e-8,
            rtol: 1e-5,
        }
    }
}

/// Goniometer section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct GoniometerConfig {
    /// PV prefix for the axis motor records
    #[validate(min_length = 1)]
    pub prefix: String,
}

impl Default for GoniometerConfig {
    fn default() -> Self {
        Self {
            prefix: "XF:17IDB-ES:AMX{Gon:1".to_string(),
        }
    }
}

/// Robot work/mount position section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct PositionsConfig {
    /// PV prefix for the `{Gov:Robot-Dev:...}Pos:...` signals
    #[validate(min_length = 1)]
    pub prefix: String,
}

impl Default for PositionsConfig {
    fn default() -> Self {
        Self {
            prefix: "XF:17IDB-ES:AMX".to_string(),
        }
    }
}

/// Dewar section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct DewarConfig {
    /// PV prefix for rotation, motor and puck sensors
    #[validate(min_length = 1)]
    pub prefix: String,
    /// Per-phase limit for the start and finish waits of a rotation.
    /// Absent means wait indefinitely.
    pub rotation_timeout_ms: Option<u64>,
}

impl DewarConfig {
    /// Rotation wait limit as a duration.
    pub fn rotation_timeout(&self) -> Option<Duration> {
        self.rotation_timeout_ms.map(Duration::from_millis)
    }
}

impl Default for DewarConfig {
    fn default() -> Self {
        Self {
            prefix: "XF:17IDB-ES:AMX".to_string(),
            rotation_timeout_ms: None,
        }
    }
}

/// Robot section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct RobotConfig {
    /// PV prefix for `{EMBL}:RobotSpeed`
    #[validate(min_length = 1)]
    pub prefix: String,
}

impl Default for RobotConfig {
    fn default() -> Self {
        Self {
            prefix: "XF:17IDB-ES:AMX".to_string(),
        }
    }
}

/// Complete beamline configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct BeamlineConfig {
    /// Cryostream settings
    #[validate]
    pub cryostream: CryoStreamConfig,
    /// Goniometer settings
    #[validate]
    pub goniometer: GoniometerConfig,
    /// Work/mount position settings
    #[validate]
    pub positions: PositionsConfig,
    /// Dewar settings
    #[validate]
    pub dewar: DewarConfig,
    /// Robot settings
    #[validate]
    pub robot: RobotConfig,
}

/// Build the layered figment: defaults, then file (if any), then environment.
///
/// Callers that keep extra sections in the same file (e.g. simulation
/// settings) can focus this figment on their own key.
pub fn figment(path: Option<&Path>) -> MxResult<Figment> {
    let mut figment = Figment::from(Serialized::defaults(BeamlineConfig::default()));
    if let Some(path) = path {
        if !path.exists() {
            return Err(MxError::Configuration(format!(
                "config file not found: {}",
                path.display()
            )));
        }
        debug!("Loading beamline config from: {}", path.display());
        figment = figment.merge(Toml::file(path));
    }
    Ok(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
}

impl BeamlineConfig {
    /// Load and validate configuration from an optional file plus environment.
    pub fn load(path: Option<&Path>) -> MxResult<Self> {
        Self::from_figment(&figment(path)?)
    }

    /// Load and validate configuration from a TOML string (no environment).
    pub fn from_toml_str(toml: &str) -> MxResult<Self> {
        let figment =
            Figment::from(Serialized::defaults(BeamlineConfig::default())).merge(Toml::string(toml));
        Self::from_figment(&figment)
    }

    /// Extract and validate from an existing figment.
    pub fn from_figment(figment: &Figment) -> MxResult<Self> {
        let config: BeamlineConfig = figment.extract()?;
        config.check()?;
        info!(
            dewar = %config.dewar.prefix,
            goniometer = %config.goniometer.prefix,
            "Loaded beamline config"
        );
        Ok(config)
    }

    /// Run schema and cross-field validation.
    pub fn check(&self) -> MxResult<()> {
        if let Err(errors) = self.validate() {
            return Err(MxError::Configuration(errors.to_string()));
        }
        if self.dewar.rotation_timeout_ms == Some(0) {
            return Err(MxError::Configuration(
                "dewar.rotation_timeout_ms must be positive when set".to_string(),
            ));
        }
        if !self.cryostream.atol.is_finite() || !self.cryostream.rtol.is_finite() {
            return Err(MxError::Configuration(
                "cryostream tolerances must be finite".to_string(),
            ));
        }
        Ok(())
    }
}
