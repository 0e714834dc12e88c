//! Sample-mounting robot arm.

use mx_core::config::RobotConfig;
use mx_core::{pv_name, ComponentInfo, Device, DeviceCategory, MxError, MxResult, PvClient, Signal};
use std::sync::Arc;

/// Robot speed, in percent, that counts as full speed.
pub const FULL_SPEED: f64 = 100.0;

/// Robot arm.
#[derive(Clone, Debug)]
pub struct RobotArm {
    name: String,
    /// Speed override in percent (`{EMBL}:RobotSpeed`)
    pub speed: Signal<f64>,
}

impl RobotArm {
    /// Bind the robot at `prefix`.
    pub fn new(client: Arc<dyn PvClient>, name: impl Into<String>, prefix: &str) -> Self {
        Self {
            name: name.into(),
            speed: Signal::new(client, "speed", pv_name(prefix, "{EMBL}:RobotSpeed"))
                .with_description("Robot speed override")
                .with_units("%"),
        }
    }

    /// Bind the robot from its configuration section.
    pub fn from_config(client: Arc<dyn PvClient>, config: &RobotConfig) -> Self {
        Self::new(client, "robot_arm", &config.prefix)
    }

    /// Whether the arm runs at full speed: anything not below 100 %.
    ///
    /// An unreadable (NaN) speed does not count as reduced.
    #[allow(clippy::neg_cmp_op_on_partial_ord)]
    pub async fn is_full_speed(&self) -> MxResult<bool> {
        let speed = self.speed.get().await?;
        Ok(!(speed < FULL_SPEED))
    }

    /// Set the speed override, `0..=100` percent.
    pub async fn set_speed(&self, percent: f64) -> MxResult<()> {
        if !(0.0..=FULL_SPEED).contains(&percent) {
            return Err(MxError::InvalidValue(format!(
                "robot speed {percent} outside 0..=100 %"
            )));
        }
        tracing::info!(robot = %self.name, percent, "Setting robot speed");
        self.speed.set(percent).await
    }
}

impl Device for RobotArm {
    fn name(&self) -> &str {
        &self.name
    }

    fn category(&self) -> DeviceCategory {
        DeviceCategory::Robot
    }

    fn components(&self) -> Vec<ComponentInfo> {
        vec![self.speed.component()]
    }
}
