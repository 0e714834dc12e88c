//! Goniometer stack and the robot's stored goniometer positions.
//!
//! The stack owns six motor records under one prefix. Axis names follow the
//! motor naming (`gx`, `py`, ...) but the MD2-style aliases used by plans are
//! accepted everywhere an axis is looked up by name, and
//! [`GoniometerStack::read_positions`] reports the standard `x`, `y`, `z`,
//! `omega` keys.

use futures::future::try_join_all;
use mx_core::config::{GoniometerConfig, PositionsConfig};
use mx_core::{
    pv_name, ComponentInfo, Device, DeviceCategory, Motor, MxError, MxResult, PvClient, Signal,
};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Axis aliases, `(alias, canonical motor name)`.
pub const AXIS_ALIASES: &[(&str, &str)] = &[
    ("x", "gx"),
    ("cx", "gx"),
    ("y", "py"),
    ("cy", "py"),
    ("z", "pz"),
    ("cz", "pz"),
    ("omega", "o"),
];

/// Standard readback names and the motor behind each.
const STANDARD_READBACK: &[(&str, &str)] = &[("x", "gx"), ("y", "py"), ("z", "pz"), ("omega", "o")];

/// Six-axis goniometer stack.
#[derive(Clone, Debug)]
pub struct GoniometerStack {
    name: String,
    /// Goniometer X (`-Ax:GX}Mtr`)
    pub gx: Motor,
    /// Goniometer Y (`-Ax:GY}Mtr`)
    pub gy: Motor,
    /// Goniometer Z (`-Ax:GZ}Mtr`)
    pub gz: Motor,
    /// Omega rotation (`-Ax:O}Mtr`)
    pub o: Motor,
    /// Pin Y (`-Ax:PY}Mtr`)
    pub py: Motor,
    /// Pin Z (`-Ax:PZ}Mtr`)
    pub pz: Motor,
}

impl GoniometerStack {
    /// Bind the stack at `prefix` (e.g. `XF:17IDB-ES:AMX{Gon:1`).
    pub fn new(client: Arc<dyn PvClient>, name: impl Into<String>, prefix: &str) -> Self {
        let motor =
            |axis: &str, suffix: &str| Motor::new(client.clone(), axis, pv_name(prefix, suffix));
        Self {
            name: name.into(),
            gx: motor("gx", "-Ax:GX}Mtr"),
            gy: motor("gy", "-Ax:GY}Mtr"),
            gz: motor("gz", "-Ax:GZ}Mtr"),
            o: motor("o", "-Ax:O}Mtr"),
            py: motor("py", "-Ax:PY}Mtr"),
            pz: motor("pz", "-Ax:PZ}Mtr"),
        }
    }

    /// Bind the stack from its configuration section.
    pub fn from_config(client: Arc<dyn PvClient>, config: &GoniometerConfig) -> Self {
        Self::new(client, "gonio", &config.prefix)
    }

    /// Motors in declaration order.
    pub fn motors(&self) -> [&Motor; 6] {
        [&self.gx, &self.gy, &self.gz, &self.o, &self.py, &self.pz]
    }

    /// Alias for `gx`.
    pub fn x(&self) -> &Motor {
        &self.gx
    }

    /// Alias for `gx`.
    pub fn cx(&self) -> &Motor {
        &self.gx
    }

    /// Alias for `py`.
    pub fn y(&self) -> &Motor {
        &self.py
    }

    /// Alias for `py`.
    pub fn cy(&self) -> &Motor {
        &self.py
    }

    /// Alias for `pz`.
    pub fn z(&self) -> &Motor {
        &self.pz
    }

    /// Alias for `pz`.
    pub fn cz(&self) -> &Motor {
        &self.pz
    }

    /// Alias for `o`.
    pub fn omega(&self) -> &Motor {
        &self.o
    }

    /// Canonical motor name for an axis name or alias.
    pub fn resolve_axis(name: &str) -> MxResult<&'static str> {
        if let Some(&(_, canonical)) = AXIS_ALIASES.iter().find(|(alias, _)| *alias == name) {
            return Ok(canonical);
        }
        ["gx", "gy", "gz", "o", "py", "pz"]
            .into_iter()
            .find(|axis| *axis == name)
            .ok_or_else(|| MxError::UnknownAxis(name.to_string()))
    }

    /// Motor for an axis name or alias.
    pub fn axis(&self, name: &str) -> MxResult<&Motor> {
        let canonical = Self::resolve_axis(name)?;
        self.motors()
            .into_iter()
            .find(|motor| motor.name() == canonical)
            .ok_or_else(|| MxError::UnknownAxis(name.to_string()))
    }

    /// Readbacks keyed by the standard names `x`, `y`, `z`, `omega`.
    pub async fn read_positions(&self) -> MxResult<BTreeMap<&'static str, f64>> {
        let reads = STANDARD_READBACK.iter().map(|&(key, axis)| async move {
            let value = self.axis(axis)?.user_readback.get().await?;
            Ok::<_, MxError>((key, value))
        });
        Ok(try_join_all(reads).await?.into_iter().collect())
    }
}

impl Device for GoniometerStack {
    fn name(&self) -> &str {
        &self.name
    }

    fn category(&self) -> DeviceCategory {
        DeviceCategory::Goniometer
    }

    fn components(&self) -> Vec<ComponentInfo> {
        self.motors()
            .into_iter()
            .flat_map(|motor| {
                motor
                    .components()
                    .into_iter()
                    .map(move |c| c.nested(motor.name()))
            })
            .collect()
    }
}

// =============================================================================
// Stored positions
// =============================================================================

fn position_signal(
    client: &Arc<dyn PvClient>,
    prefix: &str,
    name: &str,
    axis: &str,
    kind: &str,
) -> Signal<f64> {
    Signal::new(
        client.clone(),
        name,
        pv_name(prefix, &format!("{{Gov:Robot-Dev:{axis}}}Pos:{kind}")),
    )
}

/// Goniometer work position stored by the robot governor.
#[derive(Clone, Debug)]
pub struct WorkPositions {
    name: String,
    /// `{Gov:Robot-Dev:gx}Pos:Work-Pos`
    pub gx: Signal<f64>,
    /// `{Gov:Robot-Dev:gpy}Pos:Work-Pos`
    pub gpy: Signal<f64>,
    /// `{Gov:Robot-Dev:gpz}Pos:Work-Pos`
    pub gpz: Signal<f64>,
    /// `{Gov:Robot-Dev:go}Pos:Work-Pos`
    pub o: Signal<f64>,
}

impl WorkPositions {
    /// Bind the work position set at `prefix`.
    pub fn new(client: Arc<dyn PvClient>, name: impl Into<String>, prefix: &str) -> Self {
        let signal = |name: &str, axis: &str| position_signal(&client, prefix, name, axis, "Work-Pos");
        Self {
            name: name.into(),
            gx: signal("gx", "gx"),
            gpy: signal("gpy", "gpy"),
            gpz: signal("gpz", "gpz"),
            o: signal("o", "go"),
        }
    }

    /// Bind from the positions configuration section.
    pub fn from_config(client: Arc<dyn PvClient>, config: &PositionsConfig) -> Self {
        Self::new(client, "work_pos", &config.prefix)
    }

    fn signals(&self) -> [&Signal<f64>; 4] {
        [&self.gx, &self.gpy, &self.gpz, &self.o]
    }

    /// Read every stored coordinate.
    pub async fn snapshot(&self) -> MxResult<BTreeMap<String, f64>> {
        snapshot(&self.signals()).await
    }
}

impl Device for WorkPositions {
    fn name(&self) -> &str {
        &self.name
    }

    fn category(&self) -> DeviceCategory {
        DeviceCategory::Positions
    }

    fn components(&self) -> Vec<ComponentInfo> {
        self.signals().iter().map(|s| s.component()).collect()
    }
}

/// Goniometer mount position stored by the robot governor.
#[derive(Clone, Debug)]
pub struct MountPositions {
    name: String,
    /// `{Gov:Robot-Dev:gx}Pos:Mount-Pos`
    pub gx: Signal<f64>,
    /// `{Gov:Robot-Dev:gpy}Pos:Mount-Pos`
    pub py: Signal<f64>,
    /// `{Gov:Robot-Dev:gpz}Pos:Mount-Pos`
    pub pz: Signal<f64>,
    /// `{Gov:Robot-Dev:go}Pos:Mount-Pos`
    pub o: Signal<f64>,
}

impl MountPositions {
    /// Bind the mount position set at `prefix`.
    pub fn new(client: Arc<dyn PvClient>, name: impl Into<String>, prefix: &str) -> Self {
        let signal =
            |name: &str, axis: &str| position_signal(&client, prefix, name, axis, "Mount-Pos");
        Self {
            name: name.into(),
            gx: signal("gx", "gx"),
            py: signal("py", "gpy"),
            pz: signal("pz", "gpz"),
            o: signal("o", "go"),
        }
    }

    /// Bind from the positions configuration section.
    pub fn from_config(client: Arc<dyn PvClient>, config: &PositionsConfig) -> Self {
        Self::new(client, "mount_pos", &config.prefix)
    }

    fn signals(&self) -> [&Signal<f64>; 4] {
        [&self.gx, &self.py, &self.pz, &self.o]
    }

    /// Read every stored coordinate.
    pub async fn snapshot(&self) -> MxResult<BTreeMap<String, f64>> {
        snapshot(&self.signals()).await
    }
}

impl Device for MountPositions {
    fn name(&self) -> &str {
        &self.name
    }

    fn category(&self) -> DeviceCategory {
        DeviceCategory::Positions
    }

    fn components(&self) -> Vec<ComponentInfo> {
        self.signals().iter().map(|s| s.component()).collect()
    }
}

async fn snapshot(signals: &[&Signal<f64>]) -> MxResult<BTreeMap<String, f64>> {
    let reads = signals.iter().map(|signal| async move {
        Ok::<_, MxError>((signal.name().to_string(), signal.get().await?))
    });
    Ok(try_join_all(reads).await?.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mx_sim::SimControlSystem;

    const PREFIX: &str = "XF:17IDB-ES:AMX{Gon:1";

    fn stack() -> (SimControlSystem, GoniometerStack) {
        let sim = SimControlSystem::instant();
        let gonio = GoniometerStack::new(sim.client(), "gonio", PREFIX);
        for motor in gonio.motors() {
            sim.add_motor_record(motor.prefix(), 0.0);
        }
        (sim, gonio)
    }

    #[test]
    fn test_motor_prefixes() {
        let (_, gonio) = stack();
        assert_eq!(gonio.gx.prefix(), "XF:17IDB-ES:AMX{Gon:1-Ax:GX}Mtr");
        assert_eq!(gonio.gy.prefix(), "XF:17IDB-ES:AMX{Gon:1-Ax:GY}Mtr");
        assert_eq!(gonio.gz.prefix(), "XF:17IDB-ES:AMX{Gon:1-Ax:GZ}Mtr");
        assert_eq!(gonio.o.prefix(), "XF:17IDB-ES:AMX{Gon:1-Ax:O}Mtr");
        assert_eq!(gonio.py.prefix(), "XF:17IDB-ES:AMX{Gon:1-Ax:PY}Mtr");
        assert_eq!(gonio.pz.prefix(), "XF:17IDB-ES:AMX{Gon:1-Ax:PZ}Mtr");
    }

    #[test]
    fn test_aliases_resolve_to_same_motor() {
        let (_, gonio) = stack();
        assert_eq!(gonio.x().prefix(), gonio.gx.prefix());
        assert_eq!(gonio.cy().prefix(), gonio.py.prefix());
        assert_eq!(gonio.cz().prefix(), gonio.pz.prefix());
        assert_eq!(gonio.axis("omega").unwrap().prefix(), gonio.o.prefix());
        assert_eq!(gonio.axis("cx").unwrap().name(), "gx");
        assert_eq!(gonio.axis("gy").unwrap().name(), "gy");
    }

    #[test]
    fn test_unknown_axis() {
        let (_, gonio) = stack();
        assert!(matches!(
            gonio.axis("kappa"),
            Err(MxError::UnknownAxis(name)) if name == "kappa"
        ));
        // Lookup is exact
        assert!(gonio.axis("Omega").is_err());
    }

    #[tokio::test]
    async fn test_read_positions_uses_standard_names() {
        let (_, gonio) = stack();
        gonio.omega().move_and_wait(90.0, None).await.unwrap();
        gonio.y().move_and_wait(-0.25, None).await.unwrap();

        let positions = gonio.read_positions().await.unwrap();
        assert_eq!(
            positions.keys().copied().collect::<Vec<_>>(),
            vec!["omega", "x", "y", "z"]
        );
        assert_eq!(positions["omega"], 90.0);
        assert_eq!(positions["y"], -0.25);
        assert_eq!(positions["x"], 0.0);
    }

    #[test]
    fn test_components_nested_by_motor() {
        let (_, gonio) = stack();
        let components = gonio.components();
        assert_eq!(components.len(), 6 * 15);
        assert_eq!(components[0].path, "gx.user_readback");
        assert!(components
            .iter()
            .any(|c| c.path == "o.user_setpoint" && c.pv == "XF:17IDB-ES:AMX{Gon:1-Ax:O}Mtr.VAL"));
    }

    #[test]
    fn test_position_addresses() {
        let sim = SimControlSystem::instant();
        let work = WorkPositions::new(sim.client(), "work_pos", "XF:17IDB-ES:AMX");
        let mount = MountPositions::new(sim.client(), "mount_pos", "XF:17IDB-ES:AMX");

        assert_eq!(work.gx.pv(), "XF:17IDB-ES:AMX{Gov:Robot-Dev:gx}Pos:Work-Pos");
        assert_eq!(work.gpy.pv(), "XF:17IDB-ES:AMX{Gov:Robot-Dev:gpy}Pos:Work-Pos");
        assert_eq!(work.gpz.pv(), "XF:17IDB-ES:AMX{Gov:Robot-Dev:gpz}Pos:Work-Pos");
        assert_eq!(work.o.pv(), "XF:17IDB-ES:AMX{Gov:Robot-Dev:go}Pos:Work-Pos");
        assert_eq!(mount.gx.pv(), "XF:17IDB-ES:AMX{Gov:Robot-Dev:gx}Pos:Mount-Pos");
        assert_eq!(mount.py.pv(), "XF:17IDB-ES:AMX{Gov:Robot-Dev:gpy}Pos:Mount-Pos");
        assert_eq!(mount.pz.pv(), "XF:17IDB-ES:AMX{Gov:Robot-Dev:gpz}Pos:Mount-Pos");
        assert_eq!(mount.o.pv(), "XF:17IDB-ES:AMX{Gov:Robot-Dev:go}Pos:Mount-Pos");
    }

    #[tokio::test]
    async fn test_mount_snapshot() {
        let sim = SimControlSystem::instant();
        let mount = MountPositions::new(sim.client(), "mount_pos", "XF:17IDB-ES:AMX");
        sim.seed(&mount.components());
        mount.o.set(180.0).await.unwrap();

        let snapshot = mount.snapshot().await.unwrap();
        assert_eq!(snapshot.len(), 4);
        assert_eq!(snapshot["o"], 180.0);
        assert_eq!(snapshot["py"], 0.0);
    }
}
