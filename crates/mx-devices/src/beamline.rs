//! The beamline: every device, bound once from configuration.

use crate::cryostream::CryoStream;
use crate::dewar::Dewar;
use crate::goniometer::{GoniometerStack, MountPositions, WorkPositions};
use crate::robot::{RobotArm, FULL_SPEED};
use mx_core::{BeamlineConfig, ComponentInfo, Device, MxResult, PvClient};
use mx_sim::{SimConfig, SimControlSystem};
use std::sync::Arc;

/// Sample temperature the simulated cryostream starts at, in K.
const SIM_START_KELVIN: f64 = 100.0;

/// All devices of the MX endstation over one control-system client.
#[derive(Clone, Debug)]
pub struct Beamline {
    /// Sample cryostream
    pub cryostream: CryoStream,
    /// Goniometer stack
    pub gonio: GoniometerStack,
    /// Robot work position
    pub work_pos: WorkPositions,
    /// Robot mount position
    pub mount_pos: MountPositions,
    /// Sample storage dewar
    pub dewar: Dewar,
    /// Sample-mounting robot
    pub robot_arm: RobotArm,
}

impl Beamline {
    /// Bind every device from `config`.
    pub fn new(client: Arc<dyn PvClient>, config: &BeamlineConfig) -> Self {
        Self {
            cryostream: CryoStream::from_config(client.clone(), &config.cryostream),
            gonio: GoniometerStack::from_config(client.clone(), &config.goniometer),
            work_pos: WorkPositions::from_config(client.clone(), &config.positions),
            mount_pos: MountPositions::from_config(client.clone(), &config.positions),
            dewar: Dewar::from_config(client.clone(), &config.dewar),
            robot_arm: RobotArm::from_config(client, &config.robot),
        }
    }

    /// Bind every device over a fresh simulated control system.
    pub fn simulated(config: &BeamlineConfig, sim: &SimConfig) -> MxResult<(Self, SimControlSystem)> {
        sim.check()?;
        let control_system = SimControlSystem::new(sim);
        let beamline = Self::new(control_system.client(), config);
        beamline.attach_simulation(&control_system)?;
        Ok((beamline, control_system))
    }

    /// Devices in declaration order.
    pub fn devices(&self) -> Vec<&dyn Device> {
        vec![
            &self.cryostream as &dyn Device,
            &self.gonio,
            &self.work_pos,
            &self.mount_pos,
            &self.dewar,
            &self.robot_arm,
        ]
    }

    /// Complete address map, each path prefixed with its device name.
    pub fn components(&self) -> Vec<ComponentInfo> {
        self.devices()
            .into_iter()
            .flat_map(|device| {
                let parent = device.name().to_string();
                device
                    .components()
                    .into_iter()
                    .map(move |c| c.nested(&parent))
            })
            .collect()
    }

    /// Create every PV in `sim` and attach the records that drive them:
    /// motor records for each motor, the dewar's virtual axis linked to its
    /// motor, and the cryostream ramp.
    pub fn attach_simulation(&self, sim: &SimControlSystem) -> MxResult<()> {
        sim.seed(&self.components());

        for motor in self.gonio.motors() {
            sim.add_motor_record(motor.prefix(), 0.0);
        }
        sim.add_motor_record(self.dewar.rotation_motor.prefix(), 0.0);
        sim.add_soft_link(
            self.dewar.rotation.pv(),
            self.dewar.rotation_motor.user_setpoint.pv(),
        );

        let cryo = &self.cryostream;
        sim.add_ramp_record(
            cryo.readback.pv(),
            cryo.setpoint.pv(),
            cryo.actuate.pv(),
            SIM_START_KELVIN,
        );

        sim.post(self.robot_arm.speed.pv(), FULL_SPEED)?;
        for sector in self.dewar.sectors() {
            for (_, puck) in sector.pucks() {
                sim.post(puck.status.pv(), 1i64)?;
            }
        }

        tracing::info!(
            mode = ?sim.mode(),
            pvs = sim.pv_names().len(),
            "Simulated beamline ready"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_address_map_paths_are_unique() {
        let sim = SimControlSystem::instant();
        let beamline = Beamline::new(sim.client(), &BeamlineConfig::default());
        let components = beamline.components();

        let paths: HashSet<_> = components.iter().map(|c| c.path.as_str()).collect();
        assert_eq!(paths.len(), components.len());
        // 4 + 6 * 15 + 4 + 4 + (1 + 15 + 24) + 1
        assert_eq!(components.len(), 143);
        assert!(paths.contains("dewar.sectors.sector_7.A.status"));
        assert!(paths.contains("gonio.o.user_readback"));
        assert!(paths.contains("robot_arm.speed"));
    }

    #[test]
    fn test_stop_signal_shares_actuate_pv() {
        let sim = SimControlSystem::instant();
        let beamline = Beamline::new(sim.client(), &BeamlineConfig::default());
        let pvs: Vec<_> = beamline
            .components()
            .into_iter()
            .filter(|c| c.pv.ends_with("RAMP.PROC"))
            .map(|c| c.path)
            .collect();
        assert_eq!(pvs, vec!["cryostream.actuate", "cryostream.stop_signal"]);
    }

    #[tokio::test]
    async fn test_simulated_beamline_defaults() {
        let (beamline, sim) =
            Beamline::simulated(&BeamlineConfig::default(), &SimConfig::default()).unwrap();

        assert!(beamline.robot_arm.is_full_speed().await.unwrap());
        assert_eq!(beamline.dewar.get_puck_status("1A").await.unwrap(), 1);
        assert_eq!(beamline.cryostream.readback.get().await.unwrap(), SIM_START_KELVIN);
        // Every declared PV exists in the simulator
        for component in beamline.components() {
            assert!(sim.value(&component.pv).is_some(), "{} missing", component.pv);
        }
    }
}
