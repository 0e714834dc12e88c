//! Cryostream sample temperature controller.
//!
//! The controller is driven like a positioner: write the target to the
//! set point, process the ramp record with [`CryoStreamCmd::StartRamp`], and
//! consider the move finished once the readback is close to the set point.
//! Stopping processes the same record with [`CryoStreamCmd::StopRamp`].
//!
//! | Component | Suffix | Access |
//! |---|---|---|
//! | `readback` | `TEMP` | read-only |
//! | `setpoint` | `RTEMP` | read/write |
//! | `actuate` | `RAMP.PROC` | command |
//! | `stop_signal` | `RAMP.PROC` | command |

use anyhow::Result;
use async_trait::async_trait;
use mx_core::config::CryoStreamConfig;
use mx_core::{
    pv_name, ComponentInfo, Device, DeviceCategory, Movable, MxResult, PvClient, Readable,
    Signal, SignalRO,
};
use std::sync::Arc;
use std::time::Duration;

/// Value written to the ramp record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i64)]
pub enum CryoStreamCmd {
    /// Start ramping towards the set point
    StartRamp = 1,
    /// Stop the ramp
    StopRamp = 0,
}

impl From<CryoStreamCmd> for i64 {
    fn from(cmd: CryoStreamCmd) -> Self {
        cmd as i64
    }
}

/// Cryostream temperature controller.
#[derive(Clone, Debug)]
pub struct CryoStream {
    name: String,
    /// Sample temperature (`TEMP`)
    pub readback: SignalRO<f64>,
    /// Target temperature (`RTEMP`)
    pub setpoint: Signal<f64>,
    /// Ramp trigger (`RAMP.PROC`)
    pub actuate: Signal<i64>,
    /// Ramp stop (`RAMP.PROC`)
    pub stop_signal: Signal<i64>,
    atol: f64,
    rtol: f64,
}

impl CryoStream {
    /// Value written to `actuate` to start a ramp.
    pub const ACTUATE_VALUE: CryoStreamCmd = CryoStreamCmd::StartRamp;
    /// Value written to `stop_signal` to stop a ramp.
    pub const STOP_VALUE: CryoStreamCmd = CryoStreamCmd::StopRamp;

    /// Bind a cryostream at `prefix` with default tolerances.
    pub fn new(client: Arc<dyn PvClient>, name: impl Into<String>, prefix: &str) -> Self {
        let defaults = CryoStreamConfig::default();
        Self {
            name: name.into(),
            readback: SignalRO::new(client.clone(), "readback", pv_name(prefix, "TEMP"))
                .with_description("Sample temperature")
                .with_units("K"),
            setpoint: Signal::new(client.clone(), "setpoint", pv_name(prefix, "RTEMP"))
                .with_description("Target temperature")
                .with_units("K"),
            actuate: Signal::new(client.clone(), "actuate", pv_name(prefix, "RAMP.PROC")),
            stop_signal: Signal::new(client, "stop_signal", pv_name(prefix, "RAMP.PROC")),
            atol: defaults.atol,
            rtol: defaults.rtol,
        }
    }

    /// Bind a cryostream from its configuration section.
    pub fn from_config(client: Arc<dyn PvClient>, config: &CryoStreamConfig) -> Self {
        Self::new(client, "cryostream", &config.prefix).with_tolerance(config.atol, config.rtol)
    }

    /// Override the "temperature reached" tolerances.
    pub fn with_tolerance(mut self, atol: f64, rtol: f64) -> Self {
        self.atol = atol;
        self.rtol = rtol;
        self
    }

    /// Whether `readback` counts as having reached `setpoint`.
    pub fn is_close(&self, readback: f64, setpoint: f64) -> bool {
        (readback - setpoint).abs() <= self.atol + self.rtol * setpoint.abs()
    }

    /// Write the set point and start the ramp.
    pub async fn start_ramp(&self, kelvin: f64) -> MxResult<()> {
        tracing::info!(device = %self.name, kelvin, "Starting temperature ramp");
        self.setpoint.set(kelvin).await?;
        self.actuate.set(Self::ACTUATE_VALUE.into()).await
    }

    /// Ramp to `kelvin` and wait until the readback is close to it.
    pub async fn ramp_to(&self, kelvin: f64, timeout: Option<Duration>) -> MxResult<f64> {
        let mut readback = self.readback.subscribe().await?;
        self.start_ramp(kelvin).await?;

        if !self.is_close(*readback.current(), kelvin) {
            readback
                .wait_for(|_, new| self.is_close(*new, kelvin), timeout)
                .await?;
        }
        let reached = *readback.current();
        tracing::info!(device = %self.name, reached, "Temperature reached");
        Ok(reached)
    }

    /// Stop the ramp.
    pub async fn stop_ramp(&self) -> MxResult<()> {
        tracing::info!(device = %self.name, "Stopping temperature ramp");
        self.stop_signal.set(Self::STOP_VALUE.into()).await
    }
}

impl Device for CryoStream {
    fn name(&self) -> &str {
        &self.name
    }

    fn category(&self) -> DeviceCategory {
        DeviceCategory::TemperatureController
    }

    fn components(&self) -> Vec<ComponentInfo> {
        vec![
            self.readback.component(),
            self.setpoint.component(),
            self.actuate.component(),
            self.stop_signal.component(),
        ]
    }
}

#[async_trait]
impl Movable for CryoStream {
    async fn move_abs(&self, position: f64) -> Result<()> {
        Ok(self.start_ramp(position).await?)
    }

    async fn move_rel(&self, distance: f64) -> Result<()> {
        let current = self.readback.get().await?;
        self.move_abs(current + distance).await
    }

    async fn position(&self) -> Result<f64> {
        Ok(self.readback.get().await?)
    }

    async fn wait_settled(&self) -> Result<()> {
        let target = self.setpoint.get().await?;
        let mut readback = self.readback.subscribe().await?;
        if !self.is_close(*readback.current(), target) {
            readback
                .wait_for(|_, new| self.is_close(*new, target), None)
                .await?;
        }
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        Ok(self.stop_ramp().await?)
    }
}

#[async_trait]
impl Readable for CryoStream {
    async fn read(&self) -> Result<f64> {
        Ok(self.readback.get().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mx_core::{MxError, PvValue};
    use mx_sim::{MockMode, SimConfig, SimControlSystem};

    const PREFIX: &str = "XF:17IDB-ES:AMX{CS:1}";

    fn simulated(sim: SimControlSystem) -> (SimControlSystem, CryoStream) {
        let cryo = CryoStream::new(sim.client(), "cryostream", PREFIX);
        sim.add_ramp_record(cryo.readback.pv(), cryo.setpoint.pv(), cryo.actuate.pv(), 100.0);
        (sim, cryo)
    }

    #[test]
    fn test_addresses() {
        let (_, cryo) = simulated(SimControlSystem::instant());
        assert_eq!(cryo.readback.pv(), "XF:17IDB-ES:AMX{CS:1}TEMP");
        assert_eq!(cryo.setpoint.pv(), "XF:17IDB-ES:AMX{CS:1}RTEMP");
        assert_eq!(cryo.actuate.pv(), "XF:17IDB-ES:AMX{CS:1}RAMP.PROC");
        assert_eq!(cryo.stop_signal.pv(), cryo.actuate.pv());
        assert!(cryo.readback.metadata().read_only);
        assert_eq!(
            cryo.readback.metadata().description.as_deref(),
            Some("Sample temperature")
        );
        assert_eq!(i64::from(CryoStream::ACTUATE_VALUE), 1);
        assert_eq!(i64::from(CryoStream::STOP_VALUE), 0);
    }

    #[test]
    fn test_is_close_tolerances() {
        let (_, cryo) = simulated(SimControlSystem::instant());
        assert!(cryo.is_close(100.0, 100.0));
        assert!(cryo.is_close(100.0005, 100.0));
        assert!(!cryo.is_close(100.01, 100.0));

        let loose = cryo.with_tolerance(0.5, 0.0);
        assert!(loose.is_close(100.4, 100.0));
        assert!(!loose.is_close(100.6, 100.0));
    }

    #[tokio::test]
    async fn test_ramp_to_writes_setpoint_then_actuates() {
        let (sim, cryo) = simulated(SimControlSystem::instant());

        let reached = cryo.ramp_to(120.0, None).await.unwrap();

        assert_eq!(reached, 120.0);
        assert_eq!(sim.value(cryo.setpoint.pv()), Some(PvValue::Double(120.0)));
        assert_eq!(sim.value(cryo.actuate.pv()), Some(PvValue::Long(1)));
        assert_eq!(cryo.position().await.unwrap(), 120.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ramp_to_realistic_and_stop() {
        let (sim, cryo) = simulated(SimControlSystem::new(&SimConfig::with_mode(
            MockMode::Realistic,
        )));

        // 5 K/s: 20 K takes four seconds
        let reached = cryo
            .ramp_to(80.0, Some(Duration::from_secs(10)))
            .await
            .unwrap();
        assert_eq!(reached, 80.0);

        cryo.move_abs(100.0).await.unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        cryo.stop().await.unwrap();
        assert_eq!(sim.value(cryo.stop_signal.pv()), Some(PvValue::Long(0)));

        let held = cryo.read().await.unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(cryo.read().await.unwrap(), held);
        assert!(held < 100.0);
    }

    #[tokio::test]
    async fn test_ramp_to_times_out_without_ramp_record() {
        let sim = SimControlSystem::instant();
        let cryo = CryoStream::new(sim.client(), "cryostream", PREFIX);
        sim.seed(&cryo.components());

        let err = cryo
            .ramp_to(150.0, Some(Duration::from_millis(20)))
            .await
            .unwrap_err();
        assert!(matches!(err, MxError::Timeout { .. }));
    }
}
