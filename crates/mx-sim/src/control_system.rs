//! In-memory control system.
//!
//! [`SimControlSystem`] is a PV database behind the [`PvClient`] seam. Every
//! PV holds one [`PvValue`], a read-only flag and a broadcast channel feeding
//! its monitors. Records attached with [`SimControlSystem::add_motor_record`],
//! [`SimControlSystem::add_soft_link`] and [`SimControlSystem::add_ramp_record`]
//! play the IOC side: they post readbacks and done flags in response to
//! client writes.
//!
//! # Example
//!
//! ```rust,ignore
//! let sim = SimControlSystem::new(&SimConfig::default());
//! sim.add_motor_record("BL{Gon:1-Ax:O}Mtr", 0.0);
//! sim.put("BL{Gon:1-Ax:O}Mtr.VAL", 90.0.into()).await?;
//! assert_eq!(sim.value("BL{Gon:1-Ax:O}Mtr.RBV"), Some(90.0.into()));
//! ```

use crate::common::{ErrorConfig, MockMode, TimingConfig};
use crate::config::SimConfig;
use crate::records::{motion_profile, step_count, MotorRecord, RampRecord, Record};
use async_trait::async_trait;
use mx_core::client::MONITOR_CAPACITY;
use mx_core::{
    ComponentInfo, DeviceError, DeviceErrorKind, MxError, MxResult, PvClient, PvMonitor, PvValue,
};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::time::sleep;

struct SimPv {
    value: PvValue,
    read_only: bool,
    tx: broadcast::Sender<PvValue>,
}

impl SimPv {
    fn new(value: PvValue, read_only: bool) -> Self {
        let (tx, _) = broadcast::channel(MONITOR_CAPACITY);
        Self {
            value,
            read_only,
            tx,
        }
    }

    fn post(&mut self, value: PvValue) {
        self.value = value.clone();
        // No receivers is fine; the value is still stored
        let _ = self.tx.send(value);
    }
}

struct Inner {
    pvs: RwLock<HashMap<String, SimPv>>,
    records: RwLock<HashMap<String, Record>>,
    mode: MockMode,
    motor_timing: TimingConfig,
    ramp_timing: TimingConfig,
    motor_speed: f64,
    ramp_rate: f64,
    errors: ErrorConfig,
}

/// Simulated control system.
///
/// Cheap to clone; clones share the same PV database.
#[derive(Clone)]
pub struct SimControlSystem {
    inner: Arc<Inner>,
}

impl SimControlSystem {
    /// Empty control system with the given settings.
    pub fn new(config: &SimConfig) -> Self {
        let (motor_timing, ramp_timing) = if config.mode.is_timed() {
            (TimingConfig::motor(), TimingConfig::cryostream())
        } else {
            (TimingConfig::default(), TimingConfig::default())
        };
        Self {
            inner: Arc::new(Inner {
                pvs: RwLock::new(HashMap::new()),
                records: RwLock::new(HashMap::new()),
                mode: config.mode,
                motor_timing,
                ramp_timing,
                motor_speed: config.motor_speed_deg_per_sec,
                ramp_rate: config.ramp_rate_k_per_sec,
                errors: config.error_config(),
            }),
        }
    }

    /// Instant-mode control system with no injected faults.
    pub fn instant() -> Self {
        Self::new(&SimConfig::default())
    }

    /// Replace fault injection. Must be called before the system is shared.
    pub fn with_errors(self, errors: ErrorConfig) -> Self {
        let inner = match Arc::try_unwrap(self.inner) {
            Ok(inner) => inner,
            Err(shared) => {
                tracing::warn!("Control system already shared; fault injection unchanged");
                return Self { inner: shared };
            }
        };
        Self {
            inner: Arc::new(Inner { errors, ..inner }),
        }
    }

    /// Timing mode.
    pub fn mode(&self) -> MockMode {
        self.inner.mode
    }

    /// Shared handle usable wherever a [`PvClient`] is expected.
    pub fn client(&self) -> Arc<dyn PvClient> {
        Arc::new(self.clone())
    }

    // =========================================================================
    // Database
    // =========================================================================

    /// Create (or replace) a PV.
    pub fn add_pv(&self, pv: &str, value: impl Into<PvValue>, read_only: bool) {
        self.inner
            .pvs
            .write()
            .insert(pv.to_string(), SimPv::new(value.into(), read_only));
    }

    /// Create every PV listed in an address map that does not exist yet,
    /// holding the zero value of its type.
    pub fn seed(&self, components: &[ComponentInfo]) {
        let mut pvs = self.inner.pvs.write();
        for component in components {
            pvs.entry(component.pv.clone())
                .or_insert_with(|| SimPv::new(zero_value(component.dtype), component.read_only));
        }
        tracing::debug!(count = pvs.len(), "Seeded simulated PVs");
    }

    /// Post a value from the IOC side: bypasses read-only flags, fault
    /// injection and record processing.
    pub fn post(&self, pv: &str, value: impl Into<PvValue>) -> MxResult<()> {
        let mut pvs = self.inner.pvs.write();
        let entry = pvs
            .get_mut(pv)
            .ok_or_else(|| MxError::PvNotFound(pv.to_string()))?;
        entry.post(value.into());
        Ok(())
    }

    /// Current value of a PV.
    pub fn value(&self, pv: &str) -> Option<PvValue> {
        self.inner.pvs.read().get(pv).map(|entry| entry.value.clone())
    }

    /// Every PV address, sorted.
    pub fn pv_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.pvs.read().keys().cloned().collect();
        names.sort();
        names
    }

    // =========================================================================
    // Records
    // =========================================================================

    /// Attach a motor record at `prefix`, idle at `position`.
    ///
    /// Creates any missing record fields. Soft limits start at 0/0
    /// (unlimited travel).
    pub fn add_motor_record(&self, prefix: &str, position: f64) {
        let record = Arc::new(MotorRecord::new(prefix));
        {
            let mut pvs = self.inner.pvs.write();
            let fields: [(&str, PvValue, bool); 15] = [
                (".RBV", position.into(), true),
                (".VAL", position.into(), false),
                (".OFF", 0.0.into(), false),
                (".VELO", self.inner.motor_speed.into(), false),
                (".ACCL", 0.2.into(), false),
                (".EGU", "deg".into(), true),
                (".MOVN", 0i64.into(), true),
                (".DMOV", 1i64.into(), true),
                (".HLS", 0i64.into(), true),
                (".LLS", 0i64.into(), true),
                (".HLM", 0.0.into(), false),
                (".LLM", 0.0.into(), false),
                (".STOP", 0i64.into(), false),
                (".HOMF", 0i64.into(), false),
                (".HOMR", 0i64.into(), false),
            ];
            for (suffix, value, read_only) in fields {
                let entry = pvs
                    .entry(record.field(suffix))
                    .or_insert_with(|| SimPv::new(value.clone(), read_only));
                entry.value = value;
            }
        }

        let mut records = self.inner.records.write();
        records.insert(record.field(".VAL"), Record::MotorMove(record.clone()));
        records.insert(record.field(".STOP"), Record::MotorStop(record.clone()));
        records.insert(record.field(".HOMF"), Record::MotorHome(record.clone()));
        records.insert(record.field(".HOMR"), Record::MotorHome(record));
    }

    /// Forward every client write on `from` to `to`.
    pub fn add_soft_link(&self, from: &str, to: &str) {
        self.inner
            .records
            .write()
            .insert(from.to_string(), Record::Link(to.to_string()));
    }

    /// Attach a temperature ramp record.
    ///
    /// A non-zero write to `process` ramps `readback` towards the value of
    /// `setpoint`; zero stops the ramp.
    pub fn add_ramp_record(&self, readback: &str, setpoint: &str, process: &str, kelvin: f64) {
        {
            let mut pvs = self.inner.pvs.write();
            for (pv, value, read_only) in [
                (readback, PvValue::Double(kelvin), true),
                (setpoint, PvValue::Double(kelvin), false),
                (process, PvValue::Long(0), false),
            ] {
                pvs.insert(pv.to_string(), SimPv::new(value, read_only));
            }
        }
        self.inner.records.write().insert(
            process.to_string(),
            Record::Ramp(Arc::new(RampRecord::new(readback, setpoint))),
        );
    }

    // =========================================================================
    // Write path
    // =========================================================================

    /// Client write: honours read-only flags and runs record processing.
    fn write(&self, pv: &str, value: PvValue) -> MxResult<()> {
        {
            let mut pvs = self.inner.pvs.write();
            let entry = pvs
                .get_mut(pv)
                .ok_or_else(|| MxError::PvNotFound(pv.to_string()))?;
            if entry.read_only {
                return Err(MxError::PvReadOnly(pv.to_string()));
            }
            entry.post(value.clone());
        }
        tracing::trace!(pv, %value, "put");

        let record = self.inner.records.read().get(pv).cloned();
        match record {
            Some(record) => self.process(record, pv, value),
            None => Ok(()),
        }
    }

    fn process(&self, record: Record, pv: &str, value: PvValue) -> MxResult<()> {
        match record {
            Record::MotorMove(motor) => {
                let target = value.as_f64().filter(|v| v.is_finite()).ok_or_else(|| {
                    DeviceError::new(
                        pv,
                        DeviceErrorKind::InvalidParameter,
                        format!("{} is not a motor position", value),
                    )
                })?;
                self.start_motion(motor, target)
            }
            Record::MotorStop(motor) => {
                if is_set(&value) {
                    self.stop_motion(&motor)?;
                    self.post(pv, 0i64)?;
                }
                Ok(())
            }
            Record::MotorHome(motor) => {
                if is_set(&value) {
                    self.post(pv, 0i64)?;
                    self.start_motion(motor, 0.0)?;
                }
                Ok(())
            }
            Record::Link(target) => self.write(&target, value),
            Record::Ramp(ramp) => {
                if is_set(&value) {
                    self.start_ramp(ramp)
                } else {
                    ramp.begin();
                    tracing::debug!(readback = %ramp.readback, "Ramp stopped");
                    Ok(())
                }
            }
        }
    }

    fn number(&self, pv: &str) -> MxResult<f64> {
        let value = self
            .value(pv)
            .ok_or_else(|| MxError::PvNotFound(pv.to_string()))?;
        value.as_f64().ok_or_else(|| MxError::TypeMismatch {
            pv: pv.to_string(),
            expected: "f64",
            found: value.kind(),
        })
    }

    // =========================================================================
    // Motor record
    // =========================================================================

    fn start_motion(&self, motor: Arc<MotorRecord>, target: f64) -> MxResult<()> {
        let generation = motor.begin();
        let start = self.number(&motor.field(".RBV"))?;
        tracing::debug!(motor = motor.prefix(), start, target, "Motion started");

        self.post(&motor.field(".DMOV"), 0i64)?;
        self.post(&motor.field(".MOVN"), 1i64)?;

        if !self.inner.mode.is_timed() {
            self.post(&motor.field(".RBV"), target)?;
            return self.finish_motion(&motor);
        }

        let timing = self.inner.motor_timing;
        let steps = step_count(target - start, self.inner.motor_speed, timing.update_interval_ms);
        let sim = self.clone();
        tokio::spawn(async move {
            for position in motion_profile(start, target, steps) {
                sleep(timing.update_interval()).await;
                if !motor.is_current(generation) {
                    return;
                }
                sim.post_quiet(&motor.field(".RBV"), position);
            }
            sleep(timing.settling_time()).await;
            if motor.is_current(generation) {
                if let Err(e) = sim.finish_motion(&motor) {
                    tracing::warn!(motor = motor.prefix(), error = %e, "Motion did not complete");
                }
            }
        });
        Ok(())
    }

    fn finish_motion(&self, motor: &MotorRecord) -> MxResult<()> {
        self.post(&motor.field(".MOVN"), 0i64)?;
        self.post(&motor.field(".DMOV"), 1i64)?;
        tracing::debug!(motor = motor.prefix(), "Motion complete");
        Ok(())
    }

    fn stop_motion(&self, motor: &MotorRecord) -> MxResult<()> {
        motor.begin();
        let moving = self
            .value(&motor.field(".DMOV"))
            .and_then(|v| v.as_f64())
            .is_some_and(|done| done == 0.0);
        if moving {
            let position = self.number(&motor.field(".RBV"))?;
            self.post(&motor.field(".VAL"), position)?;
            self.finish_motion(motor)?;
        }
        tracing::info!(motor = motor.prefix(), moving, "Stop");
        Ok(())
    }

    // =========================================================================
    // Ramp record
    // =========================================================================

    fn start_ramp(&self, ramp: Arc<RampRecord>) -> MxResult<()> {
        let generation = ramp.begin();
        let start = self.number(&ramp.readback)?;
        let target = self.number(&ramp.setpoint)?;
        tracing::debug!(readback = %ramp.readback, start, target, "Ramp started");

        if !self.inner.mode.is_timed() {
            return self.post(&ramp.readback, target);
        }

        let timing = self.inner.ramp_timing;
        let steps = step_count(target - start, self.inner.ramp_rate, timing.update_interval_ms);
        let sim = self.clone();
        tokio::spawn(async move {
            for kelvin in motion_profile(start, target, steps) {
                sleep(timing.update_interval()).await;
                if !ramp.is_current(generation) {
                    return;
                }
                sim.post_quiet(&ramp.readback, kelvin);
            }
        });
        Ok(())
    }

    fn post_quiet(&self, pv: &str, value: f64) {
        if let Err(e) = self.post(pv, value) {
            tracing::warn!(pv, error = %e, "Record update dropped");
        }
    }

    async fn channel_delay(&self) {
        if self.inner.mode.is_timed() {
            sleep(self.inner.motor_timing.communication_delay()).await;
        }
    }
}

impl std::fmt::Debug for SimControlSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimControlSystem")
            .field("mode", &self.inner.mode)
            .field("pvs", &self.inner.pvs.read().len())
            .field("records", &self.inner.records.read().len())
            .finish()
    }
}

#[async_trait]
impl PvClient for SimControlSystem {
    async fn get(&self, pv: &str) -> MxResult<PvValue> {
        self.inner.errors.check_operation(pv, "get")?;
        self.channel_delay().await;
        self.value(pv)
            .ok_or_else(|| MxError::PvNotFound(pv.to_string()))
    }

    async fn put(&self, pv: &str, value: PvValue) -> MxResult<()> {
        self.inner.errors.check_operation(pv, "put")?;
        self.channel_delay().await;
        self.write(pv, value)
    }

    fn monitor(&self, pv: &str) -> MxResult<PvMonitor> {
        self.inner.errors.check_operation(pv, "monitor")?;
        let pvs = self.inner.pvs.read();
        let entry = pvs
            .get(pv)
            .ok_or_else(|| MxError::PvNotFound(pv.to_string()))?;
        Ok(PvMonitor::new(pv, entry.tx.subscribe()))
    }
}

fn zero_value(dtype: &str) -> PvValue {
    match dtype {
        "f64" => PvValue::Double(0.0),
        "string" => PvValue::Str(String::new()),
        _ => PvValue::Long(0),
    }
}

fn is_set(value: &PvValue) -> bool {
    value.as_f64().is_some_and(|v| v != 0.0)
}
