//! Record processing.
//!
//! A record reacts to writes on one of its PVs, the way an IOC processes a
//! record when a channel access client puts to it:
//!
//! - **motor**: a write to `.VAL` drops `.DMOV`, raises `.MOVN`, drives
//!   `.RBV` to the target, then clears `.MOVN` and raises `.DMOV`. `.STOP`
//!   halts the motion in place; `.HOMF`/`.HOMR` drive to zero.
//! - **soft link**: a write is forwarded to another PV (e.g. a virtual
//!   rotation axis feeding its motor's `.VAL`).
//! - **ramp**: a non-zero write to the process field drives the readback
//!   towards the set point; zero stops the ramp where it is.
//!
//! In instant mode the whole sequence is posted before the triggering write
//! returns. In timed modes it runs on a background task; each new command
//! bumps a generation counter so superseded tasks exit quietly.

use mx_core::pv_name;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Motor record state shared with its motion tasks.
#[derive(Debug)]
pub(crate) struct MotorRecord {
    prefix: String,
    generation: AtomicU64,
}

impl MotorRecord {
    pub(crate) fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            generation: AtomicU64::new(0),
        }
    }

    pub(crate) fn prefix(&self) -> &str {
        &self.prefix
    }

    pub(crate) fn field(&self, suffix: &str) -> String {
        pv_name(&self.prefix, suffix)
    }

    /// Start a new command, superseding any running one.
    pub(crate) fn begin(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub(crate) fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }
}

/// Temperature ramp record state.
#[derive(Debug)]
pub(crate) struct RampRecord {
    pub(crate) readback: String,
    pub(crate) setpoint: String,
    generation: AtomicU64,
}

impl RampRecord {
    pub(crate) fn new(readback: &str, setpoint: &str) -> Self {
        Self {
            readback: readback.to_string(),
            setpoint: setpoint.to_string(),
            generation: AtomicU64::new(0),
        }
    }

    pub(crate) fn begin(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub(crate) fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }
}

/// What happens when a PV with an attached record is written.
#[derive(Debug, Clone)]
pub(crate) enum Record {
    /// `.VAL` of a motor
    MotorMove(Arc<MotorRecord>),
    /// `.STOP` of a motor
    MotorStop(Arc<MotorRecord>),
    /// `.HOMF` / `.HOMR` of a motor
    MotorHome(Arc<MotorRecord>),
    /// Forward to another PV
    Link(String),
    /// Process field of a ramp record
    Ramp(Arc<RampRecord>),
}

/// Readback positions for a linear move split into `steps` updates.
pub(crate) fn motion_profile(start: f64, target: f64, steps: u32) -> impl Iterator<Item = f64> {
    let steps = steps.max(1);
    (1..=steps).map(move |i| {
        if i == steps {
            target
        } else {
            start + (target - start) * f64::from(i) / f64::from(steps)
        }
    })
}

/// Number of updates for a move of `distance` at `speed` per second, one
/// per `interval_ms`.
pub(crate) fn step_count(distance: f64, speed: f64, interval_ms: u64) -> u32 {
    if speed <= 0.0 || !distance.is_finite() {
        return 1;
    }
    let seconds = distance.abs() / speed;
    let interval = interval_ms.max(1) as f64 / 1000.0;
    let steps = (seconds / interval).ceil();
    if steps < 1.0 {
        1
    } else if steps > f64::from(u32::MAX) {
        u32::MAX
    } else {
        steps as u32
    }
}
