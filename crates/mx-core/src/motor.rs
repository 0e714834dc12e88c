//! EPICS motor record.
//!
//! [`Motor`] binds the standard motor record fields under a single prefix
//! (`<prefix>.VAL`, `<prefix>.RBV`, `<prefix>.DMOV`, ...) and implements
//! [`Movable`] on top of them.
//!
//! Completion is tracked through `.DMOV` ("done moving"), which the record
//! drops to 0 when motion starts and raises back to 1 when it finishes.

use crate::capabilities::{ComponentInfo, Movable};
use crate::client::PvClient;
use crate::error::{MxError, MxResult};
use crate::pv::pv_name;
use crate::signal::{Signal, SignalRO};
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Homing direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HomeDirection {
    /// Home towards the high limit (`.HOMF`)
    Forward,
    /// Home towards the low limit (`.HOMR`)
    Reverse,
}

/// EPICS motor record bound to a prefix.
#[derive(Clone, Debug)]
pub struct Motor {
    name: String,
    prefix: String,
    /// Readback position (`.RBV`)
    pub user_readback: SignalRO<f64>,
    /// Target position (`.VAL`)
    pub user_setpoint: Signal<f64>,
    /// User offset (`.OFF`)
    pub user_offset: Signal<f64>,
    /// Velocity (`.VELO`)
    pub velocity: Signal<f64>,
    /// Acceleration time (`.ACCL`)
    pub acceleration: Signal<f64>,
    /// Engineering units (`.EGU`)
    pub motor_egu: SignalRO<String>,
    /// Motion in progress (`.MOVN`)
    pub motor_is_moving: SignalRO<bool>,
    /// Done moving (`.DMOV`)
    pub motor_done_move: SignalRO<bool>,
    /// High limit switch (`.HLS`)
    pub high_limit_switch: SignalRO<bool>,
    /// Low limit switch (`.LLS`)
    pub low_limit_switch: SignalRO<bool>,
    /// High soft limit (`.HLM`)
    pub high_limit_travel: Signal<f64>,
    /// Low soft limit (`.LLM`)
    pub low_limit_travel: Signal<f64>,
    /// Stop command (`.STOP`)
    pub motor_stop: Signal<i64>,
    /// Home forward command (`.HOMF`)
    pub home_forward: Signal<i64>,
    /// Home reverse command (`.HOMR`)
    pub home_reverse: Signal<i64>,
}

impl Motor {
    /// Bind a motor record named `name` at `prefix`.
    pub fn new(client: Arc<dyn PvClient>, name: impl Into<String>, prefix: impl Into<String>) -> Self {
        let name = name.into();
        let prefix = prefix.into();
        let pv = |suffix: &str| pv_name(&prefix, suffix);

        Self {
            user_readback: SignalRO::new(client.clone(), "user_readback", pv(".RBV")),
            user_setpoint: Signal::new(client.clone(), "user_setpoint", pv(".VAL")),
            user_offset: Signal::new(client.clone(), "user_offset", pv(".OFF")),
            velocity: Signal::new(client.clone(), "velocity", pv(".VELO")),
            acceleration: Signal::new(client.clone(), "acceleration", pv(".ACCL")),
            motor_egu: SignalRO::new(client.clone(), "motor_egu", pv(".EGU")),
            motor_is_moving: SignalRO::new(client.clone(), "motor_is_moving", pv(".MOVN")),
            motor_done_move: SignalRO::new(client.clone(), "motor_done_move", pv(".DMOV")),
            high_limit_switch: SignalRO::new(client.clone(), "high_limit_switch", pv(".HLS")),
            low_limit_switch: SignalRO::new(client.clone(), "low_limit_switch", pv(".LLS")),
            high_limit_travel: Signal::new(client.clone(), "high_limit_travel", pv(".HLM")),
            low_limit_travel: Signal::new(client.clone(), "low_limit_travel", pv(".LLM")),
            motor_stop: Signal::new(client.clone(), "motor_stop", pv(".STOP")),
            home_forward: Signal::new(client.clone(), "home_forward", pv(".HOMF")),
            home_reverse: Signal::new(client, "home_reverse", pv(".HOMR")),
            name,
            prefix,
        }
    }

    /// Motor name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Record prefix.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Address-map entries for every record field, in declaration order.
    pub fn components(&self) -> Vec<ComponentInfo> {
        vec![
            self.user_readback.component(),
            self.user_setpoint.component(),
            self.user_offset.component(),
            self.velocity.component(),
            self.acceleration.component(),
            self.motor_egu.component(),
            self.motor_is_moving.component(),
            self.motor_done_move.component(),
            self.high_limit_switch.component(),
            self.low_limit_switch.component(),
            self.high_limit_travel.component(),
            self.low_limit_travel.component(),
            self.motor_stop.component(),
            self.home_forward.component(),
            self.home_reverse.component(),
        ]
    }

    /// Whether the record reports done moving.
    pub async fn is_done(&self) -> MxResult<bool> {
        self.motor_done_move.get().await
    }

    /// Check `target` against the soft travel limits.
    ///
    /// The record treats `LLM == HLM == 0` as unlimited travel.
    pub async fn check_limits(&self, target: f64) -> MxResult<()> {
        if !target.is_finite() {
            return Err(MxError::InvalidValue(format!(
                "target {} for motor '{}' is not finite",
                target, self.name
            )));
        }
        let low = self.low_limit_travel.get().await?;
        let high = self.high_limit_travel.get().await?;
        if low == 0.0 && high == 0.0 {
            return Ok(());
        }
        if target < low || target > high {
            return Err(MxError::SoftLimit {
                motor: self.name.clone(),
                target,
                low,
                high,
            });
        }
        Ok(())
    }

    /// Move to `target` and wait until the record reports done.
    ///
    /// Subscribes to `.DMOV` before writing `.VAL`, then waits for the
    /// falling edge (motion started) and the rising edge (motion finished).
    /// Fails with [`MxError::MotorAlreadyMoving`] without writing if the
    /// record is not idle.
    pub async fn move_and_wait(&self, target: f64, timeout: Option<Duration>) -> MxResult<f64> {
        self.check_limits(target).await?;

        let mut done = self.motor_done_move.subscribe().await?;
        if !*done.current() {
            return Err(MxError::MotorAlreadyMoving(self.name.clone()));
        }

        tracing::debug!(motor = %self.name, target, "Moving");
        self.user_setpoint.set(target).await?;

        done.wait_for(|old, new| *old && !*new, timeout).await?;
        done.wait_for(|old, new| !*old && *new, timeout).await?;

        let position = self.user_readback.get().await?;
        tracing::debug!(motor = %self.name, position, "Move complete");
        Ok(position)
    }

    /// Start a homing search.
    pub async fn home(&self, direction: HomeDirection) -> MxResult<()> {
        tracing::info!(motor = %self.name, ?direction, "Homing");
        match direction {
            HomeDirection::Forward => self.home_forward.set(1).await,
            HomeDirection::Reverse => self.home_reverse.set(1).await,
        }
    }
}

#[async_trait]
impl Movable for Motor {
    async fn move_abs(&self, position: f64) -> Result<()> {
        self.check_limits(position).await?;
        self.user_setpoint.set(position).await?;
        Ok(())
    }

    async fn move_rel(&self, distance: f64) -> Result<()> {
        let current = self.user_readback.get().await?;
        self.move_abs(current + distance).await
    }

    async fn position(&self) -> Result<f64> {
        Ok(self.user_readback.get().await?)
    }

    async fn wait_settled(&self) -> Result<()> {
        let mut done = self.motor_done_move.subscribe().await?;
        if !*done.current() {
            done.wait_for(|_, new| *new, None).await?;
        }
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        tracing::info!(motor = %self.name, "Stop");
        self.motor_stop.set(1).await?;
        Ok(())
    }
}
