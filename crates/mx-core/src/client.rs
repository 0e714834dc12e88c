//! Control-system client seam.
//!
//! Devices never talk to the network themselves. Every PV access goes
//! through a [`PvClient`], which a deployment backs with its control-system
//! library and tests back with the simulated control system in `mx-sim`.
//!
//! # Contract
//!
//! - `get` returns the PV's current value
//! - `put` writes a value; read-only PVs fail with [`MxError::PvReadOnly`]
//! - `monitor` delivers every value posted after the call, in order

use crate::error::{MxError, MxResult};
use crate::pv::PvValue;
use async_trait::async_trait;
use tokio::sync::broadcast;

/// Number of monitor updates buffered per subscriber before it lags.
pub const MONITOR_CAPACITY: usize = 256;

/// Access to process variables in the control system.
#[async_trait]
pub trait PvClient: Send + Sync {
    /// Read the current value of `pv`.
    async fn get(&self, pv: &str) -> MxResult<PvValue>;

    /// Write `value` to `pv`.
    async fn put(&self, pv: &str, value: PvValue) -> MxResult<()>;

    /// Subscribe to value updates of `pv`.
    fn monitor(&self, pv: &str) -> MxResult<PvMonitor>;
}

/// Ordered stream of updates for one PV.
///
/// Wraps a `tokio::sync::broadcast` receiver. If the subscriber falls more
/// than [`MONITOR_CAPACITY`] updates behind, the skipped updates are dropped
/// with a warning and delivery resumes from the oldest retained value.
#[derive(Debug)]
pub struct PvMonitor {
    pv: String,
    rx: broadcast::Receiver<PvValue>,
}

impl PvMonitor {
    /// Wrap a broadcast receiver for `pv`.
    pub fn new(pv: impl Into<String>, rx: broadcast::Receiver<PvValue>) -> Self {
        Self { pv: pv.into(), rx }
    }

    /// PV this monitor follows.
    pub fn pv(&self) -> &str {
        &self.pv
    }

    /// Wait for the next update.
    pub async fn recv(&mut self) -> MxResult<PvValue> {
        loop {
            match self.rx.recv().await {
                Ok(value) => return Ok(value),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(pv = %self.pv, skipped, "Monitor lagged, updates dropped");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(MxError::MonitorClosed(self.pv.clone()));
                }
            }
        }
    }

    /// Take the next queued update without waiting, `None` if the queue is empty.
    pub fn try_recv(&mut self) -> MxResult<Option<PvValue>> {
        loop {
            match self.rx.try_recv() {
                Ok(value) => return Ok(Some(value)),
                Err(broadcast::error::TryRecvError::Empty) => return Ok(None),
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    tracing::warn!(pv = %self.pv, skipped, "Monitor lagged, updates dropped");
                }
                Err(broadcast::error::TryRecvError::Closed) => {
                    return Err(MxError::MonitorClosed(self.pv.clone()));
                }
            }
        }
    }
}
