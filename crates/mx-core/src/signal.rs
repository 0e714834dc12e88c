//! Typed signals bound to a single PV.
//!
//! A [`Signal<T>`] is a writable control point (set point or command
//! trigger). A [`SignalRO<T>`] is a readback. Both map to exactly one PV
//! address, fixed when the signal is constructed, and share the device's
//! [`PvClient`].
//!
//! # Waiting on transitions
//!
//! [`Signal::subscribe`] returns a [`Subscription`] seeded with the value at
//! subscription time. [`Subscription::wait_for`] resolves on the first
//! posted update for which `predicate(previous, current)` holds, which is
//! how edge-triggered waits (motor started, motor finished) are expressed:
//!
//! ```rust,ignore
//! let mut dmov = motor.motor_done_move.subscribe().await?;
//! motor.user_setpoint.set(12.5).await?;
//! dmov.wait_for(|old, new| *old && !*new, None).await?; // started
//! dmov.wait_for(|old, new| !*old && *new, None).await?; // finished
//! ```

use crate::capabilities::{ComponentInfo, Readable};
use crate::client::{PvClient, PvMonitor};
use crate::error::{MxError, MxResult};
use crate::pv::PvType;
use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

/// Descriptive metadata for a signal.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SignalMetadata {
    /// Component name within the parent device
    pub name: String,
    /// Full PV address
    pub pv: String,
    /// Human-readable description
    pub description: Option<String>,
    /// Physical units (e.g. "K", "deg", "mm", "%")
    pub units: Option<String>,
    /// Whether writes are rejected
    pub read_only: bool,
}

// =============================================================================
// Signal<T>
// =============================================================================

/// Writable control point backed by one PV.
pub struct Signal<T: PvType> {
    client: Arc<dyn PvClient>,
    meta: SignalMetadata,
    _marker: PhantomData<fn() -> T>,
}

impl<T: PvType> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            meta: self.meta.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T: PvType> fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("name", &self.meta.name)
            .field("pv", &self.meta.pv)
            .field("type", &T::TYPE_NAME)
            .finish_non_exhaustive()
    }
}

impl<T: PvType> Signal<T> {
    /// Bind a signal named `name` to the PV address `pv`.
    pub fn new(client: Arc<dyn PvClient>, name: impl Into<String>, pv: impl Into<String>) -> Self {
        Self {
            client,
            meta: SignalMetadata {
                name: name.into(),
                pv: pv.into(),
                description: None,
                units: None,
                read_only: false,
            },
            _marker: PhantomData,
        }
    }

    /// Add a description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.meta.description = Some(description.into());
        self
    }

    /// Add units.
    pub fn with_units(mut self, units: impl Into<String>) -> Self {
        self.meta.units = Some(units.into());
        self
    }

    /// Component name.
    pub fn name(&self) -> &str {
        &self.meta.name
    }

    /// PV address.
    pub fn pv(&self) -> &str {
        &self.meta.pv
    }

    /// Signal metadata.
    pub fn metadata(&self) -> &SignalMetadata {
        &self.meta
    }

    /// Address-map entry for this signal.
    pub fn component(&self) -> ComponentInfo {
        ComponentInfo::new(
            &self.meta.name,
            &self.meta.pv,
            T::TYPE_NAME,
            self.meta.read_only,
        )
    }

    /// Read the current value.
    pub async fn get(&self) -> MxResult<T> {
        let value = self.client.get(&self.meta.pv).await?;
        T::from_pv(&self.meta.pv, value)
    }

    /// Write a new value.
    pub async fn set(&self, value: T) -> MxResult<()> {
        if self.meta.read_only {
            return Err(MxError::PvReadOnly(self.meta.pv.clone()));
        }
        tracing::debug!(pv = %self.meta.pv, value = ?value, "put");
        self.client.put(&self.meta.pv, value.into_pv()).await
    }

    /// Subscribe to updates, seeded with the current value.
    ///
    /// The monitor is opened before the current value is read, so no update
    /// posted after this call returns can be missed. Updates that land while
    /// the subscription is being set up are folded into the seed value and
    /// never reported as transitions.
    pub async fn subscribe(&self) -> MxResult<Subscription<T>> {
        let mut monitor = self.client.monitor(&self.meta.pv)?;
        let mut last = self.get().await?;
        while let Some(raw) = monitor.try_recv()? {
            last = T::from_pv(&self.meta.pv, raw)?;
        }
        Ok(Subscription { monitor, last })
    }

    /// Subscribe and wait for `predicate(previous, current)` to hold.
    pub async fn wait_for<F>(&self, predicate: F, timeout: Option<Duration>) -> MxResult<T>
    where
        F: FnMut(&T, &T) -> bool + Send,
    {
        let mut sub = self.subscribe().await?;
        sub.wait_for(predicate, timeout).await
    }

    fn into_read_only(mut self) -> Self {
        self.meta.read_only = true;
        self
    }
}

#[async_trait]
impl Readable for Signal<f64> {
    async fn read(&self) -> Result<f64> {
        Ok(self.get().await?)
    }
}

// =============================================================================
// SignalRO<T>
// =============================================================================

/// Read-only readback backed by one PV.
#[derive(Clone, Debug)]
pub struct SignalRO<T: PvType> {
    inner: Signal<T>,
}

impl<T: PvType> SignalRO<T> {
    /// Bind a read-only signal named `name` to the PV address `pv`.
    pub fn new(client: Arc<dyn PvClient>, name: impl Into<String>, pv: impl Into<String>) -> Self {
        Self {
            inner: Signal::new(client, name, pv).into_read_only(),
        }
    }

    /// Add a description.
    pub fn with_description(self, description: impl Into<String>) -> Self {
        Self {
            inner: self.inner.with_description(description),
        }
    }

    /// Add units.
    pub fn with_units(self, units: impl Into<String>) -> Self {
        Self {
            inner: self.inner.with_units(units),
        }
    }

    /// Component name.
    pub fn name(&self) -> &str {
        self.inner.name()
    }

    /// PV address.
    pub fn pv(&self) -> &str {
        self.inner.pv()
    }

    /// Signal metadata.
    pub fn metadata(&self) -> &SignalMetadata {
        self.inner.metadata()
    }

    /// Address-map entry for this signal.
    pub fn component(&self) -> ComponentInfo {
        self.inner.component()
    }

    /// Read the current value.
    pub async fn get(&self) -> MxResult<T> {
        self.inner.get().await
    }

    /// Subscribe to updates, seeded with the current value.
    pub async fn subscribe(&self) -> MxResult<Subscription<T>> {
        self.inner.subscribe().await
    }

    /// Subscribe and wait for `predicate(previous, current)` to hold.
    pub async fn wait_for<F>(&self, predicate: F, timeout: Option<Duration>) -> MxResult<T>
    where
        F: FnMut(&T, &T) -> bool + Send,
    {
        self.inner.wait_for(predicate, timeout).await
    }
}

#[async_trait]
impl Readable for SignalRO<f64> {
    async fn read(&self) -> Result<f64> {
        Ok(self.get().await?)
    }
}

// =============================================================================
// Subscription<T>
// =============================================================================

/// Typed stream of updates for one signal, tracking the previous value.
#[derive(Debug)]
pub struct Subscription<T: PvType> {
    monitor: PvMonitor,
    last: T,
}

impl<T: PvType> Subscription<T> {
    /// Most recently observed value.
    pub fn current(&self) -> &T {
        &self.last
    }

    /// PV this subscription follows.
    pub fn pv(&self) -> &str {
        self.monitor.pv()
    }

    /// Wait for the next update, returning `(previous, current)`.
    pub async fn next(&mut self) -> MxResult<(T, T)> {
        let raw = self.monitor.recv().await?;
        let value = T::from_pv(self.monitor.pv(), raw)?;
        let previous = std::mem::replace(&mut self.last, value.clone());
        Ok((previous, value))
    }

    /// Wait until an update satisfies `predicate(previous, current)`.
    ///
    /// Returns the value that satisfied it. With `timeout = None` this waits
    /// indefinitely.
    pub async fn wait_for<F>(&mut self, mut predicate: F, timeout: Option<Duration>) -> MxResult<T>
    where
        F: FnMut(&T, &T) -> bool + Send,
    {
        let pv = self.monitor.pv().to_string();
        let wait = async {
            loop {
                let (previous, current) = self.next().await?;
                if predicate(&previous, &current) {
                    return Ok(current);
                }
            }
        };

        match timeout {
            None => wait.await,
            Some(limit) => match tokio::time::timeout(limit, wait).await {
                Ok(result) => result,
                Err(_) => Err(MxError::Timeout {
                    what: format!("transition on {}", pv),
                    after: limit,
                }),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pv::PvValue;
    use crate::testing::MemoryClient;

    #[tokio::test]
    async fn test_get_and_set_round_trip_through_client() {
        let client = MemoryClient::new();
        client.add("BL:RTEMP", 100.0, false);

        let setpoint: Signal<f64> = Signal::new(client.clone(), "setpoint", "BL:RTEMP");
        setpoint.set(120.5).await.unwrap();

        assert_eq!(setpoint.get().await.unwrap(), 120.5);
        assert_eq!(client.value("BL:RTEMP"), PvValue::Double(120.5));
    }

    #[tokio::test]
    async fn test_read_only_signal_has_no_write_path() {
        let client = MemoryClient::new();
        client.add("BL:TEMP", 100.0, true);

        let readback: SignalRO<f64> = SignalRO::new(client, "readback", "BL:TEMP").with_units("K");
        assert!(readback.metadata().read_only);
        assert_eq!(readback.metadata().units.as_deref(), Some("K"));
        assert_eq!(readback.read().await.unwrap(), 100.0);
        assert!(readback.component().read_only);
    }

    #[tokio::test]
    async fn test_wait_for_sees_falling_then_rising_edge() {
        let client = MemoryClient::new();
        client.add("BL:DMOV", 1i64, true);

        let dmov: SignalRO<bool> = SignalRO::new(client.clone(), "motor_done_move", "BL:DMOV");
        let mut sub = dmov.subscribe().await.unwrap();
        assert!(*sub.current());

        // Both edges are posted before anyone waits
        client.post("BL:DMOV", 0i64);
        client.post("BL:DMOV", 1i64);

        sub.wait_for(|old, new| *old && !*new, None).await.unwrap();
        sub.wait_for(|old, new| !*old && *new, None).await.unwrap();
        assert!(*sub.current());
    }

    /// Posts a full 0 -> 1 pulse on every read, between monitor and seed.
    struct PulseOnGet {
        inner: Arc<MemoryClient>,
    }

    #[async_trait]
    impl PvClient for PulseOnGet {
        async fn get(&self, pv: &str) -> MxResult<PvValue> {
            self.inner.post(pv, 0i64);
            self.inner.post(pv, 1i64);
            self.inner.get(pv).await
        }

        async fn put(&self, pv: &str, value: PvValue) -> MxResult<()> {
            self.inner.put(pv, value).await
        }

        fn monitor(&self, pv: &str) -> MxResult<PvMonitor> {
            self.inner.monitor(pv)
        }
    }

    #[tokio::test]
    async fn test_updates_during_subscribe_are_not_edges() {
        let inner = MemoryClient::new();
        inner.add("BL:DMOV", 1i64, true);
        let client = Arc::new(PulseOnGet { inner });

        let dmov: SignalRO<bool> = SignalRO::new(client, "motor_done_move", "BL:DMOV");
        let mut sub = dmov.subscribe().await.unwrap();
        assert!(*sub.current());

        let err = sub
            .wait_for(|old, new| *old && !*new, Some(Duration::from_millis(20)))
            .await
            .unwrap_err();
        assert!(matches!(err, MxError::Timeout { .. }));
    }

    #[test]
    fn test_description_metadata() {
        let client = MemoryClient::new();
        let setpoint: Signal<f64> =
            Signal::new(client, "setpoint", "BL:RTEMP").with_description("Target temperature");
        assert_eq!(
            setpoint.metadata().description.as_deref(),
            Some("Target temperature")
        );
    }

    #[tokio::test]
    async fn test_wait_for_times_out() {
        let client = MemoryClient::new();
        client.add("BL:DMOV", 1i64, true);

        let dmov: SignalRO<bool> = SignalRO::new(client, "motor_done_move", "BL:DMOV");
        let err = dmov
            .wait_for(|old, new| *old && !*new, Some(Duration::from_millis(20)))
            .await
            .unwrap_err();

        assert!(matches!(err, MxError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_type_mismatch_from_client() {
        let client = MemoryClient::new();
        client.add("BL:EGU", "mm", true);

        let egu: SignalRO<f64> = SignalRO::new(client, "motor_egu", "BL:EGU");
        assert!(matches!(
            egu.get().await.unwrap_err(),
            MxError::TypeMismatch { .. }
        ));
    }
}
