//! Minimal in-memory PV table for unit tests in this crate.

use crate::client::{PvClient, PvMonitor, MONITOR_CAPACITY};
use crate::error::{MxError, MxResult};
use crate::pv::PvValue;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;

struct Entry {
    value: PvValue,
    read_only: bool,
    tx: broadcast::Sender<PvValue>,
}

#[derive(Default)]
pub(crate) struct MemoryClient {
    pvs: Mutex<HashMap<String, Entry>>,
}

impl MemoryClient {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn add(&self, pv: &str, value: impl Into<PvValue>, read_only: bool) {
        let (tx, _) = broadcast::channel(MONITOR_CAPACITY);
        self.pvs.lock().insert(
            pv.to_string(),
            Entry {
                value: value.into(),
                read_only,
                tx,
            },
        );
    }

    /// Post a value as the IOC would, bypassing read-only checks.
    pub(crate) fn post(&self, pv: &str, value: impl Into<PvValue>) {
        let value = value.into();
        let mut pvs = self.pvs.lock();
        let entry = pvs.get_mut(pv).unwrap();
        entry.value = value.clone();
        let _ = entry.tx.send(value);
    }

    pub(crate) fn value(&self, pv: &str) -> PvValue {
        self.pvs.lock()[pv].value.clone()
    }
}

#[async_trait]
impl PvClient for MemoryClient {
    async fn get(&self, pv: &str) -> MxResult<PvValue> {
        self.pvs
            .lock()
            .get(pv)
            .map(|e| e.value.clone())
            .ok_or_else(|| MxError::PvNotFound(pv.to_string()))
    }

    async fn put(&self, pv: &str, value: PvValue) -> MxResult<()> {
        let mut pvs = self.pvs.lock();
        let entry = pvs
            .get_mut(pv)
            .ok_or_else(|| MxError::PvNotFound(pv.to_string()))?;
        if entry.read_only {
            return Err(MxError::PvReadOnly(pv.to_string()));
        }
        entry.value = value.clone();
        let _ = entry.tx.send(value);
        Ok(())
    }

    fn monitor(&self, pv: &str) -> MxResult<PvMonitor> {
        let pvs = self.pvs.lock();
        let entry = pvs
            .get(pv)
            .ok_or_else(|| MxError::PvNotFound(pv.to_string()))?;
        Ok(PvMonitor::new(pv, entry.tx.subscribe()))
    }
}
