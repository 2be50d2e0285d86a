//! BLE Scanner Module
//!
//! Scan pass bookkeeping: whether a scan is running, when it must be
//! force-stopped, and which addresses were already reported.

use crate::domain::models::{Device, DeviceType};
use crate::infrastructure::bluetooth::protocol;
use std::collections::HashSet;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Default)]
pub struct BleScanner {
    deadline: Option<Instant>,
    seen: HashSet<String>,
}

impl BleScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin a new pass that times out after `timeout`. Returns false if a
    /// pass is already running.
    pub fn start(&mut self, timeout: Duration) -> bool {
        if self.is_scanning() {
            return false;
        }
        self.seen.clear();
        self.deadline = Some(Instant::now() + timeout);
        true
    }

    /// End the running pass. Returns false if none was running.
    pub fn stop(&mut self) -> bool {
        self.deadline.take().is_some()
    }

    pub fn is_scanning(&self) -> bool {
        self.deadline.is_some()
    }

    /// When the running pass has to be force-stopped.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Turn a scan result into a [`Device`], or `None` if this address was
    /// already reported during the current pass.
    pub fn observe(
        &mut self,
        address: &str,
        adv_data: &[u8],
        rssi: i32,
        device_type: i32,
    ) -> Option<Device> {
        if !self.seen.insert(address.to_string()) {
            return None;
        }
        Some(Device {
            name: protocol::local_name(adv_data),
            address: address.to_string(),
            rssi,
            device_type: DeviceType::from_raw(device_type),
        })
    }
}
