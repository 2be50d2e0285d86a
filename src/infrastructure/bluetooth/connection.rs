//! BLE Connection Module
//!
//! Session state shared by every controller operation: adapter and client
//! handles, the active link with its generation, the selection path and the
//! page depth the UI is showing.

use crate::domain::error::{GattError, SelectionLevel};
use crate::domain::gatt::{
    AdapterHandle, CharacteristicId, ClientHandle, ConnectionId, DescriptorId, ServiceId,
    WriteTarget,
};
use crate::domain::models::NavigationDepth;
use std::time::Duration;
use tokio::time::Instant;

/// The link currently open to a peripheral.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveConnection {
    pub id: ConnectionId,
    pub address: String,
    /// Bumped on every successful connect; requests issued under an older
    /// generation are stale.
    pub generation: u64,
}

/// Service → characteristic → descriptor path chosen by the user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    service: Option<ServiceId>,
    characteristic: Option<CharacteristicId>,
    descriptor: Option<DescriptorId>,
}

impl Selection {
    pub fn service(&self) -> Option<&ServiceId> {
        self.service.as_ref()
    }

    pub fn characteristic(&self) -> Option<&CharacteristicId> {
        self.characteristic.as_ref()
    }

    pub fn descriptor(&self) -> Option<&DescriptorId> {
        self.descriptor.as_ref()
    }

    pub fn select_service(&mut self, service: ServiceId) {
        self.service = Some(service);
        self.characteristic = None;
        self.descriptor = None;
    }

    pub fn select_characteristic(&mut self, characteristic: CharacteristicId) {
        self.characteristic = Some(characteristic);
        self.descriptor = None;
    }

    pub fn select_descriptor(&mut self, descriptor: DescriptorId) {
        self.descriptor = Some(descriptor);
    }

    /// Drop every selection level below `depth`.
    pub fn trim_to(&mut self, depth: NavigationDepth) {
        if depth < NavigationDepth::DescriptorDetail {
            self.descriptor = None;
        }
        if depth < NavigationDepth::CharacteristicDetail {
            self.characteristic = None;
        }
        if depth < NavigationDepth::Characteristics {
            self.service = None;
        }
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn is_empty(&self) -> bool {
        self.service.is_none()
    }

    pub fn require_service(&self) -> Result<ServiceId, GattError> {
        self.service
            .ok_or(GattError::NothingSelected(SelectionLevel::Service))
    }

    pub fn require_characteristic(&self) -> Result<(ServiceId, CharacteristicId), GattError> {
        let service = self.require_service()?;
        let characteristic = self
            .characteristic
            .ok_or(GattError::NothingSelected(SelectionLevel::Characteristic))?;
        Ok((service, characteristic))
    }

    pub fn require_descriptor(
        &self,
    ) -> Result<(ServiceId, CharacteristicId, DescriptorId), GattError> {
        let (service, characteristic) = self.require_characteristic()?;
        let descriptor = self
            .descriptor
            .ok_or(GattError::NothingSelected(SelectionLevel::Descriptor))?;
        Ok((service, characteristic, descriptor))
    }

    pub fn characteristic_target(&self) -> Result<WriteTarget, GattError> {
        let (service, characteristic) = self.require_characteristic()?;
        Ok(WriteTarget::Characteristic {
            service,
            characteristic,
        })
    }

    pub fn descriptor_target(&self) -> Result<WriteTarget, GattError> {
        let (service, characteristic, descriptor) = self.require_descriptor()?;
        Ok(WriteTarget::Descriptor {
            service,
            characteristic,
            descriptor,
        })
    }

    /// Breadcrumb shown above the attribute lists.
    pub fn path(&self) -> String {
        let mut parts = Vec::new();
        if let Some(service) = &self.service {
            parts.push(format!("Service:{}", service.uuid));
        }
        if let Some(characteristic) = &self.characteristic {
            parts.push(format!("Characteristic:{}", characteristic.uuid));
        }
        if let Some(descriptor) = &self.descriptor {
            parts.push(format!("Descriptor:{}", descriptor.uuid));
        }
        parts.join("/  ")
    }
}

#[derive(Debug, Default)]
pub struct SessionState {
    adapter: Option<AdapterHandle>,
    client: Option<ClientHandle>,
    /// Address a connect was issued for and not answered yet.
    pending_address: Option<String>,
    connection: Option<ActiveConnection>,
    generation: u64,
    selection: Selection,
    depth: NavigationDepth,
    rssi_deadline: Option<Instant>,
    server: Option<i32>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_adapter_ready(&mut self, adapter: AdapterHandle) {
        self.adapter = Some(adapter);
    }

    /// Forget everything tied to the adapter. Returns the link that was
    /// open, if any.
    pub fn on_adapter_disabled(&mut self) -> Option<ActiveConnection> {
        self.adapter = None;
        self.client = None;
        self.server = None;
        self.pending_address = None;
        self.on_disconnected()
    }

    pub fn on_client_registered(&mut self, client: ClientHandle) {
        self.client = Some(client);
    }

    pub fn release_client(&mut self) -> Option<ClientHandle> {
        self.client.take()
    }

    pub fn on_connect_requested(&mut self, address: &str) {
        self.pending_address = Some(address.to_string());
    }

    pub fn on_connect_failed(&mut self) {
        self.pending_address = None;
    }

    /// Record a new link and return its generation.
    pub fn on_connected(&mut self, id: ConnectionId, address: String) -> u64 {
        self.generation += 1;
        self.pending_address = None;
        self.connection = Some(ActiveConnection {
            id,
            address,
            generation: self.generation,
        });
        self.generation
    }

    /// Close the link: drops the selection, resets the page stack and
    /// cancels RSSI polling.
    pub fn on_disconnected(&mut self) -> Option<ActiveConnection> {
        self.selection.clear();
        self.depth = NavigationDepth::DeviceList;
        self.rssi_deadline = None;
        self.connection.take()
    }

    pub fn client(&self) -> Option<ClientHandle> {
        self.client
    }

    pub fn pending_address(&self) -> Option<&str> {
        self.pending_address.as_deref()
    }

    pub fn connection(&self) -> Option<&ActiveConnection> {
        self.connection.as_ref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn require_adapter(&self) -> Result<&AdapterHandle, GattError> {
        self.adapter.as_ref().ok_or(GattError::AdapterUnavailable)
    }

    pub fn require_client(&self) -> Result<ClientHandle, GattError> {
        self.client.ok_or(GattError::NotRegistered)
    }

    pub fn require_connection(&self) -> Result<&ActiveConnection, GattError> {
        self.connection.as_ref().ok_or(GattError::StaleConnection)
    }

    /// True when an event scoped to `id` belongs to the open link.
    pub fn is_current(&self, id: ConnectionId) -> bool {
        self.connection.as_ref().is_some_and(|c| c.id == id)
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn selection_mut(&mut self) -> &mut Selection {
        &mut self.selection
    }

    pub fn depth(&self) -> NavigationDepth {
        self.depth
    }

    /// Move the page stack to `depth`, trimming the selection to match.
    pub fn set_depth(&mut self, depth: NavigationDepth) {
        self.depth = depth;
        self.selection.trim_to(depth);
    }

    pub fn rssi_deadline(&self) -> Option<Instant> {
        self.rssi_deadline
    }

    pub fn schedule_rssi_poll(&mut self, interval: Duration) {
        self.rssi_deadline = Some(Instant::now() + interval);
    }

    pub fn cancel_rssi_poll(&mut self) {
        self.rssi_deadline = None;
    }

    pub fn server(&self) -> Option<i32> {
        self.server
    }

    pub fn on_listening(&mut self, server: i32) {
        self.server = Some(server);
    }
}
