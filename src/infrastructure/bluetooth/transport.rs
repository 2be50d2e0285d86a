//! GATT Transport Module
//!
//! The host-provided GATT client API, seen from the session controller.
//! Every call returns immediately; its results arrive later as one or more
//! [`TransportEvent`]s on the channel the transport was built with.

use crate::domain::error::{GattError, Operation};
use crate::domain::gatt::{
    AuthReq, Characteristic, CharacteristicId, ClientHandle, ConnectionId, Cursor, DescriptorId,
    GattStatus, ServiceId, WriteType,
};
use thiserror::Error;
use uuid::Uuid;

/// The host rejected a call before anything was sent.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("transport refused {op} (status {status})")]
pub struct TransportRefused {
    pub op: Operation,
    pub status: GattStatus,
}

impl From<TransportRefused> for GattError {
    fn from(refused: TransportRefused) -> Self {
        GattError::transport(refused.op, refused.status)
    }
}

pub type CallResult = Result<(), TransportRefused>;

pub trait GattTransport {
    fn register_client(&mut self, app_uuid: Uuid) -> CallResult;

    fn unregister_client(&mut self, client: ClientHandle) -> CallResult;

    fn scan_le_device(&mut self, client: ClientHandle, enable: bool) -> CallResult;

    fn connect(&mut self, client: ClientHandle, address: &str, auto_connect: bool) -> CallResult;

    fn disconnect(
        &mut self,
        client: ClientHandle,
        address: &str,
        connection: ConnectionId,
    ) -> CallResult;

    /// `filter: None` searches every service.
    fn search_services(&mut self, connection: ConnectionId, filter: Option<Uuid>) -> CallResult;

    fn get_included_service(
        &mut self,
        connection: ConnectionId,
        service: &ServiceId,
        cursor: &Cursor<ServiceId>,
    ) -> CallResult;

    fn get_characteristic(
        &mut self,
        connection: ConnectionId,
        service: &ServiceId,
        cursor: &Cursor<CharacteristicId>,
    ) -> CallResult;

    fn get_descriptor(
        &mut self,
        connection: ConnectionId,
        service: &ServiceId,
        characteristic: &CharacteristicId,
        cursor: &Cursor<DescriptorId>,
    ) -> CallResult;

    fn read_characteristic(
        &mut self,
        connection: ConnectionId,
        service: &ServiceId,
        characteristic: &CharacteristicId,
        auth: AuthReq,
    ) -> CallResult;

    fn read_descriptor(
        &mut self,
        connection: ConnectionId,
        service: &ServiceId,
        characteristic: &CharacteristicId,
        descriptor: &DescriptorId,
        auth: AuthReq,
    ) -> CallResult;

    /// Returns whether the host accepted the write.
    fn write_characteristic(
        &mut self,
        connection: ConnectionId,
        service: &ServiceId,
        characteristic: &CharacteristicId,
        write_type: WriteType,
        auth: AuthReq,
        value: &[u8],
    ) -> bool;

    /// Returns whether the host accepted the write.
    #[allow(clippy::too_many_arguments)]
    fn write_descriptor(
        &mut self,
        connection: ConnectionId,
        service: &ServiceId,
        characteristic: &CharacteristicId,
        descriptor: &DescriptorId,
        write_type: WriteType,
        auth: AuthReq,
        value: &[u8],
    ) -> bool;

    fn execute_write(&mut self, connection: ConnectionId, flag: i32) -> CallResult;

    fn register_for_notification(
        &mut self,
        client: ClientHandle,
        address: &str,
        service: &ServiceId,
        characteristic: &CharacteristicId,
    ) -> CallResult;

    fn deregister_for_notification(
        &mut self,
        client: ClientHandle,
        address: &str,
        service: &ServiceId,
        characteristic: &CharacteristicId,
    ) -> CallResult;

    fn read_remote_rssi(&mut self, client: ClientHandle, address: &str) -> CallResult;
}

/// One variant per host callback.
///
/// Paged discovery events carry `None` when the host signals that no
/// further item exists.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    ClientRegistered {
        status: GattStatus,
        client: ClientHandle,
        app_uuid: Uuid,
    },
    ScanResult {
        address: String,
        adv_data: Vec<u8>,
        rssi: i32,
        device_type: i32,
    },
    Connected {
        status: GattStatus,
        connection: ConnectionId,
        address: String,
    },
    Disconnected {
        status: GattStatus,
        connection: ConnectionId,
    },
    SearchResult {
        connection: ConnectionId,
        service: ServiceId,
    },
    SearchComplete {
        connection: ConnectionId,
        status: GattStatus,
    },
    IncludedServiceFound {
        connection: ConnectionId,
        status: GattStatus,
        service: ServiceId,
        included: Option<ServiceId>,
    },
    CharacteristicFound {
        connection: ConnectionId,
        status: GattStatus,
        service: ServiceId,
        characteristic: Option<Characteristic>,
    },
    DescriptorFound {
        connection: ConnectionId,
        status: GattStatus,
        service: ServiceId,
        characteristic: CharacteristicId,
        descriptor: Option<DescriptorId>,
    },
    NotificationRegistered {
        connection: ConnectionId,
        status: GattStatus,
        registered: bool,
        service: ServiceId,
        characteristic: CharacteristicId,
    },
    Notify {
        connection: ConnectionId,
        address: String,
        service: ServiceId,
        characteristic: CharacteristicId,
        value: Vec<u8>,
        is_notify: bool,
    },
    CharacteristicRead {
        connection: ConnectionId,
        status: GattStatus,
        service: ServiceId,
        characteristic: CharacteristicId,
        value: Vec<u8>,
    },
    CharacteristicWritten {
        connection: ConnectionId,
        status: GattStatus,
        service: ServiceId,
        characteristic: CharacteristicId,
    },
    DescriptorRead {
        connection: ConnectionId,
        status: GattStatus,
        service: ServiceId,
        characteristic: CharacteristicId,
        descriptor: DescriptorId,
        value: Vec<u8>,
    },
    DescriptorWritten {
        connection: ConnectionId,
        status: GattStatus,
        service: ServiceId,
        characteristic: CharacteristicId,
        descriptor: DescriptorId,
    },
    ExecuteWrite {
        connection: ConnectionId,
        status: GattStatus,
    },
    RemoteRssi {
        status: GattStatus,
        address: String,
        rssi: i32,
    },
    Listen {
        status: GattStatus,
        server: i32,
    },
}

impl TransportEvent {
    /// Connection the event is scoped to, if any.
    pub fn connection(&self) -> Option<ConnectionId> {
        match self {
            Self::Connected { connection, .. }
            | Self::Disconnected { connection, .. }
            | Self::SearchResult { connection, .. }
            | Self::SearchComplete { connection, .. }
            | Self::IncludedServiceFound { connection, .. }
            | Self::CharacteristicFound { connection, .. }
            | Self::DescriptorFound { connection, .. }
            | Self::NotificationRegistered { connection, .. }
            | Self::Notify { connection, .. }
            | Self::CharacteristicRead { connection, .. }
            | Self::CharacteristicWritten { connection, .. }
            | Self::DescriptorRead { connection, .. }
            | Self::DescriptorWritten { connection, .. }
            | Self::ExecuteWrite { connection, .. } => Some(*connection),
            Self::ClientRegistered { .. }
            | Self::ScanResult { .. }
            | Self::RemoteRssi { .. }
            | Self::Listen { .. } => None,
        }
    }
}
