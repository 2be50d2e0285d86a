use crate::domain::gatt::{ConnectionId, GattStatus};
use std::fmt;
use thiserror::Error;

/// Transport call a failure is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    RegisterClient,
    UnregisterClient,
    Scan,
    Connect,
    Disconnect,
    SearchServices,
    GetIncludedService,
    GetCharacteristic,
    GetDescriptor,
    ReadCharacteristic,
    ReadDescriptor,
    WriteCharacteristic,
    WriteDescriptor,
    ExecuteWrite,
    RegisterForNotification,
    DeregisterForNotification,
    ReadRemoteRssi,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::RegisterClient => "register_client",
            Self::UnregisterClient => "unregister_client",
            Self::Scan => "scan_le_device",
            Self::Connect => "connect",
            Self::Disconnect => "disconnect",
            Self::SearchServices => "search_services",
            Self::GetIncludedService => "get_included_service",
            Self::GetCharacteristic => "get_characteristic",
            Self::GetDescriptor => "get_descriptor",
            Self::ReadCharacteristic => "read_characteristic",
            Self::ReadDescriptor => "read_descriptor",
            Self::WriteCharacteristic => "write_characteristic",
            Self::WriteDescriptor => "write_descriptor",
            Self::ExecuteWrite => "execute_write",
            Self::RegisterForNotification => "register_for_notification",
            Self::DeregisterForNotification => "deregister_for_notification",
            Self::ReadRemoteRssi => "read_remote_rssi",
        };
        f.write_str(name)
    }
}

/// Selection level an operation needed but did not find.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionLevel {
    Service,
    Characteristic,
    Descriptor,
}

impl fmt::Display for SelectionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Service => f.write_str("service"),
            Self::Characteristic => f.write_str("characteristic"),
            Self::Descriptor => f.write_str("descriptor"),
        }
    }
}

/// Errors surfaced by the GATT session controller.
///
/// None of these are fatal: the session can always be reset by
/// disconnecting and reconnecting.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GattError {
    #[error("{op} failed with status {status}")]
    Transport { op: Operation, status: GattStatus },

    #[error("no active connection")]
    StaleConnection,

    #[error("a write is already outstanding on connection {0}")]
    ConcurrentWrite(ConnectionId),

    #[error("GATT client is not registered")]
    NotRegistered,

    #[error("bluetooth adapter is not available")]
    AdapterUnavailable,

    #[error("no {0} selected")]
    NothingSelected(SelectionLevel),

    #[error("service search already in progress")]
    SearchInProgress,

    #[error("invalid payload: {0}")]
    InvalidPayload(String),
}

impl GattError {
    pub fn transport(op: Operation, status: GattStatus) -> Self {
        Self::Transport { op, status }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gatt_error_display() {
        let err = GattError::transport(Operation::WriteCharacteristic, GattStatus(0x85));
        assert_eq!(err.to_string(), "write_characteristic failed with status 0x85");

        let err = GattError::ConcurrentWrite(ConnectionId(7));
        assert_eq!(
            err.to_string(),
            "a write is already outstanding on connection 7"
        );

        let err = GattError::NothingSelected(SelectionLevel::Descriptor);
        assert_eq!(err.to_string(), "no descriptor selected");
    }
}
