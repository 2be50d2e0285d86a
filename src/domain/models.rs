use crate::domain::gatt::{
    Characteristic, CharacteristicId, ClientHandle, DescriptorId, GattStatus, ServiceId,
    WriteTarget,
};
use std::time::Duration;

/// Host device type as reported with a scan result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceType {
    Classic,
    LowEnergy,
    DualMode,
    Unknown(i32),
}

impl DeviceType {
    pub fn from_raw(raw: i32) -> Self {
        match raw {
            1 => Self::Classic,
            2 => Self::LowEnergy,
            3 => Self::DualMode,
            other => Self::Unknown(other),
        }
    }
}

/// A device seen during scanning. Only held while the scan list is shown.
#[derive(Debug, Clone, PartialEq)]
pub struct Device {
    pub name: String,
    pub address: String,
    pub rssi: i32,
    pub device_type: DeviceType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

/// UI page stack depth, from the device list down to a single descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum NavigationDepth {
    #[default]
    DeviceList,
    Device,
    Services,
    Characteristics,
    CharacteristicDetail,
    DescriptorDetail,
}

/// Level of the attribute tree a paged enumeration walks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryLevel {
    IncludedServices,
    Characteristics,
    Descriptors,
}

/// How a paged enumeration pass ended.
///
/// `Exhausted` covers both an echoed cursor and an explicit "no more
/// results" from the transport. `Failed` keeps the status of a non-zero
/// event so the caller can decide whether it was a real error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnumerationOutcome {
    Exhausted,
    Failed(GattStatus),
}

/// Unsolicited value pushed by the peripheral. The payload is untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub address: String,
    pub service: ServiceId,
    pub characteristic: CharacteristicId,
    pub value: Vec<u8>,
    pub is_notify: bool,
}

/// Result of a characteristic or descriptor read.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueReport {
    pub service: ServiceId,
    pub characteristic: CharacteristicId,
    pub descriptor: Option<DescriptorId>,
    pub status: GattStatus,
    pub value: Vec<u8>,
    pub hex: String,
}

/// Everything the session reports to the UI layer.
#[derive(Debug, Clone, PartialEq)]
pub enum AppEvent {
    AdapterAvailable(bool),
    ClientRegistered(ClientHandle),
    ScanStateChanged {
        scanning: bool,
    },
    DeviceFound(Device),
    ConnectionStatus(ConnectionStatus),
    ServiceFound(ServiceId),
    ServiceSearchComplete {
        status: GattStatus,
        count: usize,
    },
    IncludedServiceFound {
        service: ServiceId,
        included: ServiceId,
    },
    CharacteristicFound {
        service: ServiceId,
        characteristic: Characteristic,
    },
    DescriptorFound {
        service: ServiceId,
        characteristic: CharacteristicId,
        descriptor: DescriptorId,
    },
    EnumerationFinished {
        level: DiscoveryLevel,
        outcome: EnumerationOutcome,
        count: usize,
    },
    NotificationRegistration {
        service: ServiceId,
        characteristic: CharacteristicId,
        registered: bool,
        status: GattStatus,
    },
    Notification(Notification),
    CharacteristicValue(ValueReport),
    DescriptorValue(ValueReport),
    /// Also sent with a failure status when a write is refused before it
    /// reaches the peripheral.
    WriteCompleted {
        target: WriteTarget,
        status: GattStatus,
    },
    WriteExecuted {
        status: GattStatus,
    },
    Rssi {
        address: String,
        rssi: i32,
    },
    Listening {
        server: i32,
        status: GattStatus,
    },
    NavigationChanged {
        depth: NavigationDepth,
        path: String,
    },
    LogMessage(StatusMessage),
}

/// Requests the UI (or a device integration) makes of the session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionCommand {
    AdapterReady(String),
    AdapterDisabled,
    StartScan,
    StopScan,
    Connect(String),
    Disconnect,
    SearchServices,
    DiscoverCharacteristics(ServiceId),
    DiscoverDescriptors {
        service: ServiceId,
        characteristic: CharacteristicId,
    },
    SelectService(ServiceId),
    SelectCharacteristic(CharacteristicId),
    SelectDescriptor(DescriptorId),
    ReadCharacteristic,
    ReadDescriptor,
    Write {
        target: WriteTarget,
        payload: Vec<u8>,
    },
    WriteSelectedCharacteristic(Vec<u8>),
    WriteSelectedDescriptor(Vec<u8>),
    /// Hex typed by the user, written to the descriptor on the descriptor
    /// page and to the characteristic otherwise.
    WriteHex(String),
    RegisterNotification {
        service: ServiceId,
        characteristic: CharacteristicId,
    },
    DeregisterNotification {
        service: ServiceId,
        characteristic: CharacteristicId,
    },
    NavigateBack,
    /// Run `command` once `delay` has elapsed.
    Schedule {
        delay: Duration,
        command: Box<SessionCommand>,
    },
    Shutdown,
}

/// Device integrations react to session events by asking for more work.
pub trait SessionObserver {
    fn on_event(&mut self, event: &AppEvent) -> Vec<SessionCommand>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatusMessage {
    pub message: String,
    pub severity: MessageSeverity,
}

impl StatusMessage {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            severity: MessageSeverity::Info,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            severity: MessageSeverity::Error,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageSeverity {
    Info,
    Success,
    Warning,
    Error,
}
