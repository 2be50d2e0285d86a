//! GATT identifiers and attribute metadata.
//!
//! Everything here is a plain value type: the host transport hands these out
//! in its events and the session controller passes them straight back in the
//! next call.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Bluetooth adapter identifier, as named by the host platform.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AdapterHandle(pub String);

/// Handle of this application's registered GATT client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientHandle(pub i32);

/// Identifier scoping all GATT calls to one physical link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub i32);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Status code carried by every transport event. Zero is success.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GattStatus(pub i32);

impl GattStatus {
    pub const SUCCESS: GattStatus = GattStatus(0);
    /// Generic failure reported by the host stack (`GATT_ERROR`).
    pub const FAILURE: GattStatus = GattStatus(0x85);

    pub fn is_success(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for GattStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#04x}", self.0)
    }
}

/// Characteristic or descriptor identifier within its parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GattId {
    pub uuid: Uuid,
    pub instance_id: u8,
}

impl GattId {
    pub fn new(uuid: Uuid, instance_id: u8) -> Self {
        Self { uuid, instance_id }
    }
}

pub type CharacteristicId = GattId;
pub type DescriptorId = GattId;

/// One GATT service on the connected device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ServiceId {
    pub uuid: Uuid,
    pub instance_id: u8,
    pub is_primary: bool,
}

impl ServiceId {
    pub fn primary(uuid: Uuid, instance_id: u8) -> Self {
        Self {
            uuid,
            instance_id,
            is_primary: true,
        }
    }
}

/// Characteristic property bits (Bluetooth Core Vol 3, Part G, 3.3.1.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CharacteristicProperties(pub u8);

impl CharacteristicProperties {
    pub const BROADCAST: u8 = 0x01;
    pub const READ: u8 = 0x02;
    pub const WRITE_WITHOUT_RESPONSE: u8 = 0x04;
    pub const WRITE: u8 = 0x08;
    pub const NOTIFY: u8 = 0x10;
    pub const INDICATE: u8 = 0x20;
    pub const AUTHENTICATED_SIGNED_WRITES: u8 = 0x40;
    pub const EXTENDED_PROPERTIES: u8 = 0x80;

    pub fn contains(self, bits: u8) -> bool {
        self.0 & bits == bits
    }

    pub fn can_read(self) -> bool {
        self.contains(Self::READ)
    }

    pub fn can_write(self) -> bool {
        self.0 & (Self::WRITE | Self::WRITE_WITHOUT_RESPONSE) != 0
    }

    pub fn can_subscribe(self) -> bool {
        self.0 & (Self::NOTIFY | Self::INDICATE) != 0
    }
}

/// A discovered characteristic together with its declared properties.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Characteristic {
    pub id: CharacteristicId,
    pub properties: CharacteristicProperties,
}

/// Paging position for "give me the item after X" discovery calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Cursor<I> {
    #[default]
    Start,
    After(I),
}

impl<I: PartialEq> Cursor<I> {
    pub fn is_start(&self) -> bool {
        matches!(self, Cursor::Start)
    }

    /// True when `id` is the item this cursor already points past.
    pub fn points_at(&self, id: &I) -> bool {
        matches!(self, Cursor::After(current) if current == id)
    }
}

/// Host write types (`WRITE_TYPE_*` in the host GATT client API).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WriteType {
    #[default]
    NoResponse,
    Default,
    Prepare,
    Signed,
}

impl WriteType {
    pub fn as_raw(self) -> i32 {
        match self {
            Self::NoResponse => 1,
            Self::Default => 2,
            Self::Prepare => 3,
            Self::Signed => 4,
        }
    }
}

/// Authentication requirement passed with reads and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuthReq {
    #[default]
    None,
    NoMitm,
    Mitm,
    SignedNoMitm,
    SignedMitm,
}

impl AuthReq {
    pub fn as_raw(self) -> i32 {
        match self {
            Self::None => 0,
            Self::NoMitm => 1,
            Self::Mitm => 2,
            Self::SignedNoMitm => 3,
            Self::SignedMitm => 4,
        }
    }
}

/// Attribute a write is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteTarget {
    Characteristic {
        service: ServiceId,
        characteristic: CharacteristicId,
    },
    Descriptor {
        service: ServiceId,
        characteristic: CharacteristicId,
        descriptor: DescriptorId,
    },
}

impl WriteTarget {
    pub fn service(&self) -> &ServiceId {
        match self {
            Self::Characteristic { service, .. } | Self::Descriptor { service, .. } => service,
        }
    }

    pub fn characteristic(&self) -> &CharacteristicId {
        match self {
            Self::Characteristic { characteristic, .. }
            | Self::Descriptor { characteristic, .. } => characteristic,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cursor_points_at() {
        let id = GattId::new(Uuid::from_u128(1), 0);
        let other = GattId::new(Uuid::from_u128(2), 0);

        assert!(Cursor::<GattId>::Start.is_start());
        assert!(!Cursor::<GattId>::Start.points_at(&id));
        assert!(Cursor::After(id).points_at(&id));
        assert!(!Cursor::After(id).points_at(&other));
    }

    #[test]
    fn test_properties() {
        let props = CharacteristicProperties(
            CharacteristicProperties::READ | CharacteristicProperties::NOTIFY,
        );
        assert!(props.can_read());
        assert!(props.can_subscribe());
        assert!(!props.can_write());
        assert!(CharacteristicProperties(0x04).can_write());
    }

    #[test]
    fn test_raw_codes() {
        assert_eq!(WriteType::NoResponse.as_raw(), 1);
        assert_eq!(AuthReq::None.as_raw(), 0);
        assert_eq!(GattStatus(0x85).to_string(), "0x85");
    }
}
