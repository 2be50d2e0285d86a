//! BLE Shield Profile
//!
//! Protocol definitions for the RedBearLab BLE shield: a UART-like service
//! with one notify (TX) and one write (RX) characteristic, carrying 3-byte
//! pin frames.
//!
//! ```text
//! [0]   : pin / command id
//! [1-2] : content (u16 big-endian)
//! ```

use crate::domain::gatt::{CharacteristicId, DescriptorId, ServiceId, WriteTarget};
use crate::domain::models::{AppEvent, ConnectionStatus, SessionCommand, SessionObserver};
use std::fmt;
use thiserror::Error;
use tracing::{debug, info};
use uuid::{uuid, Uuid};

pub const SERVICE_UUID: Uuid = uuid!("713d0000-503e-4c75-ba94-3148f18d941e");

/// Notify characteristic: shield → phone.
pub const TX_CHAR_UUID: Uuid = uuid!("713d0002-503e-4c75-ba94-3148f18d941e");

/// Write characteristic: phone → shield.
pub const RX_CHAR_UUID: Uuid = uuid!("713d0003-503e-4c75-ba94-3148f18d941e");

pub const CLIENT_CHARACTERISTIC_CONFIG_UUID: Uuid = uuid!("00002902-0000-1000-8000-00805f9b34fb");

/// Pin reporting the digital input.
pub const DIGITAL_PIN: u8 = 0x0A;
/// Pin reporting the analog input.
pub const ANALOG_PIN: u8 = 0x0B;

const DIGITAL_HIGH: u16 = 0x0100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShieldCommand {
    /// Drive the LED on the digital output pin
    DigitalOut(bool),
    /// Move the servo to the given angle in degrees
    Servo(u8),
    /// Start or stop analog input reporting
    AnalogInput(bool),
    /// Reset the shield firmware state
    Reset,
}

impl ShieldCommand {
    pub fn frame(&self) -> [u8; 3] {
        match *self {
            Self::DigitalOut(true) => [0x01, 0x01, 0x00],
            Self::DigitalOut(false) => [0x01, 0x00, 0x00],
            Self::Servo(angle) => [0x03, angle, 0x00],
            Self::AnalogInput(true) => [0xA0, 0x01, 0x00],
            Self::AnalogInput(false) => [0xA0, 0x00, 0x00],
            Self::Reset => [0x04, 0x00, 0x00],
        }
    }
}

/// Client characteristic configuration value enabling/disabling notifications.
pub fn notification_config(enabled: bool) -> [u8; 2] {
    if enabled {
        [0x01, 0x00]
    } else {
        [0x00, 0x00]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinLevel {
    On,
    Off,
}

impl fmt::Display for PinLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::On => f.write_str("On"),
            Self::Off => f.write_str("Off"),
        }
    }
}

/// A decoded notify frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinReading {
    Digital(PinLevel),
    Analog(u16),
    Unknown { pin: u8, content: u16 },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ShieldError {
    #[error("payload too short: {0} bytes (expected 3)")]
    PayloadTooShort(usize),

    #[error("shield {0} not discovered yet")]
    NotDiscovered(&'static str),
}

/// Split a raw frame into `(pin, content)`.
pub fn split_frame(payload: &[u8]) -> Result<(u8, u16), ShieldError> {
    match payload {
        [pin, hi, lo, ..] => Ok((*pin, u16::from_be_bytes([*hi, *lo]))),
        _ => Err(ShieldError::PayloadTooShort(payload.len())),
    }
}

pub fn decode_notification(payload: &[u8]) -> Result<PinReading, ShieldError> {
    let (pin, content) = split_frame(payload)?;
    let reading = match pin {
        DIGITAL_PIN if content == DIGITAL_HIGH => PinReading::Digital(PinLevel::On),
        DIGITAL_PIN => PinReading::Digital(PinLevel::Off),
        ANALOG_PIN => PinReading::Analog(content),
        _ => PinReading::Unknown { pin, content },
    };
    Ok(reading)
}

/// Tracks the shield's attributes as discovery reports them, and turns
/// shield commands into session writes.
#[derive(Debug, Default)]
pub struct ShieldProfile {
    service: Option<ServiceId>,
    tx: Option<CharacteristicId>,
    rx: Option<CharacteristicId>,
    ccc: Option<DescriptorId>,
    digital: Option<PinLevel>,
    analog: Option<u16>,
}

impl ShieldProfile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn service(&self) -> Option<&ServiceId> {
        self.service.as_ref()
    }

    pub fn tx(&self) -> Option<&CharacteristicId> {
        self.tx.as_ref()
    }

    pub fn rx(&self) -> Option<&CharacteristicId> {
        self.rx.as_ref()
    }

    /// True once the RX characteristic is known and commands can be sent.
    pub fn is_ready(&self) -> bool {
        self.service.is_some() && self.rx.is_some()
    }

    pub fn digital(&self) -> Option<PinLevel> {
        self.digital
    }

    pub fn analog(&self) -> Option<u16> {
        self.analog
    }

    pub fn command(&self, command: ShieldCommand) -> Result<SessionCommand, ShieldError> {
        let service = self.service.ok_or(ShieldError::NotDiscovered("service"))?;
        let rx = self.rx.ok_or(ShieldError::NotDiscovered("RX characteristic"))?;
        Ok(SessionCommand::Write {
            target: WriteTarget::Characteristic {
                service,
                characteristic: rx,
            },
            payload: command.frame().to_vec(),
        })
    }

    pub fn set_notifications(&self, enabled: bool) -> Result<SessionCommand, ShieldError> {
        let service = self.service.ok_or(ShieldError::NotDiscovered("service"))?;
        let tx = self.tx.ok_or(ShieldError::NotDiscovered("TX characteristic"))?;
        let ccc = self.ccc.ok_or(ShieldError::NotDiscovered("CCC descriptor"))?;
        Ok(SessionCommand::Write {
            target: WriteTarget::Descriptor {
                service,
                characteristic: tx,
                descriptor: ccc,
            },
            payload: notification_config(enabled).to_vec(),
        })
    }

    /// Decode a notification if it came from the shield's TX characteristic.
    pub fn reading(&mut self, event: &AppEvent) -> Option<PinReading> {
        let AppEvent::Notification(notification) = event else {
            return None;
        };
        if Some(notification.characteristic) != self.tx {
            return None;
        }
        match decode_notification(&notification.value) {
            Ok(reading) => {
                match reading {
                    PinReading::Digital(level) => self.digital = Some(level),
                    PinReading::Analog(value) => self.analog = Some(value),
                    PinReading::Unknown { pin, .. } => debug!("Ignoring frame for pin {:#04x}", pin),
                }
                Some(reading)
            }
            Err(e) => {
                debug!("Discarding shield notification: {}", e);
                None
            }
        }
    }
}

impl SessionObserver for ShieldProfile {
    fn on_event(&mut self, event: &AppEvent) -> Vec<SessionCommand> {
        match event {
            AppEvent::ServiceFound(service) if service.uuid == SERVICE_UUID => {
                info!("Found BLE shield service");
                self.service = Some(*service);
                vec![SessionCommand::DiscoverCharacteristics(*service)]
            }
            AppEvent::CharacteristicFound {
                service,
                characteristic,
            } if Some(*service) == self.service => {
                let id = characteristic.id;
                if id.uuid == RX_CHAR_UUID {
                    self.rx = Some(id);
                    Vec::new()
                } else if id.uuid == TX_CHAR_UUID {
                    self.tx = Some(id);
                    vec![
                        SessionCommand::RegisterNotification {
                            service: *service,
                            characteristic: id,
                        },
                        SessionCommand::DiscoverDescriptors {
                            service: *service,
                            characteristic: id,
                        },
                    ]
                } else {
                    Vec::new()
                }
            }
            AppEvent::DescriptorFound {
                characteristic,
                descriptor,
                ..
            } if Some(*characteristic) == self.tx
                && descriptor.uuid == CLIENT_CHARACTERISTIC_CONFIG_UUID =>
            {
                self.ccc = Some(*descriptor);
                Vec::new()
            }
            AppEvent::Notification(_) => {
                if let Some(reading) = self.reading(event) {
                    info!("Shield reading: {:?}", reading);
                }
                Vec::new()
            }
            AppEvent::ConnectionStatus(ConnectionStatus::Disconnected) => {
                *self = Self::default();
                Vec::new()
            }
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::gatt::{Characteristic, CharacteristicProperties, GattId};
    use crate::domain::models::Notification;

    fn discovered() -> (ShieldProfile, ServiceId, GattId, GattId) {
        let mut profile = ShieldProfile::new();
        let service = ServiceId::primary(SERVICE_UUID, 0);
        let tx = GattId::new(TX_CHAR_UUID, 0);
        let rx = GattId::new(RX_CHAR_UUID, 0);

        let commands = profile.on_event(&AppEvent::ServiceFound(service));
        assert_eq!(commands, vec![SessionCommand::DiscoverCharacteristics(service)]);

        let commands = profile.on_event(&AppEvent::CharacteristicFound {
            service,
            characteristic: Characteristic {
                id: tx,
                properties: CharacteristicProperties(CharacteristicProperties::NOTIFY),
            },
        });
        assert_eq!(commands.len(), 2);

        profile.on_event(&AppEvent::CharacteristicFound {
            service,
            characteristic: Characteristic {
                id: rx,
                properties: CharacteristicProperties(CharacteristicProperties::WRITE),
            },
        });
        (profile, service, tx, rx)
    }

    #[test]
    fn test_decode_digital_on() {
        let reading = decode_notification(&[0x0A, 0x01, 0x00]).unwrap();
        assert_eq!(reading, PinReading::Digital(PinLevel::On));
        assert_eq!(PinLevel::On.to_string(), "On");
        assert_eq!(split_frame(&[0x0A, 0x01, 0x00]).unwrap(), (0x0A, 0x0100));
    }

    #[test]
    fn test_decode_other_pins() {
        assert_eq!(
            decode_notification(&[0x0A, 0x00, 0x00]).unwrap(),
            PinReading::Digital(PinLevel::Off)
        );
        assert_eq!(
            decode_notification(&[0x0B, 0x01, 0x2C]).unwrap(),
            PinReading::Analog(300)
        );
        assert_eq!(
            decode_notification(&[0x0C, 0x00, 0x01]).unwrap(),
            PinReading::Unknown {
                pin: 0x0C,
                content: 1
            }
        );
        assert_eq!(
            decode_notification(&[0x0A]),
            Err(ShieldError::PayloadTooShort(1))
        );
    }

    #[test]
    fn test_command_frames() {
        assert_eq!(ShieldCommand::DigitalOut(true).frame(), [0x01, 0x01, 0x00]);
        assert_eq!(ShieldCommand::Servo(0xA0).frame(), [0x03, 0xA0, 0x00]);
        assert_eq!(ShieldCommand::AnalogInput(false).frame(), [0xA0, 0x00, 0x00]);
        assert_eq!(ShieldCommand::Reset.frame(), [0x04, 0x00, 0x00]);
        assert_eq!(notification_config(true), [0x01, 0x00]);
    }

    #[test]
    fn test_command_requires_discovery() {
        let profile = ShieldProfile::new();
        assert_eq!(
            profile.command(ShieldCommand::Reset),
            Err(ShieldError::NotDiscovered("service"))
        );
    }

    #[test]
    fn test_profile_tracks_attributes() {
        let (mut profile, service, tx, rx) = discovered();
        assert!(profile.is_ready());

        let command = profile.command(ShieldCommand::DigitalOut(true)).unwrap();
        assert_eq!(
            command,
            SessionCommand::Write {
                target: WriteTarget::Characteristic {
                    service,
                    characteristic: rx
                },
                payload: vec![0x01, 0x01, 0x00],
            }
        );

        let ccc = GattId::new(CLIENT_CHARACTERISTIC_CONFIG_UUID, 0);
        profile.on_event(&AppEvent::DescriptorFound {
            service,
            characteristic: tx,
            descriptor: ccc,
        });
        assert!(profile.set_notifications(true).is_ok());

        profile.on_event(&AppEvent::Notification(Notification {
            address: "00:11:22:33:44:55".to_string(),
            service,
            characteristic: tx,
            value: vec![0x0A, 0x01, 0x00],
            is_notify: true,
        }));
        assert_eq!(profile.digital(), Some(PinLevel::On));
    }
}
