//! Cat feeder automation on top of the BLE shield.
//!
//! A pressure sensor on the shield's analog pin reports the cat rubbing
//! against the feeder. The backend decides whether it is time to feed; if so
//! the servo opens the flap and closes it again after a delay.

use crate::domain::gatt::{GattStatus, WriteTarget};
use crate::domain::models::{AppEvent, ConnectionStatus, SessionCommand, SessionObserver};
use crate::domain::settings::FeederSettings;
use crate::domain::shield::{PinReading, ShieldCommand, ShieldProfile};
use std::time::Duration;
use tracing::{info, warn};

/// Servo angle holding the flap open.
pub const FLAP_OPEN: u8 = 0xA0;
/// Servo angle holding the flap closed.
pub const FLAP_CLOSED: u8 = 0x00;

/// Remote feeding service the automation reports to.
pub trait FeederBackend {
    /// The cat is rubbing the sensor. Returns true when it is time to feed.
    fn rub(&mut self) -> bool;
    /// The cat walked away.
    fn leave(&mut self);
    /// A full open/close cycle finished.
    fn fed(&mut self);
}

pub struct CatFeeder<B> {
    shield: ShieldProfile,
    backend: B,
    settings: FeederSettings,
    eating: bool,
    pending_feed_writes: u8,
}

impl<B: FeederBackend> CatFeeder<B> {
    pub fn new(backend: B, settings: FeederSettings) -> Self {
        Self {
            shield: ShieldProfile::new(),
            backend,
            settings,
            eating: false,
            pending_feed_writes: 0,
        }
    }

    pub fn shield(&self) -> &ShieldProfile {
        &self.shield
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn is_eating(&self) -> bool {
        self.eating
    }

    /// Open the flap now and schedule it to close after the feed delay.
    pub fn feed(&mut self) -> Vec<SessionCommand> {
        let (open, close) = match (
            self.shield.command(ShieldCommand::Servo(FLAP_OPEN)),
            self.shield.command(ShieldCommand::Servo(FLAP_CLOSED)),
        ) {
            (Ok(open), Ok(close)) => (open, close),
            (Err(e), _) | (_, Err(e)) => {
                warn!("Cannot feed: {}", e);
                return Vec::new();
            }
        };

        info!("Feeding: opening flap for {} ms", self.settings.feed_delay_ms);
        self.pending_feed_writes = 2;
        vec![
            open,
            SessionCommand::Schedule {
                delay: Duration::from_millis(self.settings.feed_delay_ms),
                command: Box::new(close),
            },
        ]
    }

    /// Messages relayed from a remote peer; only `feed` is understood.
    pub fn on_remote_message(&mut self, message: &str) -> Vec<SessionCommand> {
        match message {
            "feed" => self.feed(),
            other => {
                warn!("Unknown remote message: {}", other);
                Vec::new()
            }
        }
    }

    fn on_analog(&mut self, value: u16) -> Vec<SessionCommand> {
        if !self.eating && value > self.settings.rub_threshold {
            self.eating = true;
            info!("Cat is rubbing (analog {})", value);
            if self.backend.rub() {
                return self.feed();
            }
        } else {
            self.eating = false;
            self.backend.leave();
        }
        Vec::new()
    }

    fn on_write_completed(&mut self, target: &WriteTarget, status: GattStatus) {
        if self.pending_feed_writes == 0
            || Some(target.characteristic()) != self.shield.rx()
        {
            return;
        }
        if !status.is_success() {
            warn!("Feeder servo write failed with status {}", status);
            self.pending_feed_writes = 0;
            return;
        }
        self.pending_feed_writes -= 1;
        if self.pending_feed_writes == 0 {
            info!("Feeding cycle complete");
            self.backend.fed();
        }
    }
}

impl<B: FeederBackend> SessionObserver for CatFeeder<B> {
    fn on_event(&mut self, event: &AppEvent) -> Vec<SessionCommand> {
        match event {
            AppEvent::Notification(_) => match self.shield.reading(event) {
                Some(PinReading::Analog(value)) => self.on_analog(value),
                _ => Vec::new(),
            },
            AppEvent::WriteCompleted { target, status } => {
                self.on_write_completed(target, *status);
                Vec::new()
            }
            AppEvent::ConnectionStatus(ConnectionStatus::Disconnected) => {
                self.eating = false;
                self.pending_feed_writes = 0;
                self.shield.on_event(event)
            }
            _ => self.shield.on_event(event),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::gatt::{Characteristic, CharacteristicProperties, GattId, ServiceId};
    use crate::domain::models::Notification;
    use crate::domain::shield::{RX_CHAR_UUID, SERVICE_UUID, TX_CHAR_UUID};

    #[derive(Default)]
    struct RecordingBackend {
        time_to_feed: bool,
        calls: Vec<&'static str>,
    }

    impl FeederBackend for RecordingBackend {
        fn rub(&mut self) -> bool {
            self.calls.push("rub");
            self.time_to_feed
        }

        fn leave(&mut self) {
            self.calls.push("leave");
        }

        fn fed(&mut self) {
            self.calls.push("fed");
        }
    }

    fn service() -> ServiceId {
        ServiceId::primary(SERVICE_UUID, 0)
    }

    fn feeder(time_to_feed: bool) -> CatFeeder<RecordingBackend> {
        let backend = RecordingBackend {
            time_to_feed,
            ..Default::default()
        };
        let mut feeder = CatFeeder::new(backend, FeederSettings::default());
        feeder.on_event(&AppEvent::ServiceFound(service()));
        for uuid in [TX_CHAR_UUID, RX_CHAR_UUID] {
            feeder.on_event(&AppEvent::CharacteristicFound {
                service: service(),
                characteristic: Characteristic {
                    id: GattId::new(uuid, 0),
                    properties: CharacteristicProperties::default(),
                },
            });
        }
        feeder
    }

    fn analog(value: u16) -> AppEvent {
        let [hi, lo] = value.to_be_bytes();
        AppEvent::Notification(Notification {
            address: "00:11:22:33:44:55".to_string(),
            service: service(),
            characteristic: GattId::new(TX_CHAR_UUID, 0),
            value: vec![0x0B, hi, lo],
            is_notify: true,
        })
    }

    fn servo_write(status: GattStatus) -> AppEvent {
        AppEvent::WriteCompleted {
            target: WriteTarget::Characteristic {
                service: service(),
                characteristic: GattId::new(RX_CHAR_UUID, 0),
            },
            status,
        }
    }

    fn servo_write_done() -> AppEvent {
        servo_write(GattStatus::SUCCESS)
    }

    #[test]
    fn test_rub_without_feeding() {
        let mut feeder = feeder(false);
        assert!(feeder.on_event(&analog(250)).is_empty());
        assert!(feeder.is_eating());
        assert_eq!(feeder.backend().calls, vec!["rub"]);

        feeder.on_event(&analog(10));
        assert!(!feeder.is_eating());
        assert_eq!(feeder.backend().calls, vec!["rub", "leave"]);
    }

    #[test]
    fn test_rub_triggers_feed_cycle() {
        let mut feeder = feeder(true);
        let commands = feeder.on_event(&analog(201));
        assert_eq!(commands.len(), 2);

        let SessionCommand::Write { payload, .. } = &commands[0] else {
            panic!("expected open write, got {:?}", commands[0]);
        };
        assert_eq!(payload, &vec![0x03, 0xA0, 0x00]);

        let SessionCommand::Schedule { delay, command } = &commands[1] else {
            panic!("expected scheduled close, got {:?}", commands[1]);
        };
        assert_eq!(*delay, Duration::from_millis(1000));
        assert!(matches!(
            command.as_ref(),
            SessionCommand::Write { payload, .. } if payload == &vec![0x03, 0x00, 0x00]
        ));

        feeder.on_event(&servo_write_done());
        assert_eq!(feeder.backend().calls, vec!["rub"]);
        feeder.on_event(&servo_write_done());
        assert_eq!(feeder.backend().calls, vec!["rub", "fed"]);
    }

    #[test]
    fn test_rejected_open_write_abandons_cycle() {
        let mut feeder = feeder(true);
        assert_eq!(feeder.on_event(&analog(250)).len(), 2);

        // the open write was refused, only the scheduled close goes through
        feeder.on_event(&servo_write(GattStatus::FAILURE));
        feeder.on_event(&servo_write_done());
        assert_eq!(feeder.backend().calls, vec!["rub"]);

        // the next cycle is counted from scratch
        feeder.on_event(&analog(10));
        assert_eq!(feeder.on_event(&analog(250)).len(), 2);
        feeder.on_event(&servo_write_done());
        feeder.on_event(&servo_write_done());
        assert_eq!(feeder.backend().calls, vec!["rub", "leave", "rub", "fed"]);
    }

    #[test]
    fn test_disconnect_resets_feeding_state() {
        let mut feeder = feeder(true);
        feeder.on_event(&analog(250));
        assert!(feeder.is_eating());

        feeder.on_event(&AppEvent::ConnectionStatus(ConnectionStatus::Disconnected));
        assert!(!feeder.is_eating());
        assert!(!feeder.shield().is_ready());

        // a close answer arriving after the drop does not complete a cycle
        feeder.on_event(&servo_write_done());
        feeder.on_event(&servo_write_done());
        assert_eq!(feeder.backend().calls, vec!["rub"]);
    }

    #[test]
    fn test_threshold_is_exclusive() {
        let mut feeder = feeder(true);
        assert!(feeder.on_event(&analog(200)).is_empty());
        assert_eq!(feeder.backend().calls, vec!["leave"]);
    }

    #[test]
    fn test_remote_feed() {
        let mut feeder = feeder(false);
        assert_eq!(feeder.on_remote_message("feed").len(), 2);
        assert!(feeder.on_remote_message("rub").is_empty());
    }
}
