//! Simulated GATT transport
//!
//! An in-memory peripheral behind the [`GattTransport`] trait. Every call is
//! recorded, and the events a host stack would deliver are pushed onto the
//! transport channel straight away.

use crate::domain::error::Operation;
use crate::domain::gatt::{
    AuthReq, Characteristic, CharacteristicId, CharacteristicProperties, ClientHandle,
    ConnectionId, Cursor, DescriptorId, GattId, GattStatus, ServiceId, WriteType,
};
use crate::domain::shield;
use crate::infrastructure::bluetooth::discovery::Keyed;
use crate::infrastructure::bluetooth::protocol;
use crate::infrastructure::bluetooth::transport::{
    CallResult, GattTransport, TransportEvent, TransportRefused,
};
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

/// Expand a 16-bit SIG-assigned UUID onto the Bluetooth base UUID.
pub fn sig_uuid(short: u16) -> Uuid {
    const BASE: u128 = 0x0000_0000_0000_1000_8000_0080_5f9b_34fb;
    Uuid::from_u128(BASE | ((short as u128) << 96))
}

#[derive(Debug, Clone)]
pub struct SimulatedDescriptor {
    pub id: DescriptorId,
    pub value: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct SimulatedCharacteristic {
    pub characteristic: Characteristic,
    pub value: Vec<u8>,
    pub descriptors: Vec<SimulatedDescriptor>,
}

#[derive(Debug, Clone)]
pub struct SimulatedService {
    pub id: ServiceId,
    pub included: Vec<ServiceId>,
    pub characteristics: Vec<SimulatedCharacteristic>,
}

#[derive(Debug, Clone)]
pub struct SimulatedDevice {
    pub address: String,
    pub name: String,
    pub rssi: i32,
    pub services: Vec<SimulatedService>,
}

/// How the peripheral answers a request past the last item of a list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TerminationStyle {
    /// Re-deliver the item the cursor points at, like the stock host stack.
    #[default]
    EchoLast,
    /// Answer with no item.
    NoMoreResults,
    /// Answer with a non-zero status.
    Error(GattStatus),
}

/// One recorded transport call.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportCall {
    RegisterClient(Uuid),
    UnregisterClient(ClientHandle),
    Scan(bool),
    Connect(String),
    Disconnect(ConnectionId),
    SearchServices(Option<Uuid>),
    GetIncludedService {
        service: ServiceId,
        cursor: Cursor<ServiceId>,
    },
    GetCharacteristic {
        service: ServiceId,
        cursor: Cursor<CharacteristicId>,
    },
    GetDescriptor {
        characteristic: CharacteristicId,
        cursor: Cursor<DescriptorId>,
    },
    ReadCharacteristic(CharacteristicId),
    ReadDescriptor(DescriptorId),
    WriteCharacteristic {
        characteristic: CharacteristicId,
        write_type: WriteType,
        value: Vec<u8>,
    },
    WriteDescriptor {
        descriptor: DescriptorId,
        value: Vec<u8>,
    },
    ExecuteWrite {
        connection: ConnectionId,
        flag: i32,
    },
    RegisterForNotification(CharacteristicId),
    DeregisterForNotification(CharacteristicId),
    ReadRemoteRssi(String),
}

impl TransportCall {
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            Self::WriteCharacteristic { .. } | Self::WriteDescriptor { .. }
        )
    }
}

enum Page<T> {
    Item(T),
    Echo(T),
    End,
}

fn page<T: Keyed + Clone>(items: &[T], cursor: &Cursor<T::Key>) -> Page<T> {
    let position = match cursor {
        Cursor::Start => Some(0),
        Cursor::After(key) => items.iter().position(|i| i.key() == *key).map(|p| p + 1),
    };
    match position {
        Some(p) if p < items.len() => Page::Item(items[p].clone()),
        Some(p) if p > 0 => Page::Echo(items[p - 1].clone()),
        _ => Page::End,
    }
}

pub struct SimulatedPeripheral {
    events: mpsc::UnboundedSender<TransportEvent>,
    device: SimulatedDevice,
    termination: TerminationStyle,
    calls: Vec<TransportCall>,
    client: ClientHandle,
    next_connection: i32,
    connection: Option<ConnectionId>,
    write_status: GattStatus,
    accept_writes: bool,
    duplicate_search_results: bool,
}

impl SimulatedPeripheral {
    pub fn new(events: mpsc::UnboundedSender<TransportEvent>, device: SimulatedDevice) -> Self {
        Self {
            events,
            device,
            termination: TerminationStyle::default(),
            calls: Vec::new(),
            client: ClientHandle(1),
            next_connection: 7,
            connection: None,
            write_status: GattStatus::SUCCESS,
            accept_writes: true,
            duplicate_search_results: false,
        }
    }

    /// A RedBearLab BLE shield advertising as "BLE Shield".
    pub fn ble_shield(events: mpsc::UnboundedSender<TransportEvent>) -> Self {
        let ccc = SimulatedDescriptor {
            id: GattId::new(shield::CLIENT_CHARACTERISTIC_CONFIG_UUID, 0),
            value: vec![0x00, 0x00],
        };
        let device = SimulatedDevice {
            address: "D0:39:72:A4:7B:11".to_string(),
            name: "BLE Shield".to_string(),
            rssi: -58,
            services: vec![
                SimulatedService {
                    id: ServiceId::primary(sig_uuid(0x1800), 0),
                    included: Vec::new(),
                    characteristics: vec![SimulatedCharacteristic {
                        characteristic: Characteristic {
                            id: GattId::new(sig_uuid(0x2A00), 0),
                            properties: CharacteristicProperties(CharacteristicProperties::READ),
                        },
                        value: b"BLE Shield".to_vec(),
                        descriptors: Vec::new(),
                    }],
                },
                SimulatedService {
                    id: ServiceId::primary(shield::SERVICE_UUID, 0),
                    included: Vec::new(),
                    characteristics: vec![
                        SimulatedCharacteristic {
                            characteristic: Characteristic {
                                id: GattId::new(shield::TX_CHAR_UUID, 0),
                                properties: CharacteristicProperties(
                                    CharacteristicProperties::NOTIFY
                                        | CharacteristicProperties::READ,
                                ),
                            },
                            value: vec![shield::DIGITAL_PIN, 0x01, 0x00],
                            descriptors: vec![ccc],
                        },
                        SimulatedCharacteristic {
                            characteristic: Characteristic {
                                id: GattId::new(shield::RX_CHAR_UUID, 0),
                                properties: CharacteristicProperties(
                                    CharacteristicProperties::WRITE
                                        | CharacteristicProperties::WRITE_WITHOUT_RESPONSE,
                                ),
                            },
                            value: vec![0x00, 0x00, 0x00],
                            descriptors: Vec::new(),
                        },
                    ],
                },
            ],
        };
        Self::new(events, device)
    }

    pub fn with_termination(mut self, termination: TerminationStyle) -> Self {
        self.termination = termination;
        self
    }

    /// Status reported by every write-completion event.
    pub fn with_write_status(mut self, status: GattStatus) -> Self {
        self.write_status = status;
        self
    }

    /// Make the host refuse write calls outright.
    pub fn refusing_writes(mut self) -> Self {
        self.accept_writes = false;
        self
    }

    /// Report every search result twice, as some host stacks do.
    pub fn with_duplicate_search_results(mut self) -> Self {
        self.duplicate_search_results = true;
        self
    }

    /// List `included` under `service`.
    pub fn with_included_service(mut self, service: ServiceId, included: ServiceId) -> Self {
        if let Some(s) = self.device.services.iter_mut().find(|s| s.id == service) {
            s.included.push(included);
        }
        self
    }

    pub fn device(&self) -> &SimulatedDevice {
        &self.device
    }

    pub fn calls(&self) -> &[TransportCall] {
        &self.calls
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    pub fn count_calls(&self, predicate: impl Fn(&TransportCall) -> bool) -> usize {
        self.calls.iter().filter(|c| predicate(c)).count()
    }

    /// Push a notification from `characteristic` as if the peripheral sent it.
    pub fn notify(&self, service: ServiceId, characteristic: CharacteristicId, value: Vec<u8>) {
        if let Some(connection) = self.connection {
            self.send(TransportEvent::Notify {
                connection,
                address: self.device.address.clone(),
                service,
                characteristic,
                value,
                is_notify: true,
            });
        }
    }

    /// Drop the link from the peripheral side.
    pub fn drop_link(&mut self, status: GattStatus) {
        if let Some(connection) = self.connection.take() {
            self.send(TransportEvent::Disconnected { status, connection });
        }
    }

    /// Re-establish the link as `connection` without reporting the old one
    /// closed first.
    pub fn reopen_link(&mut self, connection: ConnectionId) {
        self.connection = Some(connection);
        self.send(TransportEvent::Connected {
            status: GattStatus::SUCCESS,
            connection,
            address: self.device.address.clone(),
        });
    }

    fn send(&self, event: TransportEvent) {
        debug!("Simulated event: {:?}", event);
        let _ = self.events.send(event);
    }

    fn service(&self, id: &ServiceId) -> Option<&SimulatedService> {
        self.device.services.iter().find(|s| s.id == *id)
    }

    fn characteristic(
        &self,
        service: &ServiceId,
        characteristic: &CharacteristicId,
    ) -> Option<&SimulatedCharacteristic> {
        self.service(service)?
            .characteristics
            .iter()
            .find(|c| c.characteristic.id == *characteristic)
    }

    fn characteristic_mut(
        &mut self,
        service: &ServiceId,
        characteristic: &CharacteristicId,
    ) -> Option<&mut SimulatedCharacteristic> {
        self.device
            .services
            .iter_mut()
            .find(|s| s.id == *service)?
            .characteristics
            .iter_mut()
            .find(|c| c.characteristic.id == *characteristic)
    }

    /// Status and item answering a paged request.
    fn answer<T>(&self, page: Option<Page<T>>) -> (GattStatus, Option<T>) {
        match page {
            None => (GattStatus::FAILURE, None),
            Some(Page::Item(item)) => (GattStatus::SUCCESS, Some(item)),
            Some(Page::Echo(item)) => match self.termination {
                TerminationStyle::EchoLast => (GattStatus::SUCCESS, Some(item)),
                TerminationStyle::NoMoreResults => (GattStatus::SUCCESS, None),
                TerminationStyle::Error(status) => (status, None),
            },
            Some(Page::End) => match self.termination {
                TerminationStyle::Error(status) => (status, None),
                _ => (GattStatus::SUCCESS, None),
            },
        }
    }

    fn connected(&self, connection: ConnectionId, op: Operation) -> CallResult {
        if self.connection == Some(connection) {
            Ok(())
        } else {
            Err(TransportRefused {
                op,
                status: GattStatus::FAILURE,
            })
        }
    }
}

impl GattTransport for SimulatedPeripheral {
    fn register_client(&mut self, app_uuid: Uuid) -> CallResult {
        self.calls.push(TransportCall::RegisterClient(app_uuid));
        self.send(TransportEvent::ClientRegistered {
            status: GattStatus::SUCCESS,
            client: self.client,
            app_uuid,
        });
        Ok(())
    }

    fn unregister_client(&mut self, client: ClientHandle) -> CallResult {
        self.calls.push(TransportCall::UnregisterClient(client));
        Ok(())
    }

    fn scan_le_device(&mut self, _client: ClientHandle, enable: bool) -> CallResult {
        self.calls.push(TransportCall::Scan(enable));
        if enable {
            let adv_data = protocol::advertise_name(&self.device.name);
            // advertisements repeat while the scan runs
            for rssi in [self.device.rssi, self.device.rssi - 2] {
                self.send(TransportEvent::ScanResult {
                    address: self.device.address.clone(),
                    adv_data: adv_data.clone(),
                    rssi,
                    device_type: 2,
                });
            }
        }
        Ok(())
    }

    fn connect(&mut self, _client: ClientHandle, address: &str, _auto_connect: bool) -> CallResult {
        self.calls.push(TransportCall::Connect(address.to_string()));
        let connection = ConnectionId(self.next_connection);
        let status = if address == self.device.address {
            self.connection = Some(connection);
            GattStatus::SUCCESS
        } else {
            GattStatus::FAILURE
        };
        self.send(TransportEvent::Connected {
            status,
            connection,
            address: address.to_string(),
        });
        Ok(())
    }

    fn disconnect(
        &mut self,
        _client: ClientHandle,
        _address: &str,
        connection: ConnectionId,
    ) -> CallResult {
        self.calls.push(TransportCall::Disconnect(connection));
        self.connected(connection, Operation::Disconnect)?;
        self.connection = None;
        self.send(TransportEvent::Disconnected {
            status: GattStatus::SUCCESS,
            connection,
        });
        Ok(())
    }

    fn search_services(&mut self, connection: ConnectionId, filter: Option<Uuid>) -> CallResult {
        self.calls.push(TransportCall::SearchServices(filter));
        self.connected(connection, Operation::SearchServices)?;
        let repeats = if self.duplicate_search_results { 2 } else { 1 };
        for service in &self.device.services {
            if filter.is_some_and(|uuid| uuid != service.id.uuid) {
                continue;
            }
            for _ in 0..repeats {
                self.send(TransportEvent::SearchResult {
                    connection,
                    service: service.id,
                });
            }
        }
        self.send(TransportEvent::SearchComplete {
            connection,
            status: GattStatus::SUCCESS,
        });
        Ok(())
    }

    fn get_included_service(
        &mut self,
        connection: ConnectionId,
        service: &ServiceId,
        cursor: &Cursor<ServiceId>,
    ) -> CallResult {
        self.calls.push(TransportCall::GetIncludedService {
            service: *service,
            cursor: *cursor,
        });
        self.connected(connection, Operation::GetIncludedService)?;
        let found = self.service(service).map(|s| page(&s.included, cursor));
        let (status, included) = self.answer(found);
        self.send(TransportEvent::IncludedServiceFound {
            connection,
            status,
            service: *service,
            included,
        });
        Ok(())
    }

    fn get_characteristic(
        &mut self,
        connection: ConnectionId,
        service: &ServiceId,
        cursor: &Cursor<CharacteristicId>,
    ) -> CallResult {
        self.calls.push(TransportCall::GetCharacteristic {
            service: *service,
            cursor: *cursor,
        });
        self.connected(connection, Operation::GetCharacteristic)?;
        let found = self.service(service).map(|s| {
            let characteristics: Vec<Characteristic> =
                s.characteristics.iter().map(|c| c.characteristic).collect();
            page(&characteristics, cursor)
        });
        let (status, characteristic) = self.answer(found);
        self.send(TransportEvent::CharacteristicFound {
            connection,
            status,
            service: *service,
            characteristic,
        });
        Ok(())
    }

    fn get_descriptor(
        &mut self,
        connection: ConnectionId,
        service: &ServiceId,
        characteristic: &CharacteristicId,
        cursor: &Cursor<DescriptorId>,
    ) -> CallResult {
        self.calls.push(TransportCall::GetDescriptor {
            characteristic: *characteristic,
            cursor: *cursor,
        });
        self.connected(connection, Operation::GetDescriptor)?;
        let found = self.characteristic(service, characteristic).map(|c| {
            let descriptors: Vec<DescriptorId> = c.descriptors.iter().map(|d| d.id).collect();
            page(&descriptors, cursor)
        });
        let (status, descriptor) = self.answer(found);
        self.send(TransportEvent::DescriptorFound {
            connection,
            status,
            service: *service,
            characteristic: *characteristic,
            descriptor,
        });
        Ok(())
    }

    fn read_characteristic(
        &mut self,
        connection: ConnectionId,
        service: &ServiceId,
        characteristic: &CharacteristicId,
        _auth: AuthReq,
    ) -> CallResult {
        self.calls.push(TransportCall::ReadCharacteristic(*characteristic));
        self.connected(connection, Operation::ReadCharacteristic)?;
        let (status, value) = match self.characteristic(service, characteristic) {
            Some(c) => (GattStatus::SUCCESS, c.value.clone()),
            None => (GattStatus::FAILURE, Vec::new()),
        };
        self.send(TransportEvent::CharacteristicRead {
            connection,
            status,
            service: *service,
            characteristic: *characteristic,
            value,
        });
        Ok(())
    }

    fn read_descriptor(
        &mut self,
        connection: ConnectionId,
        service: &ServiceId,
        characteristic: &CharacteristicId,
        descriptor: &DescriptorId,
        _auth: AuthReq,
    ) -> CallResult {
        self.calls.push(TransportCall::ReadDescriptor(*descriptor));
        self.connected(connection, Operation::ReadDescriptor)?;
        let value = self
            .characteristic(service, characteristic)
            .and_then(|c| c.descriptors.iter().find(|d| d.id == *descriptor))
            .map(|d| d.value.clone());
        let (status, value) = match value {
            Some(value) => (GattStatus::SUCCESS, value),
            None => (GattStatus::FAILURE, Vec::new()),
        };
        self.send(TransportEvent::DescriptorRead {
            connection,
            status,
            service: *service,
            characteristic: *characteristic,
            descriptor: *descriptor,
            value,
        });
        Ok(())
    }

    fn write_characteristic(
        &mut self,
        connection: ConnectionId,
        service: &ServiceId,
        characteristic: &CharacteristicId,
        write_type: WriteType,
        _auth: AuthReq,
        value: &[u8],
    ) -> bool {
        self.calls.push(TransportCall::WriteCharacteristic {
            characteristic: *characteristic,
            write_type,
            value: value.to_vec(),
        });
        if !self.accept_writes
            || self
                .connected(connection, Operation::WriteCharacteristic)
                .is_err()
        {
            return false;
        }
        let status = self.write_status;
        if status.is_success() {
            if let Some(c) = self.characteristic_mut(service, characteristic) {
                c.value = value.to_vec();
            }
        }
        self.send(TransportEvent::CharacteristicWritten {
            connection,
            status,
            service: *service,
            characteristic: *characteristic,
        });
        true
    }

    fn write_descriptor(
        &mut self,
        connection: ConnectionId,
        service: &ServiceId,
        characteristic: &CharacteristicId,
        descriptor: &DescriptorId,
        _write_type: WriteType,
        _auth: AuthReq,
        value: &[u8],
    ) -> bool {
        self.calls.push(TransportCall::WriteDescriptor {
            descriptor: *descriptor,
            value: value.to_vec(),
        });
        if !self.accept_writes
            || self
                .connected(connection, Operation::WriteDescriptor)
                .is_err()
        {
            return false;
        }
        let status = self.write_status;
        if status.is_success() {
            if let Some(d) = self
                .characteristic_mut(service, characteristic)
                .and_then(|c| c.descriptors.iter_mut().find(|d| d.id == *descriptor))
            {
                d.value = value.to_vec();
            }
        }
        self.send(TransportEvent::DescriptorWritten {
            connection,
            status,
            service: *service,
            characteristic: *characteristic,
            descriptor: *descriptor,
        });
        true
    }

    fn execute_write(&mut self, connection: ConnectionId, flag: i32) -> CallResult {
        self.calls.push(TransportCall::ExecuteWrite { connection, flag });
        self.connected(connection, Operation::ExecuteWrite)?;
        self.send(TransportEvent::ExecuteWrite {
            connection,
            status: GattStatus::SUCCESS,
        });
        Ok(())
    }

    fn register_for_notification(
        &mut self,
        _client: ClientHandle,
        _address: &str,
        service: &ServiceId,
        characteristic: &CharacteristicId,
    ) -> CallResult {
        self.calls
            .push(TransportCall::RegisterForNotification(*characteristic));
        let Some(connection) = self.connection else {
            return Err(TransportRefused {
                op: Operation::RegisterForNotification,
                status: GattStatus::FAILURE,
            });
        };
        let found = self
            .characteristic(service, characteristic)
            .map(|c| (c.characteristic.properties.can_subscribe(), c.value.clone()));
        let status = match &found {
            Some((true, _)) => GattStatus::SUCCESS,
            _ => GattStatus::FAILURE,
        };
        self.send(TransportEvent::NotificationRegistered {
            connection,
            status,
            registered: status.is_success(),
            service: *service,
            characteristic: *characteristic,
        });
        // the shield reports its current pin state once subscribed
        if let Some((true, value)) = found {
            self.notify(*service, *characteristic, value);
        }
        Ok(())
    }

    fn deregister_for_notification(
        &mut self,
        _client: ClientHandle,
        _address: &str,
        service: &ServiceId,
        characteristic: &CharacteristicId,
    ) -> CallResult {
        self.calls
            .push(TransportCall::DeregisterForNotification(*characteristic));
        if let Some(connection) = self.connection {
            self.send(TransportEvent::NotificationRegistered {
                connection,
                status: GattStatus::SUCCESS,
                registered: false,
                service: *service,
                characteristic: *characteristic,
            });
        }
        Ok(())
    }

    fn read_remote_rssi(&mut self, _client: ClientHandle, address: &str) -> CallResult {
        self.calls.push(TransportCall::ReadRemoteRssi(address.to_string()));
        self.send(TransportEvent::RemoteRssi {
            status: GattStatus::SUCCESS,
            address: address.to_string(),
            rssi: self.device.rssi,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sig_uuid() {
        assert_eq!(sig_uuid(0x2902), shield::CLIENT_CHARACTERISTIC_CONFIG_UUID);
    }

    #[test]
    fn test_paging_answers() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut peripheral = SimulatedPeripheral::ble_shield(tx.clone());
        let address = peripheral.device().address.clone();
        peripheral.connect(ClientHandle(1), &address, true).unwrap();
        let service = ServiceId::primary(shield::SERVICE_UUID, 0);
        let tx_char = GattId::new(shield::TX_CHAR_UUID, 0);
        let rx_char = GattId::new(shield::RX_CHAR_UUID, 0);
        let conn = ConnectionId(7);

        peripheral
            .get_characteristic(conn, &service, &Cursor::After(rx_char))
            .unwrap();
        peripheral
            .get_characteristic(conn, &service, &Cursor::After(tx_char))
            .unwrap();

        let mut answers = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let TransportEvent::CharacteristicFound { characteristic, .. } = event {
                answers.push(characteristic.map(|c| c.id));
            }
        }
        // past the end the last item is echoed
        assert_eq!(answers, vec![Some(rx_char), Some(rx_char)]);

        let mut peripheral = SimulatedPeripheral::ble_shield(tx)
            .with_termination(TerminationStyle::Error(GattStatus::FAILURE));
        peripheral.connect(ClientHandle(1), &address, true).unwrap();
        peripheral
            .get_characteristic(conn, &service, &Cursor::After(rx_char))
            .unwrap();
        let last = std::iter::from_fn(|| rx.try_recv().ok()).last();
        assert!(matches!(
            last,
            Some(TransportEvent::CharacteristicFound {
                status: GattStatus::FAILURE,
                characteristic: None,
                ..
            })
        ));
    }
}
