//! GATT Session Controller
//!
//! Owns the transport and all session state. UI requests come in as method
//! calls (or [`SessionCommand`]s through [`SessionController::execute`]),
//! host callbacks come in through [`SessionController::handle_event`], and
//! everything the UI should see goes out as [`AppEvent`]s.
//!
//! The controller never sleeps. Timers are deadlines it exposes
//! ([`scan_deadline`](SessionController::scan_deadline),
//! [`rssi_deadline`](SessionController::rssi_deadline)) for the runtime to
//! wait on.

use crate::domain::error::{GattError, Operation};
use crate::domain::gatt::{
    AdapterHandle, AuthReq, Characteristic, CharacteristicId, ClientHandle, ConnectionId, Cursor,
    DescriptorId, GattStatus, ServiceId, WriteTarget, WriteType,
};
use crate::domain::models::{
    AppEvent, ConnectionStatus, DiscoveryLevel, EnumerationOutcome, NavigationDepth, Notification,
    SessionCommand, StatusMessage, ValueReport,
};
use crate::domain::settings::SessionSettings;
use crate::infrastructure::bluetooth::{
    connection::SessionState,
    discovery::{DiscoverySequencer, EnumerationStep},
    protocol,
    scanner::BleScanner,
    transport::{GattTransport, TransportEvent},
    write_pipeline::{WritePipeline, WriteStep},
};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

pub struct SessionController<T: GattTransport> {
    transport: T,
    settings: SessionSettings,
    event_sender: mpsc::UnboundedSender<AppEvent>,
    state: SessionState,
    scanner: BleScanner,
    discovery: DiscoverySequencer,
    writes: WritePipeline,
}

impl<T: GattTransport> SessionController<T> {
    pub fn create(
        transport: T,
        settings: SessionSettings,
        event_sender: mpsc::UnboundedSender<AppEvent>,
    ) -> Self {
        Self {
            transport,
            settings,
            event_sender,
            state: SessionState::new(),
            scanner: BleScanner::new(),
            discovery: DiscoverySequencer::new(),
            writes: WritePipeline::new(),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn discovery(&self) -> &DiscoverySequencer {
        &self.discovery
    }

    pub fn services(&self) -> &[ServiceId] {
        self.discovery.services()
    }

    pub fn included_services(&self) -> &[ServiceId] {
        self.discovery.included.items()
    }

    pub fn characteristics(&self) -> &[Characteristic] {
        self.discovery.characteristics.items()
    }

    pub fn descriptors(&self) -> &[DescriptorId] {
        self.discovery.descriptors.items()
    }

    pub fn is_scanning(&self) -> bool {
        self.scanner.is_scanning()
    }

    pub fn is_connected(&self) -> bool {
        self.state.connection().is_some()
    }

    pub fn depth(&self) -> NavigationDepth {
        self.state.depth()
    }

    /// When the running scan has to be stopped.
    pub fn scan_deadline(&self) -> Option<Instant> {
        self.scanner.deadline()
    }

    /// When the next RSSI read is due.
    pub fn rssi_deadline(&self) -> Option<Instant> {
        self.state.rssi_deadline()
    }

    // ------------------------------------------------------------------
    // Reporting
    // ------------------------------------------------------------------

    fn emit(&self, event: AppEvent) {
        let _ = self.event_sender.send(event);
    }

    fn log_info(&self, message: String) {
        info!("{}", message);
        self.emit(AppEvent::LogMessage(StatusMessage::info(message)));
    }

    /// Log an error and show it to the user.
    pub fn report_error(&self, error: &GattError) {
        warn!("{}", error);
        self.emit(AppEvent::LogMessage(StatusMessage::error(error.to_string())));
    }

    fn or_report(&self, result: Result<(), GattError>) {
        if let Err(e) = result {
            self.report_error(&e);
        }
    }

    fn navigate_to(&mut self, depth: NavigationDepth) {
        self.state.set_depth(depth);
        self.emit(AppEvent::NavigationChanged {
            depth,
            path: self.state.selection().path(),
        });
    }

    fn link(&self) -> Result<(ConnectionId, u64), GattError> {
        let link = self.state.require_connection()?;
        Ok((link.id, link.generation))
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// The platform reported Bluetooth as enabled.
    pub fn on_adapter_ready(&mut self, adapter: AdapterHandle) -> Result<(), GattError> {
        info!("Bluetooth adapter ready: {}", adapter.0);
        self.state.on_adapter_ready(adapter);
        self.emit(AppEvent::AdapterAvailable(true));
        if self.state.client().is_some() {
            return self.start_scan();
        }
        self.transport.register_client(self.settings.app_uuid)?;
        Ok(())
    }

    /// The platform reported Bluetooth as disabled. Every handle is gone.
    pub fn on_adapter_disabled(&mut self) {
        warn!("Bluetooth adapter disabled");
        let was_scanning = self.scanner.stop();
        let link = self.state.on_adapter_disabled();
        self.discovery.reset();
        self.writes.reset();
        if was_scanning {
            self.emit(AppEvent::ScanStateChanged { scanning: false });
        }
        if link.is_some() {
            self.emit(AppEvent::ConnectionStatus(ConnectionStatus::Disconnected));
            self.navigate_to(NavigationDepth::DeviceList);
        }
        self.emit(AppEvent::AdapterAvailable(false));
    }

    /// Stop scanning, close the link and release the client handle.
    pub fn teardown(&mut self) -> Result<(), GattError> {
        info!("Tearing down GATT session");
        let scan = self.stop_scan();
        let link = self.state.on_disconnected();
        self.discovery.reset();
        self.writes.reset();
        let client = self.state.release_client();

        if let (Some(link), Some(client)) = (&link, client) {
            if let Err(refused) = self.transport.disconnect(client, &link.address, link.id) {
                warn!("Disconnect during teardown failed: {}", refused);
            }
            self.emit(AppEvent::ConnectionStatus(ConnectionStatus::Disconnected));
        }
        if let Some(client) = client {
            self.transport.unregister_client(client)?;
        }
        scan
    }

    pub fn on_client_registered(&mut self, client: ClientHandle, status: GattStatus) {
        if !status.is_success() {
            self.report_error(&GattError::transport(Operation::RegisterClient, status));
            return;
        }
        info!("GATT client registered: {}", client.0);
        self.state.on_client_registered(client);
        self.emit(AppEvent::ClientRegistered(client));
        let result = self.start_scan();
        self.or_report(result);
    }

    pub fn on_connected(&mut self, connection: ConnectionId, status: GattStatus, address: String) {
        if !status.is_success() {
            self.state.on_connect_failed();
            self.report_error(&GattError::transport(Operation::Connect, status));
            self.emit(AppEvent::ConnectionStatus(ConnectionStatus::Error));
            return;
        }
        if let Some(previous) = self.state.on_disconnected() {
            warn!(
                "Connection {} to {} replaced by connection {}",
                previous.id, previous.address, connection
            );
            self.discovery.reset();
            self.writes.reset();
            self.emit(AppEvent::ConnectionStatus(ConnectionStatus::Disconnected));
        }
        let message = format!("Connected to {} (connection {})", address, connection);
        let generation = self.state.on_connected(connection, address);
        debug!("Connection generation {}", generation);
        self.log_info(message);
        self.emit(AppEvent::ConnectionStatus(ConnectionStatus::Connected));
        self.navigate_to(NavigationDepth::Device);
        self.state
            .schedule_rssi_poll(self.settings.rssi_poll_interval());
        let result = self.discover_services();
        self.or_report(result);
    }

    pub fn on_disconnected(&mut self, status: GattStatus) {
        if !status.is_success() {
            self.report_error(&GattError::transport(Operation::Disconnect, status));
            return;
        }
        let Some(link) = self.state.on_disconnected() else {
            return;
        };
        self.discovery.reset();
        self.writes.reset();
        self.log_info(format!("Disconnected from {}", link.address));
        self.emit(AppEvent::ConnectionStatus(ConnectionStatus::Disconnected));
        self.navigate_to(NavigationDepth::DeviceList);
    }

    // ------------------------------------------------------------------
    // Scanning and connection
    // ------------------------------------------------------------------

    /// Start a scan pass. Starting while a scan runs does nothing.
    pub fn start_scan(&mut self) -> Result<(), GattError> {
        let adapter = self.state.require_adapter()?.0.clone();
        let client = self.state.require_client()?;
        if !self.scanner.start(self.settings.scan_timeout()) {
            debug!("Scan already running");
            return Ok(());
        }
        if let Err(refused) = self.transport.scan_le_device(client, true) {
            self.scanner.stop();
            return Err(refused.into());
        }
        info!("Scanning on {} for {} ms", adapter, self.settings.scan_timeout_ms);
        self.emit(AppEvent::ScanStateChanged { scanning: true });
        Ok(())
    }

    pub fn stop_scan(&mut self) -> Result<(), GattError> {
        if !self.scanner.stop() {
            return Ok(());
        }
        self.emit(AppEvent::ScanStateChanged { scanning: false });
        let client = self.state.require_client()?;
        self.transport.scan_le_device(client, false)?;
        Ok(())
    }

    /// The scan deadline elapsed.
    pub fn on_scan_timeout(&mut self) {
        info!("Scan timed out");
        let result = self.stop_scan();
        self.or_report(result);
    }

    pub fn connect(&mut self, address: &str) -> Result<(), GattError> {
        let client = self.state.require_client()?;
        if let Some(link) = self.state.connection() {
            if link.address == address {
                debug!("Already connected to {}", address);
                return Ok(());
            }
            self.disconnect()?;
        }
        if self.state.pending_address() == Some(address) {
            debug!("Connect to {} already pending", address);
            return Ok(());
        }
        self.stop_scan()?;
        self.state.on_connect_requested(address);
        if let Err(refused) = self
            .transport
            .connect(client, address, self.settings.auto_connect)
        {
            self.state.on_connect_failed();
            return Err(refused.into());
        }
        self.log_info(format!("Connecting to {}", address));
        self.emit(AppEvent::ConnectionStatus(ConnectionStatus::Connecting));
        Ok(())
    }

    /// Ask the host to close the link. State is cleared once the disconnect
    /// event arrives.
    pub fn disconnect(&mut self) -> Result<(), GattError> {
        let client = self.state.require_client()?;
        let link = self.state.require_connection()?;
        self.transport.disconnect(client, &link.address, link.id)?;
        info!("Disconnecting from {}", link.address);
        Ok(())
    }

    /// Read the RSSI of the open link and schedule the next read.
    pub fn poll_rssi(&mut self) {
        let (Ok(client), Some(link)) = (self.state.require_client(), self.state.connection())
        else {
            self.state.cancel_rssi_poll();
            return;
        };
        if let Err(refused) = self.transport.read_remote_rssi(client, &link.address) {
            warn!("RSSI poll failed: {}", refused);
        }
        self.state
            .schedule_rssi_poll(self.settings.rssi_poll_interval());
    }

    // ------------------------------------------------------------------
    // Discovery
    // ------------------------------------------------------------------

    /// Search every service of the open link.
    pub fn discover_services(&mut self) -> Result<(), GattError> {
        let (connection, generation) = self.link()?;
        self.discovery.begin_search(generation)?;
        if let Err(refused) = self.transport.search_services(connection, None) {
            self.discovery.cancel_search();
            return Err(refused.into());
        }
        debug!("Searching services on connection {}", connection);
        Ok(())
    }

    pub fn discover_included_services(
        &mut self,
        service: ServiceId,
        cursor: Cursor<ServiceId>,
    ) -> Result<(), GattError> {
        let (connection, generation) = self.link()?;
        self.discovery.included.begin(service, cursor, generation);
        self.request_included_service(connection, service, cursor)
    }

    pub fn discover_characteristics(
        &mut self,
        service: ServiceId,
        cursor: Cursor<CharacteristicId>,
    ) -> Result<(), GattError> {
        let (connection, generation) = self.link()?;
        self.discovery
            .characteristics
            .begin(service, cursor, generation);
        self.request_characteristic(connection, service, cursor)
    }

    pub fn discover_descriptors(
        &mut self,
        service: ServiceId,
        characteristic: CharacteristicId,
        cursor: Cursor<DescriptorId>,
    ) -> Result<(), GattError> {
        let (connection, generation) = self.link()?;
        self.discovery
            .descriptors
            .begin((service, characteristic), cursor, generation);
        self.request_descriptor(connection, service, characteristic, cursor)
    }

    fn request_included_service(
        &mut self,
        connection: ConnectionId,
        service: ServiceId,
        cursor: Cursor<ServiceId>,
    ) -> Result<(), GattError> {
        if let Err(refused) = self
            .transport
            .get_included_service(connection, &service, &cursor)
        {
            self.discovery.included.reset();
            return Err(refused.into());
        }
        Ok(())
    }

    fn request_characteristic(
        &mut self,
        connection: ConnectionId,
        service: ServiceId,
        cursor: Cursor<CharacteristicId>,
    ) -> Result<(), GattError> {
        if let Err(refused) = self
            .transport
            .get_characteristic(connection, &service, &cursor)
        {
            self.discovery.characteristics.reset();
            return Err(refused.into());
        }
        Ok(())
    }

    fn request_descriptor(
        &mut self,
        connection: ConnectionId,
        service: ServiceId,
        characteristic: CharacteristicId,
        cursor: Cursor<DescriptorId>,
    ) -> Result<(), GattError> {
        if let Err(refused) =
            self.transport
                .get_descriptor(connection, &service, &characteristic, &cursor)
        {
            self.discovery.descriptors.reset();
            return Err(refused.into());
        }
        Ok(())
    }

    fn finish_enumeration(&self, level: DiscoveryLevel, outcome: EnumerationOutcome, count: usize) {
        match outcome {
            EnumerationOutcome::Exhausted => {
                debug!("{:?} enumeration finished with {} items", level, count)
            }
            EnumerationOutcome::Failed(status) => warn!(
                "{:?} enumeration stopped with status {} after {} items",
                level, status, count
            ),
        }
        self.emit(AppEvent::EnumerationFinished {
            level,
            outcome,
            count,
        });
    }

    // ------------------------------------------------------------------
    // Selection and navigation
    // ------------------------------------------------------------------

    pub fn on_service_selected(&mut self, service: ServiceId) -> Result<(), GattError> {
        self.link()?;
        self.state.selection_mut().select_service(service);
        self.navigate_to(NavigationDepth::Characteristics);
        self.discover_included_services(service, Cursor::Start)?;
        self.discover_characteristics(service, Cursor::Start)
    }

    /// Select a characteristic of the selected service: list its
    /// descriptors, subscribe to it and read its value.
    pub fn on_characteristic_selected(
        &mut self,
        characteristic: CharacteristicId,
    ) -> Result<(), GattError> {
        self.link()?;
        let service = self.state.selection().require_service()?;
        self.state
            .selection_mut()
            .select_characteristic(characteristic);
        self.navigate_to(NavigationDepth::CharacteristicDetail);

        // unknown characteristics get every request
        let properties = self
            .characteristics()
            .iter()
            .find(|c| c.id == characteristic)
            .map(|c| c.properties);
        self.discover_descriptors(service, characteristic, Cursor::Start)?;
        if properties.is_none_or(|p| p.can_subscribe()) {
            self.register_notification(service, characteristic)?;
        }
        if properties.is_none_or(|p| p.can_read()) {
            self.read_characteristic()?;
        }
        Ok(())
    }

    pub fn on_descriptor_selected(&mut self, descriptor: DescriptorId) -> Result<(), GattError> {
        self.link()?;
        self.state.selection().require_characteristic()?;
        self.state.selection_mut().select_descriptor(descriptor);
        self.navigate_to(NavigationDepth::DescriptorDetail);
        self.read_descriptor()
    }

    /// Go back one page, re-running the listing the previous page shows.
    pub fn navigate_back(&mut self) -> Result<(), GattError> {
        match self.state.depth() {
            NavigationDepth::DeviceList => Ok(()),
            NavigationDepth::Device => {
                self.navigate_to(NavigationDepth::DeviceList);
                match self.disconnect() {
                    Err(GattError::StaleConnection) => Ok(()),
                    other => other,
                }
            }
            NavigationDepth::Services => {
                self.navigate_to(NavigationDepth::Device);
                Ok(())
            }
            NavigationDepth::Characteristics => {
                self.navigate_to(NavigationDepth::Services);
                self.discover_services()
            }
            NavigationDepth::CharacteristicDetail => {
                let service = self.state.selection().require_service()?;
                self.navigate_to(NavigationDepth::Characteristics);
                self.discover_characteristics(service, Cursor::Start)
            }
            NavigationDepth::DescriptorDetail => {
                let (service, characteristic) = self.state.selection().require_characteristic()?;
                self.navigate_to(NavigationDepth::CharacteristicDetail);
                self.discover_descriptors(service, characteristic, Cursor::Start)
            }
        }
    }

    // ------------------------------------------------------------------
    // Reads, writes and notifications
    // ------------------------------------------------------------------

    pub fn read_characteristic(&mut self) -> Result<(), GattError> {
        let (connection, _) = self.link()?;
        let (service, characteristic) = self.state.selection().require_characteristic()?;
        self.transport.read_characteristic(
            connection,
            &service,
            &characteristic,
            self.settings.auth_req,
        )?;
        Ok(())
    }

    pub fn read_descriptor(&mut self) -> Result<(), GattError> {
        let (connection, _) = self.link()?;
        let (service, characteristic, descriptor) = self.state.selection().require_descriptor()?;
        self.transport.read_descriptor(
            connection,
            &service,
            &characteristic,
            &descriptor,
            self.settings.auth_req,
        )?;
        Ok(())
    }

    /// Write with the configured write type and auth requirement.
    pub fn write(&mut self, target: WriteTarget, payload: &[u8]) -> Result<(), GattError> {
        self.write_with(target, payload, self.settings.write_type, self.settings.auth_req)
    }

    /// Write `payload` to `target`. The pipeline commits it with an
    /// execute-write once the host confirms it. A write refused here is
    /// still answered with a failed [`AppEvent::WriteCompleted`].
    pub fn write_with(
        &mut self,
        target: WriteTarget,
        payload: &[u8],
        write_type: WriteType,
        auth: AuthReq,
    ) -> Result<(), GattError> {
        let result = self.start_write(target, payload, write_type, auth);
        if result.is_err() {
            self.emit(AppEvent::WriteCompleted {
                target,
                status: GattStatus::FAILURE,
            });
        }
        result
    }

    fn start_write(
        &mut self,
        target: WriteTarget,
        payload: &[u8],
        write_type: WriteType,
        auth: AuthReq,
    ) -> Result<(), GattError> {
        let (connection, generation) = self.link()?;
        self.writes.begin(connection, target, generation)?;
        let (accepted, op) = match &target {
            WriteTarget::Characteristic {
                service,
                characteristic,
            } => (
                self.transport.write_characteristic(
                    connection,
                    service,
                    characteristic,
                    write_type,
                    auth,
                    payload,
                ),
                Operation::WriteCharacteristic,
            ),
            WriteTarget::Descriptor {
                service,
                characteristic,
                descriptor,
            } => (
                self.transport.write_descriptor(
                    connection,
                    service,
                    characteristic,
                    descriptor,
                    write_type,
                    auth,
                    payload,
                ),
                Operation::WriteDescriptor,
            ),
        };
        if !accepted {
            self.writes.abort();
            return Err(GattError::transport(op, GattStatus::FAILURE));
        }
        debug!(
            "Wrote {} to {} (write type {}, auth {})",
            protocol::display_hex(payload),
            target.characteristic().uuid,
            write_type.as_raw(),
            auth.as_raw()
        );
        Ok(())
    }

    pub fn write_selected_characteristic(&mut self, payload: &[u8]) -> Result<(), GattError> {
        let target = self.state.selection().characteristic_target()?;
        self.write(target, payload)
    }

    pub fn write_selected_descriptor(&mut self, payload: &[u8]) -> Result<(), GattError> {
        let target = self.state.selection().descriptor_target()?;
        self.write(target, payload)
    }

    /// Write user-typed hex to the descriptor when its page is open, to the
    /// selected characteristic otherwise.
    pub fn write_hex(&mut self, input: &str) -> Result<(), GattError> {
        let payload = protocol::from_hex(input)?;
        if self.state.depth() == NavigationDepth::DescriptorDetail {
            self.write_selected_descriptor(&payload)
        } else {
            self.write_selected_characteristic(&payload)
        }
    }

    pub fn register_notification(
        &mut self,
        service: ServiceId,
        characteristic: CharacteristicId,
    ) -> Result<(), GattError> {
        let client = self.state.require_client()?;
        let link = self.state.require_connection()?;
        self.transport
            .register_for_notification(client, &link.address, &service, &characteristic)?;
        Ok(())
    }

    pub fn deregister_notification(
        &mut self,
        service: ServiceId,
        characteristic: CharacteristicId,
    ) -> Result<(), GattError> {
        let client = self.state.require_client()?;
        let link = self.state.require_connection()?;
        self.transport
            .deregister_for_notification(client, &link.address, &service, &characteristic)?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Dispatch
    // ------------------------------------------------------------------

    /// Run one UI command.
    pub fn execute(&mut self, command: SessionCommand) -> Result<(), GattError> {
        match command {
            SessionCommand::AdapterReady(name) => self.on_adapter_ready(AdapterHandle(name)),
            SessionCommand::AdapterDisabled => {
                self.on_adapter_disabled();
                Ok(())
            }
            SessionCommand::StartScan => self.start_scan(),
            SessionCommand::StopScan => self.stop_scan(),
            SessionCommand::Connect(address) => self.connect(&address),
            SessionCommand::Disconnect => self.disconnect(),
            SessionCommand::SearchServices => self.discover_services(),
            SessionCommand::DiscoverCharacteristics(service) => {
                self.discover_characteristics(service, Cursor::Start)
            }
            SessionCommand::DiscoverDescriptors {
                service,
                characteristic,
            } => self.discover_descriptors(service, characteristic, Cursor::Start),
            SessionCommand::SelectService(service) => self.on_service_selected(service),
            SessionCommand::SelectCharacteristic(characteristic) => {
                self.on_characteristic_selected(characteristic)
            }
            SessionCommand::SelectDescriptor(descriptor) => self.on_descriptor_selected(descriptor),
            SessionCommand::ReadCharacteristic => self.read_characteristic(),
            SessionCommand::ReadDescriptor => self.read_descriptor(),
            SessionCommand::Write { target, payload } => self.write(target, &payload),
            SessionCommand::WriteSelectedCharacteristic(payload) => {
                self.write_selected_characteristic(&payload)
            }
            SessionCommand::WriteSelectedDescriptor(payload) => {
                self.write_selected_descriptor(&payload)
            }
            SessionCommand::WriteHex(input) => self.write_hex(&input),
            SessionCommand::RegisterNotification {
                service,
                characteristic,
            } => self.register_notification(service, characteristic),
            SessionCommand::DeregisterNotification {
                service,
                characteristic,
            } => self.deregister_notification(service, characteristic),
            SessionCommand::NavigateBack => self.navigate_back(),
            other @ (SessionCommand::Schedule { .. } | SessionCommand::Shutdown) => {
                debug!("Ignoring runtime command {:?}", other);
                Ok(())
            }
        }
    }

    /// Route one host callback.
    pub fn handle_event(&mut self, event: TransportEvent) {
        if let Some(connection) = event.connection() {
            let opens_link = matches!(event, TransportEvent::Connected { .. });
            if !opens_link && !self.state.is_current(connection) {
                debug!("Dropping event for stale connection {}: {:?}", connection, event);
                return;
            }
        }
        let generation = self.state.generation();

        match event {
            TransportEvent::ClientRegistered {
                status,
                client,
                app_uuid,
            } => {
                if app_uuid != self.settings.app_uuid {
                    debug!("Ignoring registration for another app: {}", app_uuid);
                    return;
                }
                self.on_client_registered(client, status);
            }
            TransportEvent::ScanResult {
                address,
                adv_data,
                rssi,
                device_type,
            } => {
                if !self.scanner.is_scanning() {
                    debug!("Scan result after scan stopped: {}", address);
                    return;
                }
                if let Some(device) = self.scanner.observe(&address, &adv_data, rssi, device_type)
                {
                    info!(
                        "Found device {} ({}) rssi {}",
                        device.name, device.address, device.rssi
                    );
                    self.emit(AppEvent::DeviceFound(device));
                }
            }
            TransportEvent::Connected {
                status,
                connection,
                address,
            } => self.on_connected(connection, status, address),
            TransportEvent::Disconnected { status, .. } => self.on_disconnected(status),
            TransportEvent::SearchResult { service, .. } => {
                if self.discovery.on_search_result(service, generation) {
                    debug!("Service found: {}", service.uuid);
                    if self.state.depth() == NavigationDepth::Device {
                        self.navigate_to(NavigationDepth::Services);
                    }
                    self.emit(AppEvent::ServiceFound(service));
                }
            }
            TransportEvent::SearchComplete { status, .. } => {
                if let Some(count) = self.discovery.on_search_complete(generation) {
                    if status.is_success() {
                        info!("Service search complete: {} services", count);
                    } else {
                        self.report_error(&GattError::transport(Operation::SearchServices, status));
                    }
                    self.emit(AppEvent::ServiceSearchComplete { status, count });
                }
            }
            TransportEvent::IncludedServiceFound {
                connection,
                status,
                service,
                included,
            } => match self
                .discovery
                .included
                .on_found(&service, status, included, generation)
            {
                EnumerationStep::Continue { item, next } => {
                    self.emit(AppEvent::IncludedServiceFound {
                        service,
                        included: item,
                    });
                    let result = self.request_included_service(connection, service, next);
                    self.or_report(result);
                }
                EnumerationStep::Finished { outcome, count } => {
                    self.finish_enumeration(DiscoveryLevel::IncludedServices, outcome, count)
                }
                EnumerationStep::Ignored => {}
            },
            TransportEvent::CharacteristicFound {
                connection,
                status,
                service,
                characteristic,
            } => match self
                .discovery
                .characteristics
                .on_found(&service, status, characteristic, generation)
            {
                EnumerationStep::Continue { item, next } => {
                    debug!("Characteristic found: {}", item.id.uuid);
                    self.emit(AppEvent::CharacteristicFound {
                        service,
                        characteristic: item,
                    });
                    let result = self.request_characteristic(connection, service, next);
                    self.or_report(result);
                }
                EnumerationStep::Finished { outcome, count } => {
                    self.finish_enumeration(DiscoveryLevel::Characteristics, outcome, count)
                }
                EnumerationStep::Ignored => {}
            },
            TransportEvent::DescriptorFound {
                connection,
                status,
                service,
                characteristic,
                descriptor,
            } => match self.discovery.descriptors.on_found(
                &(service, characteristic),
                status,
                descriptor,
                generation,
            ) {
                EnumerationStep::Continue { item, next } => {
                    debug!("Descriptor found: {}", item.uuid);
                    self.emit(AppEvent::DescriptorFound {
                        service,
                        characteristic,
                        descriptor: item,
                    });
                    let result = self.request_descriptor(connection, service, characteristic, next);
                    self.or_report(result);
                }
                EnumerationStep::Finished { outcome, count } => {
                    self.finish_enumeration(DiscoveryLevel::Descriptors, outcome, count)
                }
                EnumerationStep::Ignored => {}
            },
            TransportEvent::NotificationRegistered {
                status,
                registered,
                service,
                characteristic,
                ..
            } => {
                if !status.is_success() {
                    let op = if registered {
                        Operation::RegisterForNotification
                    } else {
                        Operation::DeregisterForNotification
                    };
                    self.report_error(&GattError::transport(op, status));
                }
                self.emit(AppEvent::NotificationRegistration {
                    service,
                    characteristic,
                    registered,
                    status,
                });
            }
            TransportEvent::Notify {
                address,
                service,
                characteristic,
                value,
                is_notify,
                ..
            } => {
                debug!(
                    "Notification from {} on {}: {}",
                    address,
                    characteristic.uuid,
                    protocol::display_hex(&value)
                );
                self.emit(AppEvent::Notification(Notification {
                    address,
                    service,
                    characteristic,
                    value,
                    is_notify,
                }));
            }
            TransportEvent::CharacteristicRead {
                status,
                service,
                characteristic,
                value,
                ..
            } => {
                if !status.is_success() {
                    self.report_error(&GattError::transport(
                        Operation::ReadCharacteristic,
                        status,
                    ));
                }
                self.emit(AppEvent::CharacteristicValue(ValueReport {
                    service,
                    characteristic,
                    descriptor: None,
                    status,
                    hex: protocol::to_hex(&value),
                    value,
                }));
            }
            TransportEvent::DescriptorRead {
                status,
                service,
                characteristic,
                descriptor,
                value,
                ..
            } => {
                if !status.is_success() {
                    self.report_error(&GattError::transport(Operation::ReadDescriptor, status));
                }
                self.emit(AppEvent::DescriptorValue(ValueReport {
                    service,
                    characteristic,
                    descriptor: Some(descriptor),
                    status,
                    hex: protocol::to_hex(&value),
                    value,
                }));
            }
            TransportEvent::CharacteristicWritten {
                status,
                service,
                characteristic,
                ..
            } => self.on_write_completed(
                WriteTarget::Characteristic {
                    service,
                    characteristic,
                },
                status,
                generation,
            ),
            TransportEvent::DescriptorWritten {
                status,
                service,
                characteristic,
                descriptor,
                ..
            } => self.on_write_completed(
                WriteTarget::Descriptor {
                    service,
                    characteristic,
                    descriptor,
                },
                status,
                generation,
            ),
            TransportEvent::ExecuteWrite { status, .. } => {
                if !self.writes.on_execute_complete(generation) {
                    debug!("Execute-write answer without a pending write");
                    return;
                }
                if !status.is_success() {
                    self.report_error(&GattError::transport(Operation::ExecuteWrite, status));
                }
                self.emit(AppEvent::WriteExecuted { status });
            }
            TransportEvent::RemoteRssi {
                status,
                address,
                rssi,
            } => {
                if status.is_success() {
                    self.emit(AppEvent::Rssi { address, rssi });
                } else {
                    debug!("RSSI read failed with status {}", status);
                }
            }
            TransportEvent::Listen { status, server } => {
                if status.is_success() {
                    self.state.on_listening(server);
                } else {
                    warn!("Listen failed with status {}", status);
                }
                self.emit(AppEvent::Listening { server, status });
            }
        }
    }

    fn on_write_completed(&mut self, target: WriteTarget, status: GattStatus, generation: u64) {
        match self.writes.on_write_complete(&target, status, generation) {
            WriteStep::Execute(connection) => {
                self.emit(AppEvent::WriteCompleted { target, status });
                if let Err(refused) = self
                    .transport
                    .execute_write(connection, self.settings.execute_write_flag)
                {
                    self.writes.reset();
                    self.report_error(&refused.into());
                }
            }
            WriteStep::Cancelled(status) => {
                let op = match target {
                    WriteTarget::Characteristic { .. } => Operation::WriteCharacteristic,
                    WriteTarget::Descriptor { .. } => Operation::WriteDescriptor,
                };
                self.report_error(&GattError::transport(op, status));
                self.emit(AppEvent::WriteCompleted { target, status });
            }
            WriteStep::Ignored => debug!("Unexpected write completion for {:?}", target),
        }
    }
}
