//! Bluetooth Service Module
//!
//! Async runtime around the [`SessionController`]: feeds it host callbacks
//! and UI commands from two channels and fires its timers. Everything runs
//! on one task, so the controller is never touched concurrently.

use crate::domain::models::SessionCommand;
use crate::infrastructure::bluetooth::{
    controller::SessionController,
    transport::{GattTransport, TransportEvent},
};
use std::future::{self, Future};
use tokio::sync::mpsc;
use tokio::time::{self, Instant};
use tracing::{debug, info, warn};

/// Sleep until `deadline`, or forever when there is none.
fn sleep_until_opt(deadline: Option<Instant>) -> impl Future<Output = ()> {
    async move {
        match deadline {
            Some(deadline) => time::sleep_until(deadline).await,
            None => future::pending().await,
        }
    }
}

/// Drives one GATT session until shut down.
pub struct GattService<T: GattTransport> {
    controller: SessionController<T>,
    transport_events: mpsc::UnboundedReceiver<TransportEvent>,
    commands: mpsc::UnboundedReceiver<SessionCommand>,
    /// Commands waiting for their delay to elapse.
    scheduled: Vec<(Instant, SessionCommand)>,
}

impl<T: GattTransport> GattService<T> {
    /// Wrap `controller`. Returns the service and the sender commands are
    /// submitted through.
    pub fn new(
        controller: SessionController<T>,
        transport_events: mpsc::UnboundedReceiver<TransportEvent>,
    ) -> (Self, mpsc::UnboundedSender<SessionCommand>) {
        let (command_tx, commands) = mpsc::unbounded_channel();
        let service = Self {
            controller,
            transport_events,
            commands,
            scheduled: Vec::new(),
        };
        (service, command_tx)
    }

    pub fn controller(&self) -> &SessionController<T> {
        &self.controller
    }

    /// Run until [`SessionCommand::Shutdown`] arrives or every command sender
    /// is dropped. The session is torn down before the controller is handed
    /// back.
    pub async fn run(mut self) -> SessionController<T> {
        info!("GATT session service started");
        loop {
            let next_scheduled = self.scheduled.iter().map(|(at, _)| *at).min();
            tokio::select! {
                biased;

                Some(event) = self.transport_events.recv() => {
                    self.controller.handle_event(event);
                }
                command = self.commands.recv() => {
                    let Some(command) = command else { break };
                    if !self.submit(command) {
                        break;
                    }
                }
                _ = sleep_until_opt(self.controller.scan_deadline()) => {
                    self.controller.on_scan_timeout();
                }
                _ = sleep_until_opt(self.controller.rssi_deadline()) => {
                    self.controller.poll_rssi();
                }
                _ = sleep_until_opt(next_scheduled) => {
                    if !self.run_due_commands() {
                        break;
                    }
                }
            }
        }

        if let Err(e) = self.controller.teardown() {
            warn!("Teardown failed: {}", e);
        }
        info!("GATT session service stopped");
        self.controller
    }

    /// Returns false once the session has to stop.
    fn submit(&mut self, command: SessionCommand) -> bool {
        match command {
            SessionCommand::Shutdown => return false,
            SessionCommand::Schedule { delay, command } => {
                debug!("Scheduling {:?} in {:?}", command, delay);
                self.scheduled.push((Instant::now() + delay, *command));
            }
            command => {
                if let Err(e) = self.controller.execute(command) {
                    self.controller.report_error(&e);
                }
            }
        }
        true
    }

    fn run_due_commands(&mut self) -> bool {
        let now = Instant::now();
        let (due, pending): (Vec<_>, Vec<_>) = std::mem::take(&mut self.scheduled)
            .into_iter()
            .partition(|(at, _)| *at <= now);
        self.scheduled = pending;
        due.into_iter().all(|(_, command)| self.submit(command))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::gatt::{ClientHandle, ConnectionId};
    use crate::domain::models::AppEvent;
    use crate::domain::settings::SessionSettings;
    use crate::infrastructure::bluetooth::simulated::{SimulatedPeripheral, TransportCall};
    use std::time::Duration;

    const SHIELD_ADDRESS: &str = "D0:39:72:A4:7B:11";

    fn service() -> (
        GattService<SimulatedPeripheral>,
        mpsc::UnboundedSender<SessionCommand>,
        mpsc::UnboundedReceiver<AppEvent>,
    ) {
        let (transport_tx, transport_rx) = mpsc::unbounded_channel();
        let (app_tx, app_rx) = mpsc::unbounded_channel();
        let controller = SessionController::create(
            SimulatedPeripheral::ble_shield(transport_tx),
            SessionSettings::default(),
            app_tx,
        );
        let (service, commands) = GattService::new(controller, transport_rx);
        (service, commands, app_rx)
    }

    async fn next_matching(
        events: &mut mpsc::UnboundedReceiver<AppEvent>,
        predicate: impl Fn(&AppEvent) -> bool,
    ) -> AppEvent {
        loop {
            let event = events.recv().await.unwrap();
            if predicate(&event) {
                return event;
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_scan_stops_after_timeout() {
        let (service, commands, mut events) = service();
        let handle = tokio::spawn(service.run());
        commands
            .send(SessionCommand::AdapterReady("hci0".into()))
            .unwrap();

        next_matching(&mut events, |e| {
            *e == AppEvent::ScanStateChanged { scanning: true }
        })
        .await;
        let started = Instant::now();
        next_matching(&mut events, |e| {
            *e == AppEvent::ScanStateChanged { scanning: false }
        })
        .await;
        assert!(started.elapsed() >= SessionSettings::default().scan_timeout());

        commands.send(SessionCommand::Shutdown).unwrap();
        let controller = handle.await.unwrap();
        assert!(!controller.is_scanning());
        assert_eq!(
            controller
                .transport()
                .count_calls(|c| *c == TransportCall::Scan(false)),
            1
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_rssi_polled_while_connected() {
        let (service, commands, mut events) = service();
        let handle = tokio::spawn(service.run());
        commands
            .send(SessionCommand::AdapterReady("hci0".into()))
            .unwrap();
        commands
            .send(SessionCommand::Connect(SHIELD_ADDRESS.into()))
            .unwrap();

        for _ in 0..2 {
            let event = next_matching(&mut events, |e| matches!(e, AppEvent::Rssi { .. })).await;
            assert_eq!(
                event,
                AppEvent::Rssi {
                    address: SHIELD_ADDRESS.to_string(),
                    rssi: -58
                }
            );
        }

        commands.send(SessionCommand::Shutdown).unwrap();
        let controller = handle.await.unwrap();
        assert!(
            controller
                .transport()
                .count_calls(|c| matches!(c, TransportCall::ReadRemoteRssi(_)))
                >= 2
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduled_command_runs_after_delay() {
        let (service, commands, mut events) = service();
        let handle = tokio::spawn(service.run());
        commands
            .send(SessionCommand::AdapterReady("hci0".into()))
            .unwrap();
        next_matching(&mut events, |e| matches!(e, AppEvent::DeviceFound(_))).await;

        let requested = Instant::now();
        commands
            .send(SessionCommand::Schedule {
                delay: Duration::from_millis(1_000),
                command: Box::new(SessionCommand::Connect(SHIELD_ADDRESS.into())),
            })
            .unwrap();
        next_matching(&mut events, |e| {
            matches!(
                e,
                AppEvent::ConnectionStatus(crate::domain::models::ConnectionStatus::Connected)
            )
        })
        .await;
        assert!(requested.elapsed() >= Duration::from_millis(1_000));

        drop(commands);
        let controller = handle.await.unwrap();
        assert!(!controller.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduled_shutdown_stops_service() {
        let (service, commands, _events) = service();
        let handle = tokio::spawn(service.run());
        commands
            .send(SessionCommand::Schedule {
                delay: Duration::from_secs(3),
                command: Box::new(SessionCommand::Shutdown),
            })
            .unwrap();

        let started = Instant::now();
        handle.await.unwrap();
        assert!(started.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_tears_session_down() {
        let (service, commands, mut events) = service();
        let handle = tokio::spawn(service.run());
        commands
            .send(SessionCommand::AdapterReady("hci0".into()))
            .unwrap();
        commands
            .send(SessionCommand::Connect(SHIELD_ADDRESS.into()))
            .unwrap();
        next_matching(&mut events, |e| {
            matches!(e, AppEvent::ServiceSearchComplete { .. })
        })
        .await;

        commands.send(SessionCommand::Shutdown).unwrap();
        let controller = handle.await.unwrap();
        let calls = controller.transport().calls();
        assert_eq!(
            &calls[calls.len() - 2..],
            &[
                TransportCall::Disconnect(ConnectionId(7)),
                TransportCall::UnregisterClient(ClientHandle(1)),
            ]
        );
        assert!(controller.state().client().is_none());
    }
}
