use gatt_session::domain::feeder::{CatFeeder, FeederBackend};
use gatt_session::domain::models::{
    AppEvent, ConnectionStatus, MessageSeverity, SessionCommand, SessionObserver,
};
use gatt_session::domain::settings::{Settings, SettingsService};
use gatt_session::infrastructure::bluetooth::simulated::SimulatedPeripheral;
use gatt_session::infrastructure::bluetooth::{GattService, SessionController};
use gatt_session::infrastructure::logging;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

const DEMO_TIMEOUT: Duration = Duration::from_secs(30);
const SHIELD_NAME: &str = "BLE Shield";

/// Stands in for the remote feeding service: every rub is feeding time.
#[derive(Default)]
struct LoggingBackend {
    fed: bool,
}

impl FeederBackend for LoggingBackend {
    fn rub(&mut self) -> bool {
        info!("Backend: cat is rubbing");
        true
    }

    fn leave(&mut self) {
        debug!("Backend: cat left");
    }

    fn fed(&mut self) {
        info!("Backend: feeding cycle reported");
        self.fed = true;
    }
}

fn main() -> anyhow::Result<()> {
    let mut settings_service = SettingsService::new()?;

    let _logging_guard = logging::init_logger(&settings_service.get().log_settings)
        .map_err(|e| eprintln!("Failed to initialize logging: {}", e))
        .ok();

    info!("Starting GATT session demo");

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let connected_to = runtime.block_on(run_demo(settings_service.get().clone()))?;

    if let Some(address) = connected_to {
        settings_service.remember_address(&address)?;
        info!("Remembered {}", address);
    }
    Ok(())
}

/// Connect to the simulated shield, run one feeding cycle and disconnect.
/// Returns the address the session connected to.
async fn run_demo(settings: Settings) -> anyhow::Result<Option<String>> {
    let (transport_tx, transport_rx) = mpsc::unbounded_channel();
    let (event_tx, mut event_rx) = mpsc::unbounded_channel();

    let controller = SessionController::create(
        SimulatedPeripheral::ble_shield(transport_tx),
        settings.session.clone(),
        event_tx,
    );
    let (service, commands) = GattService::new(controller, transport_rx);
    let session = tokio::spawn(service.run());

    let mut feeder = CatFeeder::new(LoggingBackend::default(), settings.feeder.clone());
    let mut candidate: Option<String> = None;
    let mut connected_to: Option<String> = None;
    let mut feeding = false;
    let mut disconnecting = false;

    commands.send(SessionCommand::AdapterReady("hci0".to_string()))?;

    let drive = async {
        while let Some(event) = event_rx.recv().await {
            match &event {
                AppEvent::DeviceFound(device) if candidate.is_none() && device.name == SHIELD_NAME => {
                    candidate = Some(device.address.clone());
                    commands.send(SessionCommand::Connect(device.address.clone()))?;
                }
                AppEvent::ConnectionStatus(ConnectionStatus::Connected) => {
                    connected_to = candidate.clone();
                }
                AppEvent::ConnectionStatus(ConnectionStatus::Disconnected) if disconnecting => {
                    break;
                }
                AppEvent::LogMessage(message) if message.severity == MessageSeverity::Error => {
                    warn!("Session: {}", message.message);
                }
                _ => {}
            }

            for command in feeder.on_event(&event) {
                commands.send(command)?;
            }

            if !feeding && feeder.shield().is_ready() {
                feeding = true;
                for command in feeder.on_remote_message("feed") {
                    commands.send(command)?;
                }
            }

            if !disconnecting && feeder.backend().fed {
                disconnecting = true;
                commands.send(SessionCommand::Disconnect)?;
            }
        }
        anyhow::Ok(())
    };

    tokio::time::timeout(DEMO_TIMEOUT, drive)
        .await
        .map_err(|_| anyhow::anyhow!("demo did not finish within {:?}", DEMO_TIMEOUT))??;

    // The service may already be gone if every sender dropped
    let _ = commands.send(SessionCommand::Shutdown);
    session.await?;

    info!("GATT session demo finished");
    Ok(connected_to)
}
