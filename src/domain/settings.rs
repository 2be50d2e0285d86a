use crate::domain::gatt::{AuthReq, WriteType};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSettings {
    #[serde(default = "default_level")]
    pub level: String, // "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_false")]
    pub file_logging_enabled: bool,
    #[serde(default = "default_true")]
    pub console_logging_enabled: bool,
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    #[serde(default = "default_prefix")]
    pub file_name_prefix: String,
    #[serde(default = "default_true")]
    pub show_file_line: bool,
    #[serde(default = "default_false")]
    pub show_thread_ids: bool,
    #[serde(default = "default_true")]
    pub show_target: bool,
    #[serde(default = "default_true")]
    pub ansi_colors: bool,
    #[serde(default = "default_rotation")]
    pub rotation: String, // "daily", "hourly", "minutely", "never"
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_level(),
            file_logging_enabled: default_false(),
            console_logging_enabled: default_true(),
            log_dir: default_log_dir(),
            file_name_prefix: default_prefix(),
            show_file_line: default_true(),
            show_thread_ids: default_false(),
            show_target: default_true(),
            ansi_colors: default_true(),
            rotation: default_rotation(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}
fn default_true() -> bool {
    true
}
fn default_false() -> bool {
    false
}
fn default_log_dir() -> String {
    "logs".to_string()
}
fn default_prefix() -> String {
    "gatt_session".to_string()
}
fn default_rotation() -> String {
    "daily".to_string()
}

/// Knobs of the session controller itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSettings {
    /// UUID the GATT client is registered under.
    #[serde(default = "Uuid::nil")]
    pub app_uuid: Uuid,
    #[serde(default = "default_scan_timeout_ms")]
    pub scan_timeout_ms: u64,
    #[serde(default = "default_rssi_poll_interval_ms")]
    pub rssi_poll_interval_ms: u64,
    #[serde(default)]
    pub auth_req: AuthReq,
    #[serde(default)]
    pub write_type: WriteType,
    /// Flag passed to execute-write once a write completes.
    #[serde(default)]
    pub execute_write_flag: i32,
    #[serde(default = "default_true")]
    pub auto_connect: bool,
}

impl SessionSettings {
    pub fn scan_timeout(&self) -> Duration {
        Duration::from_millis(self.scan_timeout_ms)
    }

    pub fn rssi_poll_interval(&self) -> Duration {
        Duration::from_millis(self.rssi_poll_interval_ms)
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            app_uuid: Uuid::nil(),
            scan_timeout_ms: default_scan_timeout_ms(),
            rssi_poll_interval_ms: default_rssi_poll_interval_ms(),
            auth_req: AuthReq::default(),
            write_type: WriteType::default(),
            execute_write_flag: 0,
            auto_connect: default_true(),
        }
    }
}

fn default_scan_timeout_ms() -> u64 {
    10_000
}
fn default_rssi_poll_interval_ms() -> u64 {
    5_000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeederSettings {
    /// Analog reading above which the cat counts as rubbing the sensor.
    #[serde(default = "default_rub_threshold")]
    pub rub_threshold: u16,
    /// Time the feeder flap stays open.
    #[serde(default = "default_feed_delay_ms")]
    pub feed_delay_ms: u64,
}

impl Default for FeederSettings {
    fn default() -> Self {
        Self {
            rub_threshold: default_rub_threshold(),
            feed_delay_ms: default_feed_delay_ms(),
        }
    }
}

fn default_rub_threshold() -> u16 {
    200
}
fn default_feed_delay_ms() -> u64 {
    1_000
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub log_settings: LogSettings,
    #[serde(default)]
    pub session: SessionSettings,
    #[serde(default)]
    pub feeder: FeederSettings,
    #[serde(default)]
    pub known_addresses: Vec<String>,
    #[serde(default)]
    pub last_connected_address: Option<String>,
}

pub struct SettingsService {
    settings: Settings,
    settings_path: PathBuf,
}

impl SettingsService {
    pub fn new() -> anyhow::Result<Self> {
        let settings_path = Self::get_settings_path()?;
        Ok(Self::with_path(settings_path))
    }

    /// Load from an explicit file, falling back to defaults when it is
    /// missing or unreadable.
    pub fn with_path(settings_path: PathBuf) -> Self {
        let settings = Self::load_from_file(&settings_path).unwrap_or_default();
        Self {
            settings,
            settings_path,
        }
    }

    fn get_settings_path() -> anyhow::Result<PathBuf> {
        let mut path = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        path.push("GattSession");
        fs::create_dir_all(&path)?;
        path.push("settings.json");
        Ok(path)
    }

    fn load_from_file(path: &Path) -> anyhow::Result<Settings> {
        let contents = fs::read_to_string(path)?;
        let settings = serde_json::from_str(&contents)?;
        Ok(settings)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(&self.settings)?;
        fs::write(&self.settings_path, json)?;
        Ok(())
    }

    pub fn get(&self) -> &Settings {
        &self.settings
    }

    pub fn get_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    pub fn remember_address(&mut self, address: &str) -> anyhow::Result<()> {
        if !self.settings.known_addresses.iter().any(|a| a == address) {
            self.settings.known_addresses.push(address.to_string());
        }
        self.settings.last_connected_address = Some(address.to_string());
        self.save()
    }
}
