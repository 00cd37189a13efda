use crate::infrastructure::bluetooth::protocol::{self, UartProfile};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

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
    #[serde(default = "default_false")]
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
            show_file_line: default_false(),
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
    "microbit_uart_controller".to_string()
}
fn default_rotation() -> String {
    "daily".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub log_settings: LogSettings,

    // BLE
    #[serde(default = "default_service_uuid")]
    pub ble_service_uuid: String,
    #[serde(default = "default_write_uuid")]
    pub ble_write_char_uuid: String,
    #[serde(default = "default_notify_uuid")]
    pub ble_notify_char_uuid: String,
    #[serde(default = "default_name_prefix")]
    pub device_name_prefix: Option<String>,
    /// Offer every peripheral and rely on the post-connect service lookup.
    #[serde(default = "default_false")]
    pub accept_any_device: bool,
    #[serde(default = "default_scan_window_ms")]
    pub scan_window_ms: u64,

    // UI
    #[serde(default = "default_quick_commands")]
    pub quick_commands: Vec<String>,
    #[serde(default = "default_log_capacity")]
    pub log_capacity: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_settings: LogSettings::default(),
            ble_service_uuid: default_service_uuid(),
            ble_write_char_uuid: default_write_uuid(),
            ble_notify_char_uuid: default_notify_uuid(),
            device_name_prefix: default_name_prefix(),
            accept_any_device: false,
            scan_window_ms: default_scan_window_ms(),
            quick_commands: default_quick_commands(),
            log_capacity: default_log_capacity(),
        }
    }
}

impl Settings {
    /// Parse the configured UUID strings.
    pub fn uart_profile(&self) -> anyhow::Result<UartProfile> {
        UartProfile::parse(
            &self.ble_service_uuid,
            &self.ble_write_char_uuid,
            &self.ble_notify_char_uuid,
        )
    }
}

fn default_service_uuid() -> String {
    protocol::UART_SERVICE_UUID.to_string()
}
fn default_write_uuid() -> String {
    protocol::UART_WRITE_CHAR_UUID.to_string()
}
fn default_notify_uuid() -> String {
    protocol::UART_NOTIFY_CHAR_UUID.to_string()
}
fn default_name_prefix() -> Option<String> {
    Some(protocol::DEFAULT_NAME_PREFIX.to_string())
}
fn default_scan_window_ms() -> u64 {
    5000
}
fn default_quick_commands() -> Vec<String> {
    protocol::REFERENCE_COMMANDS
        .iter()
        .map(|c| c.to_string())
        .collect()
}
fn default_log_capacity() -> usize {
    500
}

/// Read-only access to the settings file.
pub struct SettingsService {
    settings: Settings,
    settings_path: Option<PathBuf>,
}

impl SettingsService {
    /// Load settings from the user config directory, falling back to defaults.
    ///
    /// Runs before logging is set up, so a file that could not be used is
    /// returned alongside the defaults for the caller to report.
    pub fn load() -> (Self, Option<anyhow::Error>) {
        Self::load_from(Self::get_settings_path())
    }

    fn load_from(settings_path: Option<PathBuf>) -> (Self, Option<anyhow::Error>) {
        let (settings, error) = match &settings_path {
            Some(path) if path.exists() => match Self::load_from_file(path) {
                Ok(settings) => {
                    info!("Loaded settings from {}", path.display());
                    (settings, None)
                }
                Err(e) => (
                    Settings::default(),
                    Some(e.context(format!("Ignoring invalid settings file {}", path.display()))),
                ),
            },
            _ => (Settings::default(), None),
        };

        let service = Self {
            settings,
            settings_path,
        };
        (service, error)
    }

    fn get_settings_path() -> Option<PathBuf> {
        let mut path = dirs::config_dir()?;
        path.push("MicrobitUartController");
        path.push("settings.json");
        Some(path)
    }

    fn load_from_file(path: &Path) -> anyhow::Result<Settings> {
        let contents = fs::read_to_string(path)?;
        let settings = serde_json::from_str(&contents)?;
        Ok(settings)
    }

    pub fn get(&self) -> &Settings {
        &self.settings
    }

    pub fn path(&self) -> Option<&Path> {
        self.settings_path.as_deref()
    }
}
