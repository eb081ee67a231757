use crate::domain::ratemeter::IntegrationRate;
use crate::domain::selection::SelectionCriteria;
use crate::domain::catalog;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSettings {
    #[serde(default = "default_level")]
    pub level: String, // "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_true")]
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
            file_logging_enabled: default_true(),
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
    "ct007_ratemeter".to_string()
}
fn default_rotation() -> String {
    "daily".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    // Detector selection
    #[serde(default)]
    pub target_name: Option<String>,
    #[serde(default)]
    pub target_address: Option<String>,
    /// Rescan after the detector goes away
    #[serde(default = "default_true")]
    pub scan_forever: bool,

    // Ratemeter
    #[serde(default)]
    pub integration_rate: IntegrationRate,
    #[serde(default = "default_true")]
    pub compute_dose_rate: bool,
    #[serde(default = "default_display_interval_ms")]
    pub display_interval_ms: u64,
    #[serde(default = "default_battery_poll_interval_secs")]
    pub battery_poll_interval_secs: u64,

    // Logging Settings
    #[serde(default)]
    pub log_settings: LogSettings,

    // Advanced BLE Settings
    #[serde(default = "default_rad_count_service_uuid")]
    pub ble_rad_count_service_uuid: String,
    #[serde(default = "default_rad_count_char_uuid")]
    pub ble_rad_count_char_uuid: String,
    #[serde(default = "default_battery_service_uuid")]
    pub ble_battery_service_uuid: String,
    #[serde(default = "default_battery_char_uuid")]
    pub ble_battery_char_uuid: String,

    // Timeouts
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_subscribe_timeout_ms")]
    pub subscribe_timeout_ms: u64,
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            target_name: None,
            target_address: None,
            scan_forever: true,
            integration_rate: IntegrationRate::default(),
            compute_dose_rate: true,
            display_interval_ms: default_display_interval_ms(),
            battery_poll_interval_secs: default_battery_poll_interval_secs(),
            log_settings: LogSettings::default(),

            ble_rad_count_service_uuid: default_rad_count_service_uuid(),
            ble_rad_count_char_uuid: default_rad_count_char_uuid(),
            ble_battery_service_uuid: default_battery_service_uuid(),
            ble_battery_char_uuid: default_battery_char_uuid(),

            connect_timeout_ms: default_connect_timeout_ms(),
            subscribe_timeout_ms: default_subscribe_timeout_ms(),
            read_timeout_ms: default_read_timeout_ms(),
        }
    }
}

fn default_display_interval_ms() -> u64 {
    1000
}
fn default_battery_poll_interval_secs() -> u64 {
    10
}
fn default_rad_count_service_uuid() -> String {
    catalog::RAD_COUNT_SERVICE_UUID.to_string()
}
fn default_rad_count_char_uuid() -> String {
    catalog::RAD_COUNT_CHAR_UUID.to_string()
}
fn default_battery_service_uuid() -> String {
    catalog::BATTERY_SERVICE_UUID.to_string()
}
fn default_battery_char_uuid() -> String {
    catalog::BATTERY_LEVEL_CHAR_UUID.to_string()
}
fn default_connect_timeout_ms() -> u64 {
    15_000
}
fn default_subscribe_timeout_ms() -> u64 {
    10_000
}
fn default_read_timeout_ms() -> u64 {
    10_000
}

/// Everything the session controller needs, detached from the settings file.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub selection: SelectionCriteria,
    pub scan_forever: bool,
    pub rad_count_service_uuid: String,
    pub rad_count_char_uuid: String,
    pub battery_service_uuid: String,
    pub battery_char_uuid: String,
    pub connect_timeout: Duration,
    pub subscribe_timeout: Duration,
    pub read_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::from(&Settings::default())
    }
}

impl From<&Settings> for SessionConfig {
    fn from(s: &Settings) -> Self {
        Self {
            selection: SelectionCriteria::new(s.target_name.as_deref(), s.target_address.as_deref()),
            scan_forever: s.scan_forever,
            rad_count_service_uuid: s.ble_rad_count_service_uuid.clone(),
            rad_count_char_uuid: s.ble_rad_count_char_uuid.clone(),
            battery_service_uuid: s.ble_battery_service_uuid.clone(),
            battery_char_uuid: s.ble_battery_char_uuid.clone(),
            connect_timeout: Duration::from_millis(s.connect_timeout_ms),
            subscribe_timeout: Duration::from_millis(s.subscribe_timeout_ms),
            read_timeout: Duration::from_millis(s.read_timeout_ms),
        }
    }
}

pub struct SettingsService {
    settings: Settings,
    settings_path: PathBuf,
}

impl SettingsService {
    pub fn new() -> anyhow::Result<Self> {
        let settings_path = Self::get_settings_path()?;
        Ok(Self::load(settings_path))
    }

    /// Load from `path`, falling back to defaults when missing or unreadable.
    pub fn load(settings_path: PathBuf) -> Self {
        let settings = match Self::load_from_file(&settings_path) {
            Ok(settings) => settings,
            Err(e) if settings_path.exists() => {
                tracing::warn!(
                    "Ignoring invalid settings file {}: {}",
                    settings_path.display(),
                    e
                );
                Settings::default()
            }
            Err(e) => {
                tracing::debug!(
                    "Using default settings ({}): {}",
                    settings_path.display(),
                    e
                );
                Settings::default()
            }
        };

        Self {
            settings,
            settings_path,
        }
    }

    fn get_settings_path() -> anyhow::Result<PathBuf> {
        let mut path = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        path.push("CT007Ratemeter");
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

    pub fn path(&self) -> &Path {
        &self.settings_path
    }

    pub fn get(&self) -> &Settings {
        &self.settings
    }

    pub fn get_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig::from(&self.settings)
    }
}
