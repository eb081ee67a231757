use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of the one detector session a controller owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// Waiting for the radio to become available.
    Waiting,
    Scanning,
    /// A peripheral was selected; connect and subscribe are in progress.
    Connected,
    /// Subscribed, counts are flowing.
    Reading,
    Disconnected,
    /// Setup failed for the current attempt (subscribe or discovery).
    Error,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Waiting => "waiting",
            Self::Scanning => "scanning",
            Self::Connected => "connected",
            Self::Reading => "reading",
            Self::Disconnected => "disconnected",
            Self::Error => "error",
        };
        f.write_str(name)
    }
}

/// Address and advertised name of the selected peripheral.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    /// Lowercase hex, separators stripped.
    pub address: String,
    pub name: String,
}

impl DeviceIdentity {
    pub fn new(address: &str, name: &str) -> Self {
        Self {
            address: normalize_address(address),
            name: name.to_string(),
        }
    }
}

/// Canonical form of a link-layer address: lowercase hex digits only.
pub fn normalize_address(address: &str) -> String {
    address
        .chars()
        .filter(|c| !matches!(c, ':' | '-' | '.' | ' '))
        .collect::<String>()
        .to_ascii_lowercase()
}

/// Opaque transport handle for a peripheral.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeripheralId(pub String);

impl fmt::Display for PeripheralId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A peripheral reported by discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredPeripheral {
    pub id: PeripheralId,
    pub address: String,
    pub local_name: Option<String>,
}

/// Detector model resolved from the advertised name. Both designations stay
/// `None` until a name matches `<prefix>-<letter>-<digits>`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceModel {
    pub full: Option<String>,
    pub short: Option<String>,
}

impl DeviceModel {
    pub fn is_resolved(&self) -> bool {
        self.short.is_some()
    }
}

/// Battery level answer for a single request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatteryLevel {
    Percent(i32),
    Unavailable,
}

impl BatteryLevel {
    /// Wire-compatible value: `-1` marks an unavailable reading.
    pub fn as_percent(&self) -> i32 {
        match self {
            Self::Percent(p) => *p,
            Self::Unavailable => -1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceInfo {
    pub battery: BatteryLevel,
}

impl DeviceInfo {
    pub fn unavailable() -> Self {
        Self {
            battery: BatteryLevel::Unavailable,
        }
    }
}

/// Events published by the session controller.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceEvent {
    StateChanged(SessionState),
    CountReceived(i32),
    DeviceInfo(DeviceInfo),
}
