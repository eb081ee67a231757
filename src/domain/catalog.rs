//! CT007 service catalog.

/// Rad_Count service UUID
pub const RAD_COUNT_SERVICE_UUID: &str = "f100ffd0-0451-4100-b100-000000000000";

/// Rad_Count characteristic UUID - pulse count notifications
pub const RAD_COUNT_CHAR_UUID: &str = "f100ffd1-0451-4100-b100-000000000000";

/// Standard Battery Service UUID
pub const BATTERY_SERVICE_UUID: &str = "0000180f-0000-1000-8000-00805f9b34fb";

/// Standard Battery Level characteristic UUID
pub const BATTERY_LEVEL_CHAR_UUID: &str = "00002a19-0000-1000-8000-00805f9b34fb";

/// Rad_Count notifications per second
pub const RAD_COUNT_UPDATE_HZ: u32 = 5;
