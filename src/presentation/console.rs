//! Console rendering of readings and device info.

use crate::domain::models::BatteryLevel;
use crate::domain::ratemeter::RateReading;

/// Round to `precision` decimal places for display.
pub fn round(value: f64, precision: u32) -> f64 {
    let multiplier = 10f64.powi(precision as i32);
    (value * multiplier).round() / multiplier
}

/// `[*] CPM: 326, 2 uSv/hr`. `*` marks a full window, `-` one still filling.
pub fn format_reading(reading: &RateReading, show_dose: bool) -> String {
    let buffer = if reading.buffer_full { "*" } else { "-" };
    let mut line = format!("[{}] CPM: {}", buffer, round(reading.cpm, 1));
    if let (true, Some(dose)) = (show_dose, reading.dose_rate) {
        line.push_str(&format!(", {} uSv/hr", round(dose, 2)));
    }
    line
}

/// Prints battery levels once per distinct value.
#[derive(Debug, Default)]
pub struct BatteryTracker {
    last_percent: Option<i32>,
}

impl BatteryTracker {
    /// Message to show for `level`, if it is new.
    pub fn update(&mut self, level: BatteryLevel) -> Option<String> {
        let BatteryLevel::Percent(percent) = level else {
            return None;
        };
        if percent < 0 || self.last_percent == Some(percent) {
            return None;
        }
        self.last_percent = Some(percent);
        Some(format!("Detector battery: {}%", percent))
    }
}
