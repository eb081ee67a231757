//! Count Integration
//!
//! Smooths the per-tick pulse counts into counts per minute over a bounded
//! window whose size depends on the integration rate.

use crate::domain::calibration;
use crate::domain::models::{DeviceEvent, SessionState};
use crate::domain::catalog::RAD_COUNT_UPDATE_HZ;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;

/// Longest custom integration period, in seconds.
pub const MAX_CUSTOM_SECONDS: u32 = 3600;

/// How many seconds of counts are averaged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RateRepr", into = "RateRepr")]
pub enum IntegrationRate {
    /// 4 seconds
    Fast,
    /// 22 seconds
    Slow,
    Custom(u32),
}

/// Settings file form of [`IntegrationRate`], checked on the way in.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum RateRepr {
    Fast,
    Slow,
    Custom(u32),
}

impl IntegrationRate {
    /// A custom period of `secs`, between 1 and [`MAX_CUSTOM_SECONDS`].
    pub fn custom(secs: u32) -> Result<Self, String> {
        if (1..=MAX_CUSTOM_SECONDS).contains(&secs) {
            Ok(Self::Custom(secs))
        } else {
            Err(format!(
                "integration period must be 1..={} seconds, got {}",
                MAX_CUSTOM_SECONDS, secs
            ))
        }
    }

    pub fn seconds(&self) -> u32 {
        match self {
            Self::Fast => 4,
            Self::Slow => 22,
            Self::Custom(secs) => *secs,
        }
    }

    /// Window capacity at the given notification rate, at least one sample.
    pub fn capacity(&self, tick_hz: u32) -> usize {
        let secs = self.seconds().clamp(1, MAX_CUSTOM_SECONDS);
        secs.saturating_mul(tick_hz.max(1)) as usize
    }
}

impl TryFrom<RateRepr> for IntegrationRate {
    type Error = String;

    fn try_from(repr: RateRepr) -> Result<Self, Self::Error> {
        match repr {
            RateRepr::Fast => Ok(Self::Fast),
            RateRepr::Slow => Ok(Self::Slow),
            RateRepr::Custom(secs) => Self::custom(secs),
        }
    }
}

impl From<IntegrationRate> for RateRepr {
    fn from(rate: IntegrationRate) -> Self {
        match rate {
            IntegrationRate::Fast => Self::Fast,
            IntegrationRate::Slow => Self::Slow,
            IntegrationRate::Custom(secs) => Self::Custom(secs),
        }
    }
}

impl Default for IntegrationRate {
    fn default() -> Self {
        Self::Fast
    }
}

impl fmt::Display for IntegrationRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fast => f.write_str("fast"),
            Self::Slow => f.write_str("slow"),
            Self::Custom(secs) => write!(f, "{}s", secs),
        }
    }
}

impl FromStr for IntegrationRate {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fast" => Ok(Self::Fast),
            "slow" => Ok(Self::Slow),
            other => {
                let secs = other
                    .trim_end_matches('s')
                    .parse::<u32>()
                    .map_err(|_| format!("unknown integration rate '{}'", s))?;
                Self::custom(secs)
            }
        }
    }
}

/// Most-recent-first buffer of counts, never longer than its capacity.
#[derive(Debug, Clone)]
pub struct RateWindow {
    samples: VecDeque<i32>,
    capacity: usize,
    tick_hz: u32,
}

impl RateWindow {
    pub fn new(rate: IntegrationRate, tick_hz: u32) -> Self {
        let capacity = rate.capacity(tick_hz);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
            tick_hz,
        }
    }

    /// Insert the newest sample, evicting the oldest ones beyond capacity.
    pub fn push(&mut self, count: i32) {
        self.samples.push_front(count);
        self.samples.truncate(self.capacity);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Steady state: the window holds a full integration period.
    pub fn is_full(&self) -> bool {
        self.capacity > 0 && self.samples.len() >= self.capacity
    }

    pub fn samples(&self) -> impl Iterator<Item = i32> + '_ {
        self.samples.iter().copied()
    }

    /// Mean count per tick scaled to a minute. Empty window gives 0.
    pub fn cpm(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let sum: f64 = self.samples.iter().map(|&c| c as f64).sum();
        let mean = sum / self.samples.len() as f64;
        mean * self.tick_hz as f64 * 60.0
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

/// One smoothed reading. Values are unrounded.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateReading {
    pub cpm: f64,
    /// µSv/h, absent when the model has no calibration.
    pub dose_rate: Option<f64>,
    pub buffer_full: bool,
}

/// Consumer of the session's event stream producing CPM and dose readings.
pub struct Ratemeter {
    window: RateWindow,
    rate: IntegrationRate,
    tick_hz: u32,
    state: Option<SessionState>,
}

impl Ratemeter {
    pub fn new(rate: IntegrationRate) -> Self {
        Self::with_tick_hz(rate, RAD_COUNT_UPDATE_HZ)
    }

    pub fn with_tick_hz(rate: IntegrationRate, tick_hz: u32) -> Self {
        Self {
            window: RateWindow::new(rate, tick_hz),
            rate,
            tick_hz,
            state: None,
        }
    }

    pub fn integration_rate(&self) -> IntegrationRate {
        self.rate
    }

    /// Switch rates. Buffered samples are discarded, never reinterpreted.
    pub fn set_integration_rate(&mut self, rate: IntegrationRate) {
        tracing::info!("Integration rate set to {} ({}s)", rate, rate.seconds());
        self.rate = rate;
        self.window = RateWindow::new(rate, self.tick_hz);
    }

    pub fn window(&self) -> &RateWindow {
        &self.window
    }

    pub fn session_state(&self) -> Option<SessionState> {
        self.state
    }

    pub fn handle_event(&mut self, event: &DeviceEvent) {
        match event {
            DeviceEvent::StateChanged(state) => self.state = Some(*state),
            DeviceEvent::CountReceived(count) => self.window.push(*count),
            DeviceEvent::DeviceInfo(_) => {}
        }
    }

    /// Current reading while the session is streaming, `None` otherwise.
    pub fn reading(&self, calibration_factor: Option<f64>) -> Option<RateReading> {
        if self.state != Some(SessionState::Reading) {
            return None;
        }
        let cpm = self.window.cpm();
        Some(RateReading {
            cpm,
            dose_rate: calibration::dose_rate(cpm, calibration_factor),
            buffer_full: self.window.is_full(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_never_exceeds_capacity() {
        for rate in [
            IntegrationRate::Fast,
            IntegrationRate::Slow,
            IntegrationRate::Custom(1),
        ] {
            let mut window = RateWindow::new(rate, 5);
            for i in 0..500 {
                window.push(i);
                assert!(window.len() <= rate.seconds() as usize * 5);
            }
            assert_eq!(window.len(), window.capacity());
            assert!(window.is_full());
        }
    }

    #[test]
    fn test_empty_window_cpm_is_zero() {
        let window = RateWindow::new(IntegrationRate::Fast, 5);
        assert_eq!(window.cpm(), 0.0);
        assert!(!window.is_full());
    }

    #[test]
    fn test_identical_samples_cpm() {
        let mut window = RateWindow::new(IntegrationRate::Fast, 5);
        for _ in 0..7 {
            window.push(3);
        }
        assert_eq!(window.cpm(), 3.0 * 5.0 * 60.0);
    }

    #[test]
    fn test_eviction_is_by_recency() {
        let mut window = RateWindow::new(IntegrationRate::Custom(1), 3);
        for count in [100, 1, 2, 3] {
            window.push(count);
        }
        assert_eq!(window.samples().collect::<Vec<_>>(), vec![3, 2, 1]);
        assert_eq!(window.cpm(), 2.0 * 3.0 * 60.0);
    }

    #[test]
    fn test_rate_change_discards_old_samples() {
        let mut meter = Ratemeter::new(IntegrationRate::Fast);
        meter.handle_event(&DeviceEvent::StateChanged(SessionState::Reading));
        for _ in 0..20 {
            meter.handle_event(&DeviceEvent::CountReceived(50));
        }
        meter.set_integration_rate(IntegrationRate::Slow);
        assert!(meter.window().is_empty());
        assert_eq!(meter.window().capacity(), 110);

        meter.handle_event(&DeviceEvent::CountReceived(1));
        let reading = meter.reading(None).unwrap();
        assert_eq!(reading.cpm, 300.0);
        assert!(!reading.buffer_full);
    }

    #[test]
    fn test_reading_only_while_streaming() {
        let mut meter = Ratemeter::new(IntegrationRate::Fast);
        assert!(meter.reading(Some(163.0)).is_none());
        meter.handle_event(&DeviceEvent::StateChanged(SessionState::Connected));
        assert!(meter.reading(Some(163.0)).is_none());
        meter.handle_event(&DeviceEvent::StateChanged(SessionState::Reading));
        let reading = meter.reading(Some(163.0)).unwrap();
        assert_eq!(reading.cpm, 0.0);
        assert_eq!(reading.dose_rate, Some(0.0));
    }

    #[test]
    fn test_dose_rate_presence() {
        let mut meter = Ratemeter::new(IntegrationRate::Fast);
        meter.handle_event(&DeviceEvent::StateChanged(SessionState::Reading));
        for count in [1, 1, 1, 2, 1, 1] {
            meter.handle_event(&DeviceEvent::CountReceived(count));
        }
        let reading = meter.reading(Some(163.0)).unwrap();
        assert!((reading.cpm - 350.0).abs() < 1e-9);
        assert!((reading.dose_rate.unwrap() - 350.0 / 163.0).abs() < 1e-12);
        assert_eq!(meter.reading(None).unwrap().dose_rate, None);
    }

    #[test]
    fn test_buffer_full_indicator() {
        let mut meter = Ratemeter::new(IntegrationRate::Fast);
        meter.handle_event(&DeviceEvent::StateChanged(SessionState::Reading));
        for _ in 0..19 {
            meter.handle_event(&DeviceEvent::CountReceived(0));
        }
        assert!(!meter.reading(None).unwrap().buffer_full);
        meter.handle_event(&DeviceEvent::CountReceived(0));
        assert!(meter.reading(None).unwrap().buffer_full);
    }

    #[test]
    fn test_parse_integration_rate() {
        assert_eq!("fast".parse::<IntegrationRate>(), Ok(IntegrationRate::Fast));
        assert_eq!("SLOW".parse::<IntegrationRate>(), Ok(IntegrationRate::Slow));
        assert_eq!("10s".parse::<IntegrationRate>(), Ok(IntegrationRate::Custom(10)));
        assert!("0".parse::<IntegrationRate>().is_err());
        assert!("medium".parse::<IntegrationRate>().is_err());
        assert!("1000000000s".parse::<IntegrationRate>().is_err());
        assert_eq!(
            "3600s".parse::<IntegrationRate>(),
            Ok(IntegrationRate::Custom(MAX_CUSTOM_SECONDS))
        );
    }

    #[test]
    fn test_settings_reject_out_of_range_custom_rate() {
        for json in [r#"{"custom": 0}"#, r#"{"custom": 1000000000}"#] {
            assert!(serde_json::from_str::<IntegrationRate>(json).is_err(), "{}", json);
        }
        assert_eq!(
            serde_json::from_str::<IntegrationRate>(r#"{"custom": 10}"#).unwrap(),
            IntegrationRate::Custom(10)
        );
        assert_eq!(
            serde_json::from_str::<IntegrationRate>(r#""slow""#).unwrap(),
            IntegrationRate::Slow
        );
        assert_eq!(
            serde_json::to_string(&IntegrationRate::Custom(10)).unwrap(),
            r#"{"custom":10}"#
        );
    }

    #[test]
    fn test_window_capacity_is_bounded() {
        // Variants built directly still get a usable window.
        assert_eq!(IntegrationRate::Custom(0).capacity(5), 5);
        assert_eq!(
            IntegrationRate::Custom(u32::MAX).capacity(u32::MAX),
            u32::MAX as usize
        );
        assert_eq!(IntegrationRate::Custom(1_000_000_000).capacity(5), 3600 * 5);

        let mut meter = Ratemeter::new(IntegrationRate::Custom(0));
        meter.handle_event(&DeviceEvent::StateChanged(SessionState::Reading));
        for _ in 0..50 {
            meter.handle_event(&DeviceEvent::CountReceived(10));
        }
        let reading = meter.reading(None).unwrap();
        assert_eq!(reading.cpm, 10.0 * 5.0 * 60.0);
        assert!(reading.buffer_full);
    }
}
