use crate::domain::models::{DeviceEvent, SessionState};
use crate::domain::ratemeter::Ratemeter;
use crate::domain::settings::Settings;
use crate::infrastructure::bluetooth::SessionHandle;
use crate::infrastructure::event_bus::Subscription;
use crate::presentation::console::{self, BatteryTracker};
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{info, warn};

/// Console rate meter driven by a running session.
pub struct RatemeterApp {
    session: SessionHandle,
    events: Subscription<DeviceEvent>,
    ratemeter: Ratemeter,
    battery: BatteryTracker,
    compute_dose: bool,
    display_interval: Duration,
    battery_interval: Duration,
}

impl RatemeterApp {
    pub fn new(session: SessionHandle, settings: &Settings) -> Self {
        let events = session.subscribe();
        Self {
            session,
            events,
            ratemeter: Ratemeter::new(settings.integration_rate),
            battery: BatteryTracker::default(),
            compute_dose: settings.compute_dose_rate,
            display_interval: Duration::from_millis(settings.display_interval_ms.max(1)),
            battery_interval: Duration::from_secs(settings.battery_poll_interval_secs.max(1)),
        }
    }

    pub fn ratemeter(&self) -> &Ratemeter {
        &self.ratemeter
    }

    pub fn set_compute_dose_rate(&mut self, enabled: bool) {
        self.compute_dose = enabled;
    }

    /// Apply one session event. Returns a line to print, if any.
    pub fn handle_event(&mut self, event: DeviceEvent) -> Option<String> {
        self.ratemeter.handle_event(&event);
        match event {
            DeviceEvent::StateChanged(state) => {
                if state == SessionState::Reading {
                    self.session.request_battery_level();
                }
                Some(format!("Detector state: {}", state))
            }
            DeviceEvent::CountReceived(_) => None,
            DeviceEvent::DeviceInfo(info) => self.battery.update(info.battery),
        }
    }

    /// Line for the current reading, if the session is streaming.
    pub fn render(&self) -> Option<String> {
        let reading = self.ratemeter.reading(self.session.calibration_factor())?;
        Some(console::format_reading(&reading, self.compute_dose))
    }

    /// Print readings until Ctrl-C or the session ends.
    pub async fn run(mut self) -> anyhow::Result<()> {
        self.session.initialize()?;

        let start = Instant::now();
        let mut display = interval_at(start + self.display_interval, self.display_interval);
        display.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut battery = interval_at(start + self.battery_interval, self.battery_interval);
        battery.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                event = self.events.recv() => match event {
                    Some(event) => {
                        if let Some(line) = self.handle_event(event) {
                            println!("{}", line);
                        }
                    }
                    None => {
                        warn!("Session event stream ended");
                        break;
                    }
                },
                _ = display.tick() => {
                    if let Some(line) = self.render() {
                        println!("{}", line);
                    }
                }
                _ = battery.tick() => self.session.request_battery_level(),
                _ = tokio::signal::ctrl_c() => {
                    info!("Interrupted, shutting down");
                    break;
                }
            }
        }

        // Already stopped is fine here.
        let _ = self.session.shutdown();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{BatteryLevel, DeviceInfo};
    use crate::domain::settings::SessionConfig;
    use crate::infrastructure::bluetooth::mock::MockTransport;
    use crate::infrastructure::bluetooth::transport::TransportEvent;
    use crate::infrastructure::bluetooth::SessionController;

    async fn next(app: &mut RatemeterApp) -> DeviceEvent {
        tokio::time::timeout(Duration::from_secs(2), app.events.recv())
            .await
            .expect("timed out waiting for event")
            .expect("event bus closed")
    }

    #[tokio::test]
    async fn test_streaming_session_renders_readings() {
        let (mock, rx) = MockTransport::new();
        let (handle, _task) = SessionController::spawn(mock.clone(), rx, SessionConfig::default());
        let mut app = RatemeterApp::new(handle.clone(), &Settings::default());

        mock.emit(TransportEvent::RadioReady);
        handle.initialize().unwrap();
        mock.advertise("AA:BB:CC:DD:EE:FF", Some("CT-F-54"));

        let mut lines = Vec::new();
        while app.ratemeter().session_state() != Some(SessionState::Reading) {
            let event = next(&mut app).await;
            lines.extend(app.handle_event(event));
        }
        assert_eq!(
            lines,
            vec![
                "Detector state: scanning",
                "Detector state: connected",
                "Detector state: reading",
            ]
        );

        // Entering reading asked for the battery level.
        let event = next(&mut app).await;
        assert_eq!(
            event,
            DeviceEvent::DeviceInfo(DeviceInfo {
                battery: BatteryLevel::Percent(85)
            })
        );
        assert_eq!(
            app.handle_event(event).as_deref(),
            Some("Detector battery: 85%")
        );

        for _ in 0..2 {
            mock.notify("AA:BB:CC:DD:EE:FF", &[1, 0, 0, 0]);
            let event = next(&mut app).await;
            app.handle_event(event);
        }
        // 1 count per tick at 5 Hz is 300 CPM, 300 / 163 uSv/hr for an F model.
        assert_eq!(app.render().as_deref(), Some("[-] CPM: 300, 1.84 uSv/hr"));

        app.set_compute_dose_rate(false);
        assert_eq!(app.render().as_deref(), Some("[-] CPM: 300"));
    }

    #[tokio::test]
    async fn test_nothing_rendered_before_reading() {
        let (mock, rx) = MockTransport::new();
        let (handle, _task) = SessionController::spawn(mock, rx, SessionConfig::default());
        let app = RatemeterApp::new(handle, &Settings::default());
        assert_eq!(app.render(), None);
    }
}
