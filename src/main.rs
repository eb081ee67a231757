use ct007_ratemeter::domain::settings::SettingsService;
use ct007_ratemeter::infrastructure::logging;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings_service = SettingsService::new()?;

    let _logging_guard = logging::init_logger(&settings_service.get().log_settings)
        .map_err(|e| eprintln!("Failed to initialize logging: {}", e))
        .ok();

    tracing::info!("Starting CT007 ratemeter");
    tracing::debug!("Settings file: {}", settings_service.path().display());

    run(settings_service).await
}

#[cfg(windows)]
async fn run(settings_service: SettingsService) -> anyhow::Result<()> {
    use ct007_ratemeter::infrastructure::bluetooth::winrt::WinRtTransport;
    use ct007_ratemeter::infrastructure::bluetooth::SessionController;
    use ct007_ratemeter::presentation::app::RatemeterApp;

    let (transport, transport_rx) = WinRtTransport::new();
    let (session, controller) = SessionController::spawn(
        transport.clone(),
        transport_rx,
        settings_service.session_config(),
    );

    let app = RatemeterApp::new(session, settings_service.get());
    transport.probe_radio().await;
    app.run().await?;

    controller.await?;
    Ok(())
}

#[cfg(not(windows))]
async fn run(_settings_service: SettingsService) -> anyhow::Result<()> {
    anyhow::bail!("No BLE transport is available on this platform")
}
