//! BLE Connection Module
//!
//! Runs the connect → attribute discovery → subscribe sequence for one
//! session attempt and performs one-shot attribute reads. Every transport
//! call is bounded by a timeout.

use crate::domain::error::{SessionError, TransportError};
use crate::domain::models::PeripheralId;
use crate::domain::settings::SessionConfig;
use crate::infrastructure::bluetooth::protocol;
use crate::infrastructure::bluetooth::transport::{CharacteristicHandle, Transport};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Characteristics of an established session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionLink {
    pub rad_count: CharacteristicHandle,
    /// Not every firmware exposes the battery service.
    pub battery: Option<CharacteristicHandle>,
}

/// Run `fut`, reporting [`TransportError::Timeout`] if it takes longer than `after`.
pub async fn with_timeout<R, F>(
    operation: &'static str,
    after: Duration,
    fut: F,
) -> Result<R, TransportError>
where
    F: Future<Output = Result<R, TransportError>>,
{
    tokio::time::timeout(after, fut)
        .await
        .map_err(|_| TransportError::Timeout { operation, after })?
}

/// Connect to `peripheral` and subscribe to pulse-count notifications.
pub async fn establish<T: Transport + ?Sized>(
    transport: &T,
    peripheral: &PeripheralId,
    config: &SessionConfig,
) -> Result<SessionLink, SessionError> {
    // Step 1: Connect
    info!("Connecting to {}", peripheral);
    with_timeout("connect", config.connect_timeout, transport.connect(peripheral))
        .await
        .map_err(SessionError::Connect)?;
    info!("Connected to {}", peripheral);

    // Step 2: Resolve characteristics
    let services = [
        config.rad_count_service_uuid.clone(),
        config.battery_service_uuid.clone(),
    ];
    let characteristics = [
        config.rad_count_char_uuid.clone(),
        config.battery_char_uuid.clone(),
    ];
    let handles = with_timeout(
        "attribute discovery",
        config.subscribe_timeout,
        transport.discover_attributes(peripheral, &services, &characteristics),
    )
    .await
    .map_err(SessionError::Subscribe)?;
    debug!("Discovered {} characteristics", handles.len());

    let find = |uuid: &str| {
        handles
            .iter()
            .find(|h| protocol::uuid_eq(&h.uuid, uuid))
            .cloned()
    };
    let rad_count = find(&config.rad_count_char_uuid).ok_or_else(|| {
        SessionError::Subscribe(TransportError::Subscribe(
            "Rad_Count characteristic not found".to_string(),
        ))
    })?;
    let battery = find(&config.battery_char_uuid);
    if battery.is_none() {
        warn!("Battery level characteristic not found, battery reads will be unavailable");
    }

    // Step 3: Subscribe to counts
    with_timeout(
        "subscribe",
        config.subscribe_timeout,
        transport.subscribe(&rad_count),
    )
    .await
    .map_err(SessionError::Subscribe)?;
    info!("Subscribed for Rad_Count notifications");

    Ok(SessionLink { rad_count, battery })
}

/// One-shot battery read, decoded as a percentage.
pub async fn read_battery_level<T: Transport + ?Sized>(
    transport: &T,
    characteristic: &CharacteristicHandle,
    timeout: Duration,
) -> anyhow::Result<i32> {
    let bytes = with_timeout("battery read", timeout, transport.read_attribute(characteristic)).await?;
    let percent = protocol::decode_battery_level(&bytes)?;
    debug!("Battery level {}%", percent);
    Ok(percent)
}
