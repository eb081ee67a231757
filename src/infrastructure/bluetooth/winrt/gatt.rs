//! GATT access on a connected `BluetoothLEDevice`.

use crate::domain::models::PeripheralId;
use crate::infrastructure::bluetooth::transport::{CharacteristicHandle, TransportEvent};
use crate::infrastructure::bluetooth::winrt::parse_uuid;
use anyhow::Result;
use tokio::sync::mpsc;
use tracing::{info, warn};
use windows::Devices::Bluetooth::GenericAttributeProfile::{
    GattCharacteristic, GattClientCharacteristicConfigurationDescriptorValue,
    GattCommunicationStatus, GattValueChangedEventArgs,
};
use windows::Devices::Bluetooth::{BluetoothCacheMode, BluetoothConnectionStatus, BluetoothLEDevice};
use windows::Foundation::TypedEventHandler;
use windows::Storage::Streams::{DataReader, IBuffer};

/// Open the device and report link loss as [`TransportEvent::Disconnected`].
pub async fn open_device(
    address: u64,
    peripheral: PeripheralId,
    event_sender: mpsc::UnboundedSender<TransportEvent>,
) -> Result<BluetoothLEDevice> {
    info!("Connecting to Bluetooth device: {:#X}", address);
    let device = BluetoothLEDevice::FromBluetoothAddressAsync(address)?.await?;

    let status_handler =
        TypedEventHandler::new(move |dev: windows::core::Ref<BluetoothLEDevice>, _| {
            if let Some(dev) = dev.as_ref() {
                if let Ok(BluetoothConnectionStatus::Disconnected) = dev.ConnectionStatus() {
                    let _ = event_sender.send(TransportEvent::Disconnected(peripheral.clone()));
                }
            }
            Ok(())
        });
    device.ConnectionStatusChanged(&status_handler)?;

    info!("Device opened: {:?}", device.Name()?);
    Ok(device)
}

/// Look up one characteristic; `None` if the service or characteristic is missing.
pub async fn find_characteristic(
    device: &BluetoothLEDevice,
    service_uuid: &str,
    char_uuid: &str,
) -> Result<Option<GattCharacteristic>> {
    let services_result = device
        .GetGattServicesForUuidAsync(parse_uuid(service_uuid)?)?
        .await?;
    if services_result.Status()? != GattCommunicationStatus::Success {
        anyhow::bail!(
            "Failed to get GATT services: {:?}",
            services_result.Status()?
        );
    }

    let services = services_result.Services()?;
    if services.Size()? == 0 {
        warn!("Service {} not found", service_uuid);
        return Ok(None);
    }
    let service = services.GetAt(0)?;

    let chars_result = service
        .GetCharacteristicsForUuidAsync(parse_uuid(char_uuid)?)?
        .await?;
    if chars_result.Status()? != GattCommunicationStatus::Success {
        anyhow::bail!("Failed to get characteristics for {}", service_uuid);
    }

    let characteristics = chars_result.Characteristics()?;
    if characteristics.Size()? == 0 {
        return Ok(None);
    }
    Ok(Some(characteristics.GetAt(0)?))
}

/// Route value changes to the transport channel and enable notifications.
pub async fn enable_notifications(
    characteristic: &GattCharacteristic,
    handle: CharacteristicHandle,
    event_sender: mpsc::UnboundedSender<TransportEvent>,
) -> Result<()> {
    let data_handler = TypedEventHandler::new(
        move |_: windows::core::Ref<GattCharacteristic>,
              args: windows::core::Ref<GattValueChangedEventArgs>| {
            if let Some(args) = args.as_ref() {
                if let Ok(value) = args.CharacteristicValue() {
                    if let Ok(data) = buffer_bytes(&value) {
                        let _ = event_sender.send(TransportEvent::Notification {
                            characteristic: handle.clone(),
                            data,
                        });
                    }
                }
            }
            Ok(())
        },
    );
    characteristic.ValueChanged(&data_handler)?;

    info!("Enabling notifications...");
    let status = characteristic
        .WriteClientCharacteristicConfigurationDescriptorAsync(
            GattClientCharacteristicConfigurationDescriptorValue::Notify,
        )?
        .await?;
    if status != GattCommunicationStatus::Success {
        anyhow::bail!("Notification subscription returned status: {:?}", status);
    }
    info!("Notifications enabled successfully");
    Ok(())
}

/// Uncached read of the characteristic value.
pub async fn read_value(characteristic: &GattCharacteristic) -> Result<Vec<u8>> {
    let result = characteristic
        .ReadValueWithCacheModeAsync(BluetoothCacheMode::Uncached)?
        .await?;
    if result.Status()? != GattCommunicationStatus::Success {
        anyhow::bail!("Read returned status: {:?}", result.Status()?);
    }
    buffer_bytes(&result.Value()?)
}

fn buffer_bytes(buffer: &IBuffer) -> Result<Vec<u8>> {
    let reader = DataReader::FromBuffer(buffer)?;
    let length = reader.UnconsumedBufferLength()? as usize;
    let mut bytes = vec![0u8; length];
    reader.ReadBytes(&mut bytes)?;
    Ok(bytes)
}
