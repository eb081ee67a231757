//! Windows Runtime transport backend.

mod gatt;
mod scanner;

use crate::domain::error::TransportError;
use crate::domain::models::PeripheralId;
use crate::infrastructure::bluetooth::protocol;
use crate::infrastructure::bluetooth::transport::{
    CharacteristicHandle, Transport, TransportEvent,
};
use anyhow::Result;
use async_trait::async_trait;
use scanner::BleScanner;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::{info, warn};
use windows::core::GUID;
use windows::Devices::Bluetooth::GenericAttributeProfile::GattCharacteristic;
use windows::Devices::Bluetooth::BluetoothLEDevice;
use windows::Devices::Radios::{Radio, RadioKind, RadioState};
use windows::Foundation::TypedEventHandler;

#[derive(Default)]
struct Inner {
    // Keeps the state handler registered.
    #[allow(dead_code)]
    radio: Option<Radio>,
    devices: HashMap<PeripheralId, BluetoothLEDevice>,
    characteristics: HashMap<(PeripheralId, String), GattCharacteristic>,
}

pub struct WinRtTransport {
    scanner: Mutex<BleScanner>,
    inner: Mutex<Inner>,
    event_sender: mpsc::UnboundedSender<TransportEvent>,
}

impl WinRtTransport {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<TransportEvent>) {
        let (event_sender, rx) = mpsc::unbounded_channel();
        let transport = Arc::new(Self {
            scanner: Mutex::new(BleScanner::new(event_sender.clone())),
            inner: Mutex::new(Inner::default()),
            event_sender,
        });
        (transport, rx)
    }

    /// Report the Bluetooth radio state now and on every change.
    pub async fn probe_radio(&self) {
        match self.find_bluetooth_radio().await {
            Ok(Some(radio)) => {
                let sender = self.event_sender.clone();
                let handler = TypedEventHandler::new(move |r: windows::core::Ref<Radio>, _| {
                    if let Some(r) = r.as_ref() {
                        let _ = sender.send(radio_event(r.State()?));
                    }
                    Ok(())
                });
                if let Err(e) = radio.StateChanged(&handler) {
                    warn!("Could not watch radio state: {}", e);
                }
                let event = radio
                    .State()
                    .map(radio_event)
                    .unwrap_or(TransportEvent::RadioUnavailable);
                self.lock_inner().radio = Some(radio);
                let _ = self.event_sender.send(event);
            }
            Ok(None) => {
                warn!("No Bluetooth radio found");
                let _ = self.event_sender.send(TransportEvent::RadioUnavailable);
            }
            Err(e) => {
                warn!("Radio query failed: {}", e);
                let _ = self.event_sender.send(TransportEvent::RadioUnavailable);
            }
        }
    }

    async fn find_bluetooth_radio(&self) -> Result<Option<Radio>> {
        let radios = Radio::GetRadiosAsync()?.await?;
        for i in 0..radios.Size()? {
            let radio = radios.GetAt(i)?;
            if radio.Kind()? == RadioKind::Bluetooth {
                return Ok(Some(radio));
            }
        }
        Ok(None)
    }

    fn lock_inner(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn device(&self, peripheral: &PeripheralId) -> Result<BluetoothLEDevice, TransportError> {
        self.lock_inner()
            .devices
            .get(peripheral)
            .cloned()
            .ok_or(TransportError::NotConnected)
    }

    fn characteristic(
        &self,
        handle: &CharacteristicHandle,
    ) -> Result<GattCharacteristic, TransportError> {
        self.lock_inner()
            .characteristics
            .get(&(handle.peripheral.clone(), protocol::normalize_uuid(&handle.uuid)))
            .cloned()
            .ok_or(TransportError::NotConnected)
    }
}

fn radio_event(state: RadioState) -> TransportEvent {
    if state == RadioState::On {
        TransportEvent::RadioReady
    } else {
        TransportEvent::RadioUnavailable
    }
}

#[async_trait]
impl Transport for WinRtTransport {
    async fn start_discovery(&self, service_filter: &[String]) -> Result<(), TransportError> {
        self.scanner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .start(service_filter)
            .map_err(|e| TransportError::Discovery(e.to_string()))
    }

    async fn stop_discovery(&self) -> Result<(), TransportError> {
        self.scanner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .stop()
            .map_err(|e| TransportError::Discovery(e.to_string()))
    }

    async fn connect(&self, peripheral: &PeripheralId) -> Result<(), TransportError> {
        let address = parse_address(&peripheral.0)
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        let device = gatt::open_device(address, peripheral.clone(), self.event_sender.clone())
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        self.lock_inner().devices.insert(peripheral.clone(), device);
        Ok(())
    }

    async fn discover_attributes(
        &self,
        peripheral: &PeripheralId,
        service_ids: &[String],
        characteristic_ids: &[String],
    ) -> Result<Vec<CharacteristicHandle>, TransportError> {
        let device = self.device(peripheral)?;
        let mut handles = Vec::new();
        for (service_uuid, char_uuid) in service_ids.iter().zip(characteristic_ids) {
            let found = gatt::find_characteristic(&device, service_uuid, char_uuid)
                .await
                .map_err(|e| TransportError::Subscribe(e.to_string()))?;
            let Some(characteristic) = found else {
                continue;
            };
            info!("Found characteristic {}", char_uuid);
            self.lock_inner().characteristics.insert(
                (peripheral.clone(), protocol::normalize_uuid(char_uuid)),
                characteristic,
            );
            handles.push(CharacteristicHandle {
                peripheral: peripheral.clone(),
                service_uuid: service_uuid.clone(),
                uuid: char_uuid.clone(),
            });
        }
        Ok(handles)
    }

    async fn subscribe(&self, characteristic: &CharacteristicHandle) -> Result<(), TransportError> {
        let gatt_char = self.characteristic(characteristic)?;
        gatt::enable_notifications(&gatt_char, characteristic.clone(), self.event_sender.clone())
            .await
            .map_err(|e| TransportError::Subscribe(e.to_string()))
    }

    async fn read_attribute(
        &self,
        characteristic: &CharacteristicHandle,
    ) -> Result<Vec<u8>, TransportError> {
        let gatt_char = self.characteristic(characteristic)?;
        gatt::read_value(&gatt_char)
            .await
            .map_err(|e| TransportError::Read(e.to_string()))
    }

    async fn disconnect(&self, peripheral: &PeripheralId) -> Result<(), TransportError> {
        self.forget(peripheral).await?;
        // Closing does not raise ConnectionStatusChanged.
        let _ = self
            .event_sender
            .send(TransportEvent::Disconnected(peripheral.clone()));
        Ok(())
    }

    async fn forget(&self, peripheral: &PeripheralId) -> Result<(), TransportError> {
        let device = {
            let mut inner = self.lock_inner();
            inner.characteristics.retain(|(p, _), _| p != peripheral);
            inner.devices.remove(peripheral)
        };
        if let Some(device) = device {
            device
                .Close()
                .map_err(|e| TransportError::Disconnect(e.to_string()))?;
            info!("Released {}", peripheral);
        }
        Ok(())
    }
}

/// `aabbccddeeff` form of a 48-bit Bluetooth address.
pub fn format_address(address: u64) -> String {
    format!("{:012x}", address)
}

pub fn parse_address(address: &str) -> Result<u64> {
    let hex: String = address.chars().filter(|c| c.is_ascii_hexdigit()).collect();
    Ok(u64::from_str_radix(&hex, 16)?)
}

/// Parse a UUID string into a Windows GUID
pub fn parse_uuid(uuid_str: &str) -> Result<GUID> {
    let uuid_str = protocol::normalize_uuid(uuid_str);

    if uuid_str.len() != 32 {
        return Err(anyhow::anyhow!("Invalid UUID format"));
    }

    let d1 = u32::from_str_radix(&uuid_str[0..8], 16)?;
    let d2 = u16::from_str_radix(&uuid_str[8..12], 16)?;
    let d3 = u16::from_str_radix(&uuid_str[12..16], 16)?;

    let mut d4 = [0u8; 8];
    for (i, byte) in d4.iter_mut().enumerate() {
        *byte = u8::from_str_radix(&uuid_str[16 + i * 2..18 + i * 2], 16)?;
    }

    Ok(GUID {
        data1: d1,
        data2: d2,
        data3: d3,
        data4: d4,
    })
}
