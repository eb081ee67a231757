//! BLE Scanner Module
//!
//! Advertisement watcher reporting peripherals that offer the requested services.

use crate::domain::models::{DiscoveredPeripheral, PeripheralId};
use crate::infrastructure::bluetooth::transport::TransportEvent;
use crate::infrastructure::bluetooth::winrt::{format_address, parse_uuid};
use anyhow::Result;
use tokio::sync::mpsc;
use tracing::{debug, info};
use windows::core::GUID;
use windows::Devices::Bluetooth::Advertisement::{
    BluetoothLEAdvertisementReceivedEventArgs, BluetoothLEAdvertisementWatcher,
    BluetoothLEScanningMode,
};
use windows::Foundation::TypedEventHandler;

pub struct BleScanner {
    watcher: Option<BluetoothLEAdvertisementWatcher>,
    event_sender: mpsc::UnboundedSender<TransportEvent>,
}

impl BleScanner {
    pub fn new(event_sender: mpsc::UnboundedSender<TransportEvent>) -> Self {
        Self {
            watcher: None,
            event_sender,
        }
    }

    /// Start watching for advertisements carrying one of `service_uuids`.
    /// An empty filter reports every peripheral.
    pub fn start(&mut self, service_uuids: &[String]) -> Result<()> {
        // Stop any existing scan
        self.stop()?;

        info!("Starting BLE scan for service UUIDs: {:?}", service_uuids);

        let targets = service_uuids
            .iter()
            .map(|u| parse_uuid(u))
            .collect::<Result<Vec<GUID>>>()?;

        let watcher = BluetoothLEAdvertisementWatcher::new()?;
        watcher.SetScanningMode(BluetoothLEScanningMode::Active)?;

        let sender = self.event_sender.clone();
        let handler = TypedEventHandler::new(
            move |_: windows::core::Ref<BluetoothLEAdvertisementWatcher>,
                  args: windows::core::Ref<BluetoothLEAdvertisementReceivedEventArgs>| {
                if let Some(args) = args.as_ref() {
                    let adv = args.Advertisement()?;
                    let service_uuids = adv.ServiceUuids()?;

                    let mut found = targets.is_empty();
                    for i in 0..service_uuids.Size()? {
                        if targets.contains(&service_uuids.GetAt(i)?) {
                            found = true;
                            break;
                        }
                    }

                    if found {
                        let name = adv.LocalName()?.to_string();
                        let address = format_address(args.BluetoothAddress()?);
                        debug!("Advertisement from {} ({:?})", address, name);

                        let _ = sender.send(TransportEvent::Discovered(DiscoveredPeripheral {
                            id: PeripheralId(address.clone()),
                            address,
                            local_name: (!name.is_empty()).then_some(name),
                        }));
                    }
                }
                Ok(())
            },
        );

        watcher.Received(&handler)?;
        watcher.Start()?;
        self.watcher = Some(watcher);

        Ok(())
    }

    pub fn stop(&mut self) -> Result<()> {
        if let Some(watcher) = self.watcher.take() {
            info!("Stopping BLE scan...");
            watcher.Stop()?;
        }
        Ok(())
    }
}

impl Drop for BleScanner {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}
