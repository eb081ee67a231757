//! Scripted in-memory transport for tests.

use crate::domain::error::TransportError;
use crate::domain::models::{DiscoveredPeripheral, PeripheralId};
use crate::infrastructure::bluetooth::protocol;
use crate::infrastructure::bluetooth::transport::{
    CharacteristicHandle, Transport, TransportEvent,
};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

#[derive(Debug, Clone)]
pub struct MockBehaviour {
    pub discovery: Result<(), TransportError>,
    pub connect: Result<(), TransportError>,
    /// Connect never completes.
    pub hang_connect: bool,
    pub subscribe: Result<(), TransportError>,
    pub expose_rad_count: bool,
    pub expose_battery: bool,
    pub battery_payload: Result<Vec<u8>, TransportError>,
    /// Report link loss when asked to disconnect.
    pub emit_disconnect: bool,
}

impl Default for MockBehaviour {
    fn default() -> Self {
        Self {
            discovery: Ok(()),
            connect: Ok(()),
            hang_connect: false,
            subscribe: Ok(()),
            expose_rad_count: true,
            expose_battery: true,
            battery_payload: Ok(vec![0x55, 0x00, 0x00, 0x00]),
            emit_disconnect: true,
        }
    }
}

pub struct MockTransport {
    events: mpsc::UnboundedSender<TransportEvent>,
    behaviour: Mutex<MockBehaviour>,
    calls: Mutex<Vec<String>>,
}

impl MockTransport {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<TransportEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let mock = Arc::new(Self {
            events,
            behaviour: Mutex::new(MockBehaviour::default()),
            calls: Mutex::new(Vec::new()),
        });
        (mock, rx)
    }

    pub fn behaviour(&self, f: impl FnOnce(&mut MockBehaviour)) {
        f(&mut self.behaviour.lock().unwrap());
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count_calls(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }

    pub fn emit(&self, event: TransportEvent) {
        let _ = self.events.send(event);
    }

    pub fn advertise(&self, address: &str, name: Option<&str>) {
        self.emit(TransportEvent::Discovered(DiscoveredPeripheral {
            id: PeripheralId(address.to_string()),
            address: address.to_string(),
            local_name: name.map(String::from),
        }));
    }

    pub fn notify(&self, address: &str, data: &[u8]) {
        self.emit(TransportEvent::Notification {
            characteristic: Self::handle(
                address,
                protocol::RAD_COUNT_SERVICE_UUID,
                protocol::RAD_COUNT_CHAR_UUID,
            ),
            data: data.to_vec(),
        });
    }

    pub fn drop_link(&self, address: &str) {
        self.emit(TransportEvent::Disconnected(PeripheralId(address.to_string())));
    }

    fn handle(address: &str, service: &str, uuid: &str) -> CharacteristicHandle {
        CharacteristicHandle {
            peripheral: PeripheralId(address.to_string()),
            service_uuid: service.to_string(),
            uuid: uuid.to_string(),
        }
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn current(&self) -> MockBehaviour {
        self.behaviour.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn start_discovery(&self, service_filter: &[String]) -> Result<(), TransportError> {
        self.record(format!("start_discovery {}", service_filter.join(",")));
        self.current().discovery
    }

    async fn stop_discovery(&self) -> Result<(), TransportError> {
        self.record("stop_discovery".to_string());
        Ok(())
    }

    async fn connect(&self, peripheral: &PeripheralId) -> Result<(), TransportError> {
        self.record(format!("connect {}", peripheral));
        let behaviour = self.current();
        if behaviour.hang_connect {
            std::future::pending::<()>().await;
        }
        behaviour.connect
    }

    async fn discover_attributes(
        &self,
        peripheral: &PeripheralId,
        service_ids: &[String],
        characteristic_ids: &[String],
    ) -> Result<Vec<CharacteristicHandle>, TransportError> {
        self.record(format!("discover_attributes {}", peripheral));
        let behaviour = self.current();
        let mut handles = Vec::new();
        for (service, uuid) in service_ids.iter().zip(characteristic_ids) {
            let exposed = if protocol::uuid_eq(uuid, protocol::RAD_COUNT_CHAR_UUID) {
                behaviour.expose_rad_count
            } else {
                behaviour.expose_battery
            };
            if exposed {
                handles.push(Self::handle(&peripheral.0, service, uuid));
            }
        }
        Ok(handles)
    }

    async fn subscribe(&self, characteristic: &CharacteristicHandle) -> Result<(), TransportError> {
        self.record(format!("subscribe {}", characteristic.uuid));
        self.current().subscribe
    }

    async fn read_attribute(
        &self,
        characteristic: &CharacteristicHandle,
    ) -> Result<Vec<u8>, TransportError> {
        self.record(format!("read {}", characteristic.uuid));
        self.current().battery_payload
    }

    async fn disconnect(&self, peripheral: &PeripheralId) -> Result<(), TransportError> {
        self.record(format!("disconnect {}", peripheral));
        if self.current().emit_disconnect {
            self.emit(TransportEvent::Disconnected(peripheral.clone()));
        }
        Ok(())
    }

    async fn forget(&self, peripheral: &PeripheralId) -> Result<(), TransportError> {
        self.record(format!("forget {}", peripheral));
        Ok(())
    }
}
