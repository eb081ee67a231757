//! Transport Adapter Boundary
//!
//! The session controller talks to the radio only through [`Transport`].
//! Unsolicited happenings (radio power, advertisements, notifications, link
//! loss) are pushed by the adapter into an unbounded channel of
//! [`TransportEvent`]s that the controller owns the receiving end of.

use crate::domain::error::TransportError;
use crate::domain::models::{DiscoveredPeripheral, PeripheralId};
use async_trait::async_trait;

/// A characteristic resolved by attribute discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharacteristicHandle {
    pub peripheral: PeripheralId,
    pub service_uuid: String,
    pub uuid: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Radio powered on and usable.
    RadioReady,
    RadioUnavailable,
    Discovered(DiscoveredPeripheral),
    Notification {
        characteristic: CharacteristicHandle,
        data: Vec<u8>,
    },
    /// Link to the peripheral was lost or closed.
    Disconnected(PeripheralId),
}

#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Start reporting peripherals that advertise one of `service_filter`.
    async fn start_discovery(&self, service_filter: &[String]) -> Result<(), TransportError>;

    async fn stop_discovery(&self) -> Result<(), TransportError>;

    async fn connect(&self, peripheral: &PeripheralId) -> Result<(), TransportError>;

    /// Resolve characteristics, returned in the order of `characteristic_ids`.
    /// Characteristics that do not exist are left out.
    async fn discover_attributes(
        &self,
        peripheral: &PeripheralId,
        service_ids: &[String],
        characteristic_ids: &[String],
    ) -> Result<Vec<CharacteristicHandle>, TransportError>;

    async fn subscribe(&self, characteristic: &CharacteristicHandle) -> Result<(), TransportError>;

    async fn read_attribute(
        &self,
        characteristic: &CharacteristicHandle,
    ) -> Result<Vec<u8>, TransportError>;

    async fn disconnect(&self, peripheral: &PeripheralId) -> Result<(), TransportError>;

    /// Drop local resources of a peripheral whose link is already gone.
    /// Emits no event.
    async fn forget(&self, peripheral: &PeripheralId) -> Result<(), TransportError>;
}
