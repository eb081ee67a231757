//! Bluetooth Module
//!
//! Drives a single CT007 detector session over BLE.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                   SessionController                      │
//! │  (state machine, event fan-out, public SessionHandle)    │
//! └─────────────────────┬───────────────────────────────────┘
//!                       │
//!         ┌─────────────┼─────────────┐
//!         │             │             │
//!         ▼             ▼             ▼
//! ┌────────────┐ ┌────────────┐ ┌──────────┐
//! │ Transport  │ │ Connection │ │ Protocol │
//! │            │ │            │ │          │
//! │ - radio    │ │ - connect  │ │ - UUIDs  │
//! │ - discovery│ │ - subscribe│ │ - frame  │
//! │ - GATT I/O │ │ - timeouts │ │   decode │
//! └────────────┘ └────────────┘ └──────────┘
//! ```
//!
//! ## Modules
//!
//! - [`protocol`] - Service catalog and frame decoding
//! - [`transport`] - Capability surface a radio backend must provide
//! - [`connection`] - Session setup sequence and one-shot reads
//! - [`service`] - Session controller
//! - `winrt` - Windows backend (Windows only)

pub mod connection;
pub mod protocol;
pub mod service;
pub mod transport;

#[cfg(windows)]
pub mod winrt;

#[cfg(test)]
pub(crate) mod mock;

// Re-export main service for convenience
pub use service::{SessionController, SessionHandle};
pub use transport::{CharacteristicHandle, Transport, TransportEvent};
