//! Error types shared by the decoder, transport adapters and session controller.

use crate::domain::models::SessionState;
use std::time::Duration;
use thiserror::Error;

/// A payload that does not match the fixed wire layout.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("malformed frame: expected {expected} bytes, got {actual}")]
    Malformed { expected: usize, actual: usize },
}

/// Failures reported by a transport adapter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("discovery failed: {0}")]
    Discovery(String),
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("subscribe failed: {0}")]
    Subscribe(String),
    #[error("attribute read failed: {0}")]
    Read(String),
    #[error("disconnect failed: {0}")]
    Disconnect(String),
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },
    #[error("no peripheral connected")]
    NotConnected,
    #[error("radio unavailable: {0}")]
    Unavailable(String),
}

/// Session-level failures. Transport failures are wrapped by the setup phase
/// they interrupted so the log says where an attempt died.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("invalid state transition {from} -> {to}")]
    InvalidTransition {
        from: SessionState,
        to: SessionState,
    },
    #[error("discovery failure: {0}")]
    Discovery(#[source] TransportError),
    #[error("connect failure: {0}")]
    Connect(#[source] TransportError),
    #[error("subscribe failure: {0}")]
    Subscribe(#[source] TransportError),
    #[error("session controller is no longer running")]
    ControllerStopped,
}
