//! Session State Machine
//!
//! Closed set of states with an explicit transition table. Any edge that is
//! not in the table is rejected.
//!
//! ```text
//! waiting ──► scanning ──► connected ──► reading
//!                ▲            │  │          │  │
//!                │            │  └─► error ◄┘  │
//!                │            ▼        │       │
//!                └──────── disconnected ◄──────┘
//! ```
//!
//! `scanning ──► error` covers a failed discovery start.

use crate::domain::error::SessionError;
use crate::domain::models::SessionState;
use tracing::debug;

use SessionState::*;

/// Every allowed `(from, to)` edge.
pub const TRANSITIONS: &[(SessionState, SessionState)] = &[
    (Waiting, Scanning),
    (Scanning, Connected),
    (Scanning, Error),
    (Connected, Reading),
    (Connected, Disconnected),
    (Connected, Error),
    (Reading, Disconnected),
    (Reading, Error),
    (Error, Disconnected),
    (Disconnected, Scanning),
];

#[derive(Debug, Clone)]
pub struct StateMachine {
    state: SessionState,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl StateMachine {
    pub fn new() -> Self {
        Self { state: Waiting }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn can_transition(&self, to: SessionState) -> bool {
        TRANSITIONS.contains(&(self.state, to))
    }

    /// Move to `to`, or fail without changing state.
    pub fn transition(&mut self, to: SessionState) -> Result<SessionState, SessionError> {
        if !self.can_transition(to) {
            return Err(SessionError::InvalidTransition {
                from: self.state,
                to,
            });
        }
        debug!("Session state {} -> {}", self.state, to);
        self.state = to;
        Ok(to)
    }
}
