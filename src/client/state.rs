//! Session state machine
//!
//! One mutex guards the single four-valued connection state. Writes outside
//! the transition table are rejected and logged rather than applied, so a
//! misbehaving caller cannot force the session into an impossible lifecycle.

use std::fmt;
use std::sync::Mutex;

use tracing::{debug, warn};

/// Coarse connection lifecycle exposed to observers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
}

impl ConnectionState {
    /// Legal lifecycle edges. `Disconnected -> Connected` covers the
    /// reconnect cycle, which parks in `Disconnected` during backoff.
    fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (Disconnected, Connecting)
                | (Disconnected, Connected)
                | (Disconnected, Disconnecting)
                | (Connecting, Connected)
                | (Connecting, Disconnected)
                | (Connecting, Disconnecting)
                | (Connected, Disconnected)
                | (Connected, Disconnecting)
                | (Disconnecting, Disconnected)
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Disconnecting => "disconnecting",
        };
        write!(f, "{}", name)
    }
}

/// Single source of truth for the session state
pub struct StateCell {
    inner: Mutex<ConnectionState>,
}

impl StateCell {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(ConnectionState::Disconnected),
        }
    }

    /// Atomically read the current state
    pub fn get(&self) -> ConnectionState {
        *self.inner.lock().unwrap()
    }

    /// Atomically overwrite the state. Same-state writes are accepted
    /// silently; illegal transitions are rejected and logged.
    pub fn set(&self, next: ConnectionState) {
        let mut current = self.inner.lock().unwrap();
        if *current == next {
            return;
        }
        if !current.can_transition_to(next) {
            warn!("rejecting illegal state transition {} -> {}", current, next);
            return;
        }
        debug!("state {} -> {}", current, next);
        *current = next;
    }
}

impl Default for StateCell {
    fn default() -> Self {
        Self::new()
    }
}
