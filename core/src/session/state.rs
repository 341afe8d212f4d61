// Connection state machine primitives — peer session lifecycle and
// reconnection backoff

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Peer session lifecycle.
///
/// Exactly one state is active at a time. Transitions are driven only by
/// transport callbacks (activation result, reachability change), timers,
/// or explicit reconnection requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    /// No session; the initial state
    Disconnected,
    /// Activation requested, outcome pending
    Connecting,
    /// Session active; dispatch is gated on reachability
    Connected,
    /// Waiting out a backoff delay before the next activation attempt
    Reconnecting,
    /// Activation failed; carries the reason
    Error(String),
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Reconnecting => write!(f, "reconnecting"),
            ConnectionState::Error(reason) => write!(f, "error: {}", reason),
        }
    }
}

/// Exponential reconnection backoff: starts at a floor, doubles per
/// consecutive failed attempt, capped at a ceiling, reset on success.
#[derive(Debug, Clone)]
pub struct ReconnectBackoff {
    floor: Duration,
    ceiling: Duration,
    attempt: u32,
}

impl ReconnectBackoff {
    pub fn new(floor: Duration, ceiling: Duration) -> Self {
        Self {
            floor,
            ceiling,
            attempt: 0,
        }
    }

    /// Delay before the next attempt; consecutive calls double up to the
    /// ceiling.
    pub fn next_delay(&mut self) -> Duration {
        let shift = self.attempt.min(16);
        let delay = self
            .floor
            .saturating_mul(1u32 << shift)
            .min(self.ceiling);
        self.attempt = self.attempt.saturating_add(1);
        delay
    }

    /// Reset to the floor after a successful connection
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Consecutive failed attempts so far
    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}
