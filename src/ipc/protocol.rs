//! Control socket message protocol
//!
//! All messages are JSON-encoded, prefixed with a 4-byte little-endian
//! length.

use serde::{Deserialize, Serialize};

use crate::events::TurnEvent;
use crate::turn::TurnState;

/// Where the controller currently is in a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Waiting for a trigger
    Idle,
    /// Chime is playing
    Playing,
    /// Microphone window is open
    Listening,
    /// Query is out to the search service
    Searching,
    /// Answer is being spoken
    Speaking,
}

impl Default for Phase {
    fn default() -> Self {
        Self::Idle
    }
}

impl From<TurnState> for Phase {
    fn from(state: TurnState) -> Self {
        match state {
            TurnState::Idle => Phase::Idle,
            TurnState::Playing => Phase::Playing,
            TurnState::Listening => Phase::Listening,
            TurnState::Searching => Phase::Searching,
            TurnState::Speaking => Phase::Speaking,
        }
    }
}

/// Requests from clients to the daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Ping to check connectivity
    Ping,

    /// Request current daemon status
    GetStatus,

    /// Start a turn as if the button had been pressed
    Trigger,

    /// Subscribe to turn event notifications
    Subscribe,
}

/// Responses from the daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// Pong response to ping
    Pong,

    /// Current daemon status
    Status(DaemonStatus),

    /// Trigger was forwarded to the controller. `accepted` is a
    /// snapshot: a trigger racing a starting turn is still dropped by
    /// the controller's own guard.
    Triggered { accepted: bool },

    /// Subscription confirmed
    Subscribed,

    /// Error response
    Error { code: String, message: String },
}

/// Push notification for subscribed clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "event", rename_all = "snake_case")]
pub enum Notification {
    /// A turn event occurred
    TurnEvent(TurnEvent),
}

/// Full daemon status snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonStatus {
    /// Daemon version
    pub version: String,

    /// Current controller phase
    pub phase: Phase,

    /// Whether the physical button came up at startup
    pub button_available: bool,

    /// Uptime in seconds
    pub uptime_secs: u64,

    /// Turns finished since startup
    pub turns_completed: u64,

    /// Turns aborted by a stage failure since startup
    pub turns_failed: u64,
}

impl Default for DaemonStatus {
    fn default() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            phase: Phase::default(),
            button_available: false,
            uptime_secs: 0,
            turns_completed: 0,
            turns_failed: 0,
        }
    }
}
