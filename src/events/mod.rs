//! Turn lifecycle events
//!
//! Broadcast by the turn controller at every stage transition;
//! consumed by the control server for status tracking and pushed to
//! subscribed clients.

use serde::{Deserialize, Serialize};

/// Events emitted by the turn controller
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnEvent {
    /// A trigger was accepted and the chime is playing
    TurnStarted,

    /// The microphone window is open
    ListeningStarted,

    /// The transcript is out to the search service
    SearchingStarted,

    /// The answer is being synthesized and spoken
    SpeakingStarted,

    /// The turn finished and the controller is idle again
    TurnCompleted {
        /// Duration in milliseconds from trigger to idle
        duration_ms: u64,
    },

    /// A stage failed and the turn was aborted
    TurnFailed {
        /// The stage the failure originated from
        stage: FailedStage,
        /// Duration in milliseconds from trigger to idle
        duration_ms: u64,
    },
}

/// The stage a failed turn was in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailedStage {
    Playback,
    Listen,
    Search,
    Synthesis,
}

impl std::fmt::Display for TurnEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TurnEvent::TurnStarted => write!(f, "TURN_STARTED"),
            TurnEvent::ListeningStarted => write!(f, "LISTENING_STARTED"),
            TurnEvent::SearchingStarted => write!(f, "SEARCHING_STARTED"),
            TurnEvent::SpeakingStarted => write!(f, "SPEAKING_STARTED"),
            TurnEvent::TurnCompleted { duration_ms } => {
                write!(f, "TURN_COMPLETED ({duration_ms}ms)")
            }
            TurnEvent::TurnFailed { stage, duration_ms } => {
                write!(f, "TURN_FAILED ({stage:?}, {duration_ms}ms)")
            }
        }
    }
}
