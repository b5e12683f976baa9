//! Game lifecycle state machine.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// GameStatus
// ---------------------------------------------------------------------------

/// The lifecycle status of a room's current game.
///
/// Transitions are driven by admin lifecycle actions:
///
/// ```text
/// Idle ──(start)──→ Running ──(pause)──→ Paused
///                      ↑  │                 │
///                      │  └───(stop)───┐    │(resume → Running)
///                      │               ▼    │(stop → Stopped)
///                   (start)         Stopped
/// ```
///
/// - **Idle**: room created, no game has run yet. Players can join and
///   request tickets, but no numbers are called.
/// - **Running**: numbers are being called; claims are open.
/// - **Paused**: calling is suspended (auto-call forced off); resumable.
/// - **Stopped**: the game ended and a summary was archived. A new game
///   may be started in the same room, which resets per-game state.
///
/// `Idle → Stopped` is not a transition: a game that never ran cannot be
/// stopped, and attempting it is an admin error, not a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameStatus {
    Idle,
    Running,
    Paused,
    Stopped,
}

/// An admin lifecycle action requested against a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleAction {
    Start,
    Pause,
    Resume,
    Stop,
}

impl GameStatus {
    /// Returns `true` if a new game may be started from this status.
    pub fn can_start(self) -> bool {
        matches!(self, Self::Idle | Self::Stopped)
    }

    /// Returns `true` if players may request tickets in this status.
    pub fn accepts_ticket_requests(self) -> bool {
        !matches!(self, Self::Stopped)
    }

    /// Returns `true` if prize claims may be submitted in this status.
    ///
    /// Claims are open while running, and also while paused — pausing
    /// the call loop to adjudicate a claim is normal Tambola practice.
    pub fn accepts_claims(self) -> bool {
        matches!(self, Self::Running | Self::Paused)
    }

    /// The status an action transitions to, or `None` if the action is
    /// not valid from this status.
    pub fn apply(self, action: LifecycleAction) -> Option<Self> {
        match (self, action) {
            (s, LifecycleAction::Start) if s.can_start() => {
                Some(Self::Running)
            }
            (Self::Running, LifecycleAction::Pause) => Some(Self::Paused),
            (Self::Paused, LifecycleAction::Resume) => Some(Self::Running),
            (Self::Running | Self::Paused, LifecycleAction::Stop) => {
                Some(Self::Stopped)
            }
            _ => None,
        }
    }

    /// The status an action requires, phrased for error messages.
    pub fn required_for(action: LifecycleAction) -> &'static str {
        match action {
            LifecycleAction::Start => "idle or stopped",
            LifecycleAction::Pause => "running",
            LifecycleAction::Resume => "paused",
            LifecycleAction::Stop => "running or paused",
        }
    }
}

impl std::fmt::Display for GameStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Running => write!(f, "running"),
            Self::Paused => write!(f, "paused"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

impl std::fmt::Display for LifecycleAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Start => write!(f, "start"),
            Self::Pause => write!(f, "pause"),
            Self::Resume => write!(f, "resume"),
            Self::Stop => write!(f, "stop"),
        }
    }
}
