//! Session types: the server's record of a connected player.

use std::collections::HashSet;
use std::time::Instant;

use tambola_model::{PlayerId, RoomCode};

/// Configuration for session behavior.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// How long a disconnected player has to reconnect before their
    /// session is permanently expired. 0 disables reconnection.
    pub reconnect_grace_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { reconnect_grace_secs: 30 }
    }
}

/// The state machine of one session:
///
/// ```text
///   Connected ──(disconnect)──→ Disconnected ──(timeout)──→ Expired
///       ↑                            │
///       └────────(reconnect)─────────┘
/// ```
#[derive(Debug, Clone)]
pub enum SessionState {
    Connected,
    /// Lost the connection at `since`; may still come back within the
    /// grace period.
    Disconnected { since: Instant },
    /// Grace period elapsed; awaiting cleanup.
    Expired,
}

/// A single player's session.
///
/// The reconnect token is a 32-character hex secret issued at
/// handshake; presenting it lets a dropped connection resume without
/// re-authenticating. `rooms` tracks which rooms this connection has
/// joined so heartbeats and disconnects can fan out to room presence.
#[derive(Debug, Clone)]
pub struct Session {
    pub player_id: PlayerId,
    pub state: SessionState,
    pub reconnect_token: String,
    pub rooms: HashSet<RoomCode>,
}
