//! The session manager: tracks every live player connection.
//!
//! Not thread-safe by itself — it uses plain `HashMap`s and is meant to
//! be owned by the server behind a mutex. Keeping the locking at the
//! call site avoids hidden per-method overhead.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use rand::Rng;
use tambola_model::{PlayerId, RoomCode};

use crate::{Session, SessionConfig, SessionError, SessionState};

/// Registry of all sessions, keyed by player id. A player has at most
/// one session at a time.
pub struct SessionManager {
    sessions: HashMap<PlayerId, Session>,
    /// Reconnect token → player id, kept in sync with `sessions`.
    tokens: HashMap<String, PlayerId>,
    config: SessionConfig,
}

impl SessionManager {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            sessions: HashMap::new(),
            tokens: HashMap::new(),
            config,
        }
    }

    /// Creates a session after successful authentication and issues a
    /// fresh reconnect token.
    ///
    /// # Errors
    /// Returns [`SessionError::AlreadyConnected`] if the player already
    /// has a live session.
    pub fn create(
        &mut self,
        player_id: PlayerId,
    ) -> Result<&Session, SessionError> {
        if let Some(existing) = self.sessions.get(&player_id) {
            if matches!(existing.state, SessionState::Connected) {
                return Err(SessionError::AlreadyConnected(player_id));
            }
            // Stale session from a previous connection: revoke its
            // token before issuing a new one.
            self.tokens.remove(&existing.reconnect_token);
        }

        let token = generate_token();
        let session = Session {
            player_id: player_id.clone(),
            state: SessionState::Connected,
            reconnect_token: token.clone(),
            rooms: HashSet::new(),
        };

        self.tokens.insert(token, player_id.clone());
        self.sessions.insert(player_id.clone(), session);

        tracing::info!(player = %player_id, "session created");
        Ok(self.sessions.get(&player_id).expect("just inserted"))
    }

    /// Marks a player disconnected and starts the grace period. Their
    /// room memberships are retained for a possible reconnect.
    pub fn disconnect(
        &mut self,
        player_id: &PlayerId,
    ) -> Result<(), SessionError> {
        let session = self
            .sessions
            .get_mut(player_id)
            .ok_or_else(|| SessionError::NotFound(player_id.clone()))?;

        session.state =
            SessionState::Disconnected { since: Instant::now() };
        tracing::info!(
            player = %player_id,
            "player disconnected, grace period started"
        );
        Ok(())
    }

    /// Resumes a dropped session by reconnect token.
    ///
    /// # Errors
    /// - [`SessionError::InvalidToken`] — token not recognized
    /// - [`SessionError::SessionExpired`] — grace period elapsed
    /// - [`SessionError::AlreadyConnected`] — session never dropped
    pub fn reconnect(
        &mut self,
        token: &str,
    ) -> Result<&Session, SessionError> {
        let player_id = self
            .tokens
            .get(token)
            .cloned()
            .ok_or(SessionError::InvalidToken)?;
        let session = self
            .sessions
            .get_mut(&player_id)
            .ok_or(SessionError::InvalidToken)?;

        match &session.state {
            SessionState::Disconnected { since } => {
                let grace = Duration::from_secs(
                    self.config.reconnect_grace_secs,
                );
                if since.elapsed() > grace {
                    session.state = SessionState::Expired;
                    return Err(SessionError::SessionExpired(player_id));
                }
                session.state = SessionState::Connected;
                tracing::info!(player = %player_id, "player reconnected");
                Ok(self
                    .sessions
                    .get(&player_id)
                    .expect("just modified"))
            }
            SessionState::Connected => {
                Err(SessionError::AlreadyConnected(player_id))
            }
            SessionState::Expired => {
                Err(SessionError::SessionExpired(player_id))
            }
        }
    }

    /// Records that this session joined a room, so heartbeats and the
    /// final disconnect can update that room's presence.
    pub fn track_room(
        &mut self,
        player_id: &PlayerId,
        code: RoomCode,
    ) -> Result<(), SessionError> {
        let session = self
            .sessions
            .get_mut(player_id)
            .ok_or_else(|| SessionError::NotFound(player_id.clone()))?;
        session.rooms.insert(code);
        Ok(())
    }

    /// The rooms this session has joined.
    pub fn rooms_of(&self, player_id: &PlayerId) -> Vec<RoomCode> {
        self.sessions
            .get(player_id)
            .map(|s| s.rooms.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Expires sessions whose grace period elapsed. Returns the
    /// affected players so higher layers can mark them offline in
    /// their rooms before cleanup deletes the data.
    pub fn expire_stale(&mut self) -> Vec<PlayerId> {
        let grace =
            Duration::from_secs(self.config.reconnect_grace_secs);
        let mut expired = Vec::new();

        for session in self.sessions.values_mut() {
            if let SessionState::Disconnected { since } = &session.state
            {
                if since.elapsed() > grace {
                    session.state = SessionState::Expired;
                    expired.push(session.player_id.clone());
                    tracing::info!(
                        player = %session.player_id,
                        "session expired"
                    );
                }
            }
        }
        expired
    }

    /// Drops expired sessions and revokes their tokens. Separate from
    /// [`expire_stale`](Self::expire_stale) so callers can react to
    /// the expirations first.
    pub fn cleanup_expired(&mut self) {
        self.sessions.retain(|_, session| {
            if matches!(session.state, SessionState::Expired) {
                self.tokens.remove(&session.reconnect_token);
                false
            } else {
                true
            }
        });
    }

    pub fn get(&self, player_id: &PlayerId) -> Option<&Session> {
        self.sessions.get(player_id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

/// 128 bits of randomness as a 32-char hex string.
fn generate_token() -> String {
    let mut rng = rand::rng();
    let bytes: [u8; 16] = rng.random();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
