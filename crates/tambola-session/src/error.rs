//! Error types for the session layer.

use tambola_model::PlayerId;

/// Errors that can occur during session management.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The token was invalid, expired, or rejected by the
    /// [`Authenticator`](crate::Authenticator).
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// No session exists for the given player.
    #[error("session not found for player {0}")]
    NotFound(PlayerId),

    /// The reconnection token doesn't match anything the server issued.
    #[error("invalid reconnection token")]
    InvalidToken,

    /// The reconnection grace period has elapsed; the player must
    /// authenticate again.
    #[error("session expired for player {0}")]
    SessionExpired(PlayerId),

    /// The player already has an active session. One connection per
    /// player.
    #[error("player {0} already has an active session")]
    AlreadyConnected(PlayerId),
}
