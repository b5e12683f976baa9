//! Unified error type for the coordinator.

use tambola_protocol::ProtocolError;
use tambola_room::GameError;
use tambola_session::SessionError;
use tambola_transport::TransportError;

/// Top-level error that wraps all layer-specific errors, so callers of
/// the `tambola` crate deal with a single type and `?` converts
/// automatically.
#[derive(Debug, thiserror::Error)]
pub enum TambolaError {
    /// A transport-level error (connection, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode, invalid message).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A session-level error (auth, reconnect, expired).
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A game-level error (lifecycle, tickets, calls, claims, store).
    #[error(transparent)]
    Game(#[from] GameError),
}
