//! Authentication hook for validating player identity.
//!
//! The coordinator doesn't implement authentication itself; it calls an
//! [`Authenticator`] during the handshake and works with whatever
//! identity comes back. Deployments plug in JWT validation, an auth
//! API, or [`GuestAuthenticator`] for open lobbies.

use tambola_model::PlayerId;

use crate::SessionError;

/// Validates a client's auth token and returns their identity.
///
/// `Send + Sync + 'static` so one authenticator instance can live in
/// the server state and be called from any connection task.
pub trait Authenticator: Send + Sync + 'static {
    /// Validates the given token.
    ///
    /// # Errors
    /// Returns [`SessionError::AuthFailed`] if the token is invalid,
    /// expired, or rejected.
    fn authenticate(
        &self,
        token: &str,
    ) -> impl std::future::Future<Output = Result<PlayerId, SessionError>> + Send;
}

/// Accepts any non-empty token and uses it verbatim as the player id.
///
/// Suitable for open lobbies and development; a production deployment
/// validates a real credential instead.
#[derive(Debug, Clone, Copy, Default)]
pub struct GuestAuthenticator;

impl Authenticator for GuestAuthenticator {
    async fn authenticate(
        &self,
        token: &str,
    ) -> Result<PlayerId, SessionError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(SessionError::AuthFailed(
                "token must not be empty".into(),
            ));
        }
        Ok(PlayerId::from(token))
    }
}
