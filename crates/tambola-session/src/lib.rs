//! Player session management for the Tambola coordinator.
//!
//! 1. **Authentication** — validating who a player is
//!    ([`Authenticator`])
//! 2. **Session tracking** — knowing who's connected, and to which
//!    rooms ([`SessionManager`])
//! 3. **Reconnection** — letting players resume after brief
//!    disconnects (token-based, with a configurable grace period)
//!
//! Room presence (the `last_seen`/`online` fields on room documents)
//! lives in the store; this layer only tracks live connections and
//! which rooms each connection joined.

#![allow(async_fn_in_trait)]

mod auth;
mod error;
mod manager;
mod session;

pub use auth::{Authenticator, GuestAuthenticator};
pub use error::SessionError;
pub use manager::SessionManager;
pub use session::{Session, SessionConfig, SessionState};
