//! Tambola (Housie) game coordinator.
//!
//! Ties the workspace together: WebSocket transport, the JSON wire
//! protocol, player sessions, and the transactional game services. The
//! server accepts connections, authenticates players, dispatches their
//! requests to the room/ticket/call/claim services, and pushes game
//! events to every subscriber of a room.
//!
//! ```ignore
//! let server = TambolaServer::builder()
//!     .bind("0.0.0.0:9090")
//!     .build(GuestAuthenticator)
//!     .await?;
//! server.run().await?;
//! ```

mod error;
mod handler;
mod registry;
mod server;

pub use error::TambolaError;
pub use registry::RoomRegistry;
pub use server::{
    TambolaServer, TambolaServerBuilder, PROTOCOL_VERSION,
};

// Re-exported so embedders and tests need only this crate.
pub use tambola_protocol::{
    ClientRequest, Envelope, GameEvent, Payload, ServerResponse,
};
pub use tambola_session::{GuestAuthenticator, SessionConfig};
pub use tambola_tick::PollConfig;
