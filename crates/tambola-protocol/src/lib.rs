//! Wire protocol for the Tambola coordinator.
//!
//! This crate defines the language clients and the server speak:
//!
//! - **Types** ([`Envelope`], [`ClientRequest`], [`ServerResponse`],
//!   [`GameEvent`]) — the structures that travel on the wire.
//! - **Codec** ([`Codec`], [`JsonCodec`]) — how they become bytes.
//! - **Errors** ([`ProtocolError`]).
//!
//! The protocol layer sits between transport (raw frames) and the game
//! services. It knows nothing about rooms, sessions, or the store; it
//! only shapes and parses messages.

mod codec;
mod error;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use types::{
    ClientRequest, Envelope, GameEvent, Payload, ServerResponse,
};
