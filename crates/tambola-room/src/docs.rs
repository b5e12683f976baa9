//! Collection names, id generation, and shared transaction helpers.

use std::time::{SystemTime, UNIX_EPOCH};

use rand::Rng;
use tambola_model::{Room, RoomCode};
use tambola_store::Transaction;

use crate::GameError;

/// Room documents, keyed by room code.
pub const ROOMS: &str = "rooms";
/// Issued tickets, keyed by ticket id.
pub const TICKETS: &str = "tickets";
/// Ticket purchase requests, keyed by request id.
pub const TICKET_REQUESTS: &str = "ticket_requests";
/// Prize claims, keyed by claim id.
pub const CLAIMS: &str = "claims";

/// Room codes avoid characters that read ambiguously when spoken or
/// written down (no I/L/O/0/1).
const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";
const CODE_LEN: usize = 6;

/// Milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// A random 32-char hex id with a short type prefix, e.g. `tkt_9f…`.
pub fn new_id(prefix: &str) -> String {
    let mut rng = rand::rng();
    let bytes: [u8; 16] = rng.random();
    let hex: String =
        bytes.iter().map(|b| format!("{b:02x}")).collect();
    format!("{prefix}_{hex}")
}

/// A fresh 6-character room code. Uniqueness is the caller's job (the
/// creating transaction checks for an existing document).
pub fn new_room_code() -> RoomCode {
    let mut rng = rand::rng();
    let code: String = (0..CODE_LEN)
        .map(|_| {
            let i = rng.random_range(0..CODE_ALPHABET.len());
            CODE_ALPHABET[i] as char
        })
        .collect();
    RoomCode::from(code)
}

/// Loads a room inside a transaction or reports it missing.
pub(crate) fn load_room(
    txn: &mut Transaction,
    code: &RoomCode,
) -> Result<Room, GameError> {
    txn.get::<Room>(ROOMS, code.as_str())?.ok_or_else(|| {
        GameError::NotFound { what: "room", id: code.to_string() }
    })
}
