//! Domain model for the Tambola coordinator.
//!
//! Everything in this crate is pure data and pure logic: no I/O, no
//! store, no clock. The two algorithmic hearts of the game live here —
//! ticket generation ([`TicketGrid::generate`]) and prize-pattern
//! evaluation ([`evaluate`]) — alongside the documents the services
//! persist.
//!
//! # Key types
//!
//! - [`TicketGrid`] — the 3×9 ticket and its generator
//! - [`PrizePattern`] / [`evaluate`] — claim adjudication rules
//! - [`GameStatus`] — room lifecycle state machine
//! - [`Room`], [`PrizeRule`], [`PlayerPresence`], [`Winner`] — the room
//!   document
//! - [`Ticket`], [`TicketRequest`], [`PrizeClaim`] — per-player records

mod claim;
mod ids;
mod room;
mod rules;
mod status;
mod ticket;

pub use claim::{
    ClaimStatus, PrizeClaim, RequestStatus, Ticket, TicketRequest,
};
pub use ids::{ClaimId, PlayerId, RequestId, RoomCode, RuleId, TicketId};
pub use room::{
    CallingMode, ClaimRef, GameSummary, MAX_AUTO_CALL_SECS,
    MIN_AUTO_CALL_SECS, PlayerPresence, PrizeRule, PrizeRuleConfig, Room,
    Winner, validate_rule_configs,
};
pub use rules::{ClaimFault, Evaluation, PrizePattern, evaluate};
pub use status::{GameStatus, LifecycleAction};
pub use ticket::{
    GenerationFailure, NUMBERS_PER_ROW, NUMBERS_PER_TICKET, TICKET_COLS,
    TICKET_ROWS, TicketGrid, column_band,
};
