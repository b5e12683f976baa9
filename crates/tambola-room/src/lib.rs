//! Game services for the Tambola coordinator.
//!
//! Every operation here is one atomic read-modify-write transaction
//! against the document store: the room document is the single source
//! of truth, and no service caches room state across operations.
//!
//! - [`RoomService`] — creation, configuration, membership, lifecycle
//! - [`NumberCaller`] — manual calls and the scheduled auto-call tick
//! - [`TicketDesk`] — ticket requests, approval, rejection, marking
//! - [`ClaimAdjudicator`] — claim submission and admin review
//!
//! Services are cheap to clone and share one [`DocStore`]; concurrent
//! operations on the same room serialize through optimistic commit
//! validation rather than locks.
//!
//! [`DocStore`]: tambola_store::DocStore

mod caller;
mod claims;
mod docs;
mod error;
mod rooms;
mod tickets;

pub use caller::{AutoCall, CalledNumber, NumberCaller};
pub use claims::ClaimAdjudicator;
pub use docs::{new_id, now_ms, CLAIMS, ROOMS, TICKETS, TICKET_REQUESTS};
pub use error::GameError;
pub use rooms::{RoomConfig, RoomConfigPatch, RoomService};
pub use tickets::TicketDesk;
