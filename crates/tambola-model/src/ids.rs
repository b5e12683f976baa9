//! Identifier newtypes shared across the coordinator.
//!
//! Every identity is a string newtype: player identities come from the
//! auth layer (opaque uid), room codes are short human-enterable codes,
//! and the remaining ids are random hex generated by the room services.
//! Wrapping them keeps signatures honest — a `TicketId` can never be
//! passed where a `ClaimId` is expected.

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! string_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord,
            Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Returns the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

string_id! {
    /// A player's identity, as established by the authenticator.
    PlayerId
}

string_id! {
    /// A short alphanumeric room code, unique across active rooms.
    RoomCode
}

string_id! {
    /// Globally unique ticket identifier.
    TicketId
}

string_id! {
    /// Ticket request identifier, scoped to its room.
    RequestId
}

string_id! {
    /// Globally unique prize-claim identifier (audit record key).
    ClaimId
}

string_id! {
    /// Stable prize-rule identifier within a room's rule list.
    ///
    /// The id doubles as the pattern selector: it is canonicalized by
    /// [`crate::PrizePattern::resolve`] to decide which winning pattern
    /// the rule pays out for. The rule's display `name` never drives
    /// dispatch.
    RuleId
}
