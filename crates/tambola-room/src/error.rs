//! Error taxonomy for game operations.
//!
//! Every operation failure maps to a stable wire code (gRPC-style
//! numbering) so clients can branch on the class of failure without
//! parsing messages.

use tambola_model::GenerationFailure;
use tambola_store::StoreError;

/// Errors that can occur during game operations.
#[derive(Debug, thiserror::Error)]
pub enum GameError {
    /// The connection has no authenticated player.
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    /// The caller is authenticated but not allowed to do this, e.g. a
    /// non-admin driving the lifecycle.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// A referenced entity does not exist.
    #[error("{what} {id} not found")]
    NotFound { what: &'static str, id: String },

    /// The entity being created already exists, or the request is an
    /// identical duplicate of one still outstanding.
    #[error("{what} {id} already exists")]
    AlreadyExists { what: &'static str, id: String },

    /// The request or claim was already approved or rejected; the
    /// decision is final.
    #[error("{what} {id} was already processed")]
    AlreadyProcessed { what: &'static str, id: String },

    /// A request field failed validation.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The lifecycle action is not valid from the current status.
    #[error("cannot {action} while {current}; requires {required}")]
    InvalidTransition {
        action: &'static str,
        current: &'static str,
        required: &'static str,
    },

    /// The room is in a status that does not allow this operation.
    #[error("precondition failed: {0}")]
    FailedPrecondition(String),

    /// A per-player or per-rule quota ran out.
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    /// All 90 numbers have been called; the game has been stopped.
    #[error("all numbers have been called")]
    AllNumbersCalled,

    /// The manually requested number was called earlier in this game.
    #[error("number {0} has already been called")]
    DuplicateNumber(u8),

    /// The number is outside 1..=90.
    #[error("number {0} is out of range (expected 1-90)")]
    OutOfRange(u8),

    /// Ticket generation gave up. Should not happen in practice.
    #[error(transparent)]
    Generation(#[from] GenerationFailure),

    /// The store lost too many commit races or hit a codec fault.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl GameError {
    /// Stable numeric code for the wire. Follows gRPC status numbering.
    pub fn code(&self) -> u16 {
        match self {
            Self::InvalidArgument(_) | Self::OutOfRange(_) => 3,
            Self::NotFound { .. } => 5,
            Self::AlreadyExists { .. } | Self::DuplicateNumber(_) => 6,
            Self::PermissionDenied(_) => 7,
            Self::ResourceExhausted(_) | Self::AllNumbersCalled => 8,
            Self::InvalidTransition { .. }
            | Self::FailedPrecondition(_)
            | Self::AlreadyProcessed { .. } => 9,
            Self::Store(e) if e.is_retryable() => 10,
            Self::Generation(_) | Self::Store(_) => 13,
            Self::Unauthenticated(_) => 16,
        }
    }

    /// Whether the client may safely retry the identical request.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Store(e) if e.is_retryable())
    }
}
