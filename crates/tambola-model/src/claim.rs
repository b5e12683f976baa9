//! Ticket, ticket-request, and prize-claim documents.
//!
//! These are the records stored outside the room document: tickets are
//! keyed globally by ticket id, requests and claims form the audit
//! trail. Requests and claims become terminal exactly once and are
//! never deleted.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::{
    ClaimId, PlayerId, RequestId, RoomCode, RuleId, TicketGrid, TicketId,
};

// ---------------------------------------------------------------------------
// Ticket
// ---------------------------------------------------------------------------

/// An issued ticket. The grid is immutable after issuance; `marked` is
/// the owner's informational marking set and is never trusted for
/// adjudication beyond intersecting with authoritative called numbers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: TicketId,
    pub room: RoomCode,
    pub owner: PlayerId,
    pub grid: TicketGrid,
    pub marked: BTreeSet<u8>,
}

// ---------------------------------------------------------------------------
// Ticket requests
// ---------------------------------------------------------------------------

/// Status of a ticket request. Terminal once approved or rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
}

impl RequestStatus {
    /// Whether the request can still be processed.
    pub fn is_pending(self) -> bool {
        matches!(self, Self::Pending)
    }
}

/// A player's request for one ticket, awaiting admin review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketRequest {
    pub id: RequestId,
    pub room: RoomCode,
    pub player: PlayerId,
    pub player_name: String,
    pub status: RequestStatus,
    pub requested_at: u64,
    /// Set when approved.
    pub ticket_id: Option<TicketId>,
    /// Set when rejected.
    pub reject_reason: Option<String>,
}

// ---------------------------------------------------------------------------
// Prize claims
// ---------------------------------------------------------------------------

/// Status of a prize claim.
///
/// `PendingAdminApproval` is the only non-terminal status. Automatic
/// pattern failure is a legitimate terminal status, not an error — it
/// stays visible to both player and admin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimStatus {
    PendingAdminApproval,
    RejectedAutoInvalid,
    Approved,
    RejectedAdmin,
}

impl ClaimStatus {
    /// Whether an admin may still act on the claim.
    pub fn is_pending(self) -> bool {
        matches!(self, Self::PendingAdminApproval)
    }

    /// Whether the claim occupies a winner slot (pending claims count
    /// toward duplicate detection alongside approved ones).
    pub fn blocks_duplicates(self) -> bool {
        matches!(self, Self::PendingAdminApproval | Self::Approved)
    }
}

impl std::fmt::Display for ClaimStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PendingAdminApproval => write!(f, "pending_admin_approval"),
            Self::RejectedAutoInvalid => write!(f, "rejected_auto_invalid"),
            Self::Approved => write!(f, "approved"),
            Self::RejectedAdmin => write!(f, "rejected_admin"),
        }
    }
}

/// The audit record for one prize claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrizeClaim {
    pub id: ClaimId,
    pub room: RoomCode,
    pub ticket_id: TicketId,
    pub player: PlayerId,
    pub player_name: String,
    pub rule_id: RuleId,
    /// Numbers the player asserted fulfil the pattern.
    pub claimed_numbers: Vec<u8>,
    /// Claimed numbers recognized as both on-ticket and called.
    pub effectively_claimed: Vec<u8>,
    pub status: ClaimStatus,
    /// Result of automatic validation at submission time.
    pub auto_valid: bool,
    pub submitted_at: u64,
    pub reviewed_by: Option<PlayerId>,
    pub reviewed_at: Option<u64>,
    /// Null until approved.
    pub coins_awarded: Option<u64>,
    pub reject_reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claim_status_pending_flags() {
        assert!(ClaimStatus::PendingAdminApproval.is_pending());
        assert!(!ClaimStatus::Approved.is_pending());
        assert!(!ClaimStatus::RejectedAutoInvalid.is_pending());
        assert!(!ClaimStatus::RejectedAdmin.is_pending());
    }

    #[test]
    fn test_claim_status_duplicate_blocking() {
        assert!(ClaimStatus::PendingAdminApproval.blocks_duplicates());
        assert!(ClaimStatus::Approved.blocks_duplicates());
        assert!(!ClaimStatus::RejectedAutoInvalid.blocks_duplicates());
        assert!(!ClaimStatus::RejectedAdmin.blocks_duplicates());
    }

    #[test]
    fn test_claim_status_serializes_snake_case() {
        let json =
            serde_json::to_string(&ClaimStatus::PendingAdminApproval)
                .unwrap();
        assert_eq!(json, "\"pending_admin_approval\"");
        assert_eq!(
            ClaimStatus::RejectedAutoInvalid.to_string(),
            "rejected_auto_invalid"
        );
    }

    #[test]
    fn test_request_status_is_pending() {
        assert!(RequestStatus::Pending.is_pending());
        assert!(!RequestStatus::Approved.is_pending());
        assert!(!RequestStatus::Rejected.is_pending());
    }
}
