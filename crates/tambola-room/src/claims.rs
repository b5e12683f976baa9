//! Prize-claim adjudication: submission with automatic pre-validation,
//! and admin approval/rejection with payout.

use tambola_model::{
    evaluate, ClaimId, ClaimRef, ClaimStatus, PlayerId, PrizeClaim,
    RoomCode, RuleId, Ticket, TicketId, Winner,
};
use tambola_store::DocStore;

use crate::docs::{load_room, new_id, now_ms, CLAIMS, ROOMS, TICKETS};
use crate::rooms::require_admin;
use crate::GameError;

enum Review {
    Approved(Winner),
    /// Re-validation failed; the claim was flipped to rejected_admin
    /// with this reason. The flip commits, then the caller sees it as
    /// an error.
    Flipped(String),
}

/// Orchestrates the claim lifecycle against the room document.
#[derive(Clone)]
pub struct ClaimAdjudicator {
    store: DocStore,
}

impl ClaimAdjudicator {
    pub fn new(store: DocStore) -> Self {
        Self { store }
    }

    /// Submits a claim and runs automatic validation. An invalid
    /// pattern is not an error: the claim persists as
    /// `rejected_auto_invalid` and never reaches the admin queue.
    ///
    /// The duplicate check scans the claims collection inside the same
    /// transaction as the insert, so two racing submissions for the
    /// same player/rule/ticket cannot both land.
    pub async fn submit_claim(
        &self,
        player: &PlayerId,
        code: &RoomCode,
        ticket_id: &TicketId,
        rule_id: &RuleId,
        claimed_numbers: Vec<u8>,
    ) -> Result<PrizeClaim, GameError> {
        let claim = self
            .store
            .in_transaction(|txn| {
                let room = load_room(txn, code)?;
                if !room.status.accepts_claims() {
                    return Err(GameError::FailedPrecondition(format!(
                        "room {code} is {}, claims are closed",
                        room.status
                    )));
                }

                let ticket = txn
                    .get::<Ticket>(TICKETS, ticket_id.as_str())?
                    .filter(|t| &t.room == code)
                    .ok_or_else(|| GameError::NotFound {
                        what: "ticket",
                        id: ticket_id.to_string(),
                    })?;
                if &ticket.owner != player {
                    return Err(GameError::PermissionDenied(
                        "only the ticket owner may claim with it"
                            .into(),
                    ));
                }

                let rule =
                    room.rule(rule_id).ok_or_else(|| {
                        GameError::NotFound {
                            what: "rule",
                            id: rule_id.to_string(),
                        }
                    })?;
                if !rule.active {
                    return Err(GameError::FailedPrecondition(format!(
                        "rule {rule_id} is not active in this game"
                    )));
                }
                if !rule.has_capacity() {
                    return Err(GameError::ResourceExhausted(format!(
                        "rule {rule_id} already has its maximum of {} \
                         winners",
                        rule.max_prizes
                    )));
                }

                for (_, existing) in
                    txn.scan::<PrizeClaim>(CLAIMS)?
                {
                    if existing.room == *code
                        && existing.player == *player
                        && existing.rule_id == *rule_id
                        && existing.ticket_id == *ticket_id
                        && existing.status.blocks_duplicates()
                    {
                        return Err(GameError::AlreadyExists {
                            what: "claim",
                            id: existing.id.to_string(),
                        });
                    }
                }

                let evaluation = evaluate(
                    &ticket.grid,
                    &claimed_numbers,
                    &room.called_numbers,
                    rule_id.as_str(),
                );
                let status = if evaluation.valid {
                    ClaimStatus::PendingAdminApproval
                } else {
                    ClaimStatus::RejectedAutoInvalid
                };

                let claim = PrizeClaim {
                    id: ClaimId::from(new_id("clm")),
                    room: code.clone(),
                    ticket_id: ticket_id.clone(),
                    player: player.clone(),
                    player_name: ticket_owner_name(&room, player),
                    rule_id: rule_id.clone(),
                    claimed_numbers: claimed_numbers.clone(),
                    effectively_claimed: evaluation
                        .effectively_claimed
                        .clone(),
                    status,
                    auto_valid: evaluation.valid,
                    submitted_at: now_ms(),
                    reviewed_by: None,
                    reviewed_at: None,
                    coins_awarded: None,
                    reject_reason: evaluation
                        .fault
                        .as_ref()
                        .map(|f| f.to_string()),
                };
                txn.put(CLAIMS, claim.id.as_str(), &claim)?;
                Ok::<_, GameError>(claim)
            })
            .await?;

        tracing::info!(
            %code,
            claim = %claim.id,
            player = %player,
            rule = %rule_id,
            status = %claim.status,
            "claim submitted"
        );
        Ok(claim)
    }

    /// Approves a pending claim: re-validates against current room
    /// state, computes the payout, and records the winner — all in one
    /// transaction with the claim update.
    ///
    /// If re-validation fails (rule vanished, winner cap reached in the
    /// meantime, player already won this rule with this ticket), the
    /// claim flips to `rejected_admin` with the reason, that flip
    /// commits, and the approval fails with `FailedPrecondition`.
    pub async fn approve_claim(
        &self,
        admin: &PlayerId,
        code: &RoomCode,
        claim_id: &ClaimId,
    ) -> Result<Winner, GameError> {
        let review = self
            .store
            .in_transaction(|txn| {
                let mut room = load_room(txn, code)?;
                require_admin(&room, admin)?;
                let mut claim = load_claim(txn, code, claim_id)?;
                if !claim.status.is_pending() {
                    return Err(GameError::AlreadyProcessed {
                        what: "claim",
                        id: claim_id.to_string(),
                    });
                }

                let now = now_ms();
                let violation = check_still_approvable(&room, &claim);
                if let Some(reason) = violation {
                    claim.status = ClaimStatus::RejectedAdmin;
                    claim.reviewed_by = Some(admin.clone());
                    claim.reviewed_at = Some(now);
                    claim.reject_reason = Some(reason.clone());
                    txn.put(CLAIMS, claim.id.as_str(), &claim)?;
                    return Ok(Review::Flipped(reason));
                }

                let rule = room
                    .rules
                    .get(&claim.rule_id)
                    .cloned()
                    .ok_or_else(|| GameError::NotFound {
                        what: "rule",
                        id: claim.rule_id.to_string(),
                    })?;
                let coins = rule.payout(room.money_collected);

                claim.status = ClaimStatus::Approved;
                claim.reviewed_by = Some(admin.clone());
                claim.reviewed_at = Some(now);
                claim.coins_awarded = Some(coins);

                let winner = Winner {
                    claim_id: claim.id.clone(),
                    player_id: claim.player.clone(),
                    player_name: claim.player_name.clone(),
                    ticket_id: claim.ticket_id.clone(),
                    rule_id: claim.rule_id.clone(),
                    prize_name: rule.name.clone(),
                    coins_awarded: coins,
                    won_at: now,
                };
                room.winners.push(winner.clone());
                if let Some(rule) = room.rules.get_mut(&claim.rule_id) {
                    rule.claims.push(ClaimRef {
                        claim_id: claim.id.clone(),
                        player_id: claim.player.clone(),
                        ticket_id: claim.ticket_id.clone(),
                    });
                }

                txn.put(ROOMS, code.as_str(), &room)?;
                txn.put(CLAIMS, claim.id.as_str(), &claim)?;
                Ok(Review::Approved(winner))
            })
            .await?;

        match review {
            Review::Approved(winner) => {
                tracing::info!(
                    %code,
                    claim = %claim_id,
                    player = %winner.player_id,
                    coins = winner.coins_awarded,
                    "claim approved"
                );
                Ok(winner)
            }
            Review::Flipped(reason) => {
                tracing::warn!(
                    %code,
                    claim = %claim_id,
                    %reason,
                    "claim no longer approvable, flipped to rejected"
                );
                Err(GameError::FailedPrecondition(format!(
                    "claim {claim_id} rejected: {reason}"
                )))
            }
        }
    }

    /// Rejects a pending claim with a non-empty reason.
    pub async fn reject_claim(
        &self,
        admin: &PlayerId,
        code: &RoomCode,
        claim_id: &ClaimId,
        reason: &str,
    ) -> Result<(), GameError> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(GameError::InvalidArgument(
                "a rejection reason is required".into(),
            ));
        }

        self.store
            .in_transaction(|txn| {
                let room = load_room(txn, code)?;
                require_admin(&room, admin)?;
                let mut claim = load_claim(txn, code, claim_id)?;
                if !claim.status.is_pending() {
                    return Err(GameError::AlreadyProcessed {
                        what: "claim",
                        id: claim_id.to_string(),
                    });
                }

                claim.status = ClaimStatus::RejectedAdmin;
                claim.reviewed_by = Some(admin.clone());
                claim.reviewed_at = Some(now_ms());
                claim.reject_reason = Some(reason.to_string());
                txn.put(CLAIMS, claim.id.as_str(), &claim)?;
                Ok::<_, GameError>(())
            })
            .await?;

        tracing::info!(%code, claim = %claim_id, "claim rejected");
        Ok(())
    }
}

/// The reason a pending claim can no longer be approved, if any.
fn check_still_approvable(
    room: &tambola_model::Room,
    claim: &PrizeClaim,
) -> Option<String> {
    let Some(rule) = room.rules.get(&claim.rule_id) else {
        return Some(format!(
            "rule {} no longer exists",
            claim.rule_id
        ));
    };
    if !rule.active {
        return Some(format!("rule {} is no longer active", rule.id));
    }
    if !rule.has_capacity() {
        return Some(format!(
            "rule {} already has its maximum of {} winners",
            rule.id, rule.max_prizes
        ));
    }
    if rule.claims.iter().any(|c| {
        c.player_id == claim.player && c.ticket_id == claim.ticket_id
    }) {
        return Some(format!(
            "player {} already won rule {} with ticket {}",
            claim.player, rule.id, claim.ticket_id
        ));
    }
    None
}

fn ticket_owner_name(
    room: &tambola_model::Room,
    player: &PlayerId,
) -> String {
    room.players
        .get(player)
        .map(|p| p.name.clone())
        .unwrap_or_else(|| player.to_string())
}

fn load_claim(
    txn: &mut tambola_store::Transaction,
    code: &RoomCode,
    claim_id: &ClaimId,
) -> Result<PrizeClaim, GameError> {
    txn.get::<PrizeClaim>(CLAIMS, claim_id.as_str())?
        .filter(|c| &c.room == code)
        .ok_or_else(|| GameError::NotFound {
            what: "claim",
            id: claim_id.to_string(),
        })
}
