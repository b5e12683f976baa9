//! Ticket issuance: player requests, admin approval/rejection, and
//! number marking on issued tickets.

use std::collections::BTreeSet;

use tambola_model::{
    PlayerId, RequestId, RequestStatus, RoomCode, Ticket, TicketGrid,
    TicketId, TicketRequest,
};
use tambola_store::DocStore;

use crate::docs::{
    load_room, new_id, now_ms, ROOMS, TICKETS, TICKET_REQUESTS,
};
use crate::rooms::require_admin;
use crate::GameError;

/// Ticket purchase workflow. Tickets are only ever created through an
/// approved request, so issuance, the player's ticket count, and the
/// money pool move together atomically.
#[derive(Clone)]
pub struct TicketDesk {
    store: DocStore,
}

impl TicketDesk {
    pub fn new(store: DocStore) -> Self {
        Self { store }
    }

    /// Files a pending ticket request for the calling player.
    pub async fn request_ticket(
        &self,
        player: &PlayerId,
        code: &RoomCode,
    ) -> Result<RequestId, GameError> {
        let request_id = self
            .store
            .in_transaction(|txn| {
                let room = load_room(txn, code)?;
                if !room.status.accepts_ticket_requests() {
                    return Err(GameError::FailedPrecondition(format!(
                        "room {code} is {}, tickets are no longer \
                         available",
                        room.status
                    )));
                }
                let presence =
                    room.players.get(player).ok_or_else(|| {
                        GameError::FailedPrecondition(format!(
                            "player must join room {code} before \
                             requesting a ticket"
                        ))
                    })?;
                if presence.ticket_count >= room.max_tickets_per_player {
                    return Err(GameError::ResourceExhausted(format!(
                        "player already holds the maximum of {} tickets",
                        room.max_tickets_per_player
                    )));
                }

                let request = TicketRequest {
                    id: RequestId::from(new_id("req")),
                    room: code.clone(),
                    player: player.clone(),
                    player_name: presence.name.clone(),
                    status: RequestStatus::Pending,
                    requested_at: now_ms(),
                    ticket_id: None,
                    reject_reason: None,
                };
                txn.put(
                    TICKET_REQUESTS,
                    request.id.as_str(),
                    &request,
                )?;
                Ok::<_, GameError>(request.id)
            })
            .await?;

        tracing::debug!(
            %code,
            player = %player,
            request = %request_id,
            "ticket requested"
        );
        Ok(request_id)
    }

    /// Approves a pending request: generates a ticket, bumps the
    /// player's ticket count, and adds the ticket price to the money
    /// pool, all in one transaction.
    pub async fn approve_request(
        &self,
        admin: &PlayerId,
        code: &RoomCode,
        request_id: &RequestId,
    ) -> Result<Ticket, GameError> {
        let ticket = self
            .store
            .in_transaction(|txn| {
                let mut room = load_room(txn, code)?;
                require_admin(&room, admin)?;
                let mut request = load_request(txn, code, request_id)?;
                if !request.status.is_pending() {
                    return Err(GameError::AlreadyProcessed {
                        what: "ticket request",
                        id: request_id.to_string(),
                    });
                }
                if !room.status.accepts_ticket_requests() {
                    return Err(GameError::FailedPrecondition(format!(
                        "room {code} is {}, pending requests can no \
                         longer be approved",
                        room.status
                    )));
                }

                let max = room.max_tickets_per_player;
                let price = room.ticket_price;
                let presence = room
                    .players
                    .get_mut(&request.player)
                    .ok_or_else(|| {
                        GameError::FailedPrecondition(format!(
                            "player {} has left room {code}",
                            request.player
                        ))
                    })?;
                if presence.ticket_count >= max {
                    return Err(GameError::ResourceExhausted(format!(
                        "player already holds the maximum of {max} \
                         tickets"
                    )));
                }

                let ticket = Ticket {
                    id: TicketId::from(new_id("tkt")),
                    room: code.clone(),
                    owner: request.player.clone(),
                    grid: TicketGrid::generate()?,
                    marked: BTreeSet::new(),
                };

                presence.ticket_count += 1;
                room.money_collected += price;
                request.status = RequestStatus::Approved;
                request.ticket_id = Some(ticket.id.clone());

                txn.put(ROOMS, code.as_str(), &room)?;
                txn.put(TICKETS, ticket.id.as_str(), &ticket)?;
                txn.put(
                    TICKET_REQUESTS,
                    request.id.as_str(),
                    &request,
                )?;
                Ok::<_, GameError>(ticket)
            })
            .await?;

        tracing::info!(
            %code,
            request = %request_id,
            ticket = %ticket.id,
            owner = %ticket.owner,
            "ticket request approved"
        );
        Ok(ticket)
    }

    /// Rejects a pending request with a reason. No other side effects.
    pub async fn reject_request(
        &self,
        admin: &PlayerId,
        code: &RoomCode,
        request_id: &RequestId,
        reason: &str,
    ) -> Result<(), GameError> {
        self.store
            .in_transaction(|txn| {
                let room = load_room(txn, code)?;
                require_admin(&room, admin)?;
                let mut request = load_request(txn, code, request_id)?;
                if !request.status.is_pending() {
                    return Err(GameError::AlreadyProcessed {
                        what: "ticket request",
                        id: request_id.to_string(),
                    });
                }

                request.status = RequestStatus::Rejected;
                request.reject_reason = Some(reason.to_string());
                txn.put(
                    TICKET_REQUESTS,
                    request.id.as_str(),
                    &request,
                )?;
                Ok::<_, GameError>(())
            })
            .await?;

        tracing::info!(
            %code,
            request = %request_id,
            "ticket request rejected"
        );
        Ok(())
    }

    /// Toggles a player's own mark on one of their tickets. Marks are
    /// a player-side aid; the adjudicator never reads them.
    pub async fn mark_number(
        &self,
        player: &PlayerId,
        ticket_id: &TicketId,
        number: u8,
        marked: bool,
    ) -> Result<(), GameError> {
        if !(1..=90).contains(&number) {
            return Err(GameError::OutOfRange(number));
        }

        self.store
            .in_transaction(|txn| {
                let mut ticket = txn
                    .get::<Ticket>(TICKETS, ticket_id.as_str())?
                    .ok_or_else(|| GameError::NotFound {
                        what: "ticket",
                        id: ticket_id.to_string(),
                    })?;
                if &ticket.owner != player {
                    return Err(GameError::PermissionDenied(
                        "only the ticket owner may mark it".into(),
                    ));
                }
                if !ticket.grid.contains(number) {
                    return Err(GameError::InvalidArgument(format!(
                        "number {number} is not on ticket {ticket_id}"
                    )));
                }

                if marked {
                    ticket.marked.insert(number);
                } else {
                    ticket.marked.remove(&number);
                }
                txn.put(TICKETS, ticket_id.as_str(), &ticket)?;
                Ok::<_, GameError>(())
            })
            .await
    }
}

fn load_request(
    txn: &mut tambola_store::Transaction,
    code: &RoomCode,
    request_id: &RequestId,
) -> Result<TicketRequest, GameError> {
    let request = txn
        .get::<TicketRequest>(TICKET_REQUESTS, request_id.as_str())?
        .ok_or_else(|| GameError::NotFound {
            what: "ticket request",
            id: request_id.to_string(),
        })?;
    // Requests are scoped to their room; a request id from another
    // room is indistinguishable from a missing one.
    if &request.room != code {
        return Err(GameError::NotFound {
            what: "ticket request",
            id: request_id.to_string(),
        });
    }
    Ok(request)
}
