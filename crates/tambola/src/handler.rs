//! Per-connection handling: handshake, request dispatch, event pump,
//! and disconnect cleanup.
//!
//! Each connection gets one task. The task owns the read side of the
//! socket and an unbounded event queue that the [`RoomRegistry`] pushes
//! into; a `select!` loop interleaves the two. Locks are held only for
//! the duration of an operation, never across a network send.

use std::sync::Arc;
use std::time::Duration;

use tambola_model::{GameStatus, PlayerId, RoomCode};
use tambola_protocol::{
    ClientRequest, Codec, Envelope, GameEvent, Payload, ServerResponse,
};
use tambola_room::{new_id, GameError, RoomConfig, RoomConfigPatch};
use tambola_session::{Authenticator, SessionError};
use tambola_transport::Connection;
use tokio::sync::mpsc;
use tokio::time;

use crate::registry::EventSender;
use crate::server::{ServerState, PROTOCOL_VERSION};

/// How long the first frame (the handshake) may take to arrive.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Connections silent for this long are dropped. Heartbeats are
/// expected well within this window.
const IDLE_TIMEOUT: Duration = Duration::from_secs(120);

/// Marks the session disconnected and the player offline in their
/// rooms when the connection task ends, however it ends.
struct SessionGuard<A: Authenticator, C: Codec> {
    state: Arc<ServerState<A, C>>,
    player: PlayerId,
}

impl<A: Authenticator, C: Codec> Drop for SessionGuard<A, C> {
    fn drop(&mut self) {
        let state = Arc::clone(&self.state);
        let player = self.player.clone();
        tokio::spawn(async move {
            let rooms = {
                let mut sessions = state.sessions.lock().await;
                if let Err(e) = sessions.disconnect(&player) {
                    tracing::debug!(
                        player = %player,
                        error = %e,
                        "disconnect cleanup found no session"
                    );
                }
                sessions.rooms_of(&player)
            };
            for code in &rooms {
                state.rooms.mark_offline(&player, code).await;
            }
            state.registry.unsubscribe_all(&player);
        });
    }
}

pub(crate) async fn handle_connection<Conn, A, C>(
    conn: Conn,
    state: Arc<ServerState<A, C>>,
) where
    Conn: Connection,
    A: Authenticator,
    C: Codec,
{
    let conn_id = conn.id();
    let mut seq = 0u64;

    let setup =
        match perform_handshake(&conn, &state, &mut seq).await {
            Ok(setup) => setup,
            Err(()) => {
                let _ = conn.close().await;
                return;
            }
        };
    let player = setup.player;

    send_payload(
        &conn,
        &state,
        &mut seq,
        Payload::Response(ServerResponse::HandshakeAck {
            player_id: player.clone(),
            server_time: state.elapsed_ms(),
            reconnect_token: setup.reconnect_token,
        }),
    )
    .await;

    tracing::info!(
        %conn_id,
        player = %player,
        resumed = setup.resumed,
        "connection established"
    );
    let _guard = SessionGuard {
        state: Arc::clone(&state),
        player: player.clone(),
    };

    // Held for the connection's lifetime so the receiver never yields
    // `None` while we are still in the loop.
    let (events_tx, mut events_rx) = mpsc::unbounded_channel();

    // A resumed session keeps its room memberships: re-attach this
    // connection's event queue and bring presence back online.
    for code in &setup.rooms {
        state.registry.subscribe(code, &player, events_tx.clone());
        state.rooms.touch_presence(&player, code).await;
    }

    loop {
        tokio::select! {
            maybe_event = events_rx.recv() => {
                if let Some(event) = maybe_event {
                    send_payload(
                        &conn,
                        &state,
                        &mut seq,
                        Payload::Event(event),
                    )
                    .await;
                }
            }
            frame = time::timeout(IDLE_TIMEOUT, conn.recv()) => {
                let bytes = match frame {
                    Err(_) => {
                        tracing::info!(
                            %conn_id,
                            player = %player,
                            "connection idle, dropping"
                        );
                        break;
                    }
                    Ok(Ok(None)) => break,
                    Ok(Err(e)) => {
                        tracing::debug!(
                            %conn_id,
                            error = %e,
                            "receive failed"
                        );
                        break;
                    }
                    Ok(Ok(Some(bytes))) => bytes,
                };

                let envelope: Envelope =
                    match state.codec.decode(&bytes) {
                        Ok(envelope) => envelope,
                        Err(e) => {
                            tracing::debug!(
                                %conn_id,
                                error = %e,
                                "undecodable frame"
                            );
                            send_error(
                                &conn, &state, &mut seq,
                                3, "malformed envelope",
                            )
                            .await;
                            continue;
                        }
                    };
                let Payload::Request(request) = envelope.payload else {
                    send_error(
                        &conn, &state, &mut seq,
                        3, "expected a request payload",
                    )
                    .await;
                    continue;
                };

                if let ClientRequest::Disconnect { reason } = request {
                    tracing::info!(
                        %conn_id,
                        player = %player,
                        reason,
                        "client disconnected"
                    );
                    break;
                }

                match dispatch(&state, &player, &events_tx, request)
                    .await
                {
                    Ok(outcome) => {
                        send_payload(
                            &conn,
                            &state,
                            &mut seq,
                            Payload::Response(outcome.reply),
                        )
                        .await;
                        for (code, event) in outcome.events {
                            state.registry.broadcast(&code, &event);
                        }
                    }
                    Err(e) => {
                        send_error(
                            &conn,
                            &state,
                            &mut seq,
                            e.code(),
                            &e.to_string(),
                        )
                        .await;
                    }
                }
            }
        }
    }

    let _ = conn.close().await;
    tracing::debug!(%conn_id, player = %player, "connection task finished");
}

// ---------------------------------------------------------------------------
// Handshake
// ---------------------------------------------------------------------------

/// The established identity after a successful handshake.
struct ConnectionSetup {
    player: PlayerId,
    reconnect_token: String,
    /// Rooms carried over from a resumed session.
    rooms: Vec<RoomCode>,
    resumed: bool,
}

/// Reads and validates the first frame, then creates or resumes the
/// session. Anonymous clients (no token) get a fresh guest identity.
async fn perform_handshake<Conn, A, C>(
    conn: &Conn,
    state: &ServerState<A, C>,
    seq: &mut u64,
) -> Result<ConnectionSetup, ()>
where
    Conn: Connection,
    A: Authenticator,
    C: Codec,
{
    let bytes =
        match time::timeout(HANDSHAKE_TIMEOUT, conn.recv()).await {
            Ok(Ok(Some(bytes))) => bytes,
            Ok(Ok(None)) => return Err(()),
            Ok(Err(e)) => {
                tracing::debug!(error = %e, "receive failed during handshake");
                return Err(());
            }
            Err(_) => {
                tracing::debug!("handshake timed out");
                return Err(());
            }
        };

    let envelope: Envelope = match state.codec.decode(&bytes) {
        Ok(envelope) => envelope,
        Err(_) => {
            send_error(conn, state, seq, 3, "malformed handshake").await;
            return Err(());
        }
    };
    let Payload::Request(ClientRequest::Handshake {
        version,
        token,
        reconnect,
    }) = envelope.payload
    else {
        send_error(
            conn,
            state,
            seq,
            9,
            "the first message must be a handshake",
        )
        .await;
        return Err(());
    };

    if version != PROTOCOL_VERSION {
        send_error(
            conn,
            state,
            seq,
            3,
            &format!(
                "unsupported protocol version {version}, \
                 server speaks {PROTOCOL_VERSION}"
            ),
        )
        .await;
        return Err(());
    }

    if let Some(reconnect) = reconnect {
        let mut sessions = state.sessions.lock().await;
        return match sessions.reconnect(&reconnect) {
            Ok(session) => Ok(ConnectionSetup {
                player: session.player_id.clone(),
                reconnect_token: session.reconnect_token.clone(),
                rooms: session.rooms.iter().cloned().collect(),
                resumed: true,
            }),
            Err(e) => {
                drop(sessions);
                tracing::info!(error = %e, "session resume failed");
                send_error(conn, state, seq, 16, &e.to_string()).await;
                Err(())
            }
        };
    }

    let player = match token {
        Some(token) => match state.auth.authenticate(&token).await {
            Ok(player) => player,
            Err(e) => {
                tracing::info!(error = %e, "authentication failed");
                send_error(conn, state, seq, 16, &e.to_string()).await;
                return Err(());
            }
        },
        None => PlayerId::from(new_id("guest")),
    };

    let mut sessions = state.sessions.lock().await;
    match sessions.create(player) {
        Ok(session) => Ok(ConnectionSetup {
            player: session.player_id.clone(),
            reconnect_token: session.reconnect_token.clone(),
            rooms: Vec::new(),
            resumed: false,
        }),
        Err(e) => {
            drop(sessions);
            send_error(
                conn,
                state,
                seq,
                session_error_code(&e),
                &e.to_string(),
            )
            .await;
            Err(())
        }
    }
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

/// A reply for the requester plus events for room subscribers.
struct Outcome {
    reply: ServerResponse,
    events: Vec<(RoomCode, GameEvent)>,
}

impl Outcome {
    fn reply(reply: ServerResponse) -> Self {
        Self { reply, events: Vec::new() }
    }

    fn with_event(mut self, code: RoomCode, event: GameEvent) -> Self {
        self.events.push((code, event));
        self
    }
}

async fn dispatch<A, C>(
    state: &Arc<ServerState<A, C>>,
    player: &PlayerId,
    events_tx: &EventSender,
    request: ClientRequest,
) -> Result<Outcome, GameError>
where
    A: Authenticator,
    C: Codec,
{
    let outcome = match request {
        ClientRequest::Handshake { .. } => {
            return Err(GameError::FailedPrecondition(
                "handshake already completed".into(),
            ));
        }

        ClientRequest::Heartbeat { client_time } => {
            let rooms = state.sessions.lock().await.rooms_of(player);
            for code in &rooms {
                state.rooms.touch_presence(player, code).await;
            }
            Outcome::reply(ServerResponse::HeartbeatAck {
                client_time,
                server_time: state.elapsed_ms(),
            })
        }

        ClientRequest::CreateRoom {
            name,
            display_name,
            rules,
            ticket_price,
            max_tickets_per_player,
            calling_mode,
            auto_call_interval_secs,
        } => {
            let config = RoomConfig {
                name,
                rules,
                ticket_price,
                max_tickets_per_player,
                calling_mode,
                auto_call_interval_secs,
            };
            let code = state
                .rooms
                .create_room(player, &display_name, config)
                .await?;
            track_room(state, player, &code).await;
            state.registry.subscribe(&code, player, events_tx.clone());
            Outcome::reply(ServerResponse::RoomCreated { room: code })
        }

        ClientRequest::UpdateRoomConfig {
            room,
            name,
            rules,
            ticket_price,
            max_tickets_per_player,
            calling_mode,
            auto_call_interval_secs,
        } => {
            let patch = RoomConfigPatch {
                name,
                rules,
                ticket_price,
                max_tickets_per_player,
                calling_mode,
                auto_call_interval_secs,
            };
            state.rooms.update_config(player, &room, patch).await?;
            Outcome::reply(ServerResponse::Ack)
        }

        ClientRequest::SetLifecycle { room, action } => {
            let (status, summary) =
                state.rooms.set_lifecycle(player, &room, action).await?;
            Outcome::reply(ServerResponse::LifecycleChanged {
                room: room.clone(),
                status,
                summary: summary.clone(),
            })
            .with_event(
                room.clone(),
                GameEvent::StatusChanged { room, status, summary },
            )
        }

        ClientRequest::CallNumber { room, number } => {
            match state.caller.call_number(player, &room, number).await {
                Ok(called) => Outcome::reply(
                    ServerResponse::NumberCalled {
                        room: room.clone(),
                        number: called.number,
                    },
                )
                .with_event(
                    room.clone(),
                    GameEvent::NumberCalled {
                        room,
                        number: called.number,
                        called_count: called.called_count,
                    },
                ),
                // The board ran out: the room was stopped inside the
                // call, so subscribers still need the status event.
                Err(e @ GameError::AllNumbersCalled) => {
                    let summary = state
                        .rooms
                        .get_room(&room)
                        .ok()
                        .and_then(|r| r.summary);
                    Outcome::reply(ServerResponse::Error {
                        code: e.code(),
                        message: e.to_string(),
                    })
                    .with_event(
                        room.clone(),
                        GameEvent::StatusChanged {
                            room,
                            status: GameStatus::Stopped,
                            summary,
                        },
                    )
                }
                Err(e) => return Err(e),
            }
        }

        ClientRequest::JoinRoom { room, display_name } => {
            let room_doc = state
                .rooms
                .join_room(player, &room, &display_name)
                .await?;
            track_room(state, player, &room).await;
            state.registry.subscribe(&room, player, events_tx.clone());

            let name = room_doc
                .players
                .get(player)
                .map(|p| p.name.clone())
                .unwrap_or(display_name);
            Outcome::reply(ServerResponse::RoomSnapshot {
                room: Box::new(room_doc),
            })
            .with_event(
                room.clone(),
                GameEvent::PlayerJoined {
                    room,
                    player: player.clone(),
                    name,
                },
            )
        }

        ClientRequest::RequestTicket { room } => {
            let request =
                state.desk.request_ticket(player, &room).await?;
            Outcome::reply(ServerResponse::TicketRequested { request })
        }

        ClientRequest::ApproveTicketRequest { room, request } => {
            let ticket = state
                .desk
                .approve_request(player, &room, &request)
                .await?;
            Outcome::reply(ServerResponse::TicketApproved {
                request,
                ticket: Box::new(ticket),
            })
        }

        ClientRequest::RejectTicketRequest { room, request, reason } => {
            state
                .desk
                .reject_request(player, &room, &request, &reason)
                .await?;
            Outcome::reply(ServerResponse::Ack)
        }

        ClientRequest::SubmitClaim { room, ticket, rule, numbers } => {
            let claim = state
                .claims
                .submit_claim(player, &room, &ticket, &rule, numbers)
                .await?;
            Outcome::reply(ServerResponse::ClaimSubmitted {
                claim: claim.id,
                status: claim.status,
            })
        }

        ClientRequest::ApproveClaim { room, claim } => {
            let winner = state
                .claims
                .approve_claim(player, &room, &claim)
                .await?;
            Outcome::reply(ServerResponse::ClaimApproved {
                claim,
                coins_awarded: winner.coins_awarded,
            })
            .with_event(
                room.clone(),
                GameEvent::WinnerAnnounced { room, winner },
            )
        }

        ClientRequest::RejectClaim { room, claim, reason } => {
            state
                .claims
                .reject_claim(player, &room, &claim, &reason)
                .await?;
            Outcome::reply(ServerResponse::Ack)
        }

        ClientRequest::MarkNumber { ticket, number, marked } => {
            state
                .desk
                .mark_number(player, &ticket, number, marked)
                .await?;
            Outcome::reply(ServerResponse::Ack)
        }

        ClientRequest::GetRoom { room } => {
            let room_doc = state.rooms.get_room(&room)?;
            Outcome::reply(ServerResponse::RoomSnapshot {
                room: Box::new(room_doc),
            })
        }

        // Intercepted by the connection loop.
        ClientRequest::Disconnect { .. } => {
            Outcome::reply(ServerResponse::Ack)
        }
    };

    Ok(outcome)
}

/// Remembers the room on the session so heartbeats and the final
/// disconnect can update presence.
async fn track_room<A, C>(
    state: &ServerState<A, C>,
    player: &PlayerId,
    code: &RoomCode,
) where
    A: Authenticator,
    C: Codec,
{
    let mut sessions = state.sessions.lock().await;
    if let Err(e) = sessions.track_room(player, code.clone()) {
        tracing::warn!(
            player = %player,
            %code,
            error = %e,
            "failed to track room on session"
        );
    }
}

// ---------------------------------------------------------------------------
// Outbound helpers
// ---------------------------------------------------------------------------

fn next_seq(seq: &mut u64) -> u64 {
    *seq += 1;
    *seq
}

async fn send_payload<Conn, A, C>(
    conn: &Conn,
    state: &ServerState<A, C>,
    seq: &mut u64,
    payload: Payload,
) where
    Conn: Connection,
    A: Authenticator,
    C: Codec,
{
    let envelope = Envelope {
        seq: next_seq(seq),
        timestamp: state.elapsed_ms(),
        payload,
    };
    match state.codec.encode(&envelope) {
        Ok(bytes) => {
            if let Err(e) = conn.send(&bytes).await {
                tracing::debug!(
                    conn_id = %conn.id(),
                    error = %e,
                    "failed to send frame"
                );
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to encode envelope");
        }
    }
}

async fn send_error<Conn, A, C>(
    conn: &Conn,
    state: &ServerState<A, C>,
    seq: &mut u64,
    code: u16,
    message: &str,
) where
    Conn: Connection,
    A: Authenticator,
    C: Codec,
{
    send_payload(
        conn,
        state,
        seq,
        Payload::Response(ServerResponse::Error {
            code,
            message: message.to_string(),
        }),
    )
    .await;
}

fn session_error_code(e: &SessionError) -> u16 {
    match e {
        SessionError::AlreadyConnected(_) => 6,
        SessionError::NotFound(_) => 5,
        SessionError::AuthFailed(_)
        | SessionError::InvalidToken
        | SessionError::SessionExpired(_) => 16,
    }
}
